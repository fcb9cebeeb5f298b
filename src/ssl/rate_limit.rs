/// ACME-aware rate limiting and failure backoff.
/// Sliding windows mirror the CA's published limits so the service denies
/// locally before the provider would; failures drive an exponential
/// backoff per domain. State is in-memory and rebuilt on restart.
use crate::config::RateLimitSettings;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// 7-day request window
const REQUEST_WINDOW: Duration = Duration::from_secs(7 * 24 * 3600);
/// 1-hour failed-validation window
const FAILED_VALIDATION_WINDOW: Duration = Duration::from_secs(3600);
/// 3-hour account-creation window
const ACCOUNT_WINDOW: Duration = Duration::from_secs(3 * 3600);
/// Ceiling for the soft-delay suggestion
const MAX_SOFT_DELAY: Duration = Duration::from_secs(3600);

#[derive(Debug, Default, Clone)]
struct BackoffState {
    consecutive_failures: u32,
    next_allowed_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct DomainWindow {
    /// (timestamp, success) pairs within the past 7 days
    requests: Vec<(Instant, bool)>,
    /// Failed validations within the past hour
    failed_validations: Vec<Instant>,
    backoff: BackoffState,
}

#[derive(Default)]
struct LimiterState {
    domains: HashMap<String, DomainWindow>,
    account_creations: HashMap<String, Vec<Instant>>,
}

/// Rate limiter guarding the ACME provider
pub struct AcmeRateLimiter {
    settings: RateLimitSettings,
    state: Mutex<LimiterState>,
}

impl AcmeRateLimiter {
    pub fn new(settings: RateLimitSettings) -> Self {
        Self {
            settings,
            state: Mutex::new(LimiterState::default()),
        }
    }

    /// Admission check for a certificate request
    pub fn allow_request(&self, domain: &str) -> Result<()> {
        self.allow_request_at(domain, Instant::now())
    }

    pub fn allow_request_at(&self, domain: &str, now: Instant) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let window = state.domains.entry(domain.to_lowercase()).or_default();
        Self::prune_window(window, now);

        if let Some(until) = window.backoff.next_allowed_at {
            if now < until {
                return Err(Error::rate_limited(format!(
                    "Domain {} is backing off for {}s after {} consecutive failures",
                    domain,
                    (until - now).as_secs(),
                    window.backoff.consecutive_failures
                )));
            }
        }

        let request_count = window.requests.len();
        let limit = self.settings.requests_per_domain_per_week;
        if request_count >= limit {
            return Err(Error::rate_limited(format!(
                "Domain {} reached {} certificate requests in 7 days",
                domain, limit
            )));
        }

        let failed_count = window.failed_validations.len();
        let failed_limit = self.settings.failed_validations_per_hour;
        if failed_count >= failed_limit {
            return Err(Error::rate_limited(format!(
                "Domain {} reached {} failed validations in 1 hour",
                domain, failed_limit
            )));
        }

        let warn_at = (limit as f64 * self.settings.warning_threshold) as usize;
        if request_count >= warn_at {
            tracing::warn!(
                domain = %domain,
                used = request_count,
                limit = limit,
                "Approaching ACME request limit"
            );
        }

        Ok(())
    }

    /// Suggested pacing delay for non-urgent renewals above the warning
    /// threshold: `min(1h, remaining_window / remaining_quota)`.
    pub fn should_delay_request(&self, domain: &str) -> Option<Duration> {
        self.should_delay_request_at(domain, Instant::now())
    }

    pub fn should_delay_request_at(&self, domain: &str, now: Instant) -> Option<Duration> {
        let mut state = self.state.lock().unwrap();
        let window = state.domains.get_mut(&domain.to_lowercase())?;
        Self::prune_window(window, now);

        let limit = self.settings.requests_per_domain_per_week;
        let used = window.requests.len();
        let warn_at = (limit as f64 * self.settings.warning_threshold) as usize;
        if used < warn_at || used >= limit {
            return None;
        }

        let oldest = window.requests.first().map(|(t, _)| *t)?;
        let window_resets_in = (oldest + REQUEST_WINDOW).saturating_duration_since(now);
        let remaining_quota = (limit - used) as u32;
        let delay = window_resets_in / remaining_quota;
        Some(delay.min(MAX_SOFT_DELAY))
    }

    /// Record the outcome of an ACME request. Success clears the backoff;
    /// failure doubles it up to the configured ceiling.
    pub fn record_request(&self, domain: &str, success: bool) {
        self.record_request_at(domain, success, Instant::now());
    }

    pub fn record_request_at(&self, domain: &str, success: bool, now: Instant) {
        let mut state = self.state.lock().unwrap();
        let window = state.domains.entry(domain.to_lowercase()).or_default();
        window.requests.push((now, success));

        if success {
            window.backoff = BackoffState::default();
        } else {
            window.backoff.consecutive_failures += 1;
            let exp = window.backoff.consecutive_failures.saturating_sub(1).min(31);
            let backoff_secs = self
                .settings
                .base_backoff_secs
                .saturating_mul(1u64 << exp)
                .min(self.settings.max_backoff_secs);
            window.backoff.next_allowed_at = Some(now + Duration::from_secs(backoff_secs));
            tracing::debug!(
                domain = %domain,
                failures = window.backoff.consecutive_failures,
                backoff_secs,
                "ACME failure recorded, backing off"
            );
        }
    }

    /// Record a failed domain validation (separate 1-hour window)
    pub fn record_validation_failure(&self, domain: &str) {
        self.record_validation_failure_at(domain, Instant::now());
    }

    pub fn record_validation_failure_at(&self, domain: &str, now: Instant) {
        let mut state = self.state.lock().unwrap();
        let window = state.domains.entry(domain.to_lowercase()).or_default();
        window.failed_validations.push(now);
    }

    /// Admission check for ACME account creation per source IP
    pub fn allow_account_creation(&self, ip: &str) -> Result<()> {
        self.allow_account_creation_at(ip, Instant::now())
    }

    pub fn allow_account_creation_at(&self, ip: &str, now: Instant) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let creations = state.account_creations.entry(ip.to_string()).or_default();
        creations.retain(|t| now.saturating_duration_since(*t) < ACCOUNT_WINDOW);

        if creations.len() >= self.settings.accounts_per_ip_per_3h {
            return Err(Error::rate_limited(format!(
                "IP {} reached {} account creations in 3 hours",
                ip, self.settings.accounts_per_ip_per_3h
            )));
        }
        creations.push(now);
        Ok(())
    }

    /// Current backoff failure count for a domain (metrics/status surface)
    pub fn consecutive_failures(&self, domain: &str) -> u32 {
        let state = self.state.lock().unwrap();
        state
            .domains
            .get(&domain.to_lowercase())
            .map(|w| w.backoff.consecutive_failures)
            .unwrap_or(0)
    }

    fn prune_window(window: &mut DomainWindow, now: Instant) {
        window
            .requests
            .retain(|(t, _)| now.saturating_duration_since(*t) < REQUEST_WINDOW);
        window
            .failed_validations
            .retain(|t| now.saturating_duration_since(*t) < FAILED_VALIDATION_WINDOW);
    }

    /// Drop entries older than the longest relevant window and empty
    /// domains with no live state
    pub fn prune(&self) {
        self.prune_at(Instant::now());
    }

    pub fn prune_at(&self, now: Instant) {
        let mut state = self.state.lock().unwrap();
        for window in state.domains.values_mut() {
            Self::prune_window(window, now);
        }
        state.domains.retain(|_, w| {
            !w.requests.is_empty()
                || !w.failed_validations.is_empty()
                || w.backoff.next_allowed_at.is_some_and(|t| t > now)
        });
        for creations in state.account_creations.values_mut() {
            creations.retain(|t| now.saturating_duration_since(*t) < ACCOUNT_WINDOW);
        }
        state.account_creations.retain(|_, c| !c.is_empty());
    }

    /// Hourly housekeeping loop
    pub async fn run_pruner(self: std::sync::Arc<Self>) {
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            self.prune();
            tracing::debug!("Rate limit windows pruned");
        }
    }
}

/// Cached ACME account credentials, keyed by contact email.
/// Avoids re-registration across provisioning runs.
#[derive(Debug, Clone)]
pub struct AcmeAccount {
    pub account_url: String,
    pub key_pem: String,
    pub created_at: Instant,
    pub last_used: Instant,
}

#[derive(Default)]
pub struct AcmeAccountCache {
    accounts: Mutex<HashMap<String, AcmeAccount>>,
}

impl AcmeAccountCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch cached credentials, stamping last-used
    pub fn get(&self, email: &str) -> Option<AcmeAccount> {
        let mut accounts = self.accounts.lock().unwrap();
        accounts.get_mut(email).map(|acct| {
            acct.last_used = Instant::now();
            acct.clone()
        })
    }

    pub fn insert(&self, email: &str, account_url: String, key_pem: String) {
        let now = Instant::now();
        self.accounts.lock().unwrap().insert(
            email.to_string(),
            AcmeAccount {
                account_url,
                key_pem,
                created_at: now,
                last_used: now,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.accounts.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> AcmeRateLimiter {
        AcmeRateLimiter::new(RateLimitSettings::default())
    }

    #[test]
    fn test_weekly_request_cap() {
        let limiter = limiter();
        let now = Instant::now();
        for _ in 0..50 {
            limiter.record_request_at("acme.test", true, now);
        }
        let err = limiter.allow_request_at("acme.test", now).unwrap_err();
        assert!(matches!(err, Error::RateLimited(_)));

        // Past the window the domain is admitted again
        let later = now + REQUEST_WINDOW + Duration::from_secs(1);
        assert!(limiter.allow_request_at("acme.test", later).is_ok());
    }

    #[test]
    fn test_failed_validation_cap() {
        let limiter = limiter();
        let now = Instant::now();
        for _ in 0..5 {
            limiter.record_validation_failure_at("example.com", now);
        }
        assert!(limiter.allow_request_at("example.com", now).is_err());

        let later = now + FAILED_VALIDATION_WINDOW + Duration::from_secs(1);
        assert!(limiter.allow_request_at("example.com", later).is_ok());
    }

    #[test]
    fn test_backoff_doubles_and_clears() {
        let limiter = limiter();
        let now = Instant::now();

        limiter.record_request_at("example.com", false, now);
        // 1 failure: 60s backoff
        assert!(limiter.allow_request_at("example.com", now).is_err());
        assert!(
            limiter
                .allow_request_at("example.com", now + Duration::from_secs(61))
                .is_ok()
        );

        limiter.record_request_at("example.com", false, now);
        // 2 failures: 120s backoff
        assert!(
            limiter
                .allow_request_at("example.com", now + Duration::from_secs(61))
                .is_err()
        );
        assert!(
            limiter
                .allow_request_at("example.com", now + Duration::from_secs(121))
                .is_ok()
        );

        limiter.record_request_at("example.com", true, now);
        assert_eq!(limiter.consecutive_failures("example.com"), 0);
        assert!(limiter.allow_request_at("example.com", now).is_ok());
    }

    #[test]
    fn test_backoff_is_capped() {
        let limiter = limiter();
        let now = Instant::now();
        for _ in 0..40 {
            limiter.record_request_at("example.com", false, now);
        }
        // Even after many failures the backoff never exceeds the ceiling
        assert!(
            limiter
                .allow_request_at("example.com", now + Duration::from_secs(86_401))
                .is_ok()
        );
    }

    #[test]
    fn test_soft_delay_above_warning_threshold() {
        let limiter = limiter();
        let now = Instant::now();
        for _ in 0..30 {
            limiter.record_request_at("example.com", true, now);
        }
        assert!(limiter.should_delay_request_at("example.com", now).is_none());

        for _ in 0..12 {
            limiter.record_request_at("example.com", true, now);
        }
        // 42/50 used: above the 80% threshold
        let delay = limiter
            .should_delay_request_at("example.com", now)
            .expect("expected a pacing delay");
        assert!(delay <= MAX_SOFT_DELAY);
        assert!(delay > Duration::ZERO);
    }

    #[test]
    fn test_account_creation_cap() {
        let limiter = limiter();
        let now = Instant::now();
        for _ in 0..10 {
            assert!(limiter.allow_account_creation_at("10.0.0.1", now).is_ok());
        }
        assert!(limiter.allow_account_creation_at("10.0.0.1", now).is_err());
        assert!(limiter.allow_account_creation_at("10.0.0.2", now).is_ok());
    }

    #[test]
    fn test_prune_discards_stale_state() {
        let limiter = limiter();
        let now = Instant::now();
        limiter.record_request_at("stale.com", true, now);
        limiter.prune_at(now + REQUEST_WINDOW + Duration::from_secs(1));
        assert!(limiter.state.lock().unwrap().domains.is_empty());
    }

    #[test]
    fn test_account_cache() {
        let cache = AcmeAccountCache::new();
        assert!(cache.get("ops@example.com").is_none());
        cache.insert(
            "ops@example.com",
            "https://acme/acct/1".into(),
            "key".into(),
        );
        let acct = cache.get("ops@example.com").unwrap();
        assert_eq!(acct.account_url, "https://acme/acct/1");
        assert_eq!(cache.len(), 1);
    }
}
