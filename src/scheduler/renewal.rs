/// Expiry-driven certificate renewal worker.
/// Ticks daily, queries certificates nearing expiry, and renews them with
/// bounded parallelism. On cancellation no new renewals start; in-flight
/// renewals finish and the worker exits after the current tick.
use crate::config::RenewalSettings;
use crate::error::Result;
use crate::events::{AlertSeverity, EventBus, ServiceEvent};
use crate::metrics::SharedMetrics;
use crate::repo::CertificateRepo;
use crate::ssl::CertificateManager;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;

/// Expiry alert thresholds in days, most urgent first
const ALERT_THRESHOLDS: [i64; 4] = [1, 3, 7, 14];
/// Threshold at or below which an alert is critical
const CRITICAL_WITHIN_DAYS: i64 = 7;

/// Outcome of one scheduler pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenewalSummary {
    pub candidates: usize,
    pub renewed: usize,
    pub failed: usize,
    pub skipped: usize,
}

pub struct RenewalScheduler {
    manager: Arc<CertificateManager>,
    certs: Arc<dyn CertificateRepo>,
    events: EventBus,
    metrics: SharedMetrics,
    settings: RenewalSettings,
}

impl RenewalScheduler {
    pub fn new(
        manager: Arc<CertificateManager>,
        certs: Arc<dyn CertificateRepo>,
        events: EventBus,
        metrics: SharedMetrics,
        settings: RenewalSettings,
    ) -> Self {
        Self {
            manager,
            certs,
            events,
            metrics,
            settings,
        }
    }

    /// Long-lived worker loop. `shutdown` flipping to true stops the loop;
    /// the current tick is allowed to finish first.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.settings.check_interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(
            interval_secs = self.settings.check_interval_secs,
            renewal_days = self.settings.renewal_days,
            "Renewal scheduler started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.run_now(&shutdown).await {
                        Ok(summary) => tracing::info!(?summary, "Renewal tick finished"),
                        Err(e) => tracing::error!(error = %e, "Renewal tick failed"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("Renewal scheduler stopping");
                        break;
                    }
                }
            }
        }
    }

    /// One synchronous pass, also the explicit trigger behind the API.
    /// The `shutdown` receiver stops new renewals mid-pass.
    pub async fn run_now(&self, shutdown: &watch::Receiver<bool>) -> Result<RenewalSummary> {
        let now = Utc::now();
        let due_before = now + ChronoDuration::days(self.settings.renewal_days);
        let candidates = self.certs.list_expiring(due_before).await?;
        let retry_interval = ChronoDuration::seconds(self.settings.retry_interval_secs as i64);

        let mut summary = RenewalSummary {
            candidates: candidates.len(),
            ..Default::default()
        };

        let semaphore = Arc::new(Semaphore::new(self.settings.parallelism.max(1)));
        let mut tasks: JoinSet<(String, uuid::Uuid, bool)> = JoinSet::new();

        for cert in candidates {
            if *shutdown.borrow() {
                tracing::info!("Cancellation observed, not starting further renewals");
                break;
            }

            // Respect the per-certificate retry spacing
            if let Some(last) = cert.last_renewal_attempt {
                if now - last < retry_interval {
                    summary.skipped += 1;
                    continue;
                }
            }

            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .expect("renewal semaphore closed");
            let manager = self.manager.clone();
            let domain_name = cert.domain_name.clone();
            let domain_id = cert.domain_id;
            let urgent = cert
                .days_until_expiry(now)
                .is_some_and(|days| days <= CRITICAL_WITHIN_DAYS);

            tasks.spawn(async move {
                let _permit = permit;
                // Non-urgent renewals pace themselves when the domain is
                // approaching its weekly request cap
                if !urgent {
                    if let Some(delay) =
                        manager.rate_limiter().should_delay_request(&domain_name)
                    {
                        tracing::debug!(
                            domain = %domain_name,
                            delay_secs = delay.as_secs(),
                            "Pacing renewal near the rate limit"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
                let ok = manager.renew(domain_id).await.is_ok();
                (domain_name, domain_id, ok)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let Ok((domain_name, domain_id, ok)) = joined else {
                summary.failed += 1;
                continue;
            };

            if ok {
                summary.renewed += 1;
                let expires_at = self
                    .certs
                    .get_by_domain_id(domain_id)
                    .await
                    .ok()
                    .flatten()
                    .and_then(|c| c.expires_at)
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default();
                self.events.publish(ServiceEvent::CertificateRenewed {
                    domain: domain_name,
                    expires_at,
                });
            } else {
                summary.failed += 1;
                self.events.publish(ServiceEvent::CertificateRenewalFailed {
                    domain: domain_name.clone(),
                    error: "renewal failed, scheduler will retry".into(),
                });

                if let Ok(Some(cert)) = self.certs.get_by_domain_id(domain_id).await {
                    if let Some(days) = cert.days_until_expiry(now) {
                        self.emit_expiry_alert(&domain_name, days);
                    }
                }
            }
        }

        self.update_expiry_gauges().await?;
        Ok(summary)
    }

    /// Emit at most one alert: the most urgent threshold the certificate
    /// has crossed this tick.
    fn emit_expiry_alert(&self, domain: &str, days_until_expiry: i64) {
        let Some(threshold) = ALERT_THRESHOLDS
            .iter()
            .find(|t| days_until_expiry <= **t)
        else {
            return;
        };
        let severity = if *threshold <= CRITICAL_WITHIN_DAYS {
            AlertSeverity::Critical
        } else {
            AlertSeverity::Warning
        };
        tracing::warn!(
            domain = %domain,
            days_until_expiry,
            threshold,
            ?severity,
            "Certificate expiring without successful renewal"
        );
        self.events.publish(ServiceEvent::CertificateExpiring {
            domain: domain.to_string(),
            days_until_expiry,
            severity,
        });
    }

    /// Refresh the expiring-within-{7,14,30} gauges
    async fn update_expiry_gauges(&self) -> Result<()> {
        let now = Utc::now();
        for window in [7i64, 14, 30] {
            let count = self
                .certs
                .list_expiring(now + ChronoDuration::days(window))
                .await?
                .len();
            self.metrics
                .expiring_certificates
                .with_label_values(&[&window.to_string()])
                .set(count as i64);
        }
        Ok(())
    }
}
