/// Certificate lifecycle manager.
/// Single entry point for provisioning, renewing, retrieving and revoking
/// TLS certificates. Maintains the hot cache, enforces the per-domain
/// in-flight gate and the global provisioning semaphore, and drives the
/// rate limiter and audit trail.
use super::acme::AcmeIssuer;
use super::cache::CertificateCache;
use super::rate_limit::AcmeRateLimiter;
use super::store::EncryptedCertStore;
use super::tls::TlsCertificate;
use crate::authz::is_valid_hostname;
use crate::error::{Error, Result};
use crate::metrics::SharedMetrics;
use crate::repo::{CertificateRepo, IssuedMetadata, RevocationLogRepo};
use crate::types::{
    Certificate, CertificateStatus, RevocationEvent, RevocationInitiator, RevocationReason,
};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use uuid::Uuid;

/// Which operation a provisioning run serves, for metrics labelling
#[derive(Clone, Copy, PartialEq, Eq)]
enum OpKind {
    Provision,
    Renewal,
}

pub struct CertificateManager {
    certs: Arc<dyn CertificateRepo>,
    revocations: Arc<dyn RevocationLogRepo>,
    store: Arc<EncryptedCertStore>,
    issuer: Arc<dyn AcmeIssuer>,
    cache: Arc<CertificateCache>,
    rate_limiter: Arc<AcmeRateLimiter>,
    metrics: SharedMetrics,
    /// Domain ids with a provisioning run underway
    in_flight: Mutex<HashSet<Uuid>>,
    /// Caps concurrent ACME-facing work across all domains
    provisioning_permits: Arc<Semaphore>,
    deadline: Duration,
}

/// Removes the domain from the in-flight set on every exit path
struct InFlightGuard<'a> {
    manager: &'a CertificateManager,
    domain_id: Uuid,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.manager
            .in_flight
            .lock()
            .unwrap()
            .remove(&self.domain_id);
    }
}

impl CertificateManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        certs: Arc<dyn CertificateRepo>,
        revocations: Arc<dyn RevocationLogRepo>,
        store: Arc<EncryptedCertStore>,
        issuer: Arc<dyn AcmeIssuer>,
        cache: Arc<CertificateCache>,
        rate_limiter: Arc<AcmeRateLimiter>,
        metrics: SharedMetrics,
        concurrency: usize,
        deadline: Duration,
    ) -> Self {
        Self {
            certs,
            revocations,
            store,
            issuer,
            cache,
            rate_limiter,
            metrics,
            in_flight: Mutex::new(HashSet::new()),
            provisioning_permits: Arc::new(Semaphore::new(concurrency)),
            deadline,
        }
    }

    pub fn cache(&self) -> &Arc<CertificateCache> {
        &self.cache
    }

    pub fn rate_limiter(&self) -> &Arc<AcmeRateLimiter> {
        &self.rate_limiter
    }

    /// Certificate row for a domain (status surface)
    pub async fn certificate_record(&self, domain_id: Uuid) -> Result<Option<Certificate>> {
        self.certs.get_by_domain_id(domain_id).await
    }

    /// All certificates currently in the active state
    pub async fn active_certificates(&self) -> Result<Vec<Certificate>> {
        self.certs.list_active().await
    }

    /// Provision a certificate for a verified domain. At most one run per
    /// domain; global concurrency is capped by the semaphore; the whole
    /// run is bounded by the hard deadline.
    pub async fn provision(&self, domain_id: Uuid, domain_name: &str) -> Result<Certificate> {
        self.run_issuance(domain_id, domain_name, OpKind::Provision)
            .await
    }

    /// Renew the existing certificate for a domain. Identical issuance
    /// path; the cache entry is atomically rotated so no handshake ever
    /// observes a missing certificate.
    pub async fn renew(&self, domain_id: Uuid) -> Result<Certificate> {
        let existing = self
            .certs
            .get_by_domain_id(domain_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("certificate for domain {}", domain_id)))?;
        self.certs.touch_renewal_attempt(domain_id).await?;
        self.run_issuance(domain_id, &existing.domain_name, OpKind::Renewal)
            .await
    }

    async fn run_issuance(
        &self,
        domain_id: Uuid,
        domain_name: &str,
        kind: OpKind,
    ) -> Result<Certificate> {
        let domain_name = domain_name.to_lowercase();
        if !is_valid_hostname(&domain_name) {
            return Err(Error::validation("domain_name", "invalid_hostname"));
        }

        // Per-domain gate, then the global semaphore
        let _guard = {
            let mut in_flight = self.in_flight.lock().unwrap();
            if !in_flight.insert(domain_id) {
                return Err(Error::ProvisioningInProgress(domain_name));
            }
            InFlightGuard {
                manager: self,
                domain_id,
            }
        };

        self.rate_limiter.allow_request(&domain_name)?;

        let _permit = self
            .provisioning_permits
            .acquire()
            .await
            .map_err(|_| Error::provisioning("Provisioning semaphore closed"))?;

        self.certs
            .begin_provisioning(domain_id, &domain_name)
            .await?;

        let started = Instant::now();
        let outcome = tokio::time::timeout(
            self.deadline,
            self.issue_and_install(domain_id, &domain_name),
        )
        .await
        .unwrap_or_else(|_| {
            Err(Error::timeout(format!(
                "Provisioning for {} exceeded {}s",
                domain_name,
                self.deadline.as_secs()
            )))
        });
        let elapsed = started.elapsed().as_secs_f64();

        let (metric, histogram) = match kind {
            OpKind::Provision => (
                &self.metrics.provisioning_total,
                &self.metrics.provisioning_duration_seconds,
            ),
            OpKind::Renewal => (
                &self.metrics.renewal_total,
                &self.metrics.renewal_duration_seconds,
            ),
        };

        match outcome {
            Ok(cert) => {
                self.rate_limiter.record_request(&domain_name, true);
                metric.with_label_values(&["success"]).inc();
                histogram.with_label_values(&["success"]).observe(elapsed);
                self.metrics
                    .renewal_failures
                    .with_label_values(&[&domain_name])
                    .set(0);
                tracing::info!(
                    domain = %domain_name,
                    serial = cert.serial_number.as_deref().unwrap_or(""),
                    "Certificate issued"
                );
                Ok(cert)
            }
            Err(e) => {
                self.rate_limiter.record_request(&domain_name, false);
                metric.with_label_values(&["failure"]).inc();
                histogram.with_label_values(&["failure"]).observe(elapsed);
                if let Err(db_err) = self.certs.mark_failed(domain_id).await {
                    tracing::error!(domain = %domain_name, error = %db_err,
                        "Failed to record provisioning failure");
                }
                if let Ok(Some(cert)) = self.certs.get_by_domain_id(domain_id).await {
                    self.metrics
                        .renewal_failures
                        .with_label_values(&[&domain_name])
                        .set(cert.renewal_failures as i64);
                }
                tracing::error!(domain = %domain_name, error = %e, "Certificate issuance failed");
                match kind {
                    OpKind::Provision => Err(Error::ProvisioningFailed(e.to_string())),
                    OpKind::Renewal => Err(Error::RenewalFailed(e.to_string())),
                }
            }
        }
    }

    /// The issuance body: order, persist encrypted, rotate the cache,
    /// record metadata.
    async fn issue_and_install(&self, domain_id: Uuid, domain_name: &str) -> Result<Certificate> {
        let order_domains = vec![domain_name.to_string(), format!("mail.{}", domain_name)];
        let issued = self.issuer.issue(&order_domains).await?;

        let storage_path = self
            .store
            .store(
                domain_id,
                issued.cert_pem.as_bytes(),
                issued.key_pem.as_bytes(),
                issued.chain_pem.as_bytes(),
            )
            .await?;

        // Load the new certificate into memory before touching the cache;
        // the swap itself happens under the cache's single write lock
        let tls_cert = self.store.load(domain_id, domain_name).await?;
        let tls_cert = Arc::new(tls_cert);

        let cert = self
            .certs
            .mark_active(
                domain_id,
                &IssuedMetadata {
                    issuer: issued.issuer.clone(),
                    serial_number: issued.serial_number.clone(),
                    issued_at: issued.issued_at,
                    expires_at: issued.expires_at,
                    storage_path,
                },
            )
            .await?;

        self.cache.rotate(domain_name, tls_cert);

        if let Some(days) = cert.days_until_expiry(Utc::now()) {
            self.metrics
                .certificate_expiry_days
                .with_label_values(&[domain_name, cert.status.as_str()])
                .set(days as f64);
        }
        self.refresh_active_gauge().await;

        Ok(cert)
    }

    async fn refresh_active_gauge(&self) {
        if let Ok(active) = self.certs.list_active().await {
            self.metrics.active_certificates.set(active.len() as i64);
        }
    }

    /// Cache-first certificate retrieval by domain name
    pub async fn get_certificate(&self, domain_name: &str) -> Result<Arc<TlsCertificate>> {
        if let Some(cert) = self.cache.get(domain_name) {
            return Ok(cert);
        }

        let record = self
            .certs
            .get_by_domain_name(domain_name)
            .await?
            .ok_or_else(|| Error::not_found(format!("certificate for {}", domain_name)))?;

        if record.status != CertificateStatus::Active {
            return Err(Error::CertificateNotActive {
                domain: record.domain_name,
                status: record.status.to_string(),
            });
        }

        let tls_cert = Arc::new(
            self.store
                .load(record.domain_id, &record.domain_name)
                .await?,
        );

        // Never serve outside the validity window; the row transitions to
        // expired and the scheduler takes it from there
        if !tls_cert.is_valid_at(Utc::now()) {
            self.certs
                .set_status(record.domain_id, CertificateStatus::Expired)
                .await?;
            self.cache.evict(&record.domain_name);
            return Err(Error::CertificateExpired(record.domain_name));
        }

        self.cache.rotate(&record.domain_name, tls_cert.clone());
        Ok(tls_cert)
    }

    /// TLS handshake callback: exact name, then the `mail.` parent
    pub async fn get_certificate_for_sni(&self, server_name: &str) -> Result<Arc<TlsCertificate>> {
        match self.get_certificate(server_name).await {
            Ok(cert) => Ok(cert),
            Err(e) => {
                if let Some(parent) = server_name.strip_prefix("mail.") {
                    self.get_certificate(parent).await
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Revoke a certificate. Idempotent: an already-revoked certificate is
    /// success without a new audit event. ACME revocation failures degrade
    /// to local-only revocation.
    pub async fn revoke(
        &self,
        domain_id: Uuid,
        reason: RevocationReason,
        initiator: RevocationInitiator,
    ) -> Result<()> {
        let cert = self
            .certs
            .get_by_domain_id(domain_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("certificate for domain {}", domain_id)))?;

        if cert.status == CertificateStatus::Revoked {
            tracing::debug!(domain = %cert.domain_name, "Certificate already revoked");
            return Ok(());
        }

        if cert.status == CertificateStatus::Active {
            match self.leaf_der(domain_id).await {
                Ok(leaf_der) => {
                    if let Err(e) = self.issuer.revoke(&leaf_der, reason).await {
                        tracing::warn!(
                            domain = %cert.domain_name,
                            error = %e,
                            "ACME revocation failed, proceeding with local revocation"
                        );
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        domain = %cert.domain_name,
                        error = %e,
                        "Could not load certificate for ACME revocation"
                    );
                }
            }
        }

        let local_result = self
            .certs
            .set_status(domain_id, CertificateStatus::Revoked)
            .await;

        self.cache.evict(&cert.domain_name);

        if let Err(e) = self.store.delete(domain_id).await {
            tracing::warn!(domain = %cert.domain_name, error = %e,
                "Certificate file cleanup failed during revocation");
        }

        let success = local_result.is_ok();
        let event = RevocationEvent {
            timestamp: Utc::now(),
            domain_id,
            domain_name: cert.domain_name.clone(),
            serial_number: cert.serial_number.clone(),
            reason,
            initiator,
            success,
            error: local_result.as_ref().err().map(|e| e.to_string()),
        };
        if let Err(e) = self.revocations.append(&event).await {
            tracing::error!(domain = %cert.domain_name, error = %e,
                "Failed to append revocation audit event");
        }

        let status_label = if success { "success" } else { "failure" };
        self.metrics
            .revocation_total
            .with_label_values(&[status_label, reason.as_str()])
            .inc();
        self.refresh_active_gauge().await;

        local_result
    }

    /// Revocation entry point for domain deletion
    pub async fn revoke_for_domain_deletion(&self, domain_id: Uuid) -> Result<()> {
        self.revoke(
            domain_id,
            RevocationReason::CessationOfOperation,
            RevocationInitiator::DomainDeletion,
        )
        .await
    }

    /// Revocation entry point for key compromise; optionally deletes the
    /// row and provisions a replacement immediately.
    pub async fn revoke_for_key_compromise(
        &self,
        domain_id: Uuid,
        reprovision: bool,
    ) -> Result<Option<Certificate>> {
        let cert = self
            .certs
            .get_by_domain_id(domain_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("certificate for domain {}", domain_id)))?;
        let domain_name = cert.domain_name.clone();

        self.revoke(
            domain_id,
            RevocationReason::KeyCompromise,
            RevocationInitiator::System,
        )
        .await?;

        if !reprovision {
            return Ok(None);
        }

        self.certs.delete(domain_id).await?;
        let replacement = self.provision(domain_id, &domain_name).await?;
        Ok(Some(replacement))
    }

    /// Startup path: load every active certificate into the cache.
    /// Certificates that fail to load are logged and skipped.
    pub async fn load_all_certificates(&self) -> Result<usize> {
        let active = self.certs.list_active().await?;
        let mut loaded = 0usize;
        let now = Utc::now();

        for cert in &active {
            match self.store.load(cert.domain_id, &cert.domain_name).await {
                Ok(tls_cert) if !tls_cert.is_valid_at(now) => {
                    tracing::warn!(
                        domain = %cert.domain_name,
                        not_after = %tls_cert.not_after,
                        "Stored certificate is outside its validity window"
                    );
                    if let Err(e) = self
                        .certs
                        .set_status(cert.domain_id, CertificateStatus::Expired)
                        .await
                    {
                        tracing::error!(domain = %cert.domain_name, error = %e,
                            "Failed to mark certificate expired");
                    }
                    continue;
                }
                Ok(tls_cert) => {
                    if let Ok((_, leaf)) =
                        x509_parser::parse_x509_certificate(&tls_cert.leaf_der)
                    {
                        if !super::validator::matches_domain(&leaf, &cert.domain_name) {
                            tracing::warn!(
                                domain = %cert.domain_name,
                                names = ?tls_cert.dns_names,
                                "Stored certificate does not cover its domain"
                            );
                        }
                    }
                    self.cache.rotate(&cert.domain_name, Arc::new(tls_cert));
                    loaded += 1;
                }
                Err(e) => {
                    tracing::error!(
                        domain = %cert.domain_name,
                        error = %e,
                        "Skipping certificate that failed to load"
                    );
                    continue;
                }
            }

            if let Some(days) = cert.days_until_expiry(now) {
                self.metrics
                    .certificate_expiry_days
                    .with_label_values(&[&cert.domain_name, cert.status.as_str()])
                    .set(days as f64);
            }
            self.metrics
                .renewal_failures
                .with_label_values(&[&cert.domain_name])
                .set(cert.renewal_failures as i64);
        }

        self.metrics.active_certificates.set(active.len() as i64);
        tracing::info!(loaded, total = active.len(), "Certificate cache warmed");
        Ok(loaded)
    }

    async fn leaf_der(&self, domain_id: Uuid) -> Result<Vec<u8>> {
        let pems = self.store.load_pems(domain_id).await?;
        let block = pem::parse(&pems.cert)
            .map_err(|e| Error::pem(format!("Stored cert is not PEM: {}", e)))?;
        Ok(block.contents().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitSettings;
    use crate::metrics::MetricsRegistry;
    use crate::repo::MemoryRepo;
    use crate::ssl::acme::{AcmeIssuer, IssuedCertificate, LocalCaIssuer};
    use crate::types::RevocationReason;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Issuer whose validity period can change between calls
    struct AdjustableIssuer {
        validity_days: AtomicI64,
    }

    #[async_trait]
    impl AcmeIssuer for AdjustableIssuer {
        async fn issue(&self, domains: &[String]) -> Result<IssuedCertificate> {
            LocalCaIssuer::new(self.validity_days.load(Ordering::SeqCst))
                .issue(domains)
                .await
        }

        async fn revoke(&self, _cert_der: &[u8], _reason: RevocationReason) -> Result<()> {
            Ok(())
        }
    }

    struct Fixture {
        manager: CertificateManager,
        repo: Arc<MemoryRepo>,
        issuer: Arc<AdjustableIssuer>,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let repo = Arc::new(MemoryRepo::new());
        let metrics = Arc::new(MetricsRegistry::new());
        let issuer = Arc::new(AdjustableIssuer {
            validity_days: AtomicI64::new(30),
        });
        let manager = CertificateManager::new(
            repo.clone(),
            repo.clone(),
            Arc::new(EncryptedCertStore::new(
                dir.path(),
                *b"0123456789abcdef0123456789abcdef",
            )),
            issuer.clone(),
            Arc::new(CertificateCache::new(metrics.clone())),
            Arc::new(AcmeRateLimiter::new(RateLimitSettings::default())),
            metrics,
            10,
            Duration::from_secs(300),
        );
        Fixture {
            manager,
            repo,
            issuer,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn test_provision_activates_and_caches() {
        let f = fixture();
        let domain_id = Uuid::new_v4();
        let cert = f.manager.provision(domain_id, "Example.COM").await.unwrap();

        assert_eq!(cert.status, CertificateStatus::Active);
        assert_eq!(cert.domain_name, "example.com");
        assert_eq!(cert.renewal_failures, 0);
        assert!(cert.serial_number.is_some());
        assert!(cert.expires_at.is_some());

        let tls = f.manager.get_certificate("example.com").await.unwrap();
        assert!(tls.dns_names.contains(&"mail.example.com".to_string()));
    }

    #[tokio::test]
    async fn test_invalid_hostname_rejected() {
        let f = fixture();
        assert!(matches!(
            f.manager.provision(Uuid::new_v4(), "").await,
            Err(Error::Validation { .. })
        ));
        assert!(matches!(
            f.manager.provision(Uuid::new_v4(), "bad host").await,
            Err(Error::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_provision_gated() {
        let f = fixture();
        let domain_id = Uuid::new_v4();
        f.manager.in_flight.lock().unwrap().insert(domain_id);

        assert!(matches!(
            f.manager.provision(domain_id, "example.com").await,
            Err(Error::ProvisioningInProgress(_))
        ));
    }

    #[tokio::test]
    async fn test_rate_limited_provision_denied() {
        let f = fixture();
        for _ in 0..50 {
            f.manager.rate_limiter.record_request("acme.test", true);
        }
        let err = f
            .manager
            .provision(Uuid::new_v4(), "acme.test")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RateLimited(_)));
    }

    #[tokio::test]
    async fn test_renew_rotates_without_gap() {
        let f = fixture();
        let domain_id = Uuid::new_v4();
        let first = f.manager.provision(domain_id, "example.com").await.unwrap();
        let held = f.manager.get_certificate("example.com").await.unwrap();

        f.issuer.validity_days.store(90, Ordering::SeqCst);
        let renewed = f.manager.renew(domain_id).await.unwrap();

        assert!(renewed.expires_at.unwrap() > first.expires_at.unwrap());
        // The next lookup sees the renewed certificate immediately
        let fresh = f.manager.get_certificate("example.com").await.unwrap();
        assert!(fresh.not_after > held.not_after);
        assert!(
            f.repo
                .get_by_domain_id(domain_id)
                .await
                .unwrap()
                .unwrap()
                .last_renewal_attempt
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_failed_issuance_marks_failed() {
        struct FailingIssuer;
        #[async_trait]
        impl AcmeIssuer for FailingIssuer {
            async fn issue(&self, _domains: &[String]) -> Result<IssuedCertificate> {
                Err(Error::provisioning("CA melted"))
            }
            async fn revoke(&self, _c: &[u8], _r: RevocationReason) -> Result<()> {
                Ok(())
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let repo = Arc::new(MemoryRepo::new());
        let metrics = Arc::new(MetricsRegistry::new());
        let manager = CertificateManager::new(
            repo.clone(),
            repo.clone(),
            Arc::new(EncryptedCertStore::new(
                dir.path(),
                *b"0123456789abcdef0123456789abcdef",
            )),
            Arc::new(FailingIssuer),
            Arc::new(CertificateCache::new(metrics.clone())),
            Arc::new(AcmeRateLimiter::new(RateLimitSettings::default())),
            metrics,
            10,
            Duration::from_secs(300),
        );

        let domain_id = Uuid::new_v4();
        assert!(matches!(
            manager.provision(domain_id, "example.com").await,
            Err(Error::ProvisioningFailed(_))
        ));
        let cert = repo.get_by_domain_id(domain_id).await.unwrap().unwrap();
        assert_eq!(cert.status, CertificateStatus::Failed);
        assert_eq!(cert.renewal_failures, 1);
    }

    #[tokio::test]
    async fn test_get_certificate_not_active() {
        let f = fixture();
        let domain_id = Uuid::new_v4();
        f.repo
            .begin_provisioning(domain_id, "pending.example")
            .await
            .unwrap();
        assert!(matches!(
            f.manager.get_certificate("pending.example").await,
            Err(Error::CertificateNotActive { .. })
        ));
        assert!(matches!(
            f.manager.get_certificate("missing.example").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_sni_parent_fallback() {
        let f = fixture();
        let domain_id = Uuid::new_v4();
        f.manager.provision(domain_id, "example.com").await.unwrap();
        // Evict the mail alias so the fallback path is exercised
        f.manager.cache.evict("example.com");

        let cert = f
            .manager
            .get_certificate_for_sni("mail.example.com")
            .await
            .unwrap();
        assert_eq!(cert.domain_name, "example.com");
        assert!(
            f.manager
                .get_certificate_for_sni("mail.unknown.example")
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent_with_single_audit_event() {
        let f = fixture();
        let domain_id = Uuid::new_v4();
        f.manager.provision(domain_id, "example.com").await.unwrap();

        f.manager
            .revoke(domain_id, RevocationReason::Superseded, RevocationInitiator::User)
            .await
            .unwrap();
        // Second call: silent success, no extra event
        f.manager
            .revoke(domain_id, RevocationReason::Superseded, RevocationInitiator::User)
            .await
            .unwrap();

        let events = f.repo.list_for_domain(domain_id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].success);
        assert_eq!(events[0].reason, RevocationReason::Superseded);

        let cert = f.repo.get_by_domain_id(domain_id).await.unwrap().unwrap();
        assert_eq!(cert.status, CertificateStatus::Revoked);
        assert!(f.manager.cache.peek("example.com").is_none());
        assert!(f.manager.cache.peek("mail.example.com").is_none());
    }

    #[tokio::test]
    async fn test_revoke_for_domain_deletion_reason() {
        let f = fixture();
        let domain_id = Uuid::new_v4();
        f.manager.provision(domain_id, "example.com").await.unwrap();
        f.manager.revoke_for_domain_deletion(domain_id).await.unwrap();

        let events = f.repo.list_for_domain(domain_id).await.unwrap();
        assert_eq!(events[0].reason, RevocationReason::CessationOfOperation);
        assert_eq!(events[0].initiator, RevocationInitiator::DomainDeletion);
    }

    #[tokio::test]
    async fn test_key_compromise_reprovision() {
        let f = fixture();
        let domain_id = Uuid::new_v4();
        f.manager.provision(domain_id, "example.com").await.unwrap();

        let replacement = f
            .manager
            .revoke_for_key_compromise(domain_id, true)
            .await
            .unwrap()
            .expect("expected a replacement certificate");
        assert_eq!(replacement.status, CertificateStatus::Active);

        let events = f.repo.list_for_domain(domain_id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].reason, RevocationReason::KeyCompromise);
        assert_eq!(events[0].initiator, RevocationInitiator::System);
    }

    #[tokio::test]
    async fn test_load_all_skips_unloadable() {
        let f = fixture();
        let good = Uuid::new_v4();
        f.manager.provision(good, "good.example").await.unwrap();
        f.manager.cache.evict("good.example");

        // An active row whose files never existed
        let broken = Uuid::new_v4();
        f.repo.begin_provisioning(broken, "broken.example").await.unwrap();
        f.repo
            .mark_active(
                broken,
                &IssuedMetadata {
                    issuer: "CN=test".into(),
                    serial_number: "01".into(),
                    issued_at: Utc::now(),
                    expires_at: Utc::now() + chrono::Duration::days(30),
                    storage_path: "/nonexistent".into(),
                },
            )
            .await
            .unwrap();

        let loaded = f.manager.load_all_certificates().await.unwrap();
        assert_eq!(loaded, 1);
        assert!(f.manager.cache.peek("good.example").is_some());
        assert!(f.manager.cache.peek("broken.example").is_none());
    }
}
