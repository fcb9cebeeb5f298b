/// Metrics registry and health primitives
use prometheus::{
    Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge,
    IntGaugeVec, Opts, Registry, TextEncoder, exponential_buckets,
};
use std::sync::Arc;

/// Metrics registry wrapper owning every instrument the service exports
pub struct MetricsRegistry {
    registry: Registry,

    pub provisioning_total: IntCounterVec,
    pub renewal_total: IntCounterVec,
    pub revocation_total: IntCounterVec,
    pub cache_hits_total: IntCounter,
    pub cache_misses_total: IntCounter,

    pub active_certificates: IntGauge,
    pub cache_size: IntGauge,
    pub certificate_expiry_days: GaugeVec,
    pub expiring_certificates: IntGaugeVec,
    pub renewal_failures: IntGaugeVec,

    pub provisioning_duration_seconds: HistogramVec,
    pub renewal_duration_seconds: HistogramVec,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let registry = Registry::new();

        let provisioning_total = IntCounterVec::new(
            Opts::new(
                "mailcrypt_ssl_provisioning_total",
                "Certificate provisioning attempts",
            ),
            &["status"],
        )
        .unwrap();
        let renewal_total = IntCounterVec::new(
            Opts::new("mailcrypt_ssl_renewal_total", "Certificate renewal attempts"),
            &["status"],
        )
        .unwrap();
        let revocation_total = IntCounterVec::new(
            Opts::new("mailcrypt_ssl_revocation_total", "Certificate revocations"),
            &["status", "reason"],
        )
        .unwrap();
        let cache_hits_total =
            IntCounter::new("mailcrypt_ssl_cache_hits_total", "Certificate cache hits").unwrap();
        let cache_misses_total =
            IntCounter::new("mailcrypt_ssl_cache_misses_total", "Certificate cache misses")
                .unwrap();

        let active_certificates = IntGauge::new(
            "mailcrypt_ssl_active_certificates",
            "Certificates in the active state",
        )
        .unwrap();
        let cache_size =
            IntGauge::new("mailcrypt_ssl_cache_size", "Entries in the certificate cache").unwrap();
        let certificate_expiry_days = GaugeVec::new(
            Opts::new(
                "mailcrypt_ssl_certificate_expiry_days",
                "Days until certificate expiry",
            ),
            &["domain", "status"],
        )
        .unwrap();
        let expiring_certificates = IntGaugeVec::new(
            Opts::new(
                "mailcrypt_ssl_expiring_certificates",
                "Certificates expiring within the labelled window",
            ),
            &["within_days"],
        )
        .unwrap();
        let renewal_failures = IntGaugeVec::new(
            Opts::new(
                "mailcrypt_ssl_renewal_failures",
                "Consecutive renewal failures per domain",
            ),
            &["domain"],
        )
        .unwrap();

        let provisioning_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "mailcrypt_ssl_provisioning_duration_seconds",
                "Certificate provisioning duration",
            )
            .buckets(exponential_buckets(1.0, 2.0, 9).unwrap()),
            &["status"],
        )
        .unwrap();
        let renewal_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "mailcrypt_ssl_renewal_duration_seconds",
                "Certificate renewal duration",
            )
            .buckets(exponential_buckets(1.0, 2.0, 9).unwrap()),
            &["status"],
        )
        .unwrap();

        registry
            .register(Box::new(provisioning_total.clone()))
            .unwrap();
        registry.register(Box::new(renewal_total.clone())).unwrap();
        registry
            .register(Box::new(revocation_total.clone()))
            .unwrap();
        registry
            .register(Box::new(cache_hits_total.clone()))
            .unwrap();
        registry
            .register(Box::new(cache_misses_total.clone()))
            .unwrap();
        registry
            .register(Box::new(active_certificates.clone()))
            .unwrap();
        registry.register(Box::new(cache_size.clone())).unwrap();
        registry
            .register(Box::new(certificate_expiry_days.clone()))
            .unwrap();
        registry
            .register(Box::new(expiring_certificates.clone()))
            .unwrap();
        registry
            .register(Box::new(renewal_failures.clone()))
            .unwrap();
        registry
            .register(Box::new(provisioning_duration_seconds.clone()))
            .unwrap();
        registry
            .register(Box::new(renewal_duration_seconds.clone()))
            .unwrap();

        Self {
            registry,
            provisioning_total,
            renewal_total,
            revocation_total,
            cache_hits_total,
            cache_misses_total,
            active_certificates,
            cache_size,
            certificate_expiry_days,
            expiring_certificates,
            renewal_failures,
            provisioning_duration_seconds,
            renewal_duration_seconds,
        }
    }

    /// Render the registry in the Prometheus text format
    pub fn gather_text(&self) -> String {
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&mf, &mut buffer).unwrap();
        String::from_utf8_lossy(&buffer).to_string()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared metrics type
pub type SharedMetrics = Arc<MetricsRegistry>;
