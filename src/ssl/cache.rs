/// Hot in-memory certificate cache with zero-downtime rotation.
/// A single writer swaps entries under the write lock; readers clone the
/// `Arc` and keep serving the certificate they resolved even while a
/// rotation replaces the map entry.
use super::TlsCertificate;
use crate::metrics::SharedMetrics;
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Certificate cache keyed by lower-cased domain name.
/// Every domain is stored under both `{domain}` and `mail.{domain}`.
pub struct CertificateCache {
    entries: RwLock<HashMap<String, Arc<TlsCertificate>>>,
    metrics: SharedMetrics,
}

impl CertificateCache {
    pub fn new(metrics: SharedMetrics) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            metrics,
        }
    }

    /// Cache lookup; records hit/miss metrics
    pub fn get(&self, domain: &str) -> Option<Arc<TlsCertificate>> {
        let key = domain.to_lowercase();
        let found = self.entries.read().unwrap().get(&key).cloned();
        match &found {
            Some(_) => self.metrics.cache_hits_total.inc(),
            None => self.metrics.cache_misses_total.inc(),
        }
        found
    }

    /// Lookup without touching the metrics (internal probes)
    pub fn peek(&self, domain: &str) -> Option<Arc<TlsCertificate>> {
        self.entries
            .read()
            .unwrap()
            .get(&domain.to_lowercase())
            .cloned()
    }

    /// Insert or rotate the entry for a domain. Both `{domain}` and
    /// `mail.{domain}` are swapped under one write lock, so a reader sees
    /// either the previous certificate or the new one, never a torn pair.
    pub fn rotate(&self, domain: &str, cert: Arc<TlsCertificate>) {
        let key = domain.to_lowercase();
        let mail_key = format!("mail.{}", key);
        let mut entries = self.entries.write().unwrap();
        entries.insert(key, cert.clone());
        entries.insert(mail_key, cert);
        self.metrics.cache_size.set(entries.len() as i64);
    }

    /// Remove both entries for a domain
    pub fn evict(&self, domain: &str) {
        let key = domain.to_lowercase();
        let mail_key = format!("mail.{}", key);
        let mut entries = self.entries.write().unwrap();
        entries.remove(&key);
        entries.remove(&mail_key);
        self.metrics.cache_size.set(entries.len() as i64);
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// SNI resolution: exact match first; a `mail.`-prefixed name that
    /// misses falls back to its parent domain.
    pub fn resolve_sni(&self, server_name: &str) -> Option<Arc<TlsCertificate>> {
        if let Some(cert) = self.get(server_name) {
            return Some(cert);
        }
        if let Some(parent) = server_name.strip_prefix("mail.") {
            return self.get(parent);
        }
        None
    }
}

impl std::fmt::Debug for CertificateCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateCache")
            .field("entries", &self.len())
            .finish()
    }
}

impl ResolvesServerCert for CertificateCache {
    fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        let server_name = client_hello.server_name()?;
        self.resolve_sni(server_name)
            .map(|cert| cert.certified_key.clone())
    }
}
