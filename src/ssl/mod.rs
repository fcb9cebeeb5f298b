//! TLS certificate lifecycle.
//!
//! The manager is the single entry point for provisioning, renewal,
//! retrieval and revocation. Around it: the hot cache with zero-downtime
//! rotation, the encrypted at-rest store, the ACME-aware rate limiter,
//! the validator, and the OCSP client.

pub mod acme;
pub mod cache;
pub mod manager;
pub mod ocsp;
pub mod rate_limit;
pub mod store;
mod tls;
pub mod validator;

pub use acme::{
    AcmeDelegateConfig, AcmeIssuer, DelegateHttpIssuer, IssuedCertificate, LocalCaIssuer,
};
pub use cache::CertificateCache;
pub use manager::CertificateManager;
pub use ocsp::{OcspStatus, OcspVerifier};
pub use rate_limit::{AcmeAccountCache, AcmeRateLimiter};
pub use store::{CertificatePems, EncryptedCertStore};
pub use tls::TlsCertificate;
pub use validator::{CertificateValidator, ValidationResult};

#[cfg(test)]
pub(crate) mod test_support {
    use super::TlsCertificate;
    use chrono::{Datelike, Duration, Utc};

    /// Self-signed certificate + key PEM for a single domain
    pub fn self_signed_pem(domain: &str, validity_days: i64) -> (String, String) {
        let not_after = Utc::now() + Duration::days(validity_days);
        let mut params = rcgen::CertificateParams::new(vec![domain.to_string()]).unwrap();
        params
            .distinguished_name
            .push(rcgen::DnType::CommonName, domain);
        params.not_after = rcgen::date_time_ymd(
            not_after.year(),
            not_after.month() as u8,
            not_after.day() as u8,
        );
        let key_pair = rcgen::KeyPair::generate().unwrap();
        let cert = params.self_signed(&key_pair).unwrap();
        (cert.pem(), key_pair.serialize_pem())
    }

    /// (leaf DER, issuer DER) pair; self-signed, so both are the leaf
    pub fn self_signed_der(domain: &str, validity_days: i64) -> (Vec<u8>, Vec<u8>) {
        let (cert_pem, _) = self_signed_pem(domain, validity_days);
        let der = pem::parse(cert_pem.as_bytes()).unwrap().contents().to_vec();
        (der.clone(), der)
    }

    /// Parsed in-memory certificate for cache tests
    pub fn self_signed(domain: &str, validity_days: i64) -> TlsCertificate {
        let (cert_pem, key_pem) = self_signed_pem(domain, validity_days);
        TlsCertificate::from_pem(domain, cert_pem.as_bytes(), key_pem.as_bytes()).unwrap()
    }
}
