/// Certificate validation: chain, expiry, domain match, key-pair match,
/// and optional OCSP. Runs on load and before a certificate is served.
use super::ocsp::{OcspStatus, OcspVerifier};
use super::tls::{leaf_dns_names, parse_private_key_pem};
use crate::error::{Error, Result};
use aws_lc_rs::signature::{
    ECDSA_P256_SHA256_ASN1_SIGNING, ECDSA_P384_SHA384_ASN1_SIGNING, EcdsaKeyPair, Ed25519KeyPair,
    KeyPair as _, RsaKeyPair,
};
use chrono::{DateTime, Utc};
use rustls_pki_types::PrivateKeyDer;
use serde::Serialize;
use x509_parser::oid_registry::{
    OID_KEY_TYPE_EC_PUBLIC_KEY, OID_PKCS1_RSAENCRYPTION, OID_SIG_ED25519,
};
use x509_parser::prelude::*;

/// Why the validity window check failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryError {
    Expired,
    NotYetValid,
}

/// Combined validation outcome. Errors and warnings accumulate
/// independently; `valid` is true iff no errors were recorded.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub days_until_expiry: Option<i64>,
    pub dns_names: Vec<String>,
}

impl ValidationResult {
    fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            days_until_expiry: None,
            dns_names: Vec::new(),
        }
    }

    fn error(&mut self, msg: impl Into<String>) {
        self.valid = false;
        self.errors.push(msg.into());
    }

    fn warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }
}

/// Gate-keeping validator
pub struct CertificateValidator {
    /// DER-encoded trusted roots
    trust_roots: Vec<Vec<u8>>,
    ocsp: Option<OcspVerifier>,
    strict_ocsp: bool,
}

impl CertificateValidator {
    pub fn new() -> Self {
        Self {
            trust_roots: Vec::new(),
            ocsp: None,
            strict_ocsp: false,
        }
    }

    pub fn with_trust_roots(mut self, roots: Vec<Vec<u8>>) -> Self {
        self.trust_roots = roots;
        self
    }

    /// Enable OCSP checking. In strict mode a responder failure is a
    /// validation error; otherwise it degrades to a warning.
    pub fn with_ocsp(mut self, verifier: OcspVerifier, strict: bool) -> Self {
        self.ocsp = Some(verifier);
        self.strict_ocsp = strict;
        self
    }

    /// Run every check against one leaf
    pub async fn validate(
        &self,
        leaf_der: &[u8],
        intermediates: &[Vec<u8>],
        key_pem: Option<&[u8]>,
        domain: &str,
    ) -> ValidationResult {
        let mut result = ValidationResult::new();

        let leaf = match parse_x509_certificate(leaf_der) {
            Ok((_, cert)) => cert,
            Err(e) => {
                result.error(format!("Leaf certificate unparseable: {}", e));
                return result;
            }
        };

        result.dns_names = leaf_dns_names(&leaf);

        match check_expiry(&leaf, Utc::now()) {
            Ok(days) => result.days_until_expiry = Some(days),
            Err(ExpiryError::Expired) => result.error("Certificate expired"),
            Err(ExpiryError::NotYetValid) => result.error("Certificate not yet valid"),
        }

        if !matches_domain(&leaf, domain) {
            result.error(format!(
                "Certificate does not cover domain {}",
                domain
            ));
        }

        if let Err(e) = verify_chain(&leaf, intermediates, &self.trust_roots) {
            result.error(format!("Chain verification failed: {}", e));
        }

        if let Some(key_pem) = key_pem {
            match key_pair_matches(leaf_der, key_pem) {
                Ok(true) => {}
                Ok(false) => result.error("Private key does not match certificate public key"),
                Err(e) => result.error(format!("Key pair check failed: {}", e)),
            }
        }

        if let Some(ocsp) = &self.ocsp {
            match self.ocsp_check(ocsp, leaf_der, intermediates).await {
                Ok(OcspStatus::Good) => {}
                Ok(OcspStatus::Unknown) => {
                    result.warning("OCSP responder does not know this certificate");
                }
                Ok(OcspStatus::Revoked {
                    revoked_at,
                    reason_code,
                }) => {
                    result.error(format!(
                        "Certificate revoked (at {:?}, reason code {:?})",
                        revoked_at, reason_code
                    ));
                }
                Err(e) if self.strict_ocsp => {
                    result.error(format!("OCSP check failed: {}", e));
                }
                Err(e) => {
                    result.warning(format!("OCSP check skipped: {}", e));
                }
            }
        }

        result
    }

    /// SMTP specialization: additionally warns when `mail.{domain}` is not
    /// covered by the certificate names.
    pub async fn validate_for_smtp(
        &self,
        leaf_der: &[u8],
        intermediates: &[Vec<u8>],
        key_pem: Option<&[u8]>,
        domain: &str,
    ) -> ValidationResult {
        let mut result = self.validate(leaf_der, intermediates, key_pem, domain).await;
        let mail_name = format!("mail.{}", domain.to_lowercase());
        if let Ok((_, leaf)) = parse_x509_certificate(leaf_der) {
            if !matches_domain(&leaf, &mail_name) {
                result.warning(format!(
                    "Certificate does not cover {}; SMTP clients will not trust it",
                    mail_name
                ));
            }
        }
        result
    }

    async fn ocsp_check(
        &self,
        ocsp: &OcspVerifier,
        leaf_der: &[u8],
        intermediates: &[Vec<u8>],
    ) -> Result<OcspStatus> {
        let issuer_der = intermediates
            .first()
            .cloned()
            .unwrap_or_else(|| leaf_der.to_vec());
        ocsp.check(leaf_der, &issuer_der).await
    }
}

impl Default for CertificateValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// `now` must fall inside the validity window; returns remaining days
pub fn check_expiry(
    cert: &X509Certificate<'_>,
    now: DateTime<Utc>,
) -> std::result::Result<i64, ExpiryError> {
    let ts = now.timestamp();
    let not_before = cert.validity().not_before.timestamp();
    let not_after = cert.validity().not_after.timestamp();
    if ts < not_before {
        return Err(ExpiryError::NotYetValid);
    }
    if ts > not_after {
        return Err(ExpiryError::Expired);
    }
    Ok((not_after - ts) / 86_400)
}

/// Case-insensitive match against CN, DNS SANs and IP SANs.
/// A wildcard consumes exactly one label: `*.x` matches `sub.x`, not
/// `a.b.x` and not `x`.
pub fn matches_domain(cert: &X509Certificate<'_>, domain: &str) -> bool {
    let wanted = domain.to_lowercase();
    leaf_dns_names(cert)
        .iter()
        .any(|name| name_matches(&name.to_lowercase(), &wanted))
}

fn name_matches(pattern: &str, candidate: &str) -> bool {
    if pattern == candidate {
        return true;
    }
    if let Some(suffix) = pattern.strip_prefix("*.") {
        if let Some((first_label, rest)) = candidate.split_once('.') {
            return !first_label.is_empty() && rest == suffix;
        }
    }
    false
}

/// Verify the leaf's signature chain: self-signed leaves verify against
/// themselves; otherwise the issuer is searched among the intermediates
/// and trust roots and each link's signature is checked. The leaf must
/// carry the ServerAuth extended key usage.
pub fn verify_chain(
    leaf: &X509Certificate<'_>,
    intermediates: &[Vec<u8>],
    trust_roots: &[Vec<u8>],
) -> Result<()> {
    if !has_server_auth_eku(leaf) {
        return Err(Error::crypto(
            "Certificate lacks the ServerAuth extended key usage",
        ));
    }

    if leaf.subject() == leaf.issuer() {
        return leaf
            .verify_signature(None)
            .map_err(|e| Error::crypto(format!("Self-signature invalid: {}", e)));
    }

    let mut pool = Vec::new();
    for der in intermediates.iter().chain(trust_roots.iter()) {
        if let Ok((_, cert)) = parse_x509_certificate(der) {
            pool.push(cert);
        }
    }

    let issuer = pool
        .iter()
        .find(|candidate| candidate.subject() == leaf.issuer())
        .ok_or_else(|| Error::crypto("Issuer certificate not found in chain or trust store"))?;

    leaf.verify_signature(Some(issuer.public_key()))
        .map_err(|e| Error::crypto(format!("Leaf signature invalid: {}", e)))
}

fn has_server_auth_eku(cert: &X509Certificate<'_>) -> bool {
    for ext in cert.extensions() {
        if let ParsedExtension::ExtendedKeyUsage(eku) = ext.parsed_extension() {
            return eku.server_auth || eku.any;
        }
    }
    // No EKU extension constrains usage
    true
}

/// Compare the private key's public component against the certificate's
/// SPKI for each supported key type. A type mismatch is a failed match,
/// not an error; undecodable input is an error.
pub fn key_pair_matches(leaf_der: &[u8], key_pem: &[u8]) -> Result<bool> {
    let (_, cert) = parse_x509_certificate(leaf_der)
        .map_err(|e| Error::crypto(format!("Parse cert failed: {}", e)))?;
    let spki = cert.public_key();
    let cert_key_bits: &[u8] = &spki.subject_public_key.data;
    let alg = &spki.algorithm.algorithm;

    let key_der = parse_private_key_pem(key_pem)?;

    if *alg == OID_PKCS1_RSAENCRYPTION {
        let key_pair = match &key_der {
            PrivateKeyDer::Pkcs8(der) => RsaKeyPair::from_pkcs8(der.secret_pkcs8_der()),
            PrivateKeyDer::Pkcs1(der) => RsaKeyPair::from_der(der.secret_pkcs1_der()),
            _ => return Ok(false),
        };
        let Ok(key_pair) = key_pair else {
            return Ok(false);
        };
        return Ok(key_pair.public_key().as_ref() == cert_key_bits);
    }

    if *alg == OID_KEY_TYPE_EC_PUBLIC_KEY {
        for ecdsa_alg in [&ECDSA_P256_SHA256_ASN1_SIGNING, &ECDSA_P384_SHA384_ASN1_SIGNING] {
            let key_pair = match &key_der {
                PrivateKeyDer::Pkcs8(der) => {
                    EcdsaKeyPair::from_pkcs8(ecdsa_alg, der.secret_pkcs8_der())
                }
                PrivateKeyDer::Sec1(der) => {
                    EcdsaKeyPair::from_private_key_der(ecdsa_alg, der.secret_sec1_der())
                }
                _ => continue,
            };
            if let Ok(key_pair) = key_pair {
                return Ok(key_pair.public_key().as_ref() == cert_key_bits);
            }
        }
        return Ok(false);
    }

    if *alg == OID_SIG_ED25519 {
        let PrivateKeyDer::Pkcs8(der) = &key_der else {
            return Ok(false);
        };
        let Ok(key_pair) = Ed25519KeyPair::from_pkcs8_maybe_unchecked(der.secret_pkcs8_der())
        else {
            return Ok(false);
        };
        return Ok(key_pair.public_key().as_ref() == cert_key_bits);
    }

    Err(Error::crypto(format!(
        "Unsupported certificate key algorithm: {}",
        alg
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssl::test_support;

    #[test]
    fn test_domain_match_rules() {
        let (leaf_der, _) = test_support::self_signed_der("example.com", 30);
        let (_, cert) = parse_x509_certificate(&leaf_der).unwrap();
        assert!(matches_domain(&cert, "example.com"));
        assert!(matches_domain(&cert, "EXAMPLE.COM"));
        assert!(!matches_domain(&cert, "other.com"));
    }

    #[test]
    fn test_wildcard_consumes_one_label() {
        assert!(name_matches("*.example.com", "sub.example.com"));
        assert!(!name_matches("*.example.com", "a.b.example.com"));
        assert!(!name_matches("*.example.com", "example.com"));
        assert!(name_matches("example.com", "example.com"));
    }

    #[test]
    fn test_expiry_window() {
        let (leaf_der, _) = test_support::self_signed_der("example.com", 30);
        let (_, cert) = parse_x509_certificate(&leaf_der).unwrap();

        let days = check_expiry(&cert, Utc::now()).unwrap();
        assert!((28..=31).contains(&days));

        assert_eq!(
            check_expiry(&cert, Utc::now() + chrono::Duration::days(400)),
            Err(ExpiryError::Expired)
        );
        assert_eq!(
            check_expiry(&cert, Utc::now() - chrono::Duration::days(400)),
            Err(ExpiryError::NotYetValid)
        );
    }

    #[test]
    fn test_self_signed_chain_accepted() {
        let (leaf_der, _) = test_support::self_signed_der("example.com", 30);
        let (_, cert) = parse_x509_certificate(&leaf_der).unwrap();
        assert!(verify_chain(&cert, &[], &[]).is_ok());
    }

    #[test]
    fn test_tampered_signature_rejected() {
        let (mut leaf_der, _) = test_support::self_signed_der("example.com", 30);
        // The signature BIT STRING is the final field of the Certificate
        let last = leaf_der.len() - 1;
        leaf_der[last] ^= 0xff;
        let (_, cert) = parse_x509_certificate(&leaf_der).unwrap();
        assert!(verify_chain(&cert, &[], &[]).is_err());
    }

    #[test]
    fn test_key_pair_match_and_mismatch() {
        let (cert_pem, key_pem) = test_support::self_signed_pem("example.com", 30);
        let (_, other_key_pem) = test_support::self_signed_pem("example.com", 30);

        let leaf_der = ::pem::parse(cert_pem.as_bytes()).unwrap().contents().to_vec();
        assert!(key_pair_matches(&leaf_der, key_pem.as_bytes()).unwrap());
        assert!(!key_pair_matches(&leaf_der, other_key_pem.as_bytes()).unwrap());
    }

    #[tokio::test]
    async fn test_combined_validation() {
        let (cert_pem, key_pem) = test_support::self_signed_pem("example.com", 30);
        let leaf_der = ::pem::parse(cert_pem.as_bytes()).unwrap().contents().to_vec();

        let validator = CertificateValidator::new();
        let result = validator
            .validate(&leaf_der, &[], Some(key_pem.as_bytes()), "example.com")
            .await;
        assert!(result.valid, "errors: {:?}", result.errors);
        assert!(result.days_until_expiry.is_some());
        assert!(result.dns_names.contains(&"example.com".to_string()));

        let result = validator
            .validate(&leaf_der, &[], None, "wrong.example.org")
            .await;
        assert!(!result.valid);
    }

    #[tokio::test]
    async fn test_smtp_validation_warns_without_mail_san() {
        let (cert_pem, key_pem) = test_support::self_signed_pem("example.com", 30);
        let leaf_der = ::pem::parse(cert_pem.as_bytes()).unwrap().contents().to_vec();

        let validator = CertificateValidator::new();
        let result = validator
            .validate_for_smtp(&leaf_der, &[], Some(key_pem.as_bytes()), "example.com")
            .await;
        assert!(result.valid);
        assert!(
            result
                .warnings
                .iter()
                .any(|w| w.contains("mail.example.com"))
        );
    }
}
