/// In-memory representation of a serveable TLS certificate
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use rustls::sign::CertifiedKey;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use std::sync::Arc;
use x509_parser::prelude::*;

/// A parsed certificate ready for TLS handshakes, plus the leaf metadata
/// the lifecycle manager reports.
pub struct TlsCertificate {
    pub domain_name: String,
    /// Leaf first, then intermediates
    pub cert_chain: Vec<CertificateDer<'static>>,
    /// Leaf DER, kept for validation and OCSP
    pub leaf_der: Vec<u8>,
    pub certified_key: Arc<CertifiedKey>,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub serial_number: String,
    pub issuer: String,
    pub dns_names: Vec<String>,
}

impl std::fmt::Debug for TlsCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsCertificate")
            .field("domain_name", &self.domain_name)
            .field("serial_number", &self.serial_number)
            .field("not_after", &self.not_after)
            .finish()
    }
}

impl TlsCertificate {
    /// Build from PEM fullchain + private key. The leaf is the first
    /// certificate in the chain.
    pub fn from_pem(domain_name: &str, fullchain_pem: &[u8], key_pem: &[u8]) -> Result<Self> {
        let mut cert_chain = Vec::new();
        for block in ::pem::parse_many(fullchain_pem)
            .map_err(|e| Error::pem(format!("Failed to parse chain PEM: {}", e)))?
        {
            if block.tag() == "CERTIFICATE" {
                cert_chain.push(CertificateDer::from(block.contents().to_vec()));
            }
        }
        if cert_chain.is_empty() {
            return Err(Error::pem("No certificates found in chain PEM"));
        }
        let leaf_der = cert_chain[0].as_ref().to_vec();

        let key_der = parse_private_key_pem(key_pem)?;
        let signing_key = rustls::crypto::aws_lc_rs::sign::any_supported_type(&key_der)
            .map_err(|e| Error::crypto(format!("Unsupported private key: {}", e)))?;
        let certified_key = Arc::new(CertifiedKey::new(cert_chain.clone(), signing_key));

        let (_, x509) = parse_x509_certificate(&leaf_der)
            .map_err(|e| Error::crypto(format!("Invalid leaf certificate: {}", e)))?;

        let not_before = DateTime::from_timestamp(x509.validity().not_before.timestamp(), 0)
            .ok_or_else(|| Error::crypto("Leaf notBefore out of range"))?;
        let not_after = DateTime::from_timestamp(x509.validity().not_after.timestamp(), 0)
            .ok_or_else(|| Error::crypto("Leaf notAfter out of range"))?;

        Ok(Self {
            domain_name: domain_name.to_lowercase(),
            dns_names: leaf_dns_names(&x509),
            serial_number: x509.raw_serial_as_string(),
            issuer: x509.issuer().to_string(),
            cert_chain,
            leaf_der,
            certified_key,
            not_before,
            not_after,
        })
    }

    /// Whether `now` falls inside the validity window
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.not_before && now <= self.not_after
    }
}

/// Parse a PEM private key, accepting only the three supported encodings
pub fn parse_private_key_pem(key_pem: &[u8]) -> Result<PrivateKeyDer<'static>> {
    let block =
        ::pem::parse(key_pem).map_err(|e| Error::pem(format!("Failed to parse key PEM: {}", e)))?;
    let der = block.contents().to_vec();
    match block.tag() {
        "PRIVATE KEY" => Ok(PrivateKeyDer::Pkcs8(der.into())),
        "RSA PRIVATE KEY" => Ok(PrivateKeyDer::Pkcs1(der.into())),
        "EC PRIVATE KEY" => Ok(PrivateKeyDer::Sec1(der.into())),
        tag => Err(Error::pem(format!("Unsupported private key type: {}", tag))),
    }
}

/// DNS names from the leaf's SAN extension, falling back to the CN
pub fn leaf_dns_names(x509: &X509Certificate<'_>) -> Vec<String> {
    let mut names = Vec::new();
    for ext in x509.extensions() {
        if let ParsedExtension::SubjectAlternativeName(san) = ext.parsed_extension() {
            for name in &san.general_names {
                match name {
                    GeneralName::DNSName(dns) => names.push(dns.to_string()),
                    GeneralName::IPAddress(ip) => {
                        if ip.len() == 4 {
                            names.push(
                                std::net::Ipv4Addr::new(ip[0], ip[1], ip[2], ip[3]).to_string(),
                            );
                        } else if ip.len() == 16 {
                            let mut octets = [0u8; 16];
                            octets.copy_from_slice(ip);
                            names.push(std::net::Ipv6Addr::from(octets).to_string());
                        }
                    }
                    _ => {}
                }
            }
        }
    }
    if names.is_empty() {
        for cn in x509.subject().iter_common_name() {
            if let Ok(cn) = cn.as_str() {
                names.push(cn.to_string());
            }
        }
    }
    names
}
