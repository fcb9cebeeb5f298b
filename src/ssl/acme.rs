/// ACME issuance boundary.
/// The wire protocol itself lives in an external ACME client; this module
/// fixes the interface the lifecycle manager consumes and provides an
/// in-process issuer for tests and local development.
use crate::error::{Error, Result};
use crate::types::RevocationReason;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Let's Encrypt production directory
pub const LETS_ENCRYPT_PRODUCTION: &str = "https://acme-v02.api.letsencrypt.org/directory";
/// Let's Encrypt staging directory
pub const LETS_ENCRYPT_STAGING: &str = "https://acme-staging-v02.api.letsencrypt.org/directory";

/// The material an issuance run produces
#[derive(Debug, Clone)]
pub struct IssuedCertificate {
    pub cert_pem: String,
    pub key_pem: String,
    pub chain_pem: String,
    pub issuer: String,
    pub serial_number: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Interface the lifecycle manager drives. Implementations handle account
/// registration, ordering, and DNS-01 challenges.
#[async_trait]
pub trait AcmeIssuer: Send + Sync {
    /// Order one certificate covering all `domains`
    async fn issue(&self, domains: &[String]) -> Result<IssuedCertificate>;

    /// Ask the CA to revoke a certificate by its leaf DER
    async fn revoke(&self, cert_der: &[u8], reason: RevocationReason) -> Result<()>;
}

/// Configuration handed to the external ACME client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcmeDelegateConfig {
    /// "production" or "staging"
    pub environment: String,
    pub contact_email: String,
    /// Provider the DNS-01 solver binds to
    pub dns_provider: String,
}

impl AcmeDelegateConfig {
    pub fn directory_url(&self) -> &'static str {
        match self.environment.as_str() {
            "staging" => LETS_ENCRYPT_STAGING,
            _ => LETS_ENCRYPT_PRODUCTION,
        }
    }
}

/// Issuer backed by an external ACME client service.
/// The sidecar owns the RFC 8555 wire protocol and the DNS-01 solver;
/// this adapter forwards orders and revocations and caches the account
/// credentials it hands back so repeat orders skip re-registration.
pub struct DelegateHttpIssuer {
    base_url: String,
    config: AcmeDelegateConfig,
    client: reqwest::Client,
    accounts: super::rate_limit::AcmeAccountCache,
}

#[derive(Debug, Serialize)]
struct IssueRequest<'a> {
    domains: &'a [String],
    directory_url: &'static str,
    contact_email: &'a str,
    dns_provider: &'a str,
    /// Known account URL from a previous registration, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    account_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IssueResponse {
    cert_pem: String,
    key_pem: String,
    #[serde(default)]
    chain_pem: String,
    issuer: String,
    serial_number: String,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    account_url: Option<String>,
    account_key_pem: Option<String>,
}

impl DelegateHttpIssuer {
    pub fn new(base_url: String, config: AcmeDelegateConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("mailcrypt/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::transport(format!("Failed to build ACME client: {}", e)))?;
        Ok(Self {
            base_url,
            config,
            client,
            accounts: super::rate_limit::AcmeAccountCache::new(),
        })
    }
}

#[async_trait]
impl AcmeIssuer for DelegateHttpIssuer {
    async fn issue(&self, domains: &[String]) -> Result<IssuedCertificate> {
        let cached_account = self.accounts.get(&self.config.contact_email);
        let request = IssueRequest {
            domains,
            directory_url: self.config.directory_url(),
            contact_email: &self.config.contact_email,
            dns_provider: &self.config.dns_provider,
            account_url: cached_account.map(|a| a.account_url),
        };
        let response = self
            .client
            .post(format!("{}/issue", self.base_url.trim_end_matches('/')))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::transport(format!("ACME delegate unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::provisioning(format!(
                "ACME delegate returned HTTP {}",
                response.status()
            )));
        }

        let issued: IssueResponse = response
            .json()
            .await
            .map_err(|e| Error::provisioning(format!("Malformed delegate response: {}", e)))?;

        if let Some(account_url) = &issued.account_url {
            self.accounts.insert(
                &self.config.contact_email,
                account_url.clone(),
                issued.account_key_pem.clone().unwrap_or_default(),
            );
        }

        Ok(IssuedCertificate {
            cert_pem: issued.cert_pem,
            key_pem: issued.key_pem,
            chain_pem: issued.chain_pem,
            issuer: issued.issuer,
            serial_number: issued.serial_number,
            issued_at: issued.issued_at,
            expires_at: issued.expires_at,
        })
    }

    async fn revoke(&self, cert_der: &[u8], reason: RevocationReason) -> Result<()> {
        use base64::Engine;
        let body = serde_json::json!({
            "certificate": base64::engine::general_purpose::STANDARD.encode(cert_der),
            "reason": reason.as_u8(),
        });
        let response = self
            .client
            .post(format!("{}/revoke", self.base_url.trim_end_matches('/')))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::transport(format!("ACME delegate unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::transport(format!(
                "ACME delegate revocation returned HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// In-process issuer backed by locally generated certificates.
/// Serves tests and local development; issuance latency and CA behavior
/// are out of its scope.
pub struct LocalCaIssuer {
    validity_days: i64,
}

impl LocalCaIssuer {
    pub fn new(validity_days: i64) -> Self {
        Self { validity_days }
    }
}

impl Default for LocalCaIssuer {
    fn default() -> Self {
        Self::new(90)
    }
}

#[async_trait]
impl AcmeIssuer for LocalCaIssuer {
    async fn issue(&self, domains: &[String]) -> Result<IssuedCertificate> {
        if domains.is_empty() {
            return Err(Error::provisioning("No domains in order"));
        }

        let issued_at = Utc::now();
        let expires_at = issued_at + Duration::days(self.validity_days);
        let not_before = issued_at - Duration::days(1);

        let mut params = rcgen::CertificateParams::new(domains.to_vec())
            .map_err(|e| Error::crypto(format!("Invalid certificate params: {}", e)))?;
        params
            .distinguished_name
            .push(rcgen::DnType::CommonName, domains[0].clone());
        params.not_before = rcgen::date_time_ymd(
            not_before.year(),
            not_before.month() as u8,
            not_before.day() as u8,
        );
        params.not_after = rcgen::date_time_ymd(
            expires_at.year(),
            expires_at.month() as u8,
            expires_at.day() as u8,
        );

        let key_pair = rcgen::KeyPair::generate()
            .map_err(|e| Error::crypto(format!("Key generation failed: {}", e)))?;
        let cert = params
            .self_signed(&key_pair)
            .map_err(|e| Error::crypto(format!("Certificate signing failed: {}", e)))?;

        let cert_pem = cert.pem();
        let key_pem = key_pair.serialize_pem();

        // Read the actual serial back off the generated leaf
        let block = pem::parse(cert_pem.as_bytes())
            .map_err(|e| Error::pem(format!("Generated cert is not PEM: {}", e)))?;
        let (_, x509) = x509_parser::parse_x509_certificate(block.contents())
            .map_err(|e| Error::crypto(format!("Generated cert unparseable: {}", e)))?;

        Ok(IssuedCertificate {
            serial_number: x509.raw_serial_as_string(),
            issuer: x509.issuer().to_string(),
            cert_pem,
            key_pem,
            chain_pem: String::new(),
            issued_at,
            expires_at,
        })
    }

    async fn revoke(&self, _cert_der: &[u8], reason: RevocationReason) -> Result<()> {
        tracing::debug!(reason = %reason, "Local CA revocation is a no-op");
        Ok(())
    }
}
