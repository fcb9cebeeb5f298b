/// Common types and entities for the mail service
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Certificate lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificateStatus {
    /// Created, nothing attempted yet
    Pending,
    /// An issuance run is underway
    Provisioning,
    /// Issued and serveable
    Active,
    /// Validity window passed without renewal
    Expired,
    /// Explicitly revoked; terminal
    Revoked,
    /// Last issuance attempt failed
    Failed,
}

impl CertificateStatus {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateStatus::Pending => "pending",
            CertificateStatus::Provisioning => "provisioning",
            CertificateStatus::Active => "active",
            CertificateStatus::Expired => "expired",
            CertificateStatus::Revoked => "revoked",
            CertificateStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for CertificateStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CertificateStatus::Pending),
            "provisioning" => Ok(CertificateStatus::Provisioning),
            "active" => Ok(CertificateStatus::Active),
            "expired" => Ok(CertificateStatus::Expired),
            "revoked" => Ok(CertificateStatus::Revoked),
            "failed" => Ok(CertificateStatus::Failed),
            _ => Err(format!("Unknown certificate status: {}", s)),
        }
    }
}

impl std::fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Managed TLS certificate metadata. Exactly one row per domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Certificate {
    pub id: Uuid,
    pub domain_id: Uuid,
    /// Stored lower-cased; lookups are case-insensitive
    pub domain_name: String,
    pub status: CertificateStatus,
    pub issuer: Option<String>,
    pub serial_number: Option<String>,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_renewal_attempt: Option<DateTime<Utc>>,
    pub renewal_failures: i32,
    pub storage_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Certificate {
    /// Days until expiry, negative when already past
    pub fn days_until_expiry(&self, now: DateTime<Utc>) -> Option<i64> {
        self.expires_at.map(|e| (e - now).num_days())
    }
}

/// Registered custom domain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Domain {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Stored lower-cased
    pub name: String,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
}

/// Email alias on a verified domain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alias {
    pub id: Uuid,
    pub user_id: Uuid,
    pub domain_id: Uuid,
    pub local_part: String,
    /// `lower(local_part)@lower(domain)`; the global uniqueness key
    pub full_address: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Received email. Ownership derives from the alias.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Email {
    pub id: Uuid,
    pub alias_id: Uuid,
    pub sender_address: String,
    pub sender_name: Option<String>,
    pub subject: Option<String>,
    pub body_html: Option<String>,
    pub body_text: Option<String>,
    pub headers: HashMap<String, String>,
    pub size_bytes: i64,
    pub is_read: bool,
    pub received_at: DateTime<Utc>,
}

/// Email attachment. The blob lives in the object store under `storage_key`;
/// `checksum` is the hex SHA-256 of the blob bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub id: Uuid,
    pub email_id: Uuid,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub storage_key: String,
    pub checksum: String,
    pub created_at: DateTime<Utc>,
}

/// Certificate revocation reason (RFC 5280 CRLReason codes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
#[serde(rename_all = "camelCase")]
pub enum RevocationReason {
    /// Reason unspecified
    Unspecified = 0,
    /// Key compromise
    KeyCompromise = 1,
    /// CA compromise
    CaCompromise = 2,
    /// Affiliation changed
    AffiliationChanged = 3,
    /// Superseded
    Superseded = 4,
    /// Cessation of operation
    CessationOfOperation = 5,
    /// Certificate hold
    CertificateHold = 6,
    /// Remove from CRL
    RemoveFromCRL = 8,
    /// Privilege withdrawn
    PrivilegeWithdrawn = 9,
    /// AA compromise
    AACompromise = 10,
}

impl RevocationReason {
    /// Get the numeric value
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// RFC 5280 name used in the audit trail and metrics labels
    pub fn as_str(self) -> &'static str {
        match self {
            RevocationReason::Unspecified => "unspecified",
            RevocationReason::KeyCompromise => "keyCompromise",
            RevocationReason::CaCompromise => "cACompromise",
            RevocationReason::AffiliationChanged => "affiliationChanged",
            RevocationReason::Superseded => "superseded",
            RevocationReason::CessationOfOperation => "cessationOfOperation",
            RevocationReason::CertificateHold => "certificateHold",
            RevocationReason::RemoveFromCRL => "removeFromCRL",
            RevocationReason::PrivilegeWithdrawn => "privilegeWithdrawn",
            RevocationReason::AACompromise => "aACompromise",
        }
    }
}

impl std::fmt::Display for RevocationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RevocationReason {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "unspecified" => Ok(RevocationReason::Unspecified),
            "keyCompromise" => Ok(RevocationReason::KeyCompromise),
            "cACompromise" => Ok(RevocationReason::CaCompromise),
            "affiliationChanged" => Ok(RevocationReason::AffiliationChanged),
            "superseded" => Ok(RevocationReason::Superseded),
            "cessationOfOperation" => Ok(RevocationReason::CessationOfOperation),
            "certificateHold" => Ok(RevocationReason::CertificateHold),
            "removeFromCRL" => Ok(RevocationReason::RemoveFromCRL),
            "privilegeWithdrawn" => Ok(RevocationReason::PrivilegeWithdrawn),
            "aACompromise" => Ok(RevocationReason::AACompromise),
            _ => Err(format!("Unknown revocation reason: {}", s)),
        }
    }
}

/// Who triggered a revocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevocationInitiator {
    User,
    System,
    DomainDeletion,
}

impl RevocationInitiator {
    pub fn as_str(self) -> &'static str {
        match self {
            RevocationInitiator::User => "user",
            RevocationInitiator::System => "system",
            RevocationInitiator::DomainDeletion => "domain_deletion",
        }
    }
}

impl std::str::FromStr for RevocationInitiator {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user" => Ok(RevocationInitiator::User),
            "system" => Ok(RevocationInitiator::System),
            "domain_deletion" => Ok(RevocationInitiator::DomainDeletion),
            _ => Err(format!("Unknown revocation initiator: {}", s)),
        }
    }
}

/// Append-only revocation audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevocationEvent {
    pub timestamp: DateTime<Utc>,
    pub domain_id: Uuid,
    pub domain_name: String,
    pub serial_number: Option<String>,
    pub reason: RevocationReason,
    pub initiator: RevocationInitiator,
    pub success: bool,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_certificate_status_round_trip() {
        assert_eq!(
            "provisioning".parse::<CertificateStatus>(),
            Ok(CertificateStatus::Provisioning)
        );
        assert_eq!(CertificateStatus::Revoked.as_str(), "revoked");
        assert!("bogus".parse::<CertificateStatus>().is_err());
    }

    #[test]
    fn test_revocation_reason_codes() {
        assert_eq!(RevocationReason::KeyCompromise.as_u8(), 1);
        assert_eq!(RevocationReason::CessationOfOperation.as_u8(), 5);
        assert_eq!(
            RevocationReason::CessationOfOperation.as_str(),
            "cessationOfOperation"
        );
    }

    #[test]
    fn test_days_until_expiry() {
        let now = Utc::now();
        let cert = Certificate {
            id: Uuid::new_v4(),
            domain_id: Uuid::new_v4(),
            domain_name: "example.com".into(),
            status: CertificateStatus::Active,
            issuer: None,
            serial_number: None,
            issued_at: Some(now),
            expires_at: Some(now + chrono::Duration::days(30)),
            last_renewal_attempt: None,
            renewal_failures: 0,
            storage_path: None,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(cert.days_until_expiry(now), Some(30));
    }
}
