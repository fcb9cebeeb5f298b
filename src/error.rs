/// Error handling for the mail service core
use thiserror::Error;

/// Result type for service operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for service operations.
///
/// The first group carries the stable, user-visible error kinds surfaced by
/// the HTTP API; the second group covers infrastructure failures.
#[derive(Error, Debug)]
pub enum Error {
    /// Requested entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Authenticated user does not own the entity
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Input validation failed; each violation keeps its own kind
    #[error("Validation error: {field}: {kind}")]
    Validation { field: String, kind: String },

    /// Alias full address already taken
    #[error("Alias already exists: {0}")]
    AliasExists(String),

    /// Per-user alias ceiling reached
    #[error("Alias limit reached ({0} max)")]
    AliasLimitReached(usize),

    /// Domain exists but is not verified
    #[error("Domain not verified: {0}")]
    DomainNotVerified(String),

    /// Bulk operation exceeded the id-set bound
    #[error("Bulk limit exceeded: {got} ids, maximum {max}")]
    BulkLimitExceeded { got: usize, max: usize },

    /// Attachment row exists but the object is gone from storage
    #[error("Attachment gone: {0}")]
    AttachmentGone(String),

    /// Stored checksum does not match the object bytes
    #[error("Checksum mismatch for attachment {0}")]
    ChecksumMismatch(String),

    /// A concurrent provisioning run holds the per-domain gate
    #[error("Provisioning already in progress for domain {0}")]
    ProvisioningInProgress(String),

    /// Certificate provisioning failed
    #[error("Provisioning failed: {0}")]
    ProvisioningFailed(String),

    /// Certificate renewal failed
    #[error("Renewal failed: {0}")]
    RenewalFailed(String),

    /// ACME rate limit denied the request
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Certificate exists but is not in the active state
    #[error("Certificate not active for {domain}: status {status}")]
    CertificateNotActive { domain: String, status: String },

    /// Certificate validity window has passed
    #[error("Certificate expired: {0}")]
    CertificateExpired(String),

    /// Certificate has been revoked
    #[error("Certificate revoked: {0}")]
    CertificateRevoked(String),

    /// Object/certificate storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Cryptographic operation error
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// PEM encoding/decoding error
    #[error("PEM error: {0}")]
    Pem(String),

    /// HTTP transport error
    #[error("Transport error: {0}")]
    Transport(String),

    /// Operation timeout
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a not found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Error::NotFound(msg.into())
    }

    /// Create an access denied error
    pub fn access_denied<S: Into<String>>(msg: S) -> Self {
        Error::AccessDenied(msg.into())
    }

    /// Create a validation error with a named kind
    pub fn validation<S: Into<String>>(field: S, kind: S) -> Self {
        Error::Validation {
            field: field.into(),
            kind: kind.into(),
        }
    }

    /// Create a storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Error::Storage(msg.into())
    }

    /// Create a database error
    pub fn database<S: Into<String>>(msg: S) -> Self {
        Error::Database(msg.into())
    }

    /// Create a crypto error
    pub fn crypto<S: Into<String>>(msg: S) -> Self {
        Error::Crypto(msg.into())
    }

    /// Create a PEM error
    pub fn pem<S: Into<String>>(msg: S) -> Self {
        Error::Pem(msg.into())
    }

    /// Create a transport error
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        Error::Transport(msg.into())
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Error::Timeout(msg.into())
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Error::Configuration(msg.into())
    }

    /// Create a provisioning failure
    pub fn provisioning<S: Into<String>>(msg: S) -> Self {
        Error::ProvisioningFailed(msg.into())
    }

    /// Create a rate limited error
    pub fn rate_limited<S: Into<String>>(msg: S) -> Self {
        Error::RateLimited(msg.into())
    }

    /// Stable machine-readable code for the API error envelope
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "NOT_FOUND",
            Error::AccessDenied(_) => "ACCESS_DENIED",
            Error::Validation { .. } => "VALIDATION_ERROR",
            Error::AliasExists(_) => "ALIAS_EXISTS",
            Error::AliasLimitReached(_) => "ALIAS_LIMIT_REACHED",
            Error::DomainNotVerified(_) => "DOMAIN_NOT_VERIFIED",
            Error::BulkLimitExceeded { .. } => "BULK_LIMIT_EXCEEDED",
            Error::AttachmentGone(_) => "ATTACHMENT_GONE",
            Error::ChecksumMismatch(_) => "CHECKSUM_MISMATCH",
            Error::ProvisioningInProgress(_) => "PROVISIONING_IN_PROGRESS",
            Error::ProvisioningFailed(_) => "PROVISIONING_FAILED",
            Error::RenewalFailed(_) => "RENEWAL_FAILED",
            Error::RateLimited(_) => "RATE_LIMITED",
            Error::CertificateNotActive { .. } => "CERTIFICATE_NOT_ACTIVE",
            Error::CertificateExpired(_) => "CERTIFICATE_EXPIRED",
            Error::CertificateRevoked(_) => "CERTIFICATE_REVOKED",
            Error::Storage(_) => "STORAGE_ERROR",
            Error::Database(_) => "DATABASE_ERROR",
            Error::Crypto(_) => "CRYPTO_ERROR",
            Error::Pem(_) => "PEM_ERROR",
            Error::Transport(_) => "TRANSPORT_ERROR",
            Error::Timeout(_) => "TIMEOUT",
            Error::Configuration(_) => "CONFIGURATION_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Json(_) => "SERIALIZATION_ERROR",
        }
    }

    /// HTTP status the API surfaces for this kind
    pub fn status(&self) -> u16 {
        match self {
            Error::NotFound(_) => 404,
            Error::AccessDenied(_) => 403,
            Error::Validation { .. } => 400,
            Error::AliasExists(_) => 409,
            Error::AliasLimitReached(_) => 402,
            Error::DomainNotVerified(_) => 403,
            Error::BulkLimitExceeded { .. } => 400,
            Error::AttachmentGone(_) => 410,
            Error::ChecksumMismatch(_) => 500,
            Error::ProvisioningInProgress(_) => 409,
            Error::ProvisioningFailed(_) | Error::RenewalFailed(_) => 500,
            Error::RateLimited(_) => 429,
            Error::CertificateNotActive { .. } => 404,
            Error::CertificateExpired(_) | Error::CertificateRevoked(_) => 410,
            Error::Timeout(_) => 504,
            _ => 500,
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => Error::NotFound("row not found".to_string()),
            other => Error::Database(other.to_string()),
        }
    }
}
