//! # Mailcrypt — persistent disposable-email service core
//!
//! Three tightly-coupled cores behind an authenticated HTTP API:
//!
//! - **Certificate lifecycle**: ACME-backed provisioning, encrypted
//!   at-rest storage, a hot cache with zero-downtime rotation, an
//!   expiry-driven renewal scheduler, audited revocation, and an
//!   ACME-aware rate limiter with exponential backoff.
//! - **Attachment pipeline**: content-addressed object storage with
//!   SHA-256 integrity verification, streaming vs presigned-URL dispatch
//!   by size, and cascading cleanup with quota accounting.
//! - **Authorization envelope**: uniform ownership enforcement across
//!   aliases, emails and attachments, bulk-operation partitioning, and
//!   bounded list/filter/sort/paginate semantics.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mailcrypt::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> mailcrypt::Result<()> {
//!     let mut config = Config::from_file("mailcrypt.toml")?;
//!     config.apply_env_overrides()?;
//!     config.validate()?;
//!     // ... wire repositories, stores and the manager, then serve
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod authz;
pub mod config;
pub mod error;
pub mod events;
pub mod metrics;
pub mod objstore;
pub mod repo;
pub mod scheduler;
pub mod server;
pub mod ssl;
pub mod types;

// Re-exports for convenience
pub use authz::{BulkOutcome, EmailQuery, Page, Pagination, ensure_owner, partition_owned};
pub use config::Config;
pub use error::{Error, Result};
pub use events::{EventBus, EventSink, ServiceEvent, TracingSink, WebhookSink};
pub use metrics::{MetricsRegistry, SharedMetrics};
pub use objstore::{AttachmentPipeline, FsObjectStore, ObjectStore, Presigner};
pub use repo::{MemoryRepo, PgRepo};
pub use scheduler::RenewalScheduler;
pub use server::{AppState, HealthState, build_router, start_server};
pub use ssl::{
    AcmeIssuer, AcmeRateLimiter, CertificateCache, CertificateManager, CertificateValidator,
    EncryptedCertStore, LocalCaIssuer, TlsCertificate,
};
pub use types::{
    Alias, Attachment, Certificate, CertificateStatus, Domain, Email, RevocationEvent,
    RevocationInitiator, RevocationReason,
};

/// Prelude module with commonly used types
pub mod prelude {
    pub use crate::{
        authz::{EmailQuery, Page, Pagination},
        config::Config,
        error::{Error, Result},
        events::{EventBus, ServiceEvent},
        metrics::MetricsRegistry,
        objstore::{AttachmentPipeline, FsObjectStore, ObjectStore, Presigner},
        repo::{AliasRepo, AttachmentRepo, CertificateRepo, DomainRepo, EmailRepo, MemoryRepo,
            PgRepo, RevocationLogRepo},
        scheduler::RenewalScheduler,
        server::{AppState, HealthState, build_router, start_server},
        ssl::{
            AcmeIssuer, AcmeRateLimiter, CertificateCache, CertificateManager,
            CertificateValidator, EncryptedCertStore, LocalCaIssuer, TlsCertificate,
        },
        types::{Alias, Attachment, Certificate, CertificateStatus, Domain, Email},
    };
}
