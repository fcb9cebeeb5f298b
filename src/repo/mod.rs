/// Repositories over the ownership graph.
/// This module defines the data-access traits the service cores consume,
/// with a PostgreSQL implementation and an in-memory implementation for
/// tests and local development.
pub mod memory;
pub mod postgres;

use crate::error::Result;
use crate::types::{
    Alias, Attachment, Certificate, CertificateStatus, Domain, Email, RevocationEvent,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use uuid::Uuid;

pub use memory::MemoryRepo;
pub use postgres::PgRepo;

/// Metadata recorded when a certificate becomes active
#[derive(Debug, Clone)]
pub struct IssuedMetadata {
    pub issuer: String,
    pub serial_number: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub storage_path: String,
}

/// Aggregate email statistics for one user
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct EmailStats {
    pub total: i64,
    pub unread: i64,
    pub total_size_bytes: i64,
    pub with_attachments: i64,
}

/// Storage key plus object size, used by the cascading-cleanup paths
#[derive(Debug, Clone)]
pub struct StoredObjectRef {
    pub storage_key: String,
    pub size_bytes: i64,
}

/// Certificate rows: exactly one per domain
#[async_trait]
pub trait CertificateRepo: Send + Sync {
    /// Insert (or reset) the row for a domain and put it in `provisioning`
    async fn begin_provisioning(&self, domain_id: Uuid, domain_name: &str) -> Result<Certificate>;

    async fn get_by_domain_id(&self, domain_id: Uuid) -> Result<Option<Certificate>>;

    /// Case-insensitive lookup by domain name
    async fn get_by_domain_name(&self, domain_name: &str) -> Result<Option<Certificate>>;

    /// Transition to active, record issuance metadata, clear renewal failures
    async fn mark_active(&self, domain_id: Uuid, meta: &IssuedMetadata) -> Result<Certificate>;

    /// Transition to failed, stamp the attempt, bump the failure counter
    async fn mark_failed(&self, domain_id: Uuid) -> Result<()>;

    async fn set_status(&self, domain_id: Uuid, status: CertificateStatus) -> Result<()>;

    /// Stamp `last_renewal_attempt` without changing status
    async fn touch_renewal_attempt(&self, domain_id: Uuid) -> Result<()>;

    /// Remove the certificate row entirely (key-compromise re-provisioning)
    async fn delete(&self, domain_id: Uuid) -> Result<()>;

    async fn list_active(&self) -> Result<Vec<Certificate>>;

    /// Active certificates with `expires_at <= before`
    async fn list_expiring(&self, before: DateTime<Utc>) -> Result<Vec<Certificate>>;
}

/// Domain rows (ownership root for the certificate side)
#[async_trait]
pub trait DomainRepo: Send + Sync {
    async fn get(&self, domain_id: Uuid) -> Result<Option<Domain>>;
    async fn get_by_name(&self, name: &str) -> Result<Option<Domain>>;
}

/// Alias rows
#[async_trait]
pub trait AliasRepo: Send + Sync {
    /// Insert; the storage layer enforces full-address uniqueness and
    /// surfaces conflicts as `AliasExists`
    async fn create(&self, alias: &Alias) -> Result<Alias>;

    async fn get(&self, alias_id: Uuid) -> Result<Option<Alias>>;

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Alias>>;

    async fn count_by_user(&self, user_id: Uuid) -> Result<usize>;

    async fn update(
        &self,
        alias_id: Uuid,
        description: Option<String>,
        is_active: Option<bool>,
    ) -> Result<Alias>;

    /// Delete the row; emails cascade at the database level
    async fn delete(&self, alias_id: Uuid) -> Result<()>;
}

/// Email rows. Ownership derives from the alias join.
#[async_trait]
pub trait EmailRepo: Send + Sync {
    /// Insert a received email (SMTP ingest path)
    async fn insert(&self, email: &Email) -> Result<()>;

    /// Fetch one email together with its owner's user id
    async fn get_with_owner(&self, email_id: Uuid) -> Result<Option<(Email, Uuid)>>;

    /// Canonical alias address for the email detail response
    async fn alias_address(&self, email_id: Uuid) -> Result<Option<String>>;

    /// Filtered, sorted, paginated page plus the total count under the
    /// same filter set
    async fn list(
        &self,
        user_id: Uuid,
        query: &crate::authz::EmailQuery,
    ) -> Result<(Vec<Email>, i64)>;

    async fn stats(&self, user_id: Uuid) -> Result<EmailStats>;

    /// One query: the subset of `ids` owned by `user_id`
    async fn owned_subset(&self, user_id: Uuid, ids: &[Uuid]) -> Result<HashSet<Uuid>>;

    /// Single batched delete; returns affected row count
    async fn delete_many(&self, ids: &[Uuid]) -> Result<u64>;

    /// Single batched mark-as-read; returns affected row count
    async fn mark_read_many(&self, ids: &[Uuid]) -> Result<u64>;

    async fn set_read(&self, email_id: Uuid, is_read: bool) -> Result<()>;

    async fn count_by_alias(&self, alias_id: Uuid) -> Result<i64>;

    /// Storage keys of every attachment on this email
    async fn storage_refs_for_email(&self, email_id: Uuid) -> Result<Vec<StoredObjectRef>>;

    /// Storage keys of every attachment under this alias
    async fn storage_refs_for_alias(&self, alias_id: Uuid) -> Result<Vec<StoredObjectRef>>;
}

/// Attachment rows
#[async_trait]
pub trait AttachmentRepo: Send + Sync {
    async fn insert(&self, attachment: &Attachment) -> Result<()>;

    /// Fetch one attachment together with its owner's user id
    /// (email → alias → user)
    async fn get_with_owner(&self, attachment_id: Uuid) -> Result<Option<(Attachment, Uuid)>>;

    async fn list_by_email(&self, email_id: Uuid) -> Result<Vec<Attachment>>;
}

/// Append-only revocation audit trail
#[async_trait]
pub trait RevocationLogRepo: Send + Sync {
    async fn append(&self, event: &RevocationEvent) -> Result<()>;
    async fn list_for_domain(&self, domain_id: Uuid) -> Result<Vec<RevocationEvent>>;
}
