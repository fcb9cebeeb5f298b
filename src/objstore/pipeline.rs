/// Attachment pipeline: integrity-checked serving, size-based dispatch,
/// and best-effort bulk deletion with quota accounting.
use super::{DELETE_BATCH_SIZE, ObjectStore};
use crate::authz::ensure_owner_joined;
use crate::error::{Error, Result};
use crate::repo::{AttachmentRepo, EmailRepo, StoredObjectRef};
use crate::types::Attachment;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Options a download request carries
#[derive(Debug, Clone, Copy, Default)]
pub struct DeliveryOptions {
    /// Caller elected a presigned URL regardless of size
    pub url_only: bool,
    /// Render inline instead of as a download
    pub inline: bool,
}

/// A fully verified in-memory download
#[derive(Debug)]
pub struct AttachmentDownload {
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub checksum: String,
    pub data: Vec<u8>,
    pub inline: bool,
}

/// How the attachment is delivered to the client
#[derive(Debug)]
pub enum AttachmentDelivery {
    /// Bytes pass through the service after checksum verification
    Stream(AttachmentDownload),
    /// Client fetches directly from storage; integrity moves to the
    /// client via the surfaced checksum
    Presigned {
        url: String,
        expires_in: u64,
        filename: String,
        content_type: String,
        size_bytes: i64,
        checksum: String,
    },
}

/// Outcome of a bulk storage deletion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupSummary {
    pub count_deleted: usize,
    pub bytes_freed: u64,
}

/// The attachment storage pipeline
pub struct AttachmentPipeline {
    store: Arc<dyn ObjectStore>,
    attachments: Arc<dyn AttachmentRepo>,
    emails: Arc<dyn EmailRepo>,
    large_file_threshold: u64,
    presign_expiry: Duration,
}

impl AttachmentPipeline {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        attachments: Arc<dyn AttachmentRepo>,
        emails: Arc<dyn EmailRepo>,
        large_file_threshold: u64,
        presign_expiry: Duration,
    ) -> Self {
        Self {
            store,
            attachments,
            emails,
            large_file_threshold,
            presign_expiry,
        }
    }

    /// Content-addressed storage key for a blob
    pub fn storage_key_for(checksum_hex: &str) -> String {
        format!(
            "{}/{}/{}",
            &checksum_hex[..2],
            &checksum_hex[2..4],
            checksum_hex
        )
    }

    /// Ingest path: compute the checksum, write the blob, insert the row.
    /// The stored checksum is the integrity anchor for every later read.
    pub async fn store_attachment(
        &self,
        email_id: Uuid,
        filename: &str,
        content_type: &str,
        data: &[u8],
    ) -> Result<Attachment> {
        let checksum = hex::encode(Sha256::digest(data));
        let storage_key = Self::storage_key_for(&checksum);
        self.store.put(&storage_key, data).await?;

        let attachment = Attachment {
            id: Uuid::new_v4(),
            email_id,
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            size_bytes: data.len() as i64,
            storage_key,
            checksum,
            created_at: Utc::now(),
        };
        self.attachments.insert(&attachment).await?;
        Ok(attachment)
    }

    /// Fetch one attachment for a user, dispatching by size and options.
    ///
    /// Ownership is enforced first (existence before ownership); the
    /// attachment must also belong to the requested email. The streamed
    /// path reads the whole object and compares its SHA-256 against the
    /// stored checksum before any byte is served.
    pub async fn fetch(
        &self,
        user_id: Uuid,
        email_id: Uuid,
        attachment_id: Uuid,
        opts: DeliveryOptions,
    ) -> Result<AttachmentDelivery> {
        let attachment = ensure_owner_joined(
            user_id,
            self.attachments.get_with_owner(attachment_id).await?,
            "attachment",
        )?;

        if attachment.email_id != email_id {
            return Err(Error::not_found("attachment"));
        }

        if opts.url_only || attachment.size_bytes as u64 >= self.large_file_threshold {
            return self.presigned(&attachment);
        }

        let Some(data) = self.store.get(&attachment.storage_key).await? else {
            tracing::warn!(
                attachment_id = %attachment.id,
                storage_key = %attachment.storage_key,
                "Attachment object missing from storage"
            );
            return Err(Error::AttachmentGone(attachment.id.to_string()));
        };

        let actual = hex::encode(Sha256::digest(&data));
        if actual != attachment.checksum {
            tracing::error!(
                attachment_id = %attachment.id,
                email_id = %email_id,
                user_id = %user_id,
                storage_key = %attachment.storage_key,
                expected = %attachment.checksum,
                "Attachment checksum mismatch, refusing to serve"
            );
            return Err(Error::ChecksumMismatch(attachment.id.to_string()));
        }

        Ok(AttachmentDelivery::Stream(AttachmentDownload {
            filename: attachment.filename,
            content_type: attachment.content_type,
            size_bytes: attachment.size_bytes,
            checksum: attachment.checksum,
            data,
            inline: opts.inline,
        }))
    }

    /// Presigned-URL variant, also used by the explicit `/url` route
    pub async fn fetch_url(
        &self,
        user_id: Uuid,
        email_id: Uuid,
        attachment_id: Uuid,
    ) -> Result<AttachmentDelivery> {
        let attachment = ensure_owner_joined(
            user_id,
            self.attachments.get_with_owner(attachment_id).await?,
            "attachment",
        )?;
        if attachment.email_id != email_id {
            return Err(Error::not_found("attachment"));
        }
        self.presigned(&attachment)
    }

    fn presigned(&self, attachment: &Attachment) -> Result<AttachmentDelivery> {
        let url = self
            .store
            .presign_get(&attachment.storage_key, self.presign_expiry)?;
        Ok(AttachmentDelivery::Presigned {
            url,
            expires_in: self.presign_expiry.as_secs(),
            filename: attachment.filename.clone(),
            content_type: attachment.content_type.clone(),
            size_bytes: attachment.size_bytes,
            checksum: attachment.checksum.clone(),
        })
    }

    /// Best-effort storage deletion: HEAD each key for quota accounting,
    /// then delete in batches. Per-key failures never abort the sweep.
    pub async fn delete_by_keys(&self, refs: &[StoredObjectRef]) -> CleanupSummary {
        let mut summary = CleanupSummary::default();
        for chunk in refs.chunks(DELETE_BATCH_SIZE) {
            let mut keys = Vec::with_capacity(chunk.len());
            let mut chunk_bytes = 0u64;
            for r in chunk {
                // The row's size is a fallback when the object is already gone
                let size = match self.store.head(&r.storage_key).await {
                    Ok(Some(meta)) => meta.size,
                    _ => r.size_bytes.max(0) as u64,
                };
                chunk_bytes += size;
                keys.push(r.storage_key.clone());
            }
            match self.store.delete_batch(&keys).await {
                Ok(batch) => {
                    summary.count_deleted += batch.deleted;
                    summary.bytes_freed += chunk_bytes;
                    if batch.failed > 0 {
                        tracing::warn!(failed = batch.failed, "Partial object batch delete");
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Object batch delete failed");
                }
            }
        }
        summary
    }

    /// List-then-delete for a whole prefix
    pub async fn delete_by_prefix(&self, prefix: &str) -> CleanupSummary {
        let keys = match self.store.list_prefix(prefix).await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(prefix = %prefix, error = %e, "Prefix listing failed");
                return CleanupSummary::default();
            }
        };
        let refs: Vec<StoredObjectRef> = keys
            .into_iter()
            .map(|storage_key| StoredObjectRef {
                storage_key,
                size_bytes: 0,
            })
            .collect();
        self.delete_by_keys(&refs).await
    }

    /// Cascading cleanup for one email: storage first (best-effort), then
    /// the database row, which cascades to attachment rows. Storage
    /// failure never blocks the row deletion.
    pub async fn delete_email_cascade(&self, email_id: Uuid) -> Result<()> {
        let refs = self.emails.storage_refs_for_email(email_id).await?;
        let summary = self.delete_by_keys(&refs).await;
        tracing::debug!(
            email_id = %email_id,
            objects = summary.count_deleted,
            bytes = summary.bytes_freed,
            "Email attachment storage cleaned"
        );
        self.emails.delete_many(&[email_id]).await?;
        Ok(())
    }

    /// Cascading cleanup for every email under an alias
    pub async fn delete_alias_storage(&self, alias_id: Uuid) -> Result<CleanupSummary> {
        let refs = self.emails.storage_refs_for_alias(alias_id).await?;
        Ok(self.delete_by_keys(&refs).await)
    }
}
