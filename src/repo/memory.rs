/// In-memory repository implementation.
/// Backs the test suite and local development; mirrors the PostgreSQL
/// implementation's semantics including conflict detection and the
/// owned-subset query.
use super::{
    AliasRepo, AttachmentRepo, CertificateRepo, DomainRepo, EmailRepo, EmailStats, IssuedMetadata,
    RevocationLogRepo, StoredObjectRef,
};
use crate::authz::{EmailQuery, EmailSortKey, SortOrder};
use crate::error::{Error, Result};
use crate::types::{
    Alias, Attachment, Certificate, CertificateStatus, Domain, Email, RevocationEvent,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    domains: HashMap<Uuid, Domain>,
    certificates: HashMap<Uuid, Certificate>,
    aliases: HashMap<Uuid, Alias>,
    emails: HashMap<Uuid, Email>,
    attachments: HashMap<Uuid, Attachment>,
    revocations: Vec<RevocationEvent>,
}

/// All repositories over shared in-process state
#[derive(Default)]
pub struct MemoryRepo {
    inner: RwLock<Inner>,
}

impl MemoryRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a domain row (test setup)
    pub fn put_domain(&self, domain: Domain) {
        self.inner
            .write()
            .unwrap()
            .domains
            .insert(domain.id, domain);
    }

    /// Seed an email row without going through the ingest path (test setup)
    pub fn put_email(&self, email: Email) {
        self.inner.write().unwrap().emails.insert(email.id, email);
    }

    /// Seed an attachment row (test setup)
    pub fn put_attachment(&self, attachment: Attachment) {
        self.inner
            .write()
            .unwrap()
            .attachments
            .insert(attachment.id, attachment);
    }

    fn owner_of_alias(inner: &Inner, alias_id: Uuid) -> Option<Uuid> {
        inner.aliases.get(&alias_id).map(|a| a.user_id)
    }

    fn owner_of_email(inner: &Inner, email_id: Uuid) -> Option<Uuid> {
        let email = inner.emails.get(&email_id)?;
        Self::owner_of_alias(inner, email.alias_id)
    }

    fn email_has_attachments(inner: &Inner, email_id: Uuid) -> bool {
        inner.attachments.values().any(|a| a.email_id == email_id)
    }
}

#[async_trait]
impl CertificateRepo for MemoryRepo {
    async fn begin_provisioning(&self, domain_id: Uuid, domain_name: &str) -> Result<Certificate> {
        let mut inner = self.inner.write().unwrap();
        let now = Utc::now();
        let cert = inner
            .certificates
            .entry(domain_id)
            .and_modify(|c| {
                c.status = CertificateStatus::Provisioning;
                c.updated_at = now;
            })
            .or_insert_with(|| Certificate {
                id: Uuid::new_v4(),
                domain_id,
                domain_name: domain_name.to_lowercase(),
                status: CertificateStatus::Provisioning,
                issuer: None,
                serial_number: None,
                issued_at: None,
                expires_at: None,
                last_renewal_attempt: None,
                renewal_failures: 0,
                storage_path: None,
                created_at: now,
                updated_at: now,
            });
        Ok(cert.clone())
    }

    async fn get_by_domain_id(&self, domain_id: Uuid) -> Result<Option<Certificate>> {
        Ok(self.inner.read().unwrap().certificates.get(&domain_id).cloned())
    }

    async fn get_by_domain_name(&self, domain_name: &str) -> Result<Option<Certificate>> {
        let wanted = domain_name.to_lowercase();
        Ok(self
            .inner
            .read()
            .unwrap()
            .certificates
            .values()
            .find(|c| c.domain_name == wanted)
            .cloned())
    }

    async fn mark_active(&self, domain_id: Uuid, meta: &IssuedMetadata) -> Result<Certificate> {
        let mut inner = self.inner.write().unwrap();
        let cert = inner
            .certificates
            .get_mut(&domain_id)
            .ok_or_else(|| Error::not_found(format!("certificate for domain {}", domain_id)))?;
        cert.status = CertificateStatus::Active;
        cert.issuer = Some(meta.issuer.clone());
        cert.serial_number = Some(meta.serial_number.clone());
        cert.issued_at = Some(meta.issued_at);
        cert.expires_at = Some(meta.expires_at);
        cert.storage_path = Some(meta.storage_path.clone());
        cert.renewal_failures = 0;
        cert.updated_at = Utc::now();
        Ok(cert.clone())
    }

    async fn mark_failed(&self, domain_id: Uuid) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        if let Some(cert) = inner.certificates.get_mut(&domain_id) {
            cert.status = CertificateStatus::Failed;
            cert.renewal_failures += 1;
            cert.last_renewal_attempt = Some(Utc::now());
            cert.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_status(&self, domain_id: Uuid, status: CertificateStatus) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        if let Some(cert) = inner.certificates.get_mut(&domain_id) {
            cert.status = status;
            cert.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn touch_renewal_attempt(&self, domain_id: Uuid) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        if let Some(cert) = inner.certificates.get_mut(&domain_id) {
            cert.last_renewal_attempt = Some(Utc::now());
            cert.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn delete(&self, domain_id: Uuid) -> Result<()> {
        self.inner.write().unwrap().certificates.remove(&domain_id);
        Ok(())
    }

    async fn list_active(&self) -> Result<Vec<Certificate>> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .certificates
            .values()
            .filter(|c| c.status == CertificateStatus::Active)
            .cloned()
            .collect())
    }

    async fn list_expiring(&self, before: DateTime<Utc>) -> Result<Vec<Certificate>> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .certificates
            .values()
            .filter(|c| {
                c.status == CertificateStatus::Active
                    && c.expires_at.is_some_and(|e| e <= before)
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl DomainRepo for MemoryRepo {
    async fn get(&self, domain_id: Uuid) -> Result<Option<Domain>> {
        Ok(self.inner.read().unwrap().domains.get(&domain_id).cloned())
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Domain>> {
        let wanted = name.to_lowercase();
        Ok(self
            .inner
            .read()
            .unwrap()
            .domains
            .values()
            .find(|d| d.name == wanted)
            .cloned())
    }
}

#[async_trait]
impl AliasRepo for MemoryRepo {
    async fn create(&self, alias: &Alias) -> Result<Alias> {
        let mut inner = self.inner.write().unwrap();
        if inner
            .aliases
            .values()
            .any(|a| a.full_address == alias.full_address)
        {
            return Err(Error::AliasExists(alias.full_address.clone()));
        }
        inner.aliases.insert(alias.id, alias.clone());
        Ok(alias.clone())
    }

    async fn get(&self, alias_id: Uuid) -> Result<Option<Alias>> {
        Ok(self.inner.read().unwrap().aliases.get(&alias_id).cloned())
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Alias>> {
        let mut out: Vec<Alias> = self
            .inner
            .read()
            .unwrap()
            .aliases
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn count_by_user(&self, user_id: Uuid) -> Result<usize> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .aliases
            .values()
            .filter(|a| a.user_id == user_id)
            .count())
    }

    async fn update(
        &self,
        alias_id: Uuid,
        description: Option<String>,
        is_active: Option<bool>,
    ) -> Result<Alias> {
        let mut inner = self.inner.write().unwrap();
        let alias = inner
            .aliases
            .get_mut(&alias_id)
            .ok_or_else(|| Error::not_found(format!("alias {}", alias_id)))?;
        if let Some(d) = description {
            alias.description = Some(d);
        }
        if let Some(active) = is_active {
            alias.is_active = active;
        }
        Ok(alias.clone())
    }

    async fn delete(&self, alias_id: Uuid) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.aliases.remove(&alias_id);
        let email_ids: Vec<Uuid> = inner
            .emails
            .values()
            .filter(|e| e.alias_id == alias_id)
            .map(|e| e.id)
            .collect();
        for id in &email_ids {
            inner.emails.remove(id);
        }
        inner
            .attachments
            .retain(|_, a| !email_ids.contains(&a.email_id));
        Ok(())
    }
}

#[async_trait]
impl EmailRepo for MemoryRepo {
    async fn insert(&self, email: &Email) -> Result<()> {
        self.inner
            .write()
            .unwrap()
            .emails
            .insert(email.id, email.clone());
        Ok(())
    }

    async fn get_with_owner(&self, email_id: Uuid) -> Result<Option<(Email, Uuid)>> {
        let inner = self.inner.read().unwrap();
        let Some(email) = inner.emails.get(&email_id) else {
            return Ok(None);
        };
        let Some(owner) = Self::owner_of_alias(&inner, email.alias_id) else {
            return Ok(None);
        };
        Ok(Some((email.clone(), owner)))
    }

    async fn alias_address(&self, email_id: Uuid) -> Result<Option<String>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .emails
            .get(&email_id)
            .and_then(|e| inner.aliases.get(&e.alias_id))
            .map(|a| a.full_address.clone()))
    }

    async fn list(&self, user_id: Uuid, query: &EmailQuery) -> Result<(Vec<Email>, i64)> {
        let inner = self.inner.read().unwrap();
        let mut matches: Vec<&Email> = inner
            .emails
            .values()
            .filter(|e| Self::owner_of_alias(&inner, e.alias_id) == Some(user_id))
            .filter(|e| query.alias_id.is_none_or(|a| e.alias_id == a))
            .filter(|e| query.is_read.is_none_or(|r| e.is_read == r))
            .filter(|e| query.from_date.is_none_or(|f| e.received_at >= f))
            .filter(|e| query.to_date.is_none_or(|t| e.received_at <= t))
            .filter(|e| {
                query.has_attachments.is_none_or(|want| {
                    Self::email_has_attachments(&inner, e.id) == want
                })
            })
            .filter(|e| {
                query.search.as_ref().is_none_or(|s| {
                    let s = s.to_lowercase();
                    e.subject
                        .as_deref()
                        .unwrap_or_default()
                        .to_lowercase()
                        .contains(&s)
                        || e.sender_address.to_lowercase().contains(&s)
                })
            })
            .collect();

        matches.sort_by(|a, b| {
            let primary = match query.sort {
                EmailSortKey::ReceivedAt => a.received_at.cmp(&b.received_at),
                EmailSortKey::Size => a.size_bytes.cmp(&b.size_bytes),
            };
            let primary = match query.order {
                SortOrder::Asc => primary,
                SortOrder::Desc => primary.reverse(),
            };
            primary.then(b.received_at.cmp(&a.received_at))
        });

        let total = matches.len() as i64;
        let offset = query.offset() as usize;
        let limit = query.effective_limit() as usize;
        let page: Vec<Email> = matches
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn stats(&self, user_id: Uuid) -> Result<EmailStats> {
        let inner = self.inner.read().unwrap();
        let mut stats = EmailStats::default();
        for email in inner
            .emails
            .values()
            .filter(|e| Self::owner_of_alias(&inner, e.alias_id) == Some(user_id))
        {
            stats.total += 1;
            if !email.is_read {
                stats.unread += 1;
            }
            stats.total_size_bytes += email.size_bytes;
            if Self::email_has_attachments(&inner, email.id) {
                stats.with_attachments += 1;
            }
        }
        Ok(stats)
    }

    async fn owned_subset(&self, user_id: Uuid, ids: &[Uuid]) -> Result<HashSet<Uuid>> {
        let inner = self.inner.read().unwrap();
        Ok(ids
            .iter()
            .filter(|id| {
                Self::owner_of_email(&inner, **id) == Some(user_id)
            })
            .copied()
            .collect())
    }

    async fn delete_many(&self, ids: &[Uuid]) -> Result<u64> {
        let mut inner = self.inner.write().unwrap();
        let mut deleted = 0;
        for id in ids {
            if inner.emails.remove(id).is_some() {
                deleted += 1;
            }
        }
        inner.attachments.retain(|_, a| !ids.contains(&a.email_id));
        Ok(deleted)
    }

    async fn mark_read_many(&self, ids: &[Uuid]) -> Result<u64> {
        let mut inner = self.inner.write().unwrap();
        let mut updated = 0;
        for id in ids {
            if let Some(email) = inner.emails.get_mut(id) {
                email.is_read = true;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn set_read(&self, email_id: Uuid, is_read: bool) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        if let Some(email) = inner.emails.get_mut(&email_id) {
            email.is_read = is_read;
        }
        Ok(())
    }

    async fn count_by_alias(&self, alias_id: Uuid) -> Result<i64> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .emails
            .values()
            .filter(|e| e.alias_id == alias_id)
            .count() as i64)
    }

    async fn storage_refs_for_email(&self, email_id: Uuid) -> Result<Vec<StoredObjectRef>> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .attachments
            .values()
            .filter(|a| a.email_id == email_id)
            .map(|a| StoredObjectRef {
                storage_key: a.storage_key.clone(),
                size_bytes: a.size_bytes,
            })
            .collect())
    }

    async fn storage_refs_for_alias(&self, alias_id: Uuid) -> Result<Vec<StoredObjectRef>> {
        let inner = self.inner.read().unwrap();
        let email_ids: HashSet<Uuid> = inner
            .emails
            .values()
            .filter(|e| e.alias_id == alias_id)
            .map(|e| e.id)
            .collect();
        Ok(inner
            .attachments
            .values()
            .filter(|a| email_ids.contains(&a.email_id))
            .map(|a| StoredObjectRef {
                storage_key: a.storage_key.clone(),
                size_bytes: a.size_bytes,
            })
            .collect())
    }
}

#[async_trait]
impl AttachmentRepo for MemoryRepo {
    async fn insert(&self, attachment: &Attachment) -> Result<()> {
        self.inner
            .write()
            .unwrap()
            .attachments
            .insert(attachment.id, attachment.clone());
        Ok(())
    }

    async fn get_with_owner(&self, attachment_id: Uuid) -> Result<Option<(Attachment, Uuid)>> {
        let inner = self.inner.read().unwrap();
        let Some(att) = inner.attachments.get(&attachment_id) else {
            return Ok(None);
        };
        let Some(owner) = Self::owner_of_email(&inner, att.email_id) else {
            return Ok(None);
        };
        Ok(Some((att.clone(), owner)))
    }

    async fn list_by_email(&self, email_id: Uuid) -> Result<Vec<Attachment>> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .attachments
            .values()
            .filter(|a| a.email_id == email_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RevocationLogRepo for MemoryRepo {
    async fn append(&self, event: &RevocationEvent) -> Result<()> {
        self.inner.write().unwrap().revocations.push(event.clone());
        Ok(())
    }

    async fn list_for_domain(&self, domain_id: Uuid) -> Result<Vec<RevocationEvent>> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .revocations
            .iter()
            .filter(|r| r.domain_id == domain_id)
            .cloned()
            .collect())
    }
}
