/// PostgreSQL repository implementation.
/// Queries are built at runtime; dynamic filters go through `QueryBuilder`
/// with bound parameters only.
use super::{
    AliasRepo, AttachmentRepo, CertificateRepo, DomainRepo, EmailRepo, EmailStats, IssuedMetadata,
    RevocationLogRepo, StoredObjectRef,
};
use crate::authz::EmailQuery;
use crate::error::{Error, Result};
use crate::types::{
    Alias, Attachment, Certificate, CertificateStatus, Domain, Email, RevocationEvent,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Row};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// All repositories over one connection pool
#[derive(Clone)]
pub struct PgRepo {
    pool: PgPool,
}

impl PgRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect with the configured pool size
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| Error::database(format!("Failed to connect to PostgreSQL: {}", e)))?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(sqlx::FromRow)]
struct CertificateRow {
    id: Uuid,
    domain_id: Uuid,
    domain_name: String,
    status: String,
    issuer: Option<String>,
    serial_number: Option<String>,
    issued_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    last_renewal_attempt: Option<DateTime<Utc>>,
    renewal_failures: i32,
    storage_path: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CertificateRow {
    fn into_certificate(self) -> Result<Certificate> {
        let status: CertificateStatus = self
            .status
            .parse()
            .map_err(|e: String| Error::database(e))?;
        Ok(Certificate {
            id: self.id,
            domain_id: self.domain_id,
            domain_name: self.domain_name,
            status,
            issuer: self.issuer,
            serial_number: self.serial_number,
            issued_at: self.issued_at,
            expires_at: self.expires_at,
            last_renewal_attempt: self.last_renewal_attempt,
            renewal_failures: self.renewal_failures,
            storage_path: self.storage_path,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const CERT_COLUMNS: &str = "id, domain_id, domain_name, status, issuer, serial_number, \
     issued_at, expires_at, last_renewal_attempt, renewal_failures, storage_path, \
     created_at, updated_at";

#[async_trait]
impl CertificateRepo for PgRepo {
    async fn begin_provisioning(&self, domain_id: Uuid, domain_name: &str) -> Result<Certificate> {
        let sql = format!(
            "INSERT INTO certificates (id, domain_id, domain_name, status, renewal_failures) \
             VALUES ($1, $2, lower($3), 'provisioning', 0) \
             ON CONFLICT (domain_id) DO UPDATE \
             SET status = 'provisioning', updated_at = now() \
             RETURNING {CERT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, CertificateRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(domain_id)
            .bind(domain_name)
            .fetch_one(&self.pool)
            .await?;
        row.into_certificate()
    }

    async fn get_by_domain_id(&self, domain_id: Uuid) -> Result<Option<Certificate>> {
        let sql = format!("SELECT {CERT_COLUMNS} FROM certificates WHERE domain_id = $1");
        let row = sqlx::query_as::<_, CertificateRow>(&sql)
            .bind(domain_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(CertificateRow::into_certificate).transpose()
    }

    async fn get_by_domain_name(&self, domain_name: &str) -> Result<Option<Certificate>> {
        let sql =
            format!("SELECT {CERT_COLUMNS} FROM certificates WHERE domain_name = lower($1)");
        let row = sqlx::query_as::<_, CertificateRow>(&sql)
            .bind(domain_name)
            .fetch_optional(&self.pool)
            .await?;
        row.map(CertificateRow::into_certificate).transpose()
    }

    async fn mark_active(&self, domain_id: Uuid, meta: &IssuedMetadata) -> Result<Certificate> {
        let sql = format!(
            "UPDATE certificates \
             SET status = 'active', issuer = $2, serial_number = $3, issued_at = $4, \
                 expires_at = $5, storage_path = $6, renewal_failures = 0, updated_at = now() \
             WHERE domain_id = $1 \
             RETURNING {CERT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, CertificateRow>(&sql)
            .bind(domain_id)
            .bind(&meta.issuer)
            .bind(&meta.serial_number)
            .bind(meta.issued_at)
            .bind(meta.expires_at)
            .bind(&meta.storage_path)
            .fetch_one(&self.pool)
            .await?;
        row.into_certificate()
    }

    async fn mark_failed(&self, domain_id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE certificates \
             SET status = 'failed', renewal_failures = renewal_failures + 1, \
                 last_renewal_attempt = now(), updated_at = now() \
             WHERE domain_id = $1",
        )
        .bind(domain_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_status(&self, domain_id: Uuid, status: CertificateStatus) -> Result<()> {
        sqlx::query(
            "UPDATE certificates SET status = $2, updated_at = now() WHERE domain_id = $1",
        )
        .bind(domain_id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn touch_renewal_attempt(&self, domain_id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE certificates SET last_renewal_attempt = now(), updated_at = now() \
             WHERE domain_id = $1",
        )
        .bind(domain_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, domain_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM certificates WHERE domain_id = $1")
            .bind(domain_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_active(&self) -> Result<Vec<Certificate>> {
        let sql = format!("SELECT {CERT_COLUMNS} FROM certificates WHERE status = 'active'");
        let rows = sqlx::query_as::<_, CertificateRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(CertificateRow::into_certificate)
            .collect()
    }

    async fn list_expiring(&self, before: DateTime<Utc>) -> Result<Vec<Certificate>> {
        let sql = format!(
            "SELECT {CERT_COLUMNS} FROM certificates \
             WHERE status = 'active' AND expires_at IS NOT NULL AND expires_at <= $1"
        );
        let rows = sqlx::query_as::<_, CertificateRow>(&sql)
            .bind(before)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(CertificateRow::into_certificate)
            .collect()
    }
}

#[derive(sqlx::FromRow)]
struct DomainRow {
    id: Uuid,
    user_id: Uuid,
    name: String,
    is_verified: bool,
    created_at: DateTime<Utc>,
}

impl From<DomainRow> for Domain {
    fn from(r: DomainRow) -> Self {
        Domain {
            id: r.id,
            user_id: r.user_id,
            name: r.name,
            is_verified: r.is_verified,
            created_at: r.created_at,
        }
    }
}

#[async_trait]
impl DomainRepo for PgRepo {
    async fn get(&self, domain_id: Uuid) -> Result<Option<Domain>> {
        let row = sqlx::query_as::<_, DomainRow>(
            "SELECT id, user_id, name, is_verified, created_at FROM domains WHERE id = $1",
        )
        .bind(domain_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Domain::from))
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Domain>> {
        let row = sqlx::query_as::<_, DomainRow>(
            "SELECT id, user_id, name, is_verified, created_at FROM domains \
             WHERE name = lower($1)",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Domain::from))
    }
}

#[derive(sqlx::FromRow)]
struct AliasRow {
    id: Uuid,
    user_id: Uuid,
    domain_id: Uuid,
    local_part: String,
    full_address: String,
    description: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl From<AliasRow> for Alias {
    fn from(r: AliasRow) -> Self {
        Alias {
            id: r.id,
            user_id: r.user_id,
            domain_id: r.domain_id,
            local_part: r.local_part,
            full_address: r.full_address,
            description: r.description,
            is_active: r.is_active,
            created_at: r.created_at,
        }
    }
}

const ALIAS_COLUMNS: &str =
    "id, user_id, domain_id, local_part, full_address, description, is_active, created_at";

#[async_trait]
impl AliasRepo for PgRepo {
    async fn create(&self, alias: &Alias) -> Result<Alias> {
        let sql = format!(
            "INSERT INTO aliases (id, user_id, domain_id, local_part, full_address, \
             description, is_active) VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {ALIAS_COLUMNS}"
        );
        let row = sqlx::query_as::<_, AliasRow>(&sql)
            .bind(alias.id)
            .bind(alias.user_id)
            .bind(alias.domain_id)
            .bind(&alias.local_part)
            .bind(&alias.full_address)
            .bind(&alias.description)
            .bind(alias.is_active)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if e.as_database_error()
                    .is_some_and(|d| d.is_unique_violation())
                {
                    Error::AliasExists(alias.full_address.clone())
                } else {
                    Error::from(e)
                }
            })?;
        Ok(row.into())
    }

    async fn get(&self, alias_id: Uuid) -> Result<Option<Alias>> {
        let sql = format!("SELECT {ALIAS_COLUMNS} FROM aliases WHERE id = $1");
        let row = sqlx::query_as::<_, AliasRow>(&sql)
            .bind(alias_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Alias::from))
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Alias>> {
        let sql = format!(
            "SELECT {ALIAS_COLUMNS} FROM aliases WHERE user_id = $1 ORDER BY created_at DESC"
        );
        let rows = sqlx::query_as::<_, AliasRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Alias::from).collect())
    }

    async fn count_by_user(&self, user_id: Uuid) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT count(*) FROM aliases WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn update(
        &self,
        alias_id: Uuid,
        description: Option<String>,
        is_active: Option<bool>,
    ) -> Result<Alias> {
        let sql = format!(
            "UPDATE aliases \
             SET description = COALESCE($2, description), \
                 is_active = COALESCE($3, is_active) \
             WHERE id = $1 \
             RETURNING {ALIAS_COLUMNS}"
        );
        let row = sqlx::query_as::<_, AliasRow>(&sql)
            .bind(alias_id)
            .bind(description)
            .bind(is_active)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }

    async fn delete(&self, alias_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM aliases WHERE id = $1")
            .bind(alias_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct EmailRow {
    id: Uuid,
    alias_id: Uuid,
    sender_address: String,
    sender_name: Option<String>,
    subject: Option<String>,
    body_html: Option<String>,
    body_text: Option<String>,
    headers: Json<HashMap<String, String>>,
    size_bytes: i64,
    is_read: bool,
    received_at: DateTime<Utc>,
}

impl From<EmailRow> for Email {
    fn from(r: EmailRow) -> Self {
        Email {
            id: r.id,
            alias_id: r.alias_id,
            sender_address: r.sender_address,
            sender_name: r.sender_name,
            subject: r.subject,
            body_html: r.body_html,
            body_text: r.body_text,
            headers: r.headers.0,
            size_bytes: r.size_bytes,
            is_read: r.is_read,
            received_at: r.received_at,
        }
    }
}

const EMAIL_COLUMNS: &str = "e.id, e.alias_id, e.sender_address, e.sender_name, e.subject, \
     e.body_html, e.body_text, e.headers, e.size_bytes, e.is_read, e.received_at";

/// Append the shared WHERE clauses for the email list and its count query
fn push_email_filters(qb: &mut QueryBuilder<'_, Postgres>, user_id: Uuid, query: &EmailQuery) {
    qb.push(" WHERE a.user_id = ").push_bind(user_id);
    if let Some(alias_id) = query.alias_id {
        qb.push(" AND e.alias_id = ").push_bind(alias_id);
    }
    if let Some(search) = &query.search {
        let pattern = format!("%{}%", search);
        qb.push(" AND (e.subject ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR e.sender_address ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(from) = query.from_date {
        qb.push(" AND e.received_at >= ").push_bind(from);
    }
    if let Some(to) = query.to_date {
        qb.push(" AND e.received_at <= ").push_bind(to);
    }
    if let Some(is_read) = query.is_read {
        qb.push(" AND e.is_read = ").push_bind(is_read);
    }
    if let Some(has) = query.has_attachments {
        if has {
            qb.push(" AND EXISTS (SELECT 1 FROM attachments at WHERE at.email_id = e.id)");
        } else {
            qb.push(" AND NOT EXISTS (SELECT 1 FROM attachments at WHERE at.email_id = e.id)");
        }
    }
}

#[async_trait]
impl EmailRepo for PgRepo {
    async fn insert(&self, email: &Email) -> Result<()> {
        sqlx::query(
            "INSERT INTO emails (id, alias_id, sender_address, sender_name, subject, \
             body_html, body_text, headers, size_bytes, is_read, received_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(email.id)
        .bind(email.alias_id)
        .bind(&email.sender_address)
        .bind(&email.sender_name)
        .bind(&email.subject)
        .bind(&email.body_html)
        .bind(&email.body_text)
        .bind(Json(&email.headers))
        .bind(email.size_bytes)
        .bind(email.is_read)
        .bind(email.received_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_with_owner(&self, email_id: Uuid) -> Result<Option<(Email, Uuid)>> {
        let sql = format!(
            "SELECT {EMAIL_COLUMNS}, a.user_id AS owner_id \
             FROM emails e JOIN aliases a ON a.id = e.alias_id WHERE e.id = $1"
        );
        let row = sqlx::query(&sql)
            .bind(email_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            None => Ok(None),
            Some(row) => {
                let owner: Uuid = row.try_get("owner_id")?;
                let email = EmailRow::from_row(&row)?;
                Ok(Some((email.into(), owner)))
            }
        }
    }

    async fn alias_address(&self, email_id: Uuid) -> Result<Option<String>> {
        let address: Option<String> = sqlx::query_scalar(
            "SELECT a.full_address FROM emails e JOIN aliases a ON a.id = e.alias_id \
             WHERE e.id = $1",
        )
        .bind(email_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(address)
    }

    async fn list(&self, user_id: Uuid, query: &EmailQuery) -> Result<(Vec<Email>, i64)> {
        let mut count_qb = QueryBuilder::new(
            "SELECT count(*) FROM emails e JOIN aliases a ON a.id = e.alias_id",
        );
        push_email_filters(&mut count_qb, user_id, query);
        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut qb = QueryBuilder::new(format!(
            "SELECT {EMAIL_COLUMNS} FROM emails e JOIN aliases a ON a.id = e.alias_id"
        ));
        push_email_filters(&mut qb, user_id, query);
        // Sort column and direction come from closed enums, never user text
        qb.push(format!(
            " ORDER BY e.{} {}, e.received_at DESC",
            query.sort.as_column(),
            query.order.as_sql()
        ));
        qb.push(" LIMIT ")
            .push_bind(query.effective_limit())
            .push(" OFFSET ")
            .push_bind(query.offset());

        let rows: Vec<EmailRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        Ok((rows.into_iter().map(Email::from).collect(), total))
    }

    async fn stats(&self, user_id: Uuid) -> Result<EmailStats> {
        let row = sqlx::query(
            "SELECT count(*) AS total, \
                    count(*) FILTER (WHERE NOT e.is_read) AS unread, \
                    COALESCE(sum(e.size_bytes), 0)::bigint AS total_size, \
                    count(*) FILTER (WHERE EXISTS \
                        (SELECT 1 FROM attachments at WHERE at.email_id = e.id)) AS with_attachments \
             FROM emails e JOIN aliases a ON a.id = e.alias_id \
             WHERE a.user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(EmailStats {
            total: row.try_get("total")?,
            unread: row.try_get("unread")?,
            total_size_bytes: row.try_get("total_size")?,
            with_attachments: row.try_get("with_attachments")?,
        })
    }

    async fn owned_subset(&self, user_id: Uuid, ids: &[Uuid]) -> Result<HashSet<Uuid>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }
        let rows: Vec<Uuid> = sqlx::query_scalar(
            "SELECT e.id FROM emails e JOIN aliases a ON a.id = e.alias_id \
             WHERE a.user_id = $1 AND e.id = ANY($2)",
        )
        .bind(user_id)
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }

    async fn delete_many(&self, ids: &[Uuid]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query("DELETE FROM emails WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn mark_read_many(&self, ids: &[Uuid]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query("UPDATE emails SET is_read = true WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn set_read(&self, email_id: Uuid, is_read: bool) -> Result<()> {
        sqlx::query("UPDATE emails SET is_read = $2 WHERE id = $1")
            .bind(email_id)
            .bind(is_read)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn count_by_alias(&self, alias_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT count(*) FROM emails WHERE alias_id = $1")
            .bind(alias_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn storage_refs_for_email(&self, email_id: Uuid) -> Result<Vec<StoredObjectRef>> {
        let rows = sqlx::query(
            "SELECT storage_key, size_bytes FROM attachments WHERE email_id = $1",
        )
        .bind(email_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| {
                Ok(StoredObjectRef {
                    storage_key: row.try_get("storage_key")?,
                    size_bytes: row.try_get("size_bytes")?,
                })
            })
            .collect()
    }

    async fn storage_refs_for_alias(&self, alias_id: Uuid) -> Result<Vec<StoredObjectRef>> {
        let rows = sqlx::query(
            "SELECT at.storage_key, at.size_bytes FROM attachments at \
             JOIN emails e ON e.id = at.email_id WHERE e.alias_id = $1",
        )
        .bind(alias_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| {
                Ok(StoredObjectRef {
                    storage_key: row.try_get("storage_key")?,
                    size_bytes: row.try_get("size_bytes")?,
                })
            })
            .collect()
    }
}

#[derive(sqlx::FromRow)]
struct AttachmentRow {
    id: Uuid,
    email_id: Uuid,
    filename: String,
    content_type: String,
    size_bytes: i64,
    storage_key: String,
    checksum: String,
    created_at: DateTime<Utc>,
}

impl From<AttachmentRow> for Attachment {
    fn from(r: AttachmentRow) -> Self {
        Attachment {
            id: r.id,
            email_id: r.email_id,
            filename: r.filename,
            content_type: r.content_type,
            size_bytes: r.size_bytes,
            storage_key: r.storage_key,
            checksum: r.checksum,
            created_at: r.created_at,
        }
    }
}

const ATTACHMENT_COLUMNS: &str = "at.id, at.email_id, at.filename, at.content_type, \
     at.size_bytes, at.storage_key, at.checksum, at.created_at";

#[async_trait]
impl AttachmentRepo for PgRepo {
    async fn insert(&self, attachment: &Attachment) -> Result<()> {
        sqlx::query(
            "INSERT INTO attachments (id, email_id, filename, content_type, size_bytes, \
             storage_key, checksum) VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(attachment.id)
        .bind(attachment.email_id)
        .bind(&attachment.filename)
        .bind(&attachment.content_type)
        .bind(attachment.size_bytes)
        .bind(&attachment.storage_key)
        .bind(&attachment.checksum)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_with_owner(&self, attachment_id: Uuid) -> Result<Option<(Attachment, Uuid)>> {
        let sql = format!(
            "SELECT {ATTACHMENT_COLUMNS}, a.user_id AS owner_id \
             FROM attachments at \
             JOIN emails e ON e.id = at.email_id \
             JOIN aliases a ON a.id = e.alias_id \
             WHERE at.id = $1"
        );
        let row = sqlx::query(&sql)
            .bind(attachment_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            None => Ok(None),
            Some(row) => {
                let owner: Uuid = row.try_get("owner_id")?;
                let att = AttachmentRow::from_row(&row)?;
                Ok(Some((att.into(), owner)))
            }
        }
    }

    async fn list_by_email(&self, email_id: Uuid) -> Result<Vec<Attachment>> {
        let sql = format!(
            "SELECT {ATTACHMENT_COLUMNS} FROM attachments at WHERE at.email_id = $1 \
             ORDER BY at.created_at"
        );
        let rows = sqlx::query_as::<_, AttachmentRow>(&sql)
            .bind(email_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Attachment::from).collect())
    }
}

#[async_trait]
impl RevocationLogRepo for PgRepo {
    async fn append(&self, event: &RevocationEvent) -> Result<()> {
        sqlx::query(
            "INSERT INTO revocation_events (timestamp, domain_id, domain_name, serial_number, \
             reason, initiator, success, error) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(event.timestamp)
        .bind(event.domain_id)
        .bind(&event.domain_name)
        .bind(&event.serial_number)
        .bind(event.reason.as_str())
        .bind(event.initiator.as_str())
        .bind(event.success)
        .bind(&event.error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_for_domain(&self, domain_id: Uuid) -> Result<Vec<RevocationEvent>> {
        let rows = sqlx::query(
            "SELECT timestamp, domain_id, domain_name, serial_number, reason, initiator, \
             success, error FROM revocation_events WHERE domain_id = $1 ORDER BY timestamp",
        )
        .bind(domain_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| {
                let reason: String = row.try_get("reason")?;
                let initiator: String = row.try_get("initiator")?;
                Ok(RevocationEvent {
                    timestamp: row.try_get("timestamp")?,
                    domain_id: row.try_get("domain_id")?,
                    domain_name: row.try_get("domain_name")?,
                    serial_number: row.try_get("serial_number")?,
                    reason: reason.parse().map_err(|e: String| Error::database(e))?,
                    initiator: initiator.parse().map_err(|e: String| Error::database(e))?,
                    success: row.try_get("success")?,
                    error: row.try_get("error")?,
                })
            })
            .collect()
    }
}
