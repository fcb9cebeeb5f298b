/// Email routes: list/stats/detail plus single and bulk mutations.
/// Every operation goes through the authorization envelope.
use super::api::{AppState, envelope};
use super::auth::AuthUser;
use crate::authz::{self, EmailQuery, Page, Pagination, ensure_owner_joined};
use crate::error::Result;
use crate::events::ServiceEvent;
use crate::types::Email;
use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize)]
struct EmailSummary {
    id: Uuid,
    alias_id: Uuid,
    sender_address: String,
    sender_name: Option<String>,
    subject: Option<String>,
    size_bytes: i64,
    is_read: bool,
    received_at: chrono::DateTime<chrono::Utc>,
}

impl From<&Email> for EmailSummary {
    fn from(e: &Email) -> Self {
        Self {
            id: e.id,
            alias_id: e.alias_id,
            sender_address: e.sender_address.clone(),
            sender_name: e.sender_name.clone(),
            subject: e.subject.clone(),
            size_bytes: e.size_bytes,
            is_read: e.is_read,
            received_at: e.received_at,
        }
    }
}

/// GET /emails
pub async fn list_emails(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<EmailQuery>,
) -> Result<impl IntoResponse> {
    let query = query.normalized();
    let (items, total_count) = state.emails.list(user.0, &query).await?;

    let page = Page {
        items: items.iter().map(EmailSummary::from).collect::<Vec<_>>(),
        pagination: Pagination::new(total_count, query.page, query.limit),
    };
    Ok(envelope(page))
}

/// GET /emails/stats
pub async fn email_stats(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse> {
    let stats = state.emails.stats(user.0).await?;
    Ok(envelope(stats))
}

#[derive(Debug, Deserialize)]
pub struct GetEmailQuery {
    mark_as_read: Option<bool>,
}

#[derive(Debug, Serialize)]
struct AttachmentSummary {
    id: Uuid,
    filename: String,
    content_type: String,
    size_bytes: i64,
    checksum: String,
}

#[derive(Debug, Serialize)]
struct EmailDetail {
    #[serde(flatten)]
    email: Email,
    /// Canonical alias address the message was delivered to
    alias_address: String,
    attachments: Vec<AttachmentSummary>,
}

/// GET /emails/{id}
pub async fn get_email(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Query(query): Query<GetEmailQuery>,
) -> Result<impl IntoResponse> {
    let mut email =
        ensure_owner_joined(user.0, state.emails.get_with_owner(id).await?, "email")?;

    if query.mark_as_read.unwrap_or(true) && !email.is_read {
        state.emails.set_read(id, true).await?;
        email.is_read = true;
    }

    let alias_address = state
        .emails
        .alias_address(id)
        .await?
        .unwrap_or_default();

    let attachments = state
        .attachments
        .list_by_email(id)
        .await?
        .into_iter()
        .map(|a| AttachmentSummary {
            id: a.id,
            filename: a.filename,
            content_type: a.content_type,
            size_bytes: a.size_bytes,
            checksum: a.checksum,
        })
        .collect();

    Ok(envelope(EmailDetail {
        email,
        alias_address,
        attachments,
    }))
}

/// DELETE /emails/{id}
pub async fn delete_email(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    ensure_owner_joined(user.0, state.emails.get_with_owner(id).await?, "email")?;

    state.pipeline.delete_email_cascade(id).await?;
    state.events.publish(ServiceEvent::EmailDeleted {
        email_id: id,
        user_id: user.0,
    });
    Ok(envelope(serde_json::json!({ "deleted": true })))
}

#[derive(Debug, Deserialize)]
pub struct BulkRequest {
    email_ids: Vec<String>,
}

/// POST /emails/bulk/delete
pub async fn bulk_delete(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<BulkRequest>,
) -> Result<impl IntoResponse> {
    let parsed = authz::parse_bulk_ids(&body.email_ids, state.config.attachments.bulk_limit)?;
    let owned = state.emails.owned_subset(user.0, &parsed.parsed).await?;
    let (mine, foreign) = authz::partition_owned(&parsed, &owned);

    // Storage cleanup precedes the row batch; failures there are logged,
    // never blocking the database mutation
    for id in &mine {
        let refs = state.emails.storage_refs_for_email(*id).await?;
        state.pipeline.delete_by_keys(&refs).await;
    }

    let mutated = state.emails.delete_many(&mine).await? as usize;
    for id in &mine {
        state.events.publish(ServiceEvent::EmailDeleted {
            email_id: *id,
            user_id: user.0,
        });
    }

    Ok(envelope(authz::bulk_outcome(&parsed, &foreign, mutated)))
}

/// POST /emails/bulk/mark-read
pub async fn bulk_mark_read(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<BulkRequest>,
) -> Result<impl IntoResponse> {
    let parsed = authz::parse_bulk_ids(&body.email_ids, state.config.attachments.bulk_limit)?;
    let owned = state.emails.owned_subset(user.0, &parsed.parsed).await?;
    let (mine, foreign) = authz::partition_owned(&parsed, &owned);

    let mutated = state.emails.mark_read_many(&mine).await? as usize;
    Ok(envelope(authz::bulk_outcome(&parsed, &foreign, mutated)))
}
