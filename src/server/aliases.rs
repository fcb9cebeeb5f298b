/// Alias routes: create on verified owned domains, list, update, delete
/// with cascading cleanup.
use super::api::{AppState, envelope};
use super::auth::AuthUser;
use crate::authz::{ensure_owner, full_address, validate_local_part};
use crate::error::{Error, Result};
use crate::events::ServiceEvent;
use crate::types::Alias;
use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreateAliasRequest {
    domain_id: Uuid,
    local_part: String,
    description: Option<String>,
}

/// POST /aliases
pub async fn create_alias(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<CreateAliasRequest>,
) -> Result<impl IntoResponse> {
    let domain = ensure_owner(user.0, state.domains.get(body.domain_id).await?, "domain")?;
    if !domain.is_verified {
        return Err(Error::DomainNotVerified(domain.name));
    }

    let count = state.aliases.count_by_user(user.0).await?;
    let ceiling = state.config.attachments.max_aliases_per_user;
    if count >= ceiling {
        return Err(Error::AliasLimitReached(ceiling));
    }

    // Validation applies to the canonical lower-cased local part
    let local_part = body.local_part.to_lowercase();
    validate_local_part(&local_part)?;

    let alias = Alias {
        id: Uuid::new_v4(),
        user_id: user.0,
        domain_id: domain.id,
        full_address: full_address(&local_part, &domain.name),
        local_part,
        description: body.description,
        is_active: true,
        created_at: Utc::now(),
    };

    let created = state.aliases.create(&alias).await?;
    state.events.publish(ServiceEvent::AliasCreated {
        alias_id: created.id,
        user_id: user.0,
        full_address: created.full_address.clone(),
    });

    Ok(envelope(created))
}

/// GET /aliases
pub async fn list_aliases(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse> {
    let aliases = state.aliases.list_by_user(user.0).await?;
    Ok(envelope(aliases))
}

/// GET /aliases/{id}
pub async fn get_alias(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let alias = ensure_owner(user.0, state.aliases.get(id).await?, "alias")?;
    Ok(envelope(alias))
}

#[derive(Debug, Deserialize)]
pub struct UpdateAliasRequest {
    description: Option<String>,
    is_active: Option<bool>,
}

/// PUT /aliases/{id}
pub async fn update_alias(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateAliasRequest>,
) -> Result<impl IntoResponse> {
    ensure_owner(user.0, state.aliases.get(id).await?, "alias")?;
    let updated = state
        .aliases
        .update(id, body.description, body.is_active)
        .await?;
    Ok(envelope(updated))
}

/// DELETE /aliases/{id}
pub async fn delete_alias(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let alias = ensure_owner(user.0, state.aliases.get(id).await?, "alias")?;

    let cascaded_emails = state.emails.count_by_alias(id).await?;

    // Storage cleanup is best-effort and never blocks the row deletion
    if let Err(e) = state.pipeline.delete_alias_storage(id).await {
        tracing::warn!(alias_id = %id, error = %e, "Alias storage cleanup failed");
    }
    state.aliases.delete(id).await?;

    state.events.publish(ServiceEvent::AliasDeleted {
        alias_id: id,
        user_id: user.0,
        cascaded_emails,
    });

    tracing::info!(
        alias = %alias.full_address,
        cascaded_emails,
        "Alias deleted"
    );
    Ok(envelope(serde_json::json!({
        "deleted": true,
        "cascaded_emails": cascaded_emails,
    })))
}
