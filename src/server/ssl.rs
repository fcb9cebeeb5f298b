/// SSL certificate routes: per-domain status, asynchronous provisioning
/// and renewal triggers, and the fleet-wide health summary.
use super::api::{AppState, envelope, envelope_with_status};
use super::auth::AuthUser;
use crate::authz::ensure_owner;
use crate::error::{Error, Result};
use crate::types::{Certificate, CertificateStatus};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Serialize)]
struct SslStatus {
    domain_id: Uuid,
    domain_name: String,
    status: CertificateStatus,
    issuer: Option<String>,
    serial_number: Option<String>,
    issued_at: Option<chrono::DateTime<Utc>>,
    expires_at: Option<chrono::DateTime<Utc>>,
    days_until_expiry: Option<i64>,
    renewal_failures: i32,
    last_renewal_attempt: Option<chrono::DateTime<Utc>>,
}

impl From<Certificate> for SslStatus {
    fn from(cert: Certificate) -> Self {
        let days_until_expiry = cert.days_until_expiry(Utc::now());
        Self {
            domain_id: cert.domain_id,
            domain_name: cert.domain_name,
            status: cert.status,
            issuer: cert.issuer,
            serial_number: cert.serial_number,
            issued_at: cert.issued_at,
            expires_at: cert.expires_at,
            days_until_expiry,
            renewal_failures: cert.renewal_failures,
            last_renewal_attempt: cert.last_renewal_attempt,
        }
    }
}

/// GET /domains/{id}/ssl
pub async fn get_domain_ssl(
    State(state): State<AppState>,
    user: AuthUser,
    Path(domain_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let domain = ensure_owner(user.0, state.domains.get(domain_id).await?, "domain")?;
    let cert = state
        .ssl
        .certificate_record(domain_id)
        .await?
        .ok_or_else(|| Error::not_found(format!("certificate for domain {}", domain.name)))?;
    Ok(envelope(SslStatus::from(cert)))
}

/// POST /domains/{id}/ssl/provision — 202 Accepted, runs in the background
pub async fn provision_ssl(
    State(state): State<AppState>,
    user: AuthUser,
    Path(domain_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let domain = ensure_owner(user.0, state.domains.get(domain_id).await?, "domain")?;
    if !domain.is_verified {
        return Err(Error::DomainNotVerified(domain.name));
    }

    // Admission is checked up front so the caller sees 429 immediately;
    // the background run re-checks before talking to the CA
    state.ssl.rate_limiter().allow_request(&domain.name)?;

    let manager = state.ssl.clone();
    let domain_name = domain.name.clone();
    tokio::spawn(async move {
        if let Err(e) = manager.provision(domain_id, &domain_name).await {
            tracing::error!(domain = %domain_name, error = %e, "Background provisioning failed");
        }
    });

    Ok(envelope_with_status(
        StatusCode::ACCEPTED,
        serde_json::json!({
            "domain_id": domain_id,
            "domain_name": domain.name,
            "status": "provisioning",
        }),
    ))
}

/// POST /domains/{id}/ssl/renew — 202 Accepted, runs in the background
pub async fn renew_ssl(
    State(state): State<AppState>,
    user: AuthUser,
    Path(domain_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let domain = ensure_owner(user.0, state.domains.get(domain_id).await?, "domain")?;
    state.ssl.rate_limiter().allow_request(&domain.name)?;

    let manager = state.ssl.clone();
    let domain_name = domain.name.clone();
    tokio::spawn(async move {
        if let Err(e) = manager.renew(domain_id).await {
            tracing::error!(domain = %domain_name, error = %e, "Background renewal failed");
        }
    });

    Ok(envelope_with_status(
        StatusCode::ACCEPTED,
        serde_json::json!({
            "domain_id": domain_id,
            "domain_name": domain.name,
            "status": "renewing",
        }),
    ))
}

/// GET /ssl/health — fleet-wide certificate summary
pub async fn ssl_health(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let active = state.ssl.active_certificates().await?;
    let now = Utc::now();

    let mut expiring_within_30 = 0usize;
    let mut expired = 0usize;
    for cert in &active {
        match cert.days_until_expiry(now) {
            Some(days) if days < 0 => expired += 1,
            Some(days) if days <= 30 => expiring_within_30 += 1,
            _ => {}
        }
    }

    Ok(envelope(serde_json::json!({
        "active_certificates": active.len(),
        "cache_entries": state.ssl.cache().len(),
        "expiring_within_30_days": expiring_within_30,
        "expired": expired,
    })))
}
