/// REST API server: state, response envelope, router assembly
use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

use super::health::{HealthState, health_handler, liveness_handler, readiness_handler};
use super::{aliases, attachments, auth, emails, ssl};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::events::EventBus;
use crate::metrics::SharedMetrics;
use crate::objstore::{ObjectStore, Presigner};
use crate::objstore::pipeline::AttachmentPipeline;
use crate::repo::{AliasRepo, AttachmentRepo, DomainRepo, EmailRepo};
use crate::scheduler::RenewalScheduler;
use crate::ssl::CertificateManager;

/// Server state shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub domains: Arc<dyn DomainRepo>,
    pub aliases: Arc<dyn AliasRepo>,
    pub emails: Arc<dyn EmailRepo>,
    pub attachments: Arc<dyn AttachmentRepo>,
    pub pipeline: Arc<AttachmentPipeline>,
    pub objects: Arc<dyn ObjectStore>,
    pub presigner: Presigner,
    pub ssl: Arc<CertificateManager>,
    pub scheduler: Arc<RenewalScheduler>,
    pub events: EventBus,
    pub metrics: SharedMetrics,
    pub health: Arc<HealthState>,
    pub jwt_secret: Arc<String>,
    /// Scheduler shutdown signal, mirrored by /readiness
    pub shutdown: watch::Receiver<bool>,
}

/// Uniform response envelope: `{success, data?, error?, timestamp}`
pub fn envelope<T: Serialize>(data: T) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "success": true,
        "data": data,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Envelope with an explicit status code (202 Accepted paths)
pub fn envelope_with_status<T: Serialize>(
    status: StatusCode,
    data: T,
) -> (StatusCode, Json<serde_json::Value>) {
    (status, envelope(data))
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let details = match &self {
            Error::Validation { field, kind } => Some(serde_json::json!({
                "field": field,
                "kind": kind,
            })),
            Error::BulkLimitExceeded { got, max } => Some(serde_json::json!({
                "got": got,
                "max": max,
            })),
            _ => None,
        };

        // Infrastructure details stay out of client responses
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = Json(serde_json::json!({
            "success": false,
            "error": {
                "code": self.code(),
                "message": message,
                "details": details,
            },
            "timestamp": Utc::now().to_rfc3339(),
        }));
        (status, body).into_response()
    }
}

async fn metrics_handler(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> impl IntoResponse {
    state.metrics.gather_text()
}

/// Assemble the full router
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Email routes
        .route("/emails", get(emails::list_emails))
        .route("/emails/stats", get(emails::email_stats))
        .route(
            "/emails/{id}",
            get(emails::get_email).delete(emails::delete_email),
        )
        .route("/emails/bulk/delete", post(emails::bulk_delete))
        .route("/emails/bulk/mark-read", post(emails::bulk_mark_read))
        // Attachment routes
        .route(
            "/emails/{id}/attachments/{aid}",
            get(attachments::download_attachment),
        )
        .route(
            "/emails/{id}/attachments/{aid}/url",
            get(attachments::attachment_url),
        )
        // Alias routes
        .route(
            "/aliases",
            get(aliases::list_aliases).post(aliases::create_alias),
        )
        .route(
            "/aliases/{id}",
            get(aliases::get_alias)
                .put(aliases::update_alias)
                .delete(aliases::delete_alias),
        )
        // SSL routes
        .route("/domains/{id}/ssl", get(ssl::get_domain_ssl))
        .route("/domains/{id}/ssl/provision", post(ssl::provision_ssl))
        .route("/domains/{id}/ssl/renew", post(ssl::renew_ssl))
        .route("/ssl/health", get(ssl::ssl_health))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::bearer_auth,
        ));

    Router::new()
        .route("/health", get(health_handler))
        .route("/readiness", get(readiness_handler))
        .route("/liveness", get(liveness_handler))
        .route("/metrics", get(metrics_handler))
        .route("/objects/{*key}", get(attachments::object_gateway))
        .nest("/api/v1", api_routes)
        .with_state(state)
}

/// Bind and serve until the shutdown signal fires
pub async fn start_server(
    addr: SocketAddr,
    state: AppState,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let app = build_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::transport(format!("Failed to bind API server: {}", e)))?;

    tracing::info!("API server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await
        .map_err(|e| Error::transport(format!("Server error: {}", e)))?;

    Ok(())
}
