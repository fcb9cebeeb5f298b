/// Health, readiness and liveness endpoints with per-dependency latency
use super::api::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// A dependency the health endpoint probes
#[async_trait::async_trait]
pub trait HealthProbe: Send + Sync {
    fn name(&self) -> &str;
    async fn check(&self) -> Result<(), String>;
}

/// Mutable health state: readiness flips off first during shutdown
pub struct HealthState {
    ready: AtomicBool,
    started: Instant,
    probes: Vec<Arc<dyn HealthProbe>>,
    timeout: Duration,
}

impl HealthState {
    pub fn new(probes: Vec<Arc<dyn HealthProbe>>, timeout: Duration) -> Self {
        Self {
            ready: AtomicBool::new(false),
            started: Instant::now(),
            probes,
            timeout,
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

#[derive(Debug, Serialize)]
struct ComponentHealth {
    status: &'static str,
    latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_secs: u64,
    components: std::collections::HashMap<String, ComponentHealth>,
}

/// Full dependency check with per-component latency
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let health = &state.health;
    let mut components = std::collections::HashMap::new();
    let mut degraded = false;

    for probe in &health.probes {
        let started = Instant::now();
        let outcome = tokio::time::timeout(health.timeout, probe.check()).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let component = match outcome {
            Ok(Ok(())) => ComponentHealth {
                status: "healthy",
                latency_ms,
                error: None,
            },
            Ok(Err(e)) => {
                degraded = true;
                ComponentHealth {
                    status: "unhealthy",
                    latency_ms,
                    error: Some(e),
                }
            }
            Err(_) => {
                degraded = true;
                ComponentHealth {
                    status: "unhealthy",
                    latency_ms,
                    error: Some("probe timed out".into()),
                }
            }
        };
        components.insert(probe.name().to_string(), component);
    }

    let (status, code) = if degraded {
        ("unhealthy", StatusCode::SERVICE_UNAVAILABLE)
    } else {
        ("healthy", StatusCode::OK)
    };

    (
        code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            uptime_secs: health.uptime_secs(),
            components,
        }),
    )
}

/// Readiness: flips to 503 the moment shutdown begins
pub async fn readiness_handler(State(state): State<AppState>) -> impl IntoResponse {
    if state.health.is_ready() && !*state.shutdown.borrow() {
        (StatusCode::OK, Json(serde_json::json!({"ready": true})))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"ready": false})),
        )
    }
}

/// Liveness: the process is up
pub async fn liveness_handler() -> impl IntoResponse {
    Json(serde_json::json!({"alive": true}))
}

/// Probe over the object store: a HEAD on a sentinel key; only transport
/// failures count against health
pub struct ObjectStoreProbe {
    pub store: Arc<dyn crate::objstore::ObjectStore>,
}

#[async_trait::async_trait]
impl HealthProbe for ObjectStoreProbe {
    fn name(&self) -> &str {
        "object_store"
    }

    async fn check(&self) -> Result<(), String> {
        self.store
            .head("00/00/healthcheck")
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

/// Probe over the database pool
pub struct DatabaseProbe {
    pub pool: sqlx::PgPool,
}

#[async_trait::async_trait]
impl HealthProbe for DatabaseProbe {
    fn name(&self) -> &str {
        "database"
    }

    async fn check(&self) -> Result<(), String> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}
