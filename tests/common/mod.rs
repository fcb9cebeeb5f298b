/// Shared fixture: a full router over in-memory repositories, a tempdir
/// object store, and the in-process certificate issuer.
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use mailcrypt::config::Config;
use mailcrypt::events::EventBus;
use mailcrypt::metrics::MetricsRegistry;
use mailcrypt::objstore::pipeline::AttachmentPipeline;
use mailcrypt::objstore::{FsObjectStore, ObjectStore, Presigner};
use mailcrypt::repo::{AliasRepo, EmailRepo, MemoryRepo};
use mailcrypt::scheduler::RenewalScheduler;
use mailcrypt::server::{AppState, HealthState, build_router};
use mailcrypt::ssl::{
    AcmeRateLimiter, CertificateCache, CertificateManager, EncryptedCertStore, LocalCaIssuer,
};
use mailcrypt::types::{Alias, Domain, Email};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tower::util::ServiceExt;
use uuid::Uuid;

pub const JWT_SECRET: &str = "integration-secret";

pub struct TestApp {
    pub router: Router,
    pub repo: Arc<MemoryRepo>,
    pub pipeline: Arc<AttachmentPipeline>,
    pub manager: Arc<CertificateManager>,
    pub user_id: Uuid,
    pub token: String,
    _dir: tempfile::TempDir,
}

pub fn token_for(user_id: Uuid) -> String {
    let claims = serde_json::json!({
        "sub": user_id.to_string(),
        "exp": (Utc::now().timestamp() + 3600) as usize,
    });
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("token encoding")
}

pub async fn test_app() -> TestApp {
    let dir = tempfile::tempdir().expect("tempdir");
    let repo = Arc::new(MemoryRepo::new());
    let metrics = Arc::new(MetricsRegistry::new());
    let events = EventBus::new();

    let presigner = Presigner::new(
        b"integration-presign-secret".to_vec(),
        "http://localhost/objects",
    );
    let objects: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::new(
        dir.path().join("objects"),
        presigner.clone(),
    ));
    let pipeline = Arc::new(AttachmentPipeline::new(
        objects.clone(),
        repo.clone(),
        repo.clone(),
        10 * 1024 * 1024,
        Duration::from_secs(900),
    ));

    let manager = Arc::new(CertificateManager::new(
        repo.clone(),
        repo.clone(),
        Arc::new(EncryptedCertStore::new(
            dir.path().join("ssl"),
            *b"0123456789abcdef0123456789abcdef",
        )),
        Arc::new(LocalCaIssuer::default()),
        Arc::new(CertificateCache::new(metrics.clone())),
        Arc::new(AcmeRateLimiter::new(Default::default())),
        metrics.clone(),
        10,
        Duration::from_secs(300),
    ));

    let scheduler = Arc::new(RenewalScheduler::new(
        manager.clone(),
        repo.clone(),
        events.clone(),
        metrics.clone(),
        Default::default(),
    ));

    let mut config = Config::default();
    config.server.jwt_secret = JWT_SECRET.to_string();

    let health = Arc::new(HealthState::new(Vec::new(), Duration::from_secs(5)));
    health.set_ready(true);

    let user_id = Uuid::new_v4();
    let state = AppState {
        config: Arc::new(config),
        domains: repo.clone(),
        aliases: repo.clone(),
        emails: repo.clone(),
        attachments: repo.clone(),
        pipeline: pipeline.clone(),
        objects,
        presigner,
        ssl: manager.clone(),
        scheduler,
        events,
        metrics,
        health,
        jwt_secret: Arc::new(JWT_SECRET.to_string()),
        shutdown: watch::channel(false).1,
    };

    TestApp {
        router: build_router(state),
        repo,
        pipeline,
        manager,
        token: token_for(user_id),
        user_id,
        _dir: dir,
    }
}

impl TestApp {
    /// Seed a verified domain owned by the fixture user
    pub fn seed_domain(&self, name: &str) -> Domain {
        let domain = Domain {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            name: name.to_lowercase(),
            is_verified: true,
            created_at: Utc::now(),
        };
        self.repo.put_domain(domain.clone());
        domain
    }

    /// Seed an alias for an arbitrary user
    pub async fn seed_alias(&self, user_id: Uuid, address: &str) -> Alias {
        let alias = Alias {
            id: Uuid::new_v4(),
            user_id,
            domain_id: Uuid::new_v4(),
            local_part: address.split('@').next().unwrap_or("x").to_string(),
            full_address: address.to_string(),
            description: None,
            is_active: true,
            created_at: Utc::now(),
        };
        self.repo.create(&alias).await.expect("seed alias");
        alias
    }

    /// Seed one received email under an alias
    pub async fn seed_email(&self, alias_id: Uuid, subject: &str, size: i64) -> Email {
        let email = Email {
            id: Uuid::new_v4(),
            alias_id,
            sender_address: "sender@example.org".into(),
            sender_name: Some("Sender".into()),
            subject: Some(subject.to_string()),
            body_html: None,
            body_text: Some("body".into()),
            headers: HashMap::new(),
            size_bytes: size,
            is_read: false,
            received_at: Utc::now(),
        };
        EmailRepo::insert(self.repo.as_ref(), &email)
            .await
            .expect("seed email");
        email
    }

    /// Issue an authenticated request and decode the JSON response
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        self.request_with_token(method, uri, Some(&self.token), body)
            .await
    }

    pub async fn request_with_token(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .expect("request"),
            None => builder.body(Body::empty()).expect("request"),
        };

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router response");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };
        (status, json)
    }

    /// Raw response variant for header assertions
    pub async fn raw_get(&self, uri: &str) -> axum::http::Response<Body> {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .body(Body::empty())
            .expect("request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router response")
    }
}
