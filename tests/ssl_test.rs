/// Certificate lifecycle tests through the HTTP surface and the manager:
/// rate-limit denial, zero-gap renewal, revocation auditing, and the
/// status endpoints.
mod common;

use axum::http::StatusCode;
use common::{test_app, token_for};
use mailcrypt::repo::RevocationLogRepo;
use mailcrypt::types::{RevocationInitiator, RevocationReason};
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn test_provision_endpoint_accepts_async() {
    let app = test_app().await;
    let domain = app.seed_domain("example.com");

    let (status, body) = app
        .request(
            "POST",
            &format!("/api/v1/domains/{}/ssl/provision", domain.id),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["data"]["status"], json!("provisioning"));

    // The background task lands the certificate shortly after
    let mut active = false;
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        let (status, body) = app
            .request("GET", &format!("/api/v1/domains/{}/ssl", domain.id), None)
            .await;
        if status == StatusCode::OK && body["data"]["status"] == json!("active") {
            active = true;
            break;
        }
    }
    assert!(active, "certificate never became active");
}

#[tokio::test]
async fn test_provision_denied_at_rate_limit() {
    let app = test_app().await;
    let domain = app.seed_domain("acme.test");

    // 50 prior successes inside the 7-day window
    for _ in 0..50 {
        app.manager.rate_limiter().record_request("acme.test", true);
    }

    let (status, body) = app
        .request(
            "POST",
            &format!("/api/v1/domains/{}/ssl/provision", domain.id),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["code"], json!("RATE_LIMITED"));

    // The scheduler path is denied the same way
    assert!(matches!(
        app.manager.provision(domain.id, "acme.test").await,
        Err(mailcrypt::Error::RateLimited(_))
    ));
}

#[tokio::test]
async fn test_unverified_domain_cannot_provision() {
    let app = test_app().await;
    let mut domain = app.seed_domain("pending.example");
    domain.is_verified = false;
    app.repo.put_domain(domain.clone());

    let (status, body) = app
        .request(
            "POST",
            &format!("/api/v1/domains/{}/ssl/provision", domain.id),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], json!("DOMAIN_NOT_VERIFIED"));
}

#[tokio::test]
async fn test_foreign_domain_ssl_denied() {
    let app = test_app().await;
    let domain = app.seed_domain("example.com");

    let other = token_for(Uuid::new_v4());
    let (status, _) = app
        .request_with_token(
            "GET",
            &format!("/api/v1/domains/{}/ssl", domain.id),
            Some(other.as_str()),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .request("GET", &format!("/api/v1/domains/{}/ssl", Uuid::new_v4()), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_renewal_advances_expiry_and_cache() {
    let app = test_app().await;
    let domain = app.seed_domain("example.com");

    let first = app
        .manager
        .provision(domain.id, "example.com")
        .await
        .unwrap();
    let before = app.manager.get_certificate("example.com").await.unwrap();

    let renewed = app.manager.renew(domain.id).await.unwrap();
    assert!(renewed.expires_at.unwrap() >= first.expires_at.unwrap());

    // The very next lookup serves the renewed certificate
    let after = app.manager.get_certificate("example.com").await.unwrap();
    assert!(after.not_after >= before.not_after);
    assert_ne!(after.serial_number, before.serial_number);
}

#[tokio::test]
async fn test_revocation_writes_exactly_one_audit_event() {
    let app = test_app().await;
    let domain = app.seed_domain("example.com");
    app.manager
        .provision(domain.id, "example.com")
        .await
        .unwrap();

    app.manager
        .revoke(
            domain.id,
            RevocationReason::CessationOfOperation,
            RevocationInitiator::User,
        )
        .await
        .unwrap();
    // Idempotent second revoke
    app.manager
        .revoke(
            domain.id,
            RevocationReason::CessationOfOperation,
            RevocationInitiator::User,
        )
        .await
        .unwrap();

    let events = app.repo.list_for_domain(domain.id).await.unwrap();
    assert_eq!(events.len(), 1);
    assert!(events[0].success);
    assert_eq!(events[0].domain_name, "example.com");
    assert_eq!(events[0].initiator, RevocationInitiator::User);

    // A revoked certificate is no longer serveable
    assert!(app.manager.get_certificate("example.com").await.is_err());
}

#[tokio::test]
async fn test_ssl_health_summary() {
    let app = test_app().await;
    let domain = app.seed_domain("example.com");
    app.manager
        .provision(domain.id, "example.com")
        .await
        .unwrap();

    let (status, body) = app.request("GET", "/api/v1/ssl/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["active_certificates"], json!(1));
    assert_eq!(body["data"]["cache_entries"], json!(2));
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_ssl_series() {
    let app = test_app().await;
    let domain = app.seed_domain("example.com");
    app.manager
        .provision(domain.id, "example.com")
        .await
        .unwrap();

    let response = app.raw_get("/metrics").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8_lossy(&body);
    assert!(text.contains("mailcrypt_ssl_provisioning_total"));
    assert!(text.contains("mailcrypt_ssl_certificate_expiry_days"));
}
