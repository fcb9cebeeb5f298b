/// End-to-end API tests over the full router: authentication, the
/// ownership envelope, pagination bounds, bulk partitioning, and the
/// attachment dispatch policy.
mod common;

use axum::http::StatusCode;
use common::{test_app, token_for};
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn test_requests_without_token_are_unauthorized() {
    let app = test_app().await;
    let (status, body) = app
        .request_with_token("GET", "/api/v1/emails", None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], json!(false));

    let (status, _) = app
        .request_with_token("GET", "/api/v1/emails", Some("garbage"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_health_endpoints_are_open() {
    let app = test_app().await;
    let (status, _) = app.request_with_token("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = app.request_with_token("GET", "/readiness", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], json!(true));
    let (status, _) = app.request_with_token("GET", "/liveness", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_alias_create_normalizes_and_rejects_duplicates() {
    let app = test_app().await;
    let domain = app.seed_domain("Example.com");

    // Scenario: mixed-case input stores the canonical lower-cased address
    let (status, body) = app
        .request(
            "POST",
            "/api/v1/aliases",
            Some(json!({"domain_id": domain.id, "local_part": "Alice"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["full_address"], json!("alice@example.com"));

    // Duplicate create by another user on the same address conflicts
    let other = token_for(Uuid::new_v4());
    let (status, body) = app
        .request_with_token(
            "POST",
            "/api/v1/aliases",
            Some(other.as_str()),
            Some(json!({"domain_id": domain.id, "local_part": "alice"})),
        )
        .await;
    // The other user does not own the domain, so ownership fires first
    assert_eq!(status, StatusCode::FORBIDDEN, "{}", body);

    let (status, body) = app
        .request(
            "POST",
            "/api/v1/aliases",
            Some(json!({"domain_id": domain.id, "local_part": "ALICE"})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "{}", body);
    assert_eq!(body["error"]["code"], json!("ALIAS_EXISTS"));
}

#[tokio::test]
async fn test_alias_create_validation_kinds() {
    let app = test_app().await;
    let domain = app.seed_domain("example.com");

    for (input, kind) in [
        (".alice", "leading_dot"),
        ("alice.", "trailing_dot"),
        ("ali..ce", "consecutive_dots"),
        ("al ice", "invalid_characters"),
    ] {
        let (status, body) = app
            .request(
                "POST",
                "/api/v1/aliases",
                Some(json!({"domain_id": domain.id, "local_part": input})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "input {:?}", input);
        assert_eq!(body["error"]["details"]["kind"], json!(kind));
    }
}

#[tokio::test]
async fn test_alias_create_on_unverified_domain_rejected() {
    let app = test_app().await;
    let mut domain = app.seed_domain("pending.example");
    domain.is_verified = false;
    app.repo.put_domain(domain.clone());

    let (status, body) = app
        .request(
            "POST",
            "/api/v1/aliases",
            Some(json!({"domain_id": domain.id, "local_part": "box"})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], json!("DOMAIN_NOT_VERIFIED"));
}

#[tokio::test]
async fn test_email_list_pagination_clamp() {
    let app = test_app().await;
    let alias = app.seed_alias(app.user_id, "inbox@example.com").await;
    for i in 0..150 {
        app.seed_email(alias.id, &format!("message {}", i), 100).await;
    }

    // Scenario: page=3, limit=200 clamps to per_page=100, total_pages=2
    let (status, body) = app
        .request("GET", "/api/v1/emails?page=3&limit=200", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let pagination = &body["data"]["pagination"];
    assert_eq!(pagination["per_page"], json!(100));
    assert_eq!(pagination["total_pages"], json!(2));
    assert_eq!(pagination["total_count"], json!(150));
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 0);

    // Defaults apply when parameters are absent
    let (_, body) = app.request("GET", "/api/v1/emails", None).await;
    assert_eq!(body["data"]["pagination"]["per_page"], json!(20));
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 20);
}

#[tokio::test]
async fn test_email_list_is_scoped_to_owner() {
    let app = test_app().await;
    let mine = app.seed_alias(app.user_id, "mine@example.com").await;
    let theirs = app.seed_alias(Uuid::new_v4(), "theirs@example.com").await;
    app.seed_email(mine.id, "visible", 10).await;
    app.seed_email(theirs.id, "hidden", 10).await;

    let (_, body) = app.request("GET", "/api/v1/emails", None).await;
    let items = body["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["subject"], json!("visible"));
}

#[tokio::test]
async fn test_email_detail_marks_read_and_reports_alias() {
    let app = test_app().await;
    let alias = app.seed_alias(app.user_id, "inbox@example.com").await;
    let email = app.seed_email(alias.id, "hello", 42).await;

    let (status, body) = app
        .request("GET", &format!("/api/v1/emails/{}", email.id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["alias_address"], json!("inbox@example.com"));
    assert_eq!(body["data"]["is_read"], json!(true));

    // mark_as_read=false leaves the flag untouched
    let email2 = app.seed_email(alias.id, "second", 10).await;
    let (_, body) = app
        .request(
            "GET",
            &format!("/api/v1/emails/{}?mark_as_read=false", email2.id),
            None,
        )
        .await;
    assert_eq!(body["data"]["is_read"], json!(false));
}

#[tokio::test]
async fn test_ownership_envelope_not_found_vs_denied() {
    let app = test_app().await;
    let theirs = app.seed_alias(Uuid::new_v4(), "theirs@example.com").await;
    let foreign_email = app.seed_email(theirs.id, "private", 10).await;

    // Missing entity: 404
    let (status, body) = app
        .request("GET", &format!("/api/v1/emails/{}", Uuid::new_v4()), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], json!("NOT_FOUND"));

    // Someone else's entity: 403
    let (status, body) = app
        .request("GET", &format!("/api/v1/emails/{}", foreign_email.id), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], json!("ACCESS_DENIED"));
}

#[tokio::test]
async fn test_bulk_delete_partitions_owned_foreign_malformed() {
    let app = test_app().await;
    let mine = app.seed_alias(app.user_id, "mine@example.com").await;
    let theirs = app.seed_alias(Uuid::new_v4(), "theirs@example.com").await;

    let mut owned_ids = Vec::new();
    for i in 0..3 {
        owned_ids.push(app.seed_email(mine.id, &format!("m{}", i), 10).await.id);
    }
    let mut foreign_ids = Vec::new();
    for i in 0..2 {
        foreign_ids.push(app.seed_email(theirs.id, &format!("t{}", i), 10).await.id);
    }

    let mut ids: Vec<String> = owned_ids.iter().map(|u| u.to_string()).collect();
    ids.extend(foreign_ids.iter().map(|u| u.to_string()));
    ids.push("definitely-not-a-uuid".to_string());

    let (status, body) = app
        .request(
            "POST",
            "/api/v1/emails/bulk/delete",
            Some(json!({"email_ids": ids})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["success_count"], json!(3));
    assert_eq!(body["data"]["failed_count"], json!(3));
    let failed: Vec<String> = body["data"]["failed_ids"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    assert!(failed.contains(&"definitely-not-a-uuid".to_string()));
    for id in &foreign_ids {
        assert!(failed.contains(&id.to_string()));
    }

    // Owned rows are gone, foreign rows intact
    let (status, _) = app
        .request("GET", &format!("/api/v1/emails/{}", owned_ids[0]), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app
        .request("GET", &format!("/api/v1/emails/{}", foreign_ids[0]), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_bulk_limit_rejected_without_mutation() {
    let app = test_app().await;
    let alias = app.seed_alias(app.user_id, "mine@example.com").await;
    let kept = app.seed_email(alias.id, "survives", 10).await;

    let mut ids: Vec<String> = (0..100).map(|_| Uuid::new_v4().to_string()).collect();
    ids.push(kept.id.to_string());

    let (status, body) = app
        .request(
            "POST",
            "/api/v1/emails/bulk/delete",
            Some(json!({"email_ids": ids})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!("BULK_LIMIT_EXCEEDED"));

    let (status, _) = app
        .request("GET", &format!("/api/v1/emails/{}", kept.id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_bulk_mark_read() {
    let app = test_app().await;
    let alias = app.seed_alias(app.user_id, "mine@example.com").await;
    let a = app.seed_email(alias.id, "a", 10).await;
    let b = app.seed_email(alias.id, "b", 10).await;

    let (status, body) = app
        .request(
            "POST",
            "/api/v1/emails/bulk/mark-read",
            Some(json!({"email_ids": [a.id.to_string(), b.id.to_string()]})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["success_count"], json!(2));
    assert_eq!(body["data"]["failed_count"], json!(0));

    let (_, body) = app.request("GET", "/api/v1/emails?is_read=true", None).await;
    assert_eq!(body["data"]["pagination"]["total_count"], json!(2));
}

#[tokio::test]
async fn test_small_attachment_streams_with_integrity_headers() {
    let app = test_app().await;
    let alias = app.seed_alias(app.user_id, "inbox@example.com").await;
    let email = app.seed_email(alias.id, "with file", 10).await;
    let attachment = app
        .pipeline
        .store_attachment(email.id, "notes.txt", "text/plain", b"attachment body")
        .await
        .unwrap();

    let response = app
        .raw_get(&format!(
            "/api/v1/emails/{}/attachments/{}",
            email.id, attachment.id
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers().clone();
    assert_eq!(headers["content-type"], "text/plain");
    assert_eq!(
        headers["x-file-hash"].to_str().unwrap(),
        format!("sha256:{}", attachment.checksum)
    );
    assert!(headers["content-disposition"]
        .to_str()
        .unwrap()
        .starts_with("attachment; filename=\"notes.txt\""));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"attachment body");
}

#[tokio::test]
async fn test_large_attachment_dispatches_to_presigned_url() {
    let app = test_app().await;
    let alias = app.seed_alias(app.user_id, "inbox@example.com").await;
    let email = app.seed_email(alias.id, "big file", 10).await;

    // 15 MiB metadata with large_file_threshold at 10 MiB
    let attachment = mailcrypt::types::Attachment {
        id: Uuid::new_v4(),
        email_id: email.id,
        filename: "video.mp4".into(),
        content_type: "video/mp4".into(),
        size_bytes: 15 * 1024 * 1024,
        storage_key: "aa/bb/aabbcc".into(),
        checksum: "aabbcc".into(),
        created_at: chrono::Utc::now(),
    };
    app.repo.put_attachment(attachment.clone());

    let (status, body) = app
        .request(
            "GET",
            &format!("/api/v1/emails/{}/attachments/{}", email.id, attachment.id),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["expires_in"], json!(900));
    assert!(body["data"]["url"]
        .as_str()
        .unwrap()
        .contains("signature="));
}

#[tokio::test]
async fn test_presigned_gateway_serves_and_rejects() {
    let app = test_app().await;
    let alias = app.seed_alias(app.user_id, "inbox@example.com").await;
    let email = app.seed_email(alias.id, "file", 10).await;
    let attachment = app
        .pipeline
        .store_attachment(email.id, "f.bin", "application/octet-stream", b"blob")
        .await
        .unwrap();

    let (_, body) = app
        .request(
            "GET",
            &format!(
                "/api/v1/emails/{}/attachments/{}/url",
                email.id, attachment.id
            ),
            None,
        )
        .await;
    let url = body["data"]["url"].as_str().unwrap();
    let path = url.strip_prefix("http://localhost").unwrap();

    let (status, _) = app.request_with_token("GET", path, None, None).await;
    assert_eq!(status, StatusCode::OK);

    // A tampered signature is refused
    let tampered = path.replace("signature=", "signature=00");
    let (status, _) = app.request_with_token("GET", &tampered, None, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_alias_update_and_cascading_delete() {
    let app = test_app().await;
    let domain = app.seed_domain("example.com");

    let (_, body) = app
        .request(
            "POST",
            "/api/v1/aliases",
            Some(json!({"domain_id": domain.id, "local_part": "throwaway"})),
        )
        .await;
    let alias_id: Uuid = body["data"]["id"].as_str().unwrap().parse().unwrap();

    let (status, body) = app
        .request(
            "PUT",
            &format!("/api/v1/aliases/{}", alias_id),
            Some(json!({"description": "signup spam", "is_active": false})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["description"], json!("signup spam"));
    assert_eq!(body["data"]["is_active"], json!(false));

    let e1 = app.seed_email(alias_id, "one", 10).await;
    let e2 = app.seed_email(alias_id, "two", 10).await;
    app.pipeline
        .store_attachment(e1.id, "a.txt", "text/plain", b"bytes")
        .await
        .unwrap();

    let (status, body) = app
        .request("DELETE", &format!("/api/v1/aliases/{}", alias_id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["cascaded_emails"], json!(2));

    for email in [e1.id, e2.id] {
        let (status, _) = app
            .request("GET", &format!("/api/v1/emails/{}", email), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

#[tokio::test]
async fn test_alias_ceiling() {
    let app = test_app().await;
    let domain = app.seed_domain("example.com");
    for i in 0..50 {
        app.seed_alias(app.user_id, &format!("box{}@example.com", i))
            .await;
    }

    let (status, body) = app
        .request(
            "POST",
            "/api/v1/aliases",
            Some(json!({"domain_id": domain.id, "local_part": "onemore"})),
        )
        .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error"]["code"], json!("ALIAS_LIMIT_REACHED"));
}

#[tokio::test]
async fn test_envelope_shape() {
    let app = test_app().await;
    let (_, body) = app.request("GET", "/api/v1/emails/stats", None).await;
    assert_eq!(body["success"], json!(true));
    assert!(body["timestamp"].is_string());
    assert!(body["data"].is_object());
}
