/// Attachment download routes and the presigned-URL object gateway.
/// Dispatch policy: `url_only` or a large file yields a presigned URL;
/// everything else streams through the service after checksum
/// verification.
use super::api::{AppState, envelope};
use super::auth::AuthUser;
use crate::error::{Error, Result};
use crate::objstore::pipeline::{AttachmentDelivery, DeliveryOptions};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize, Default)]
pub struct DownloadQuery {
    inline: Option<bool>,
    url_only: Option<bool>,
}

fn file_hash_header(checksum: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("sha256:{}", checksum))
        .unwrap_or_else(|_| HeaderValue::from_static("sha256:invalid"))
}

fn delivery_response(delivery: AttachmentDelivery) -> Response {
    match delivery {
        AttachmentDelivery::Stream(download) => {
            let mut headers = HeaderMap::new();
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_str(&download.content_type)
                    .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
            );
            headers.insert(
                header::CONTENT_LENGTH,
                HeaderValue::from(download.data.len() as u64),
            );
            headers.insert("X-File-Size", HeaderValue::from(download.size_bytes as u64));
            headers.insert("X-File-Hash", file_hash_header(&download.checksum));

            let disposition = if download.inline { "inline" } else { "attachment" };
            let filename = download.filename.replace('"', "'");
            headers.insert(
                header::CONTENT_DISPOSITION,
                HeaderValue::from_str(&format!("{}; filename=\"{}\"", disposition, filename))
                    .unwrap_or_else(|_| HeaderValue::from_static("attachment")),
            );

            (headers, download.data).into_response()
        }
        AttachmentDelivery::Presigned {
            url,
            expires_in,
            filename,
            content_type,
            size_bytes,
            checksum,
        } => {
            let mut headers = HeaderMap::new();
            headers.insert("X-File-Hash", file_hash_header(&checksum));
            let body = envelope(serde_json::json!({
                "url": url,
                "expires_in": expires_in,
                "filename": filename,
                "content_type": content_type,
                "size_bytes": size_bytes,
                "checksum": format!("sha256:{}", checksum),
            }));
            (headers, body).into_response()
        }
    }
}

/// GET /emails/{id}/attachments/{aid}
pub async fn download_attachment(
    State(state): State<AppState>,
    user: AuthUser,
    Path((email_id, attachment_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response> {
    let opts = DeliveryOptions {
        url_only: query.url_only.unwrap_or(false),
        inline: query.inline.unwrap_or(false),
    };
    let delivery = state
        .pipeline
        .fetch(user.0, email_id, attachment_id, opts)
        .await?;
    Ok(delivery_response(delivery))
}

/// GET /emails/{id}/attachments/{aid}/url
pub async fn attachment_url(
    State(state): State<AppState>,
    user: AuthUser,
    Path((email_id, attachment_id)): Path<(Uuid, Uuid)>,
) -> Result<Response> {
    let delivery = state
        .pipeline
        .fetch_url(user.0, email_id, attachment_id)
        .await?;
    Ok(delivery_response(delivery))
}

#[derive(Debug, Deserialize)]
pub struct GatewayQuery {
    expires: u64,
    signature: String,
}

/// GET /objects/{key} — presigned direct download.
/// Authentication is the HMAC signature itself; no bearer token required.
pub async fn object_gateway(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<GatewayQuery>,
) -> Result<Response> {
    if !state.presigner.verify(&key, query.expires, &query.signature) {
        return Err(Error::access_denied("Presigned URL invalid or expired"));
    }

    let Some(data) = state.objects.get(&key).await? else {
        return Err(Error::AttachmentGone(key));
    };

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(data.len() as u64));
    Ok((StatusCode::OK, headers, data).into_response())
}
