/// Bearer-token authentication.
/// The JWT internals live with the identity provider; this middleware
/// validates the signature and expiry and hands handlers an authenticated
/// user id.
use super::api::AppState;
use crate::error::Error;
use axum::{
    extract::{Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct Claims {
    /// User id
    sub: String,
    #[allow(dead_code)]
    exp: usize,
}

/// The authenticated user, injected by [`bearer_auth`]
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Uuid);

impl<S> axum::extract::FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .copied()
            .ok_or_else(|| Error::access_denied("Missing authentication"))
    }
}

fn unauthorized(msg: &str) -> Response {
    let err = Error::validation("authorization", msg);
    let body = serde_json::json!({
        "success": false,
        "error": { "code": "UNAUTHORIZED", "message": err.to_string() },
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });
    (axum::http::StatusCode::UNAUTHORIZED, axum::Json(body)).into_response()
}

/// Middleware validating `Authorization: Bearer <jwt>`
pub async fn bearer_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, Response> {
    let header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default();

    let Some(token) = header.strip_prefix("Bearer ") else {
        tracing::debug!("Request without bearer token");
        return Err(unauthorized("missing_bearer_token"));
    };

    let key = DecodingKey::from_secret(state.jwt_secret.as_bytes());
    let validation = Validation::new(Algorithm::HS256);
    let claims = match decode::<Claims>(token, &key, &validation) {
        Ok(data) => data.claims,
        Err(e) => {
            tracing::debug!(error = %e, "Bearer token rejected");
            return Err(unauthorized("invalid_token"));
        }
    };

    let Ok(user_id) = Uuid::parse_str(&claims.sub) else {
        return Err(unauthorized("invalid_subject"));
    };

    req.extensions_mut().insert(AuthUser(user_id));
    Ok(next.run(req).await)
}
