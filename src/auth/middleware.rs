//! Bearer-JWT middleware for every non-proxy `/api/v1/*` route (§4.12).
//! Proxy routes authenticate against the proxy key instead (§4.6 step 1) and
//! never pass through this layer.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

use super::jwt::JwtIssuer;
use crate::domain::LlmLabError;

/// The authenticated tenant, inserted into request extensions for handlers
/// to pull out via `Extension<CurrentTenant>`.
#[derive(Debug, Clone, Copy)]
pub struct CurrentTenant(pub Uuid);

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

pub async fn require_jwt(
    State(issuer): State<Arc<JwtIssuer>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, LlmLabError> {
    let token = extract_bearer(&headers).ok_or_else(|| LlmLabError::auth("missing bearer token"))?;
    let claims = issuer.validate(token)?;
    request.extensions_mut().insert(CurrentTenant(claims.sub));
    Ok(next.run(request).await)
}
