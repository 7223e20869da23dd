//! `POST /auth/{provider}` and `GET /api/v1/me` (§4.12, §A.9).

use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::Serialize;

use super::AppState;
use crate::auth::{resolve_tenant, CurrentTenant};
use crate::domain::{LlmLabError, Result, Tenant};

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub tenant: Tenant,
}

/// Exchanges an already-verified external identity for an LLMLab session
/// JWT. The request body is the raw identity payload the caller received
/// from `{provider}` (e.g. GitHub's `/user` response), forwarded as-is.
pub async fn exchange(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    body: String,
) -> Result<Json<TokenResponse>> {
    let identity_provider = state
        .identity_providers
        .get(provider.as_str())
        .ok_or_else(|| LlmLabError::validation(format!("unknown identity provider '{provider}'")))?;

    let identity = identity_provider.verify(&body).await?;
    let tenant = resolve_tenant(state.tenants.as_ref(), identity).await?;
    let access_token = state.jwt_issuer.mint(tenant.id)?;

    Ok(Json(TokenResponse {
        access_token,
        token_type: "Bearer",
        tenant,
    }))
}

pub async fn me(State(state): State<AppState>, Extension(CurrentTenant(tenant_id)): Extension<CurrentTenant>) -> Result<Json<Tenant>> {
    let tenant = state
        .tenants
        .get_by_id(tenant_id)
        .await?
        .ok_or_else(|| LlmLabError::not_found("tenant not found"))?;
    Ok(Json(tenant))
}
