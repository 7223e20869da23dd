//! `/api/v1/keys` — provider credential CRUD (§4.2, §A.6). The plaintext
//! secret is only ever held long enough to encrypt it and derive a masked
//! hint; it is never stored or logged.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::Deserialize;
use uuid::Uuid;

use super::AppState;
use crate::auth::CurrentTenant;
use crate::crypto;
use crate::domain::{Credential, CredentialView, LlmLabError, Provider, Result};

fn to_view(credential: Credential, masked_hint: String) -> CredentialView {
    CredentialView {
        id: credential.id,
        provider: credential.provider,
        proxy_key: credential.proxy_key,
        masked_hint,
        created_at: credential.created_at,
        last_used_at: credential.last_used_at,
        is_active: credential.active,
    }
}

pub async fn list(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant_id)): Extension<CurrentTenant>,
) -> Result<Json<Vec<CredentialView>>> {
    let credentials = state.credentials.list_by_tenant(tenant_id).await?;
    let views = credentials
        .into_iter()
        .map(|c| {
            let hint = crypto::decrypt(&c.encrypted_secret, &state.encryption_key)
                .map(|plain| crypto::mask(&plain))
                .unwrap_or_else(|_| "****".to_string());
            to_view(c, hint)
        })
        .collect();
    Ok(Json(views))
}

#[derive(Debug, Deserialize)]
pub struct CreateKeyRequest {
    pub provider: String,
    pub secret: String,
}

pub async fn create(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant_id)): Extension<CurrentTenant>,
    Json(request): Json<CreateKeyRequest>,
) -> Result<Json<CredentialView>> {
    if request.secret.trim().is_empty() {
        return Err(LlmLabError::validation("secret must not be empty"));
    }
    let provider = Provider::from_path_segment(&request.provider)?;
    if state
        .credentials
        .get_active_for_tenant_provider(tenant_id, provider)
        .await?
        .is_some()
    {
        return Err(LlmLabError::conflict(format!(
            "an active {provider} credential already exists for this tenant"
        )));
    }
    let encrypted_secret = crypto::encrypt(&request.secret, &state.encryption_key)?;
    let credential = Credential::new(tenant_id, provider, encrypted_secret);
    state.credentials.create(&credential).await?;
    let masked_hint = crypto::mask(&request.secret);
    Ok(Json(to_view(credential, masked_hint)))
}

pub async fn deactivate(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant_id)): Extension<CurrentTenant>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    let deactivated = state.credentials.deactivate(id, tenant_id).await?;
    if !deactivated {
        return Err(LlmLabError::not_found("credential not found"));
    }
    Ok(Json(serde_json::json!({ "success": true })))
}
