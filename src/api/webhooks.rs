//! `/api/v1/webhooks` — tenant-registered alert callback CRUD (§3, §4.9, §4.10).

use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::Deserialize;
use uuid::Uuid;

use super::AppState;
use crate::auth::CurrentTenant;
use crate::domain::{LlmLabError, Result, Webhook, WebhookEventType};

pub async fn list(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant_id)): Extension<CurrentTenant>,
) -> Result<Json<Vec<Webhook>>> {
    Ok(Json(state.webhook_repo.list_by_tenant(tenant_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateWebhookRequest {
    pub url: String,
    pub event_type: String,
}

pub async fn create(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant_id)): Extension<CurrentTenant>,
    Json(request): Json<CreateWebhookRequest>,
) -> Result<Json<Webhook>> {
    if !request.url.starts_with("http://") && !request.url.starts_with("https://") {
        return Err(LlmLabError::validation("url must be http(s)"));
    }
    let event_type = WebhookEventType::from_str_opt(&request.event_type)
        .ok_or_else(|| LlmLabError::validation(format!("unknown event_type '{}'", request.event_type)))?;
    let webhook = Webhook::new(tenant_id, request.url, event_type);
    state.webhook_repo.create(&webhook).await?;
    Ok(Json(webhook))
}

pub async fn remove(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant_id)): Extension<CurrentTenant>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    let deleted = state.webhook_repo.delete(id, tenant_id).await?;
    if !deleted {
        return Err(LlmLabError::not_found("webhook not found"));
    }
    Ok(Json(serde_json::json!({ "success": true })))
}
