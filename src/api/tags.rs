//! `/api/v1/tags` — tag CRUD (§4.5, §3).

use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::Deserialize;
use uuid::Uuid;

use super::AppState;
use crate::auth::CurrentTenant;
use crate::domain::{LlmLabError, Result, Tag};

pub async fn list(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant_id)): Extension<CurrentTenant>,
) -> Result<Json<Vec<Tag>>> {
    Ok(Json(state.tags.list(tenant_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateTagRequest {
    pub name: String,
}

pub async fn create(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant_id)): Extension<CurrentTenant>,
    Json(request): Json<CreateTagRequest>,
) -> Result<Json<Tag>> {
    let tag = state.tag_repo.get_or_create(tenant_id, &request.name).await?;
    Ok(Json(tag))
}

pub async fn remove(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant_id)): Extension<CurrentTenant>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    let deleted = state.tag_repo.delete(id, tenant_id).await?;
    if !deleted {
        return Err(LlmLabError::not_found("tag not found"));
    }
    Ok(Json(serde_json::json!({ "success": true })))
}
