//! `/api/v1/logs` — paginated, filterable, sortable usage-log reads plus
//! tag attach/detach (§4.8, §4.5).

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AppState;
use crate::auth::CurrentTenant;
use crate::domain::{LogFilter, Provider, Result, SortDirection, UsageLog};

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub tag: Option<String>,
    pub date_from: Option<chrono::NaiveDate>,
    pub date_to: Option<chrono::NaiveDate>,
    pub sort_by: Option<String>,
    pub sort_dir: Option<String>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    50
}

impl LogsQuery {
    fn into_filter(self) -> Result<LogFilter> {
        if let (Some(from), Some(to)) = (self.date_from, self.date_to) {
            if from > to {
                return Err(crate::domain::LlmLabError::validation("date_from must not be after date_to"));
            }
        }
        Ok(LogFilter {
            provider: self.provider.map(|p| Provider::from_path_segment(&p)).transpose()?,
            model: self.model,
            tag: self.tag,
            date_from: self.date_from,
            date_to: self.date_to,
            sort_by: self.sort_by,
            sort_dir: match self.sort_dir.as_deref() {
                Some("asc") => Some(SortDirection::Asc),
                Some("desc") => Some(SortDirection::Desc),
                _ => None,
            },
            page: self.page,
            page_size: self.page_size,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct LogsPage {
    pub logs: Vec<UsageLog>,
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
}

pub async fn list(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant_id)): Extension<CurrentTenant>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<LogsPage>> {
    let page = query.page;
    let page_size = query.page_size;
    let filter = query.into_filter()?;
    let logs = state.usage_logs.list(tenant_id, &filter).await?;
    let total = state.usage_logs.count(tenant_id, &filter).await?;
    Ok(Json(LogsPage {
        logs,
        total,
        page,
        page_size,
    }))
}

pub async fn get(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant_id)): Extension<CurrentTenant>,
    Path(id): Path<Uuid>,
) -> Result<Json<UsageLog>> {
    let log = state
        .usage_logs
        .get_by_id(id, tenant_id)
        .await?
        .ok_or_else(|| crate::domain::LlmLabError::not_found("usage log not found"))?;
    Ok(Json(log))
}

#[derive(Debug, Deserialize)]
pub struct AttachTagRequest {
    pub name: String,
}

pub async fn attach_tag(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant_id)): Extension<CurrentTenant>,
    Path(id): Path<Uuid>,
    Json(request): Json<AttachTagRequest>,
) -> Result<Json<serde_json::Value>> {
    state
        .usage_logs
        .get_by_id(id, tenant_id)
        .await?
        .ok_or_else(|| crate::domain::LlmLabError::not_found("usage log not found"))?;
    let tag = state.tag_repo.get_or_create(tenant_id, &request.name).await?;
    state.tag_repo.attach(id, tag.id).await?;
    Ok(Json(serde_json::json!({ "success": true, "tag": tag })))
}

pub async fn detach_tag(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant_id)): Extension<CurrentTenant>,
    Path((id, tag_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<serde_json::Value>> {
    state
        .usage_logs
        .get_by_id(id, tenant_id)
        .await?
        .ok_or_else(|| crate::domain::LlmLabError::not_found("usage log not found"))?;
    state.tag_repo.detach(id, tag_id).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}
