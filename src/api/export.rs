//! `/api/v1/export/{csv,json}` — bulk export of usage logs. Deliberately a
//! trivial projection over the same filters as `/api/v1/logs` (§1: CSV/JSON
//! export serialization is "out of scope" as anything beyond that), so this
//! module owns no report/delivery machinery of its own — it just paginates
//! the existing repository query to exhaustion and serializes the rows.

use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Extension;
use serde::Deserialize;

use super::AppState;
use crate::auth::CurrentTenant;
use crate::domain::{LogFilter, Provider, Result, SortDirection, UsageLog};

const EXPORT_PAGE_SIZE: u32 = 500;

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub tag: Option<String>,
    pub date_from: Option<chrono::NaiveDate>,
    pub date_to: Option<chrono::NaiveDate>,
    pub sort_by: Option<String>,
    pub sort_dir: Option<String>,
}

impl ExportQuery {
    fn into_filter(self, page: u32) -> Result<LogFilter> {
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
            page,
            page_size: EXPORT_PAGE_SIZE,
        })
    }
}

/// Fetches every log matching the filter, page by page, until a page comes
/// back short of `EXPORT_PAGE_SIZE` (the repository itself caps page_size at
/// 500 regardless of what's requested).
async fn fetch_all(state: &AppState, tenant_id: uuid::Uuid, query: ExportQuery) -> Result<Vec<UsageLog>> {
    let mut page = 1;
    let mut out = Vec::new();
    loop {
        let filter = query.clone_for_page(page)?;
        let rows = state.usage_logs.list(tenant_id, &filter).await?;
        let got = rows.len();
        out.extend(rows);
        if got < EXPORT_PAGE_SIZE as usize {
            break;
        }
        page += 1;
    }
    Ok(out)
}

impl ExportQuery {
    fn clone_for_page(&self, page: u32) -> Result<LogFilter> {
        ExportQuery {
            provider: self.provider.clone(),
            model: self.model.clone(),
            tag: self.tag.clone(),
            date_from: self.date_from,
            date_to: self.date_to,
            sort_by: self.sort_by.clone(),
            sort_dir: self.sort_dir.clone(),
        }
        .into_filter(page)
    }
}

pub async fn csv(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant_id)): Extension<CurrentTenant>,
    Query(query): Query<ExportQuery>,
) -> Result<Response> {
    let logs = fetch_all(&state, tenant_id, query).await?;

    let mut writer = ::csv::Writer::from_writer(Vec::new());
    writer
        .write_record([
            "id",
            "provider",
            "model",
            "input_tokens",
            "output_tokens",
            "cost_usd",
            "latency_ms",
            "cache_hit",
            "created_at",
        ])
        .map_err(|e| crate::domain::LlmLabError::internal(format!("csv header: {e}")))?;
    for log in &logs {
        writer
            .write_record([
                log.id.to_string(),
                log.provider.as_str().to_string(),
                log.model.clone(),
                log.input_tokens.to_string(),
                log.output_tokens.to_string(),
                log.cost_usd.to_string(),
                log.latency_ms.to_string(),
                log.cache_hit.to_string(),
                log.created_at.to_rfc3339(),
            ])
            .map_err(|e| crate::domain::LlmLabError::internal(format!("csv write: {e}")))?;
    }
    let body = writer
        .into_inner()
        .map_err(|e| crate::domain::LlmLabError::internal(format!("csv flush: {e}")))?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"usage_logs.csv\""),
        ],
        body,
    )
        .into_response())
}

pub async fn json(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant_id)): Extension<CurrentTenant>,
    Query(query): Query<ExportQuery>,
) -> Result<Response> {
    let logs = fetch_all(&state, tenant_id, query).await?;
    Ok(axum::Json(logs).into_response())
}
