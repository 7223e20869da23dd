//! `/api/v1/stats/*` — dashboard rollups, forecast, and anomalies (§4.8,
//! §4.10, §4.11).

use axum::extract::{Query, State};
use axum::{Extension, Json};
use serde::Deserialize;

use super::AppState;
use crate::anomaly::AnomalyReport;
use crate::auth::CurrentTenant;
use crate::domain::Result;
use crate::forecast::{self, Forecast};
use crate::aggregator::{CacheSavings, DayBucket, HeatmapCell, ModelBreakdown, Period, ProviderComparison, Summary};

fn default_period() -> String {
    "month".to_string()
}

#[derive(Debug, Deserialize)]
pub struct PeriodQuery {
    #[serde(default = "default_period")]
    pub period: String,
    pub tag: Option<String>,
}

pub async fn summary(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant_id)): Extension<CurrentTenant>,
    Query(query): Query<PeriodQuery>,
) -> Result<Json<Summary>> {
    let period = Period::parse(&query.period)?;
    let summary = state.aggregator.summary(tenant_id, period, query.tag.as_deref()).await?;
    Ok(Json(summary))
}

pub async fn by_model(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant_id)): Extension<CurrentTenant>,
    Query(query): Query<PeriodQuery>,
) -> Result<Json<Vec<ModelBreakdown>>> {
    let period = Period::parse(&query.period)?;
    let rows = state.aggregator.by_model(tenant_id, period, query.tag.as_deref()).await?;
    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
pub struct ByDayQuery {
    #[serde(default = "default_days")]
    pub days: i64,
    pub tag: Option<String>,
}

fn default_days() -> i64 {
    30
}

pub async fn by_day(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant_id)): Extension<CurrentTenant>,
    Query(query): Query<ByDayQuery>,
) -> Result<Json<Vec<DayBucket>>> {
    let rows = state.aggregator.by_day(tenant_id, query.days, query.tag.as_deref()).await?;
    Ok(Json(rows))
}

pub async fn heatmap(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant_id)): Extension<CurrentTenant>,
) -> Result<Json<Vec<HeatmapCell>>> {
    let cells = state.aggregator.heatmap(tenant_id).await?;
    Ok(Json(cells))
}

pub async fn comparison(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant_id)): Extension<CurrentTenant>,
) -> Result<Json<ProviderComparison>> {
    let comparison = state.aggregator.comparison(tenant_id).await?;
    Ok(Json(comparison))
}

pub async fn forecast(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant_id)): Extension<CurrentTenant>,
) -> Result<Json<Forecast>> {
    let forecast = forecast::forecast(state.usage_logs.as_ref(), tenant_id).await?;
    Ok(Json(forecast))
}

pub async fn anomalies(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant_id)): Extension<CurrentTenant>,
) -> Result<Json<AnomalyReport>> {
    let report = state.anomaly_detector.detect(tenant_id).await?;
    Ok(Json(report))
}

pub async fn cache_savings(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant_id)): Extension<CurrentTenant>,
    Query(query): Query<ByDayQuery>,
) -> Result<Json<CacheSavings>> {
    let savings = state.aggregator.cache_savings(tenant_id, query.days).await?;
    Ok(Json(savings))
}
