//! `/api/v1/budgets` — one budget per tenant, upsert semantics (§3, §4.9).

use axum::extract::State;
use axum::{Extension, Json};
use rust_decimal::Decimal;
use serde::Deserialize;

use super::AppState;
use crate::auth::CurrentTenant;
use crate::domain::{Budget, LlmLabError, Result};

pub async fn get(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant_id)): Extension<CurrentTenant>,
) -> Result<Json<Option<Budget>>> {
    Ok(Json(state.budgets.get_by_tenant(tenant_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct UpsertBudgetRequest {
    pub amount_usd: Decimal,
    pub alert_threshold_pct: Decimal,
}

pub async fn upsert(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant_id)): Extension<CurrentTenant>,
    Json(request): Json<UpsertBudgetRequest>,
) -> Result<Json<Budget>> {
    if request.amount_usd <= Decimal::ZERO {
        return Err(LlmLabError::validation("amount_usd must be positive"));
    }
    let budget = Budget::new(tenant_id, request.amount_usd, request.alert_threshold_pct);
    state.budgets.upsert(&budget).await?;
    Ok(Json(budget))
}
