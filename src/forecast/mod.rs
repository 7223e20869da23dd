//! Forecaster (§4.11): ordinary least squares on trailing 30-day daily spend,
//! projected 30 days forward, plus a trend classification and a confidence
//! tier based on how many of those days actually saw spend.

use chrono::{NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::Result;
use crate::storage::UsageLogRepository;

const TRAILING_DAYS: i64 = 30;
const PROJECTION_DAYS: i64 = 30;
const TREND_THRESHOLD_PCT: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectedDay {
    pub day_offset: i64,
    pub predicted_cost_usd: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Forecast {
    pub slope: f64,
    pub intercept: f64,
    pub projection: Vec<ProjectedDay>,
    pub predicted_next_month_usd: f64,
    pub trend: TrendDirection,
    pub confidence: ConfidenceTier,
}

/// Zero-fills a daily series so every calendar day in the trailing window is
/// represented (§4.10/§4.11 both zero-fill gaps the same way).
fn zero_filled(series: &[(NaiveDate, f64)], days: i64) -> Vec<f64> {
    let today = Utc::now().date_naive();
    let mut out = Vec::with_capacity(days as usize);
    for offset in (0..days).rev() {
        let date = today - chrono::Duration::days(offset);
        let value = series.iter().find(|(d, _)| *d == date).map(|(_, v)| *v).unwrap_or(0.0);
        out.push(value);
    }
    out
}

/// Ordinary least squares on `(x, y)` pairs, `x = 0..n-1`. Returns
/// `(slope, intercept)`; a flat/degenerate series (all-zero variance in `x`,
/// which can't happen for `n >= 2`, or `n < 2`) yields a zero slope through
/// the mean.
fn ols(y: &[f64]) -> (f64, f64) {
    let n = y.len();
    if n < 2 {
        return (0.0, y.first().copied().unwrap_or(0.0));
    }
    let n_f = n as f64;
    let xs: Vec<f64> = (0..n).map(|i| i as f64).collect();
    let x_mean = xs.iter().sum::<f64>() / n_f;
    let y_mean = y.iter().sum::<f64>() / n_f;

    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for i in 0..n {
        numerator += (xs[i] - x_mean) * (y[i] - y_mean);
        denominator += (xs[i] - x_mean).powi(2);
    }
    if denominator == 0.0 {
        return (0.0, y_mean);
    }
    let slope = numerator / denominator;
    let intercept = y_mean - slope * x_mean;
    (slope, intercept)
}

fn classify_trend(daily_costs: &[f64]) -> TrendDirection {
    let half = daily_costs.len() / 2;
    if half == 0 {
        return TrendDirection::Stable;
    }
    let first_half_mean = daily_costs[..half].iter().sum::<f64>() / half as f64;
    let last_half_mean = daily_costs[daily_costs.len() - half..].iter().sum::<f64>() / half as f64;

    if first_half_mean <= 0.0 {
        return if last_half_mean > 0.0 {
            TrendDirection::Increasing
        } else {
            TrendDirection::Stable
        };
    }
    let relative_change = (last_half_mean - first_half_mean) / first_half_mean * 100.0;
    if relative_change > TREND_THRESHOLD_PCT {
        TrendDirection::Increasing
    } else if relative_change < -TREND_THRESHOLD_PCT {
        TrendDirection::Decreasing
    } else {
        TrendDirection::Stable
    }
}

fn classify_confidence(daily_costs: &[f64]) -> ConfidenceTier {
    let non_zero_days = daily_costs.iter().filter(|&&c| c > 0.0).count();
    if non_zero_days >= 20 {
        ConfidenceTier::High
    } else if non_zero_days >= 10 {
        ConfidenceTier::Medium
    } else {
        ConfidenceTier::Low
    }
}

/// Runs the forecast for a tenant (§4.11): fetches the trailing 30-day daily
/// cost series, zero-fills it, fits OLS, and projects 30 days forward.
pub async fn forecast(usage_logs: &dyn UsageLogRepository, tenant_id: Uuid) -> Result<Forecast> {
    let series = usage_logs.daily_costs(tenant_id, TRAILING_DAYS).await?;
    let as_f64: Vec<(NaiveDate, f64)> = series
        .into_iter()
        .map(|(d, cost)| (d, cost.to_f64().unwrap_or(0.0)))
        .collect();
    let daily_costs = zero_filled(&as_f64, TRAILING_DAYS);

    let (slope, intercept) = ols(&daily_costs);
    let n = daily_costs.len() as f64;
    let mut projection = Vec::with_capacity(PROJECTION_DAYS as usize);
    let mut predicted_total = 0.0;
    for i in 0..PROJECTION_DAYS {
        let predicted = (slope * (n + i as f64) + intercept).max(0.0);
        predicted_total += predicted;
        projection.push(ProjectedDay {
            day_offset: i,
            predicted_cost_usd: predicted,
        });
    }

    Ok(Forecast {
        slope,
        intercept,
        projection,
        predicted_next_month_usd: predicted_total,
        trend: classify_trend(&daily_costs),
        confidence: classify_confidence(&daily_costs),
    })
}

/// Rounds a forecast dollar amount for display, matching the 6-decimal
/// convention used everywhere else costs are surfaced (§4.1).
pub fn round_usd(value: f64) -> Decimal {
    Decimal::from_f64_retain(value)
        .unwrap_or(Decimal::ZERO)
        .round_dp(6)
}
