//! Read-side rollups (§4.8). Every query here is pushed into SQL — no
//! in-memory `HashMap` grouping over the full `usage_logs` table, which is
//! exactly what the old, now-deleted engine-level aggregator did and why it
//! was replaced. SQLite has no native decimal type, so sums/averages are
//! computed as `REAL` and converted back to [`Decimal`] at the boundary;
//! individual usage-log rows (the ledger of record) keep full `Decimal`
//! precision in `storage`, this module only approximates for dashboard
//! display.

use chrono::NaiveDate;
use serde::Serialize;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use sqlx::{Pool, Row, Sqlite};
use uuid::Uuid;

use crate::domain::{LlmLabError, Provider, Result};
use crate::pricing;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Today,
    Week,
    Month,
    All,
}

impl Period {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "today" => Ok(Period::Today),
            "week" => Ok(Period::Week),
            "month" => Ok(Period::Month),
            "all" => Ok(Period::All),
            other => Err(LlmLabError::validation(format!("unknown period '{other}'"))),
        }
    }

    /// SQLite `WHERE` fragment bounding `created_at` to this period. "Week"
    /// and "month" are trailing rolling windows (consistent with the Budget
    /// Watcher's and Anomaly Detector's own trailing windows), not calendar
    /// week/month boundaries.
    fn where_clause(self) -> &'static str {
        match self {
            Period::Today => "date(created_at) = date('now')",
            Period::Week => "date(created_at) >= date('now', '-6 days')",
            Period::Month => "date(created_at) >= date('now', '-29 days')",
            Period::All => "1 = 1",
        }
    }
}

fn tag_join_clause(tag: Option<&str>) -> &'static str {
    if tag.is_some() {
        "AND EXISTS (SELECT 1 FROM usage_log_tags ult JOIN tags t ON t.id = ult.tag_id WHERE ult.usage_log_id = usage_logs.id AND t.name = ?)"
    } else {
        ""
    }
}

fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or(Decimal::ZERO).round_dp(6)
}

#[derive(Debug, Clone, Serialize)]
pub struct PeriodSummary {
    pub period: Period,
    pub total_cost_usd: Decimal,
    pub request_count: i64,
    pub total_tokens: i64,
    pub avg_latency_ms: f64,
    pub cache_hit_count: i64,
}

/// Independent headline sums shown on the dashboard card regardless of the
/// selected period filter. `today_usd <= month_usd <= all_time_usd` always
/// holds since costs are never negative and each window nests the last (§8).
#[derive(Debug, Clone, Serialize)]
pub struct HeadlineTotals {
    pub today_usd: Decimal,
    pub month_usd: Decimal,
    pub all_time_usd: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub period: PeriodSummary,
    pub headline: HeadlineTotals,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelBreakdown {
    pub provider: Provider,
    pub model: String,
    pub total_cost_usd: Decimal,
    pub total_tokens: i64,
    pub request_count: i64,
    pub avg_latency_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DayBucket {
    pub date: NaiveDate,
    pub total_cost_usd: Decimal,
    pub request_count: i64,
}

/// `weekday` follows SQLite's `strftime('%w', ...)` convention: 0 = Sunday.
#[derive(Debug, Clone, Serialize)]
pub struct HeatmapCell {
    pub weekday: u8,
    pub hour: u8,
    pub request_count: i64,
    pub total_cost_usd: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonAlternative {
    pub provider: Provider,
    pub model: String,
    pub cost_usd: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonRow {
    pub provider: Provider,
    pub model: String,
    pub actual_cost_usd: Decimal,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cheapest_alternatives: Vec<ComparisonAlternative>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderComparison {
    pub rows: Vec<ComparisonRow>,
    pub cheapest_possible_total_usd: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheSavings {
    pub cache_hit_count: i64,
    pub would_have_cost_usd: Decimal,
}

pub struct Aggregator {
    pool: Pool<Sqlite>,
}

impl Aggregator {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn summary(&self, tenant_id: Uuid, period: Period, tag: Option<&str>) -> Result<Summary> {
        let sql = format!(
            "SELECT COALESCE(SUM(CAST(cost_usd AS REAL)), 0.0) AS total_cost, \
                    COUNT(*) AS request_count, \
                    COALESCE(SUM(input_tokens + output_tokens), 0) AS total_tokens, \
                    COALESCE(AVG(latency_ms), 0.0) AS avg_latency, \
                    COALESCE(SUM(cache_hit), 0) AS cache_hits \
             FROM usage_logs WHERE tenant_id = ? AND {} {}",
            period.where_clause(),
            tag_join_clause(tag)
        );
        let mut query = sqlx::query(&sql).bind(tenant_id.to_string());
        if let Some(tag) = tag {
            query = query.bind(tag);
        }
        let row = query.fetch_one(&self.pool).await?;

        let period_summary = PeriodSummary {
            period,
            total_cost_usd: to_decimal(row.try_get::<f64, _>("total_cost")?),
            request_count: row.try_get("request_count")?,
            total_tokens: row.try_get("total_tokens")?,
            avg_latency_ms: row.try_get("avg_latency")?,
            cache_hit_count: row.try_get("cache_hits")?,
        };

        let headline = self.headline_totals(tenant_id, tag).await?;

        Ok(Summary {
            period: period_summary,
            headline,
        })
    }

    async fn headline_totals(&self, tenant_id: Uuid, tag: Option<&str>) -> Result<HeadlineTotals> {
        let today = self.cost_sum_for(tenant_id, Period::Today, tag).await?;
        let month = self.cost_sum_for(tenant_id, Period::Month, tag).await?;
        let all_time = self.cost_sum_for(tenant_id, Period::All, tag).await?;
        Ok(HeadlineTotals {
            today_usd: today,
            month_usd: month,
            all_time_usd: all_time,
        })
    }

    async fn cost_sum_for(&self, tenant_id: Uuid, period: Period, tag: Option<&str>) -> Result<Decimal> {
        let sql = format!(
            "SELECT COALESCE(SUM(CAST(cost_usd AS REAL)), 0.0) AS total_cost FROM usage_logs \
             WHERE tenant_id = ? AND {} {}",
            period.where_clause(),
            tag_join_clause(tag)
        );
        let mut query = sqlx::query(&sql).bind(tenant_id.to_string());
        if let Some(tag) = tag {
            query = query.bind(tag);
        }
        let row = query.fetch_one(&self.pool).await?;
        Ok(to_decimal(row.try_get::<f64, _>("total_cost")?))
    }

    pub async fn by_model(&self, tenant_id: Uuid, period: Period, tag: Option<&str>) -> Result<Vec<ModelBreakdown>> {
        let sql = format!(
            "SELECT provider, model, \
                    COALESCE(SUM(CAST(cost_usd AS REAL)), 0.0) AS total_cost, \
                    COALESCE(SUM(input_tokens + output_tokens), 0) AS total_tokens, \
                    COUNT(*) AS request_count, \
                    COALESCE(AVG(latency_ms), 0.0) AS avg_latency \
             FROM usage_logs WHERE tenant_id = ? AND {} {} \
             GROUP BY provider, model ORDER BY total_cost DESC",
            period.where_clause(),
            tag_join_clause(tag)
        );
        let mut query = sqlx::query(&sql).bind(tenant_id.to_string());
        if let Some(tag) = tag {
            query = query.bind(tag);
        }
        let rows = query.fetch_all(&self.pool).await?;

        rows.into_iter()
            .map(|row| {
                let provider: String = row.try_get("provider")?;
                Ok(ModelBreakdown {
                    provider: Provider::from_path_segment(&provider)?,
                    model: row.try_get("model")?,
                    total_cost_usd: to_decimal(row.try_get::<f64, _>("total_cost")?),
                    total_tokens: row.try_get("total_tokens")?,
                    request_count: row.try_get("request_count")?,
                    avg_latency_ms: row.try_get("avg_latency")?,
                })
            })
            .collect()
    }

    pub async fn by_day(&self, tenant_id: Uuid, days: i64, tag: Option<&str>) -> Result<Vec<DayBucket>> {
        let sql = format!(
            "SELECT date(created_at) AS day, \
                    COALESCE(SUM(CAST(cost_usd AS REAL)), 0.0) AS total_cost, \
                    COUNT(*) AS request_count \
             FROM usage_logs WHERE tenant_id = ? AND date(created_at) >= date('now', ? || ' days') {} \
             GROUP BY day ORDER BY day ASC",
            tag_join_clause(tag)
        );
        let mut query = sqlx::query(&sql)
            .bind(tenant_id.to_string())
            .bind(format!("-{}", (days - 1).max(0)));
        if let Some(tag) = tag {
            query = query.bind(tag);
        }
        let rows = query.fetch_all(&self.pool).await?;

        rows.into_iter()
            .map(|row| {
                let day: String = row.try_get("day")?;
                Ok(DayBucket {
                    date: NaiveDate::parse_from_str(&day, "%Y-%m-%d")
                        .map_err(|e| LlmLabError::internal(format!("corrupt date in aggregation: {e}")))?,
                    total_cost_usd: to_decimal(row.try_get::<f64, _>("total_cost")?),
                    request_count: row.try_get("request_count")?,
                })
            })
            .collect()
    }

    /// 30-day weekday×hour grid (§4.8).
    pub async fn heatmap(&self, tenant_id: Uuid) -> Result<Vec<HeatmapCell>> {
        let sql = "SELECT CAST(strftime('%w', created_at) AS INTEGER) AS weekday, \
                          CAST(strftime('%H', created_at) AS INTEGER) AS hour, \
                          COUNT(*) AS request_count, \
                          COALESCE(SUM(CAST(cost_usd AS REAL)), 0.0) AS total_cost \
                   FROM usage_logs \
                   WHERE tenant_id = ? AND date(created_at) >= date('now', '-29 days') \
                   GROUP BY weekday, hour ORDER BY weekday ASC, hour ASC";
        let rows = sqlx::query(sql).bind(tenant_id.to_string()).fetch_all(&self.pool).await?;

        rows.into_iter()
            .map(|row| {
                Ok(HeatmapCell {
                    weekday: row.try_get::<i64, _>("weekday")? as u8,
                    hour: row.try_get::<i64, _>("hour")? as u8,
                    request_count: row.try_get("request_count")?,
                    total_cost_usd: to_decimal(row.try_get::<f64, _>("total_cost")?),
                })
            })
            .collect()
    }

    /// Actual spend vs. every other provider/model's price table, over the
    /// trailing 30 days, keeping the five cheapest alternatives per row plus
    /// the cheapest grand total across all rows combined (§4.8).
    pub async fn comparison(&self, tenant_id: Uuid) -> Result<ProviderComparison> {
        let sql = "SELECT provider, model, \
                          COALESCE(SUM(CAST(cost_usd AS REAL)), 0.0) AS total_cost, \
                          COALESCE(SUM(input_tokens), 0) AS input_tokens, \
                          COALESCE(SUM(output_tokens), 0) AS output_tokens \
                   FROM usage_logs \
                   WHERE tenant_id = ? AND date(created_at) >= date('now', '-29 days') \
                   GROUP BY provider, model";
        let rows = sqlx::query(sql).bind(tenant_id.to_string()).fetch_all(&self.pool).await?;

        let all_models = pricing::all_models();
        let mut grand_total = Decimal::ZERO;
        let mut comparison_rows = Vec::with_capacity(rows.len());

        for row in rows {
            let provider_str: String = row.try_get("provider")?;
            let provider = Provider::from_path_segment(&provider_str)?;
            let model: String = row.try_get("model")?;
            let input_tokens: i64 = row.try_get("input_tokens")?;
            let output_tokens: i64 = row.try_get("output_tokens")?;
            let actual_cost = to_decimal(row.try_get::<f64, _>("total_cost")?);

            let mut alternatives: Vec<ComparisonAlternative> = all_models
                .iter()
                .map(|(alt_provider, alt_model)| ComparisonAlternative {
                    provider: *alt_provider,
                    model: alt_model.to_string(),
                    cost_usd: pricing::price(*alt_provider, alt_model, input_tokens, output_tokens),
                })
                .collect();
            alternatives.sort_by(|a, b| a.cost_usd.cmp(&b.cost_usd));
            let cheapest_for_row = alternatives.first().map(|a| a.cost_usd).unwrap_or(actual_cost);
            grand_total += cheapest_for_row;
            alternatives.truncate(5);

            comparison_rows.push(ComparisonRow {
                provider,
                model,
                actual_cost_usd: actual_cost,
                input_tokens,
                output_tokens,
                cheapest_alternatives: alternatives,
            });
        }

        Ok(ProviderComparison {
            rows: comparison_rows,
            cheapest_possible_total_usd: grand_total.round_dp(6),
        })
    }

    /// Cache-hit rows are always logged at `cost_usd = 0` (§3); this prices
    /// what each distinct `(provider, model, input_tokens, output_tokens)`
    /// group would have cost upstream and multiplies by the group's hit
    /// count, so pricing — which only exists in Rust, not SQL — runs once
    /// per distinct group rather than once per cache-hit row.
    pub async fn cache_savings(&self, tenant_id: Uuid, days: i64) -> Result<CacheSavings> {
        let sql = "SELECT provider, model, input_tokens, output_tokens, COUNT(*) AS hits \
                   FROM usage_logs \
                   WHERE tenant_id = ? AND cache_hit = 1 AND date(created_at) >= date('now', ? || ' days') \
                   GROUP BY provider, model, input_tokens, output_tokens";
        let rows = sqlx::query(sql)
            .bind(tenant_id.to_string())
            .bind(format!("-{}", (days - 1).max(0)))
            .fetch_all(&self.pool)
            .await?;

        let mut cache_hit_count = 0i64;
        let mut would_have_cost = Decimal::ZERO;
        for row in rows {
            let provider_str: String = row.try_get("provider")?;
            let provider = Provider::from_path_segment(&provider_str)?;
            let model: String = row.try_get("model")?;
            let input_tokens: i64 = row.try_get("input_tokens")?;
            let output_tokens: i64 = row.try_get("output_tokens")?;
            let hits: i64 = row.try_get("hits")?;
            let unit_cost = pricing::price(provider, &model, input_tokens, output_tokens);
            would_have_cost += unit_cost * Decimal::from(hits);
            cache_hit_count += hits;
        }

        Ok(CacheSavings {
            cache_hit_count,
            would_have_cost_usd: would_have_cost.round_dp(6),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UsageLog;
    use crate::storage::database::{DatabaseConfig, DatabasePool};
    use crate::storage::{SqliteUsageLogRepository, UsageLogRepository};
    use rust_decimal_macros::dec;

    async fn pool() -> Pool<Sqlite> {
        let db = DatabasePool::new(&DatabaseConfig::sqlite_memory()).await.unwrap();
        db.sqlite().clone()
    }

    #[tokio::test]
    async fn summary_headline_invariant_holds() {
        let pool = pool().await;
        let repo = SqliteUsageLogRepository::new(pool.clone());
        let tenant_id = Uuid::new_v4();
        let log = UsageLog::new(tenant_id, Provider::Openai, "gpt-4o", 1000, 500, dec!(0.0075), 42, false);
        repo.create(&log, &[]).await.unwrap();

        let aggregator = Aggregator::new(pool);
        let summary = aggregator.summary(tenant_id, Period::All, None).await.unwrap();
        assert!(summary.headline.today_usd <= summary.headline.month_usd);
        assert!(summary.headline.month_usd <= summary.headline.all_time_usd);
        assert_eq!(summary.period.request_count, 1);
    }

    #[tokio::test]
    async fn by_model_orders_by_cost_descending() {
        let pool = pool().await;
        let repo = SqliteUsageLogRepository::new(pool.clone());
        let tenant_id = Uuid::new_v4();
        repo.create(
            &UsageLog::new(tenant_id, Provider::Openai, "gpt-4o", 1000, 500, dec!(5.0), 10, false),
            &[],
        )
        .await
        .unwrap();
        repo.create(
            &UsageLog::new(tenant_id, Provider::Anthropic, "claude-3-opus", 100, 50, dec!(0.5), 10, false),
            &[],
        )
        .await
        .unwrap();

        let aggregator = Aggregator::new(pool);
        let rows = aggregator.by_model(tenant_id, Period::All, None).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].model, "gpt-4o");
    }

    #[tokio::test]
    async fn cache_savings_reprices_cache_hit_rows() {
        let pool = pool().await;
        let repo = SqliteUsageLogRepository::new(pool.clone());
        let tenant_id = Uuid::new_v4();
        repo.create(
            &UsageLog::cache_hit_row(tenant_id, Provider::Openai, "gpt-4o", 1000, 500),
            &[],
        )
        .await
        .unwrap();

        let aggregator = Aggregator::new(pool);
        let savings = aggregator.cache_savings(tenant_id, 30).await.unwrap();
        assert_eq!(savings.cache_hit_count, 1);
        assert!(savings.would_have_cost_usd > Decimal::ZERO);
    }
}
