use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::provider::Provider;

/// An append-only metering record (§3). Created exactly once per
/// forwarded-or-cached request that returned a usable response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageLog {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub provider: Provider,
    pub model: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cost_usd: Decimal,
    pub latency_ms: i64,
    pub cache_hit: bool,
    pub created_at: DateTime<Utc>,
}

impl UsageLog {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tenant_id: Uuid,
        provider: Provider,
        model: impl Into<String>,
        input_tokens: i64,
        output_tokens: i64,
        cost_usd: Decimal,
        latency_ms: i64,
        cache_hit: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            provider,
            model: model.into(),
            input_tokens,
            output_tokens,
            cost_usd,
            latency_ms,
            cache_hit,
            created_at: Utc::now(),
        }
    }

    /// Builds the row for a cache hit: cost and latency are always zero
    /// (§3, §8) regardless of what the original call would have cost.
    pub fn cache_hit_row(
        tenant_id: Uuid,
        provider: Provider,
        model: impl Into<String>,
        input_tokens: i64,
        output_tokens: i64,
    ) -> Self {
        Self::new(
            tenant_id,
            provider,
            model,
            input_tokens,
            output_tokens,
            Decimal::ZERO,
            0,
            true,
        )
    }
}

/// Fields accepted for filtering/sorting `/api/v1/logs` (§4.8). Only these
/// names are honored; anything else falls back to `created_at desc`.
pub const SORT_WHITELIST: &[&str] = &[
    "created_at",
    "cost_usd",
    "input_tokens",
    "output_tokens",
    "latency_ms",
    "provider",
    "model",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub provider: Option<Provider>,
    pub model: Option<String>,
    pub tag: Option<String>,
    pub date_from: Option<chrono::NaiveDate>,
    pub date_to: Option<chrono::NaiveDate>,
    pub sort_by: Option<String>,
    pub sort_dir: Option<SortDirection>,
    pub page: u32,
    pub page_size: u32,
}

impl LogFilter {
    /// Returns the sort column, falling back to `created_at` per §4.8 if the
    /// requested field isn't whitelisted.
    pub fn sort_column(&self) -> &str {
        match self.sort_by.as_deref() {
            Some(field) if SORT_WHITELIST.contains(&field) => field,
            _ => "created_at",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn cache_hit_row_is_always_free_and_instant() {
        let log = UsageLog::cache_hit_row(Uuid::new_v4(), Provider::Openai, "gpt-4o", 10, 5);
        assert_eq!(log.cost_usd, Decimal::ZERO);
        assert_eq!(log.latency_ms, 0);
        assert!(log.cache_hit);
    }

    #[test]
    fn sort_column_falls_back_for_unknown_field() {
        let mut f = LogFilter::default();
        f.sort_by = Some("DROP TABLE usage_logs".into());
        assert_eq!(f.sort_column(), "created_at");
    }

    #[test]
    fn sort_column_accepts_whitelisted_field() {
        let mut f = LogFilter::default();
        f.sort_by = Some("cost_usd".into());
        assert_eq!(f.sort_column(), "cost_usd");
    }

    #[test]
    fn non_cache_hit_cost_is_priced() {
        let log = UsageLog::new(
            Uuid::new_v4(),
            Provider::Openai,
            "gpt-4o",
            1000,
            500,
            dec!(0.0075),
            42,
            false,
        );
        assert_eq!(log.cost_usd, dec!(0.0075));
    }
}
