//! SQLx row types for the schema in `migrations/0001_init.sql`.
//!
//! Stored as TEXT (uuid, rfc3339 timestamp, decimal-as-string) for sqlite
//! portability; repository impls parse into domain types at the boundary.

use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct TenantRow {
    pub id: String,
    pub external_id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: String,
    pub active: bool,
}

#[derive(Debug, Clone, FromRow)]
pub struct CredentialRow {
    pub id: String,
    pub tenant_id: String,
    pub provider: String,
    pub encrypted_secret: String,
    pub proxy_key: String,
    pub created_at: String,
    pub last_used_at: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone, FromRow)]
pub struct UsageLogRow {
    pub id: String,
    pub tenant_id: String,
    pub provider: String,
    pub model: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cost_usd: String,
    pub latency_ms: i64,
    pub cache_hit: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct TagRow {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub color: String,
    pub created_at: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct BudgetRow {
    pub id: String,
    pub tenant_id: String,
    pub amount_usd: String,
    pub period: String,
    pub alert_threshold_pct: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct WebhookRow {
    pub id: String,
    pub tenant_id: String,
    pub url: String,
    pub event_type: String,
    pub active: bool,
    pub created_at: String,
}
