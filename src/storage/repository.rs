//! Repository traits and SQLite implementations.
//!
//! Generalizes the teacher's trait-per-entity + `SqliteXRepository` struct
//! pattern (see `git blame` on the original `UsageRepository`/
//! `CostRepository`/`PricingRepository` split) to LLMLab's six tables.
//! Queries are written against the runtime `sqlx::query`/`query_as` API
//! rather than the `query!`/`query_as!` macros: the macros need either a
//! live `DATABASE_URL` or a checked-in `.sqlx` cache at build time, and this
//! crate is built without ever connecting to a database at compile time.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Pool, Row, Sqlite};
use tracing::info;
use uuid::Uuid;

use crate::domain::{
    Budget, BudgetPeriod, Credential, LlmLabError, LogFilter, Provider, Result, SortDirection,
    Tag, Tenant, UsageLog, Webhook, WebhookEventType,
};

use super::models::{BudgetRow, CredentialRow, TagRow, TenantRow, UsageLogRow, WebhookRow};

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| LlmLabError::internal(format!("corrupt uuid in storage: {e}")))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| LlmLabError::internal(format!("corrupt timestamp in storage: {e}")))
}

fn parse_decimal(s: &str) -> Result<Decimal> {
    Decimal::from_str(s).map_err(|e| LlmLabError::internal(format!("corrupt decimal in storage: {e}")))
}

fn parse_provider(s: &str) -> Result<Provider> {
    Provider::from_path_segment(s)
}

fn tenant_from_row(row: TenantRow) -> Result<Tenant> {
    Ok(Tenant {
        id: parse_uuid(&row.id)?,
        external_id: row.external_id,
        email: row.email,
        display_name: row.display_name,
        avatar_url: row.avatar_url,
        created_at: parse_timestamp(&row.created_at)?,
        active: row.active,
    })
}

fn credential_from_row(row: CredentialRow) -> Result<Credential> {
    Ok(Credential {
        id: parse_uuid(&row.id)?,
        tenant_id: parse_uuid(&row.tenant_id)?,
        provider: parse_provider(&row.provider)?,
        encrypted_secret: row.encrypted_secret,
        proxy_key: row.proxy_key,
        created_at: parse_timestamp(&row.created_at)?,
        last_used_at: row.last_used_at.map(|s| parse_timestamp(&s)).transpose()?,
        active: row.active,
    })
}

fn usage_log_from_row(row: UsageLogRow) -> Result<UsageLog> {
    Ok(UsageLog {
        id: parse_uuid(&row.id)?,
        tenant_id: parse_uuid(&row.tenant_id)?,
        provider: parse_provider(&row.provider)?,
        model: row.model,
        input_tokens: row.input_tokens,
        output_tokens: row.output_tokens,
        cost_usd: parse_decimal(&row.cost_usd)?,
        latency_ms: row.latency_ms,
        cache_hit: row.cache_hit,
        created_at: parse_timestamp(&row.created_at)?,
    })
}

fn tag_from_row(row: TagRow) -> Result<Tag> {
    Ok(Tag {
        id: parse_uuid(&row.id)?,
        tenant_id: parse_uuid(&row.tenant_id)?,
        name: row.name,
        color: row.color,
        created_at: parse_timestamp(&row.created_at)?,
    })
}

fn budget_from_row(row: BudgetRow) -> Result<Budget> {
    Ok(Budget {
        id: parse_uuid(&row.id)?,
        tenant_id: parse_uuid(&row.tenant_id)?,
        amount_usd: parse_decimal(&row.amount_usd)?,
        period: match row.period.as_str() {
            "monthly" => BudgetPeriod::Monthly,
            other => return Err(LlmLabError::internal(format!("unknown budget period '{other}'"))),
        },
        alert_threshold_pct: parse_decimal(&row.alert_threshold_pct)?,
        created_at: parse_timestamp(&row.created_at)?,
        updated_at: parse_timestamp(&row.updated_at)?,
    })
}

fn webhook_from_row(row: WebhookRow) -> Result<Webhook> {
    Ok(Webhook {
        id: parse_uuid(&row.id)?,
        tenant_id: parse_uuid(&row.tenant_id)?,
        url: row.url,
        event_type: WebhookEventType::from_str_opt(&row.event_type)
            .ok_or_else(|| LlmLabError::internal(format!("unknown webhook event '{}'", row.event_type)))?,
        active: row.active,
        created_at: parse_timestamp(&row.created_at)?,
    })
}

#[async_trait::async_trait]
pub trait TenantRepository: Send + Sync {
    async fn create(&self, tenant: &Tenant) -> Result<()>;
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Tenant>>;
    async fn get_by_external_id(&self, external_id: &str) -> Result<Option<Tenant>>;
}

#[async_trait::async_trait]
pub trait CredentialRepository: Send + Sync {
    async fn create(&self, credential: &Credential) -> Result<()>;
    async fn get_by_proxy_key(&self, proxy_key: &str) -> Result<Option<Credential>>;
    async fn list_by_tenant(&self, tenant_id: Uuid) -> Result<Vec<Credential>>;
    async fn get_active_for_tenant_provider(&self, tenant_id: Uuid, provider: Provider) -> Result<Option<Credential>>;
    async fn deactivate(&self, id: Uuid, tenant_id: Uuid) -> Result<bool>;
    async fn touch_last_used(&self, id: Uuid) -> Result<()>;
}

#[async_trait::async_trait]
pub trait UsageLogRepository: Send + Sync {
    async fn create(&self, log: &UsageLog, tag_ids: &[Uuid]) -> Result<()>;
    async fn get_by_id(&self, id: Uuid, tenant_id: Uuid) -> Result<Option<UsageLog>>;
    async fn list(&self, tenant_id: Uuid, filter: &LogFilter) -> Result<Vec<UsageLog>>;
    async fn count(&self, tenant_id: Uuid, filter: &LogFilter) -> Result<i64>;
    async fn sum_cost_since(&self, tenant_id: Uuid, since: DateTime<Utc>) -> Result<Decimal>;
    async fn daily_costs(&self, tenant_id: Uuid, days: i64) -> Result<Vec<(chrono::NaiveDate, Decimal)>>;
    async fn daily_tokens(&self, tenant_id: Uuid, days: i64) -> Result<Vec<(chrono::NaiveDate, i64)>>;
}

#[async_trait::async_trait]
pub trait TagRepository: Send + Sync {
    async fn get_or_create(&self, tenant_id: Uuid, name: &str) -> Result<Tag>;
    async fn list_by_tenant(&self, tenant_id: Uuid) -> Result<Vec<Tag>>;
    async fn attach(&self, usage_log_id: Uuid, tag_id: Uuid) -> Result<()>;
    async fn detach(&self, usage_log_id: Uuid, tag_id: Uuid) -> Result<()>;
    async fn delete(&self, id: Uuid, tenant_id: Uuid) -> Result<bool>;
}

#[async_trait::async_trait]
pub trait BudgetRepository: Send + Sync {
    async fn upsert(&self, budget: &Budget) -> Result<()>;
    async fn get_by_tenant(&self, tenant_id: Uuid) -> Result<Option<Budget>>;
}

#[async_trait::async_trait]
pub trait WebhookRepository: Send + Sync {
    async fn create(&self, webhook: &Webhook) -> Result<()>;
    async fn list_by_tenant(&self, tenant_id: Uuid) -> Result<Vec<Webhook>>;
    async fn list_active_for_event(&self, tenant_id: Uuid, event_type: WebhookEventType) -> Result<Vec<Webhook>>;
    async fn delete(&self, id: Uuid, tenant_id: Uuid) -> Result<bool>;
}

#[derive(Clone)]
pub struct SqliteTenantRepository {
    pool: Pool<Sqlite>,
}

impl SqliteTenantRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl TenantRepository for SqliteTenantRepository {
    async fn create(&self, tenant: &Tenant) -> Result<()> {
        info!(tenant_id = %tenant.id, "creating tenant");
        sqlx::query(
            "INSERT INTO tenants (id, external_id, email, display_name, avatar_url, created_at, active)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(tenant.id.to_string())
        .bind(&tenant.external_id)
        .bind(&tenant.email)
        .bind(&tenant.display_name)
        .bind(&tenant.avatar_url)
        .bind(tenant.created_at.to_rfc3339())
        .bind(tenant.active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Tenant>> {
        let row = sqlx::query_as::<_, TenantRow>("SELECT * FROM tenants WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(tenant_from_row).transpose()
    }

    async fn get_by_external_id(&self, external_id: &str) -> Result<Option<Tenant>> {
        let row = sqlx::query_as::<_, TenantRow>("SELECT * FROM tenants WHERE external_id = ?")
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(tenant_from_row).transpose()
    }
}

#[derive(Clone)]
pub struct SqliteCredentialRepository {
    pool: Pool<Sqlite>,
}

impl SqliteCredentialRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CredentialRepository for SqliteCredentialRepository {
    async fn create(&self, credential: &Credential) -> Result<()> {
        info!(credential_id = %credential.id, "creating credential");
        sqlx::query(
            "INSERT INTO credentials (id, tenant_id, provider, encrypted_secret, proxy_key, created_at, last_used_at, active)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(credential.id.to_string())
        .bind(credential.tenant_id.to_string())
        .bind(credential.provider.as_str())
        .bind(&credential.encrypted_secret)
        .bind(&credential.proxy_key)
        .bind(credential.created_at.to_rfc3339())
        .bind(credential.last_used_at.map(|t| t.to_rfc3339()))
        .bind(credential.active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_by_proxy_key(&self, proxy_key: &str) -> Result<Option<Credential>> {
        let row = sqlx::query_as::<_, CredentialRow>(
            "SELECT * FROM credentials WHERE proxy_key = ? AND active = 1",
        )
        .bind(proxy_key)
        .fetch_optional(&self.pool)
        .await?;
        row.map(credential_from_row).transpose()
    }

    async fn list_by_tenant(&self, tenant_id: Uuid) -> Result<Vec<Credential>> {
        let rows = sqlx::query_as::<_, CredentialRow>(
            "SELECT * FROM credentials WHERE tenant_id = ? ORDER BY created_at DESC",
        )
        .bind(tenant_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(credential_from_row).collect()
    }

    async fn get_active_for_tenant_provider(&self, tenant_id: Uuid, provider: Provider) -> Result<Option<Credential>> {
        let row = sqlx::query_as::<_, CredentialRow>(
            "SELECT * FROM credentials WHERE tenant_id = ? AND provider = ? AND active = 1
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(tenant_id.to_string())
        .bind(provider.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(credential_from_row).transpose()
    }

    async fn deactivate(&self, id: Uuid, tenant_id: Uuid) -> Result<bool> {
        let result = sqlx::query("UPDATE credentials SET active = 0 WHERE id = ? AND tenant_id = ?")
            .bind(id.to_string())
            .bind(tenant_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn touch_last_used(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE credentials SET last_used_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct SqliteUsageLogRepository {
    pool: Pool<Sqlite>,
}

impl SqliteUsageLogRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    fn build_where(&self, tenant_id: Uuid, filter: &LogFilter, args: &mut Vec<String>) -> String {
        let mut clauses = vec!["tenant_id = ?".to_string()];
        args.push(tenant_id.to_string());

        if let Some(provider) = filter.provider {
            clauses.push("provider = ?".to_string());
            args.push(provider.as_str().to_string());
        }
        if let Some(model) = &filter.model {
            clauses.push("model = ?".to_string());
            args.push(model.clone());
        }
        if let Some(from) = filter.date_from {
            clauses.push("created_at >= ?".to_string());
            args.push(from.and_hms_opt(0, 0, 0).unwrap().and_utc().to_rfc3339());
        }
        if let Some(to) = filter.date_to {
            clauses.push("created_at <= ?".to_string());
            args.push(to.and_hms_opt(23, 59, 59).unwrap().and_utc().to_rfc3339());
        }
        if let Some(tag) = &filter.tag {
            clauses.push(
                "id IN (SELECT usage_log_id FROM usage_log_tags ult JOIN tags t ON t.id = ult.tag_id WHERE t.name = ?)"
                    .to_string(),
            );
            args.push(tag.clone());
        }
        clauses.join(" AND ")
    }
}

#[async_trait::async_trait]
impl UsageLogRepository for SqliteUsageLogRepository {
    async fn create(&self, log: &UsageLog, tag_ids: &[Uuid]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO usage_logs (id, tenant_id, provider, model, input_tokens, output_tokens, cost_usd, latency_ms, cache_hit, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(log.id.to_string())
        .bind(log.tenant_id.to_string())
        .bind(log.provider.as_str())
        .bind(&log.model)
        .bind(log.input_tokens)
        .bind(log.output_tokens)
        .bind(log.cost_usd.to_string())
        .bind(log.latency_ms)
        .bind(log.cache_hit)
        .bind(log.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        for tag_id in tag_ids {
            sqlx::query("INSERT OR IGNORE INTO usage_log_tags (usage_log_id, tag_id) VALUES (?, ?)")
                .bind(log.id.to_string())
                .bind(tag_id.to_string())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid, tenant_id: Uuid) -> Result<Option<UsageLog>> {
        let row = sqlx::query_as::<_, UsageLogRow>("SELECT * FROM usage_logs WHERE id = ? AND tenant_id = ?")
            .bind(id.to_string())
            .bind(tenant_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(usage_log_from_row).transpose()
    }

    async fn list(&self, tenant_id: Uuid, filter: &LogFilter) -> Result<Vec<UsageLog>> {
        let mut args = Vec::new();
        let where_clause = self.build_where(tenant_id, filter, &mut args);
        let sort_col = filter.sort_column();
        let sort_dir = match filter.sort_dir {
            Some(SortDirection::Asc) => "ASC",
            _ => "DESC",
        };
        let page = filter.page.max(1);
        let page_size = filter.page_size.clamp(1, 500);
        let offset = (page - 1) as i64 * page_size as i64;

        let sql = format!(
            "SELECT * FROM usage_logs WHERE {where_clause} ORDER BY {sort_col} {sort_dir} LIMIT ? OFFSET ?"
        );
        let mut query = sqlx::query_as::<_, UsageLogRow>(&sql);
        for arg in &args {
            query = query.bind(arg);
        }
        query = query.bind(page_size as i64).bind(offset);
        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(usage_log_from_row).collect()
    }

    async fn count(&self, tenant_id: Uuid, filter: &LogFilter) -> Result<i64> {
        let mut args = Vec::new();
        let where_clause = self.build_where(tenant_id, filter, &mut args);
        let sql = format!("SELECT COUNT(*) AS n FROM usage_logs WHERE {where_clause}");
        let mut query = sqlx::query(&sql);
        for arg in &args {
            query = query.bind(arg);
        }
        let row = query.fetch_one(&self.pool).await?;
        Ok(row.try_get::<i64, _>("n")?)
    }

    async fn sum_cost_since(&self, tenant_id: Uuid, since: DateTime<Utc>) -> Result<Decimal> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(CAST(cost_usd AS REAL)), 0) AS total FROM usage_logs
             WHERE tenant_id = ? AND created_at >= ?",
        )
        .bind(tenant_id.to_string())
        .bind(since.to_rfc3339())
        .fetch_one(&self.pool)
        .await?;
        let total: f64 = row.try_get("total")?;
        Decimal::from_f64_retain(total)
            .map(|d| d.round_dp(6))
            .ok_or_else(|| LlmLabError::internal("cost sum overflowed decimal"))
    }

    async fn daily_costs(&self, tenant_id: Uuid, days: i64) -> Result<Vec<(chrono::NaiveDate, Decimal)>> {
        let since = Utc::now() - chrono::Duration::days(days);
        let rows = sqlx::query(
            "SELECT date(created_at) AS day, SUM(CAST(cost_usd AS REAL)) AS total FROM usage_logs
             WHERE tenant_id = ? AND created_at >= ? GROUP BY day ORDER BY day ASC",
        )
        .bind(tenant_id.to_string())
        .bind(since.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                let day_str: String = r.try_get("day")?;
                let total: f64 = r.try_get("total")?;
                let day = chrono::NaiveDate::parse_from_str(&day_str, "%Y-%m-%d")
                    .map_err(|e| LlmLabError::internal(format!("corrupt date in storage: {e}")))?;
                let cost = Decimal::from_f64_retain(total).unwrap_or(Decimal::ZERO).round_dp(6);
                Ok((day, cost))
            })
            .collect()
    }

    async fn daily_tokens(&self, tenant_id: Uuid, days: i64) -> Result<Vec<(chrono::NaiveDate, i64)>> {
        let since = Utc::now() - chrono::Duration::days(days);
        let rows = sqlx::query(
            "SELECT date(created_at) AS day, SUM(input_tokens + output_tokens) AS total FROM usage_logs
             WHERE tenant_id = ? AND created_at >= ? GROUP BY day ORDER BY day ASC",
        )
        .bind(tenant_id.to_string())
        .bind(since.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                let day_str: String = r.try_get("day")?;
                let total: i64 = r.try_get("total")?;
                let day = chrono::NaiveDate::parse_from_str(&day_str, "%Y-%m-%d")
                    .map_err(|e| LlmLabError::internal(format!("corrupt date in storage: {e}")))?;
                Ok((day, total))
            })
            .collect()
    }
}

#[derive(Clone)]
pub struct SqliteTagRepository {
    pool: Pool<Sqlite>,
}

impl SqliteTagRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl TagRepository for SqliteTagRepository {
    /// Inserts the tag if absent; on a unique-constraint conflict from a
    /// concurrent insert of the same `(tenant_id, name)`, re-reads the row
    /// that won instead of erroring (§4.5).
    async fn get_or_create(&self, tenant_id: Uuid, name: &str) -> Result<Tag> {
        if let Some(existing) = sqlx::query_as::<_, TagRow>(
            "SELECT * FROM tags WHERE tenant_id = ? AND name = ?",
        )
        .bind(tenant_id.to_string())
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        {
            return tag_from_row(existing);
        }

        let tag = Tag::new(tenant_id, name);
        let inserted = sqlx::query(
            "INSERT INTO tags (id, tenant_id, name, color, created_at) VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(tenant_id, name) DO NOTHING",
        )
        .bind(tag.id.to_string())
        .bind(tenant_id.to_string())
        .bind(&tag.name)
        .bind(&tag.color)
        .bind(tag.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 1 {
            return Ok(tag);
        }

        let row = sqlx::query_as::<_, TagRow>("SELECT * FROM tags WHERE tenant_id = ? AND name = ?")
            .bind(tenant_id.to_string())
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        tag_from_row(row)
    }

    async fn list_by_tenant(&self, tenant_id: Uuid) -> Result<Vec<Tag>> {
        let rows = sqlx::query_as::<_, TagRow>("SELECT * FROM tags WHERE tenant_id = ? ORDER BY name ASC")
            .bind(tenant_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(tag_from_row).collect()
    }

    async fn attach(&self, usage_log_id: Uuid, tag_id: Uuid) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO usage_log_tags (usage_log_id, tag_id) VALUES (?, ?)")
            .bind(usage_log_id.to_string())
            .bind(tag_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn detach(&self, usage_log_id: Uuid, tag_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM usage_log_tags WHERE usage_log_id = ? AND tag_id = ?")
            .bind(usage_log_id.to_string())
            .bind(tag_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid, tenant_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tags WHERE id = ? AND tenant_id = ?")
            .bind(id.to_string())
            .bind(tenant_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(Clone)]
pub struct SqliteBudgetRepository {
    pool: Pool<Sqlite>,
}

impl SqliteBudgetRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl BudgetRepository for SqliteBudgetRepository {
    /// One active budget per tenant: replaces the existing row if present
    /// (§3, §4.9).
    async fn upsert(&self, budget: &Budget) -> Result<()> {
        let existing = self.get_by_tenant(budget.tenant_id).await?;
        if let Some(existing) = existing {
            sqlx::query(
                "UPDATE budgets SET amount_usd = ?, period = ?, alert_threshold_pct = ?, updated_at = ? WHERE id = ?",
            )
            .bind(budget.amount_usd.to_string())
            .bind("monthly")
            .bind(budget.alert_threshold_pct.to_string())
            .bind(Utc::now().to_rfc3339())
            .bind(existing.id.to_string())
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query(
                "INSERT INTO budgets (id, tenant_id, amount_usd, period, alert_threshold_pct, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(budget.id.to_string())
            .bind(budget.tenant_id.to_string())
            .bind(budget.amount_usd.to_string())
            .bind("monthly")
            .bind(budget.alert_threshold_pct.to_string())
            .bind(budget.created_at.to_rfc3339())
            .bind(budget.updated_at.to_rfc3339())
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn get_by_tenant(&self, tenant_id: Uuid) -> Result<Option<Budget>> {
        let row = sqlx::query_as::<_, BudgetRow>("SELECT * FROM budgets WHERE tenant_id = ?")
            .bind(tenant_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(budget_from_row).transpose()
    }
}

#[derive(Clone)]
pub struct SqliteWebhookRepository {
    pool: Pool<Sqlite>,
}

impl SqliteWebhookRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl WebhookRepository for SqliteWebhookRepository {
    async fn create(&self, webhook: &Webhook) -> Result<()> {
        sqlx::query(
            "INSERT INTO webhooks (id, tenant_id, url, event_type, active, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(webhook.id.to_string())
        .bind(webhook.tenant_id.to_string())
        .bind(&webhook.url)
        .bind(match webhook.event_type {
            WebhookEventType::BudgetWarning => "budget_warning",
            WebhookEventType::BudgetExceeded => "budget_exceeded",
            WebhookEventType::Anomaly => "anomaly",
        })
        .bind(webhook.active)
        .bind(webhook.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_by_tenant(&self, tenant_id: Uuid) -> Result<Vec<Webhook>> {
        let rows = sqlx::query_as::<_, WebhookRow>("SELECT * FROM webhooks WHERE tenant_id = ? ORDER BY created_at DESC")
            .bind(tenant_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(webhook_from_row).collect()
    }

    async fn list_active_for_event(&self, tenant_id: Uuid, event_type: WebhookEventType) -> Result<Vec<Webhook>> {
        let event_str = match event_type {
            WebhookEventType::BudgetWarning => "budget_warning",
            WebhookEventType::BudgetExceeded => "budget_exceeded",
            WebhookEventType::Anomaly => "anomaly",
        };
        let rows = sqlx::query_as::<_, WebhookRow>(
            "SELECT * FROM webhooks WHERE tenant_id = ? AND event_type = ? AND active = 1",
        )
        .bind(tenant_id.to_string())
        .bind(event_str)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(webhook_from_row).collect()
    }

    async fn delete(&self, id: Uuid, tenant_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM webhooks WHERE id = ? AND tenant_id = ?")
            .bind(id.to_string())
            .bind(tenant_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::{DatabaseConfig, DatabasePool};

    async fn test_pool() -> Pool<Sqlite> {
        let pool = DatabasePool::new(&DatabaseConfig::sqlite_memory()).await.unwrap();
        pool.sqlite().clone()
    }

    #[tokio::test]
    async fn tenant_round_trips() {
        let pool = test_pool().await;
        let repo = SqliteTenantRepository::new(pool);
        let tenant = Tenant::new("gh-1", "a@b.com");
        repo.create(&tenant).await.unwrap();
        let fetched = repo.get_by_id(tenant.id).await.unwrap().unwrap();
        assert_eq!(fetched.external_id, "gh-1");
        assert!(fetched.active);
    }

    #[tokio::test]
    async fn credential_resolves_by_proxy_key() {
        let pool = test_pool().await;
        let tenants = SqliteTenantRepository::new(pool.clone());
        let creds = SqliteCredentialRepository::new(pool);
        let tenant = Tenant::new("gh-2", "b@c.com");
        tenants.create(&tenant).await.unwrap();

        let credential = Credential::new(tenant.id, Provider::Openai, "enc-blob".into());
        creds.create(&credential).await.unwrap();

        let resolved = creds.get_by_proxy_key(&credential.proxy_key).await.unwrap().unwrap();
        assert_eq!(resolved.id, credential.id);
        assert_eq!(resolved.provider, Provider::Openai);
    }

    #[tokio::test]
    async fn usage_log_list_is_filterable_and_sorted() {
        let pool = test_pool().await;
        let tenants = SqliteTenantRepository::new(pool.clone());
        let logs = SqliteUsageLogRepository::new(pool);
        let tenant = Tenant::new("gh-3", "c@d.com");
        tenants.create(&tenant).await.unwrap();

        use rust_decimal_macros::dec;
        let log1 = UsageLog::new(tenant.id, Provider::Openai, "gpt-4o", 10, 5, dec!(0.01), 100, false);
        let log2 = UsageLog::new(tenant.id, Provider::Anthropic, "claude-3-5-sonnet-20241022", 20, 10, dec!(0.02), 50, false);
        logs.create(&log1, &[]).await.unwrap();
        logs.create(&log2, &[]).await.unwrap();

        let mut filter = LogFilter::default();
        filter.page = 1;
        filter.page_size = 10;
        let all = logs.list(tenant.id, &filter).await.unwrap();
        assert_eq!(all.len(), 2);

        filter.provider = Some(Provider::Openai);
        let filtered = logs.list(tenant.id, &filter).await.unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].model, "gpt-4o");
    }

    #[tokio::test]
    async fn tag_get_or_create_is_idempotent() {
        let pool = test_pool().await;
        let tenants = SqliteTenantRepository::new(pool.clone());
        let tags = SqliteTagRepository::new(pool);
        let tenant = Tenant::new("gh-4", "d@e.com");
        tenants.create(&tenant).await.unwrap();

        let a = tags.get_or_create(tenant.id, "prod").await.unwrap();
        let b = tags.get_or_create(tenant.id, "prod").await.unwrap();
        assert_eq!(a.id, b.id);
    }

    #[tokio::test]
    async fn tag_delete_removes_it() {
        let pool = test_pool().await;
        let tenants = SqliteTenantRepository::new(pool.clone());
        let tags = SqliteTagRepository::new(pool);
        let tenant = Tenant::new("gh-tag-del", "tag-del@e.com");
        tenants.create(&tenant).await.unwrap();

        let tag = tags.get_or_create(tenant.id, "staging").await.unwrap();
        assert!(tags.delete(tag.id, tenant.id).await.unwrap());
        let remaining = tags.list_by_tenant(tenant.id).await.unwrap();
        assert!(remaining.is_empty());
    }

    #[tokio::test]
    async fn usage_log_get_by_id_scopes_by_tenant() {
        let pool = test_pool().await;
        let tenants = SqliteTenantRepository::new(pool.clone());
        let logs = SqliteUsageLogRepository::new(pool);
        let tenant = Tenant::new("gh-log-get", "log-get@e.com");
        let other = Tenant::new("gh-log-get-2", "log-get-2@e.com");
        tenants.create(&tenant).await.unwrap();
        tenants.create(&other).await.unwrap();

        use rust_decimal_macros::dec;
        let log = UsageLog::new(tenant.id, Provider::Openai, "gpt-4o", 1, 1, dec!(0.001), 10, false);
        logs.create(&log, &[]).await.unwrap();

        assert!(logs.get_by_id(log.id, tenant.id).await.unwrap().is_some());
        assert!(logs.get_by_id(log.id, other.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn budget_upsert_replaces_existing() {
        let pool = test_pool().await;
        let tenants = SqliteTenantRepository::new(pool.clone());
        let budgets = SqliteBudgetRepository::new(pool);
        let tenant = Tenant::new("gh-5", "e@f.com");
        tenants.create(&tenant).await.unwrap();

        use rust_decimal_macros::dec;
        let b1 = Budget::new(tenant.id, dec!(100), dec!(80));
        budgets.upsert(&b1).await.unwrap();
        let b2 = Budget::new(tenant.id, dec!(200), dec!(90));
        budgets.upsert(&b2).await.unwrap();

        let fetched = budgets.get_by_tenant(tenant.id).await.unwrap().unwrap();
        assert_eq!(fetched.amount_usd, dec!(200));
    }
}
