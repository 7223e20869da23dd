//! Budget Watcher (§4.9): a fire-and-forget post-metering hook. After a
//! request is metered, check the tenant's budget against trailing 30-day
//! spend and fan out a webhook the first time a threshold is crossed.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{classify, BudgetAlertStatus, Result, WebhookEventType};
use crate::storage::{BudgetRepository, UsageLogRepository, WebhookRepository};
use crate::webhooks;

const SPEND_WINDOW_DAYS: i64 = 30;

/// `(tenant_id, budget_id, status)` — once a status has fired for a budget
/// in this process's lifetime, it never fires again, even if spend dips
/// below and crosses back over the same threshold (§4.9). At-most-once per
/// process, at-least-once across restarts: a deliberate tradeoff, not a bug.
type FiredKey = (Uuid, Uuid, BudgetAlertStatus);

#[derive(Serialize)]
struct BudgetWebhookPayload {
    event: &'static str,
    budget_id: Uuid,
    budget_amount_usd: Decimal,
    current_spend_usd: Decimal,
    percentage_used: Decimal,
    alert_threshold: Decimal,
    timestamp: chrono::DateTime<Utc>,
}

pub struct BudgetWatcher {
    budgets: Arc<dyn BudgetRepository>,
    usage_logs: Arc<dyn UsageLogRepository>,
    webhooks: Arc<dyn WebhookRepository>,
    webhook_timeout: Duration,
    fired: Mutex<HashSet<FiredKey>>,
}

impl BudgetWatcher {
    pub fn new(
        budgets: Arc<dyn BudgetRepository>,
        usage_logs: Arc<dyn UsageLogRepository>,
        webhooks: Arc<dyn WebhookRepository>,
    ) -> Self {
        Self::with_webhook_timeout(budgets, usage_logs, webhooks, Duration::from_secs(10))
    }

    pub fn with_webhook_timeout(
        budgets: Arc<dyn BudgetRepository>,
        usage_logs: Arc<dyn UsageLogRepository>,
        webhooks: Arc<dyn WebhookRepository>,
        webhook_timeout: Duration,
    ) -> Self {
        Self {
            budgets,
            usage_logs,
            webhooks,
            webhook_timeout,
            fired: Mutex::new(HashSet::new()),
        }
    }

    /// Runs the post-metering check for a tenant (§4.6 step 7). Swallows its
    /// own errors — a failing budget check must never surface to the
    /// request that triggered it.
    pub async fn check(&self, tenant_id: Uuid) {
        if let Err(e) = self.check_inner(tenant_id).await {
            tracing::warn!(error = %e, %tenant_id, "budget watcher check failed");
        }
    }

    async fn check_inner(&self, tenant_id: Uuid) -> Result<()> {
        let Some(budget) = self.budgets.get_by_tenant(tenant_id).await? else {
            return Ok(());
        };

        let since = Utc::now() - ChronoDuration::days(SPEND_WINDOW_DAYS);
        let current_spend = self.usage_logs.sum_cost_since(tenant_id, since).await?;

        let Some((status, percentage_used)) = classify(current_spend, budget.amount_usd, budget.alert_threshold_pct)
        else {
            return Ok(());
        };

        let key = (tenant_id, budget.id, status);
        {
            let mut fired = self.fired.lock().unwrap();
            if fired.contains(&key) {
                return Ok(());
            }
            fired.insert(key);
        }

        let event_type = match status {
            BudgetAlertStatus::BudgetWarning => WebhookEventType::BudgetWarning,
            BudgetAlertStatus::BudgetExceeded => WebhookEventType::BudgetExceeded,
        };
        let targets = self.webhooks.list_active_for_event(tenant_id, event_type).await?;
        if targets.is_empty() {
            return Ok(());
        }

        let payload = BudgetWebhookPayload {
            event: status.as_event_str(),
            budget_id: budget.id,
            budget_amount_usd: budget.amount_usd,
            current_spend_usd: current_spend,
            percentage_used,
            alert_threshold: budget.alert_threshold_pct,
            timestamp: Utc::now(),
        };

        for webhook in targets {
            webhooks::dispatch(&webhook.url, &payload, self.webhook_timeout).await;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Budget, UsageLog, Webhook};
    use crate::storage::database::{DatabaseConfig, DatabasePool};
    use crate::storage::{SqliteBudgetRepository, SqliteUsageLogRepository, SqliteWebhookRepository};
    use rust_decimal_macros::dec;
    use serial_test::serial;

    async fn watcher() -> (BudgetWatcher, Arc<dyn BudgetRepository>, Arc<dyn UsageLogRepository>, Arc<dyn WebhookRepository>) {
        let db = DatabasePool::new(&DatabaseConfig::sqlite_memory()).await.unwrap();
        let pool = db.sqlite().clone();
        let budgets: Arc<dyn BudgetRepository> = Arc::new(SqliteBudgetRepository::new(pool.clone()));
        let usage_logs: Arc<dyn UsageLogRepository> = Arc::new(SqliteUsageLogRepository::new(pool.clone()));
        let webhook_repo: Arc<dyn WebhookRepository> = Arc::new(SqliteWebhookRepository::new(pool));
        let watcher = BudgetWatcher::new(budgets.clone(), usage_logs.clone(), webhook_repo.clone());
        (watcher, budgets, usage_logs, webhook_repo)
    }

    #[tokio::test]
    #[serial]
    async fn no_budget_means_no_check_failure() {
        let (watcher, ..) = watcher().await;
        watcher.check(Uuid::new_v4()).await;
    }

    #[tokio::test]
    #[serial]
    async fn fires_only_once_per_status() {
        let (watcher, budgets, usage_logs, webhook_repo) = watcher().await;
        let tenant_id = Uuid::new_v4();
        budgets.upsert(&Budget::new(tenant_id, dec!(10), dec!(50))).await.unwrap();
        webhook_repo
            .create(&Webhook::new(
                tenant_id,
                "http://127.0.0.1:0/webhook",
                crate::domain::WebhookEventType::BudgetExceeded,
            ))
            .await
            .unwrap();
        usage_logs
            .create(
                &UsageLog::new(tenant_id, crate::domain::Provider::Openai, "gpt-4o", 1, 1, dec!(20), 1, false),
                &[],
            )
            .await
            .unwrap();

        watcher.check(tenant_id).await;
        let first_fired = watcher.fired.lock().unwrap().len();
        watcher.check(tenant_id).await;
        let second_fired = watcher.fired.lock().unwrap().len();
        assert_eq!(first_fired, second_fired);
        assert_eq!(first_fired, 1);
    }
}
