//! Anomaly Detector (§4.10): a fire-and-forget post-metering hook that
//! watches for day-over-day spend and token spikes using a simple Z-score
//! over the trailing two weeks.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::Result;
use crate::storage::{UsageLogRepository, WebhookRepository};
use crate::webhooks;

const TRAILING_DAYS: i64 = 14;
const SPEND_Z_THRESHOLD: f64 = 2.0;
const SPEND_Z_CRITICAL: f64 = 3.0;
const DEGENERATE_SPIKE_MULTIPLE: f64 = 2.0;
const TOKEN_SURGE_RATIO: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Anomaly {
    pub kind: &'static str,
    pub message: String,
    pub severity: Severity,
    pub current_value: f64,
    pub expected_value: f64,
    pub deviation_factor: f64,
}

/// Response shape for `GET /api/v1/stats/anomalies`: the list plus a summary
/// flag so a dashboard can badge the tenant without scanning the array (§8
/// scenario 6: "`has_active_anomaly=true`").
#[derive(Debug, Clone, Serialize)]
pub struct AnomalyReport {
    pub has_active_anomaly: bool,
    pub anomalies: Vec<Anomaly>,
}

#[derive(Serialize)]
struct AnomalyWebhookPayload {
    event: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    message: String,
    severity: &'static str,
    current_value: f64,
    expected_value: f64,
    deviation_factor: f64,
    timestamp: chrono::DateTime<Utc>,
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn std_dev(values: &[f64], avg: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Zero-fills a 14-day daily series so every calendar day in the window is
/// represented, even days with no usage at all (§4.10).
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

fn detect_spend_spike(daily_costs: &[f64]) -> Option<Anomaly> {
    let (hist, today) = daily_costs.split_at(daily_costs.len() - 1);
    let today = today[0];
    let avg = mean(hist);
    let std = std_dev(hist, avg);

    if std > 0.0 && today > 0.0 {
        let z = (today - avg) / std;
        if z >= SPEND_Z_THRESHOLD {
            let severity = if z >= SPEND_Z_CRITICAL { Severity::Critical } else { Severity::Warning };
            return Some(Anomaly {
                kind: "spend_spike",
                message: format!("Daily spend ${today:.2} is {z:.1} standard deviations above the trailing average"),
                severity,
                current_value: today,
                expected_value: avg,
                deviation_factor: z,
            });
        }
    } else if std == 0.0 && avg > 0.0 && today > DEGENERATE_SPIKE_MULTIPLE * avg {
        let factor = today / avg;
        return Some(Anomaly {
            kind: "spend_spike",
            message: format!("Daily spend ${today:.2} is {factor:.1}x the flat trailing average"),
            severity: Severity::Warning,
            current_value: today,
            expected_value: avg,
            deviation_factor: factor,
        });
    }
    None
}

fn detect_token_surge(daily_tokens: &[f64]) -> Option<Anomaly> {
    let (hist, today) = daily_tokens.split_at(daily_tokens.len() - 1);
    let today = today[0];
    let avg = mean(hist);
    if avg <= 0.0 || today <= 0.0 {
        return None;
    }
    let ratio = today / avg;
    if ratio >= TOKEN_SURGE_RATIO {
        return Some(Anomaly {
            kind: "token_surge",
            message: format!("Daily token usage is {ratio:.1}x the trailing average"),
            severity: Severity::Info,
            current_value: today,
            expected_value: avg,
            deviation_factor: ratio,
        });
    }
    None
}

pub struct AnomalyDetector {
    usage_logs: Arc<dyn UsageLogRepository>,
    webhooks: Arc<dyn WebhookRepository>,
    webhook_timeout: Duration,
    fired: Mutex<HashSet<(Uuid, NaiveDate)>>,
}

impl AnomalyDetector {
    pub fn new(usage_logs: Arc<dyn UsageLogRepository>, webhooks: Arc<dyn WebhookRepository>) -> Self {
        Self::with_webhook_timeout(usage_logs, webhooks, Duration::from_secs(10))
    }

    pub fn with_webhook_timeout(
        usage_logs: Arc<dyn UsageLogRepository>,
        webhooks: Arc<dyn WebhookRepository>,
        webhook_timeout: Duration,
    ) -> Self {
        Self {
            usage_logs,
            webhooks,
            webhook_timeout,
            fired: Mutex::new(HashSet::new()),
        }
    }

    /// Runs the post-metering anomaly check for a tenant (§4.6 step 7).
    pub async fn check(&self, tenant_id: Uuid) {
        if let Err(e) = self.check_inner(tenant_id).await {
            tracing::warn!(error = %e, %tenant_id, "anomaly detector check failed");
        }
    }

    /// Computes the current anomalies for a tenant without touching the
    /// fired-dedup set or dispatching webhooks — the read path behind
    /// `GET /api/v1/stats/anomalies`.
    pub async fn detect(&self, tenant_id: Uuid) -> Result<AnomalyReport> {
        let cost_series: Vec<(NaiveDate, f64)> = self
            .usage_logs
            .daily_costs(tenant_id, TRAILING_DAYS)
            .await?
            .into_iter()
            .map(|(d, c)| (d, c.to_f64().unwrap_or(0.0)))
            .collect();
        let token_series: Vec<(NaiveDate, f64)> = self
            .usage_logs
            .daily_tokens(tenant_id, TRAILING_DAYS)
            .await?
            .into_iter()
            .map(|(d, t)| (d, t as f64))
            .collect();

        let daily_costs = zero_filled(&cost_series, TRAILING_DAYS);
        let daily_tokens = zero_filled(&token_series, TRAILING_DAYS);

        let mut anomalies = Vec::new();
        anomalies.extend(detect_spend_spike(&daily_costs));
        anomalies.extend(detect_token_surge(&daily_tokens));
        let has_active_anomaly = anomalies
            .iter()
            .any(|a| matches!(a.severity, Severity::Warning | Severity::Critical));
        Ok(AnomalyReport {
            has_active_anomaly,
            anomalies,
        })
    }

    async fn check_inner(&self, tenant_id: Uuid) -> Result<()> {
        let today = Utc::now().date_naive();
        {
            let mut fired = self.fired.lock().unwrap();
            if fired.contains(&(tenant_id, today)) {
                return Ok(());
            }
        }

        let cost_series: Vec<(NaiveDate, f64)> = self
            .usage_logs
            .daily_costs(tenant_id, TRAILING_DAYS)
            .await?
            .into_iter()
            .map(|(d, c)| (d, c.to_f64().unwrap_or(0.0)))
            .collect();
        let token_series: Vec<(NaiveDate, f64)> = self
            .usage_logs
            .daily_tokens(tenant_id, TRAILING_DAYS)
            .await?
            .into_iter()
            .map(|(d, t)| (d, t as f64))
            .collect();

        let daily_costs = zero_filled(&cost_series, TRAILING_DAYS);
        let daily_tokens = zero_filled(&token_series, TRAILING_DAYS);

        let mut anomalies = Vec::new();
        anomalies.extend(detect_spend_spike(&daily_costs));
        anomalies.extend(detect_token_surge(&daily_tokens));

        let dispatchable: Vec<&Anomaly> = anomalies
            .iter()
            .filter(|a| matches!(a.severity, Severity::Warning | Severity::Critical))
            .collect();
        if dispatchable.is_empty() {
            return Ok(());
        }

        let targets = self
            .webhooks
            .list_active_for_event(tenant_id, crate::domain::WebhookEventType::Anomaly)
            .await?;

        {
            let mut fired = self.fired.lock().unwrap();
            fired.insert((tenant_id, today));
        }

        if targets.is_empty() {
            return Ok(());
        }

        for anomaly in dispatchable {
            let payload = AnomalyWebhookPayload {
                event: "anomaly",
                kind: anomaly.kind,
                message: anomaly.message.clone(),
                severity: anomaly.severity.as_str(),
                current_value: anomaly.current_value,
                expected_value: anomaly.expected_value,
                deviation_factor: anomaly.deviation_factor,
                timestamp: Utc::now(),
            };
            for webhook in &targets {
                webhooks::dispatch(&webhook.url, &payload, self.webhook_timeout).await;
            }
        }

        Ok(())
    }
}
