use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events a webhook can subscribe to (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEventType {
    BudgetWarning,
    BudgetExceeded,
    Anomaly,
}

impl WebhookEventType {
    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "budget_warning" => Some(Self::BudgetWarning),
            "budget_exceeded" => Some(Self::BudgetExceeded),
            "anomaly" => Some(Self::Anomaly),
            _ => None,
        }
    }
}

/// A tenant-registered HTTP callback (§3). Multiple allowed per tenant,
/// filtered by event type at dispatch time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Webhook {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub url: String,
    pub event_type: WebhookEventType,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Webhook {
    pub fn new(tenant_id: Uuid, url: impl Into<String>, event_type: WebhookEventType) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            url: url.into(),
            event_type,
            active: true,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_event_types() {
        assert_eq!(
            WebhookEventType::from_str_opt("budget_warning"),
            Some(WebhookEventType::BudgetWarning)
        );
        assert_eq!(WebhookEventType::from_str_opt("bogus"), None);
    }
}
