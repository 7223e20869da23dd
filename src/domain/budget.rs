use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetPeriod {
    Monthly,
}

/// A tenant's spend ceiling (§3, §4.9). Upsert semantics: one active budget
/// per tenant; a `POST` replaces the existing row if present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Budget {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub amount_usd: Decimal,
    pub period: BudgetPeriod,
    pub alert_threshold_pct: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Budget {
    pub fn new(tenant_id: Uuid, amount_usd: Decimal, alert_threshold_pct: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            amount_usd,
            period: BudgetPeriod::Monthly,
            alert_threshold_pct,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Alert status per §4.9's threshold computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetAlertStatus {
    BudgetWarning,
    BudgetExceeded,
}

impl BudgetAlertStatus {
    pub fn as_event_str(&self) -> &'static str {
        match self {
            BudgetAlertStatus::BudgetWarning => "budget_warning",
            BudgetAlertStatus::BudgetExceeded => "budget_exceeded",
        }
    }
}

/// The exact rule from §4.9:
/// `pct >= 100 -> exceeded; pct >= threshold -> warning; else no alert`.
pub fn classify(current_spend: Decimal, amount: Decimal, threshold_pct: Decimal) -> Option<(BudgetAlertStatus, Decimal)> {
    if amount <= Decimal::ZERO {
        return None;
    }
    let pct = current_spend / amount * Decimal::from(100);
    if pct >= Decimal::from(100) {
        Some((BudgetAlertStatus::BudgetExceeded, pct))
    } else if pct >= threshold_pct {
        Some((BudgetAlertStatus::BudgetWarning, pct))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn warning_threshold_crossed() {
        let (status, pct) = classify(dec!(85), dec!(100), dec!(80)).unwrap();
        assert_eq!(status, BudgetAlertStatus::BudgetWarning);
        assert_eq!(pct, dec!(85));
    }

    #[test]
    fn exceeded_threshold_crossed() {
        let (status, _) = classify(dec!(120), dec!(100), dec!(80)).unwrap();
        assert_eq!(status, BudgetAlertStatus::BudgetExceeded);
    }

    #[test]
    fn below_threshold_is_none() {
        assert!(classify(dec!(10), dec!(100), dec!(80)).is_none());
    }

    #[test]
    fn zero_amount_never_alerts() {
        assert!(classify(dec!(10), dec!(0), dec!(80)).is_none());
    }
}
