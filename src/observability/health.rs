//! `GET /health` (§6, §A.5). Grounded on
//! `original_source/backend/routes/health.py`'s `{status, version,
//! uptime_seconds, database_connected}` shape.

use std::sync::OnceLock;
use std::time::Instant;

use serde::Serialize;

use crate::storage::DatabasePool;

static START_TIME: OnceLock<Instant> = OnceLock::new();

/// Records the process start time. Call once at boot, before serving.
pub fn mark_started() {
    let _ = START_TIME.set(Instant::now());
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthState,
    pub database: bool,
    pub version: &'static str,
    pub uptime_seconds: u64,
}

pub async fn check(pool: &DatabasePool) -> HealthReport {
    let database = pool.health_check().await.is_ok();
    let uptime_seconds = START_TIME.get().map(|t| t.elapsed().as_secs()).unwrap_or(0);
    HealthReport {
        status: if database { HealthState::Healthy } else { HealthState::Degraded },
        database,
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DatabaseConfig;

    #[tokio::test]
    async fn healthy_pool_reports_healthy() {
        let pool = DatabasePool::new(&DatabaseConfig::sqlite_memory()).await.unwrap();
        let report = check(&pool).await;
        assert_eq!(report.status, HealthState::Healthy);
        assert!(report.database);
    }
}
