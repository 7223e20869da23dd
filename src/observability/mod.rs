//! Ambient observability: tracing init, request-id middleware, health check,
//! Prometheus metrics (§A.1, §A.5).

pub mod health;
pub mod metrics;
pub mod middleware;
pub mod tracing;

pub use health::{check as health_check, mark_started, HealthReport, HealthState};
pub use middleware::request_id;
pub use tracing::RequestId;
