//! Persistence layer: connection pooling, row models, and repositories.

pub mod database;
pub mod models;
pub mod repository;

pub use database::{DatabaseConfig, DatabasePool, DatabaseType, PoolStats};
pub use repository::{
    BudgetRepository, CredentialRepository, SqliteBudgetRepository, SqliteCredentialRepository,
    SqliteTagRepository, SqliteTenantRepository, SqliteUsageLogRepository, SqliteWebhookRepository,
    TagRepository, TenantRepository, UsageLogRepository, WebhookRepository,
};
