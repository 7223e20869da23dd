//! Database connection and pool management.
//!
//! Generalizes the teacher's `SqlitePool`/`PostgresPool`/`DatabasePool`
//! wrapper (same health-check, migration-runner, and pool-stats shape) to
//! LLMLab's schema. SQLite is the only backend: every tenant, credential, and
//! usage-log repository is written against `Pool<Sqlite>` (see
//! `storage/repository.rs`), and spec.md never calls for a second one.

use serde::{Deserialize, Serialize};
use sqlx::{migrate::MigrateDatabase, Pool, Sqlite};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::domain::{LlmLabError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub database_type: DatabaseType,
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
}

fn default_max_connections() -> u32 {
    10
}

fn default_connection_timeout() -> u64 {
    30
}

fn default_run_migrations() -> bool {
    true
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_type: DatabaseType::Sqlite,
            url: "sqlite::memory:".to_string(),
            max_connections: default_max_connections(),
            connection_timeout_secs: default_connection_timeout(),
            run_migrations: default_run_migrations(),
        }
    }
}

impl DatabaseConfig {
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self {
            database_type: DatabaseType::Sqlite,
            url: format!("sqlite://{}", path.into()),
            ..Default::default()
        }
    }

    pub fn sqlite_memory() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            return Err(LlmLabError::internal("database URL cannot be empty"));
        }
        if self.max_connections == 0 {
            return Err(LlmLabError::internal("max connections must be greater than 0"));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct SqlitePoolWrapper {
    pool: Pool<Sqlite>,
}

impl SqlitePoolWrapper {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        config.validate()?;
        info!(url = %config.url, "creating sqlite connection pool");

        if !config.url.contains(":memory:") && !Sqlite::database_exists(&config.url).await.unwrap_or(false) {
            info!(url = %config.url, "creating sqlite database file");
            Sqlite::create_database(&config.url).await?;
        }

        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_secs))
            .connect_with(
                sqlx::sqlite::SqliteConnectOptions::from_str(&config.url)?
                    .create_if_missing(true)
                    .busy_timeout(Duration::from_secs(config.connection_timeout_secs))
                    .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                    .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                    .foreign_keys(true),
            )
            .await?;

        let wrapper = Self { pool };
        if config.run_migrations {
            wrapper.run_migrations().await?;
        }
        info!("sqlite pool ready");
        Ok(wrapper)
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<()> {
        info!("running sqlite migrations");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            connections: self.pool.size(),
            idle_connections: self.pool.num_idle() as u32,
        }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PoolStats {
    pub connections: u32,
    pub idle_connections: u32,
}

/// Unified pool handle threaded through [`crate::api::AppState`]. A single
/// variant today, kept as an enum (rather than a bare `SqlitePoolWrapper`) so
/// callers go through `health_check`/`stats`/`sqlite` instead of reaching
/// into the wrapper directly.
#[derive(Clone)]
pub enum DatabasePool {
    Sqlite(SqlitePoolWrapper),
}

impl DatabasePool {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        match config.database_type {
            DatabaseType::Sqlite => Ok(DatabasePool::Sqlite(SqlitePoolWrapper::new(config).await?)),
        }
    }

    pub async fn health_check(&self) -> Result<()> {
        match self {
            DatabasePool::Sqlite(p) => p.health_check().await,
        }
    }

    pub fn stats(&self) -> PoolStats {
        match self {
            DatabasePool::Sqlite(p) => p.stats(),
        }
    }

    pub fn sqlite(&self) -> &Pool<Sqlite> {
        match self {
            DatabasePool::Sqlite(p) => p.pool(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_empty_url() {
        let mut config = DatabaseConfig::sqlite_memory();
        config.url = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validates_zero_max_connections() {
        let mut config = DatabaseConfig::sqlite_memory();
        config.max_connections = 0;
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn sqlite_pool_creation_and_migration() {
        let config = DatabaseConfig::sqlite_memory();
        let pool = DatabasePool::new(&config).await.expect("pool creation");
        pool.health_check().await.expect("health check");
    }
}
