//! Layered configuration (§A.3): defaults, an optional TOML file, then
//! `LLMLAB_*` environment variables, composed with `figment` the same way
//! the teacher's own `Cargo.toml` already pulls in the crate for.

use std::path::PathBuf;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::cache::CacheBackendKind;
use crate::domain::Provider;
use crate::storage::DatabaseConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// AES-256-GCM key material for the Credential Store (§4.2). Required at
/// startup; a missing or malformed key is an `Internal` error raised before
/// the server starts accepting connections, matching §7's classification of
/// encryption failures applied one step earlier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CryptoConfig {
    pub encryption_key: String,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            encryption_key: "dev-only-encryption-key-do-not-use-in-production".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    #[serde(default = "default_access_ttl")]
    pub access_token_ttl_secs: i64,
    #[serde(default = "default_refresh_ttl")]
    pub refresh_token_ttl_secs: i64,
}

fn default_access_ttl() -> i64 {
    3600
}

fn default_refresh_ttl() -> i64 {
    30 * 24 * 3600
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "dev-only-jwt-secret-do-not-use-in-production".to_string(),
            jwt_issuer: "llmlab".to_string(),
            jwt_audience: "llmlab-api".to_string(),
            access_token_ttl_secs: default_access_ttl(),
            refresh_token_ttl_secs: default_refresh_ttl(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackendKind,
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_cache_ttl")]
    pub default_ttl_secs: u64,
    pub redis_url: Option<String>,
}

fn default_cache_max_entries() -> usize {
    10_000
}

fn default_cache_ttl() -> u64 {
    3600
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::InProcess,
            max_entries: default_cache_max_entries(),
            default_ttl_secs: default_cache_ttl(),
            redis_url: None,
        }
    }
}

/// Per-provider upstream endpoints (§4.4). Defaults to the production URLs
/// rather than `localhost` — §9's Open Question on this is resolved in
/// `DESIGN.md`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub openai_base_url: String,
    pub anthropic_base_url: String,
    pub anthropic_version: String,
    pub google_base_url: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            openai_base_url: "https://api.openai.com".to_string(),
            anthropic_base_url: "https://api.anthropic.com".to_string(),
            anthropic_version: "2023-06-01".to_string(),
            google_base_url: "https://generativelanguage.googleapis.com".to_string(),
        }
    }
}

impl ProviderConfig {
    pub fn base_url_for(&self, provider: Provider) -> &str {
        match provider {
            Provider::Openai => &self.openai_base_url,
            Provider::Anthropic => &self.anthropic_base_url,
            Provider::Google => &self.google_base_url,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub crypto: CryptoConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub providers: ProviderConfig,
    #[serde(default = "default_upstream_timeout")]
    pub upstream_timeout_secs: u64,
    #[serde(default = "default_webhook_timeout")]
    pub webhook_timeout_secs: u64,
}

fn default_upstream_timeout() -> u64 {
    120
}

fn default_webhook_timeout() -> u64 {
    10
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            http: HttpConfig::default(),
            logging: LoggingConfig::default(),
            crypto: CryptoConfig::default(),
            auth: AuthConfig::default(),
            cache: CacheConfig::default(),
            providers: ProviderConfig::default(),
            upstream_timeout_secs: default_upstream_timeout(),
            webhook_timeout_secs: default_webhook_timeout(),
        }
    }
}

impl AppConfig {
    /// An all-defaults config pointed at an in-memory SQLite database, for
    /// tests (analogous to the teacher's own `Config::default_sqlite()`).
    pub fn default_sqlite() -> Self {
        Self {
            database: DatabaseConfig::sqlite_memory(),
            ..Self::default()
        }
    }
}

pub struct Config;

impl Config {
    /// Builds the figment provider chain: compiled-in defaults, then an
    /// optional TOML file, then `LLMLAB_*` environment variables, each layer
    /// overriding the last.
    pub fn load() -> anyhow::Result<AppConfig> {
        Self::load_from(None)
    }

    pub fn load_from(path: Option<PathBuf>) -> anyhow::Result<AppConfig> {
        let mut figment = Figment::new().merge(Serialized::defaults(AppConfig::default()));

        if let Some(path) = path.or_else(|| std::env::var("LLMLAB_CONFIG").ok().map(PathBuf::from)) {
            if path.exists() {
                figment = figment.merge(Toml::file(path));
            }
        }

        figment = figment.merge(Env::prefixed("LLMLAB_").split("__"));

        let config: AppConfig = figment.extract()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_sqlite_config_is_in_memory() {
        let config = AppConfig::default_sqlite();
        assert!(config.database.url.contains(":memory:"));
    }

    #[test]
    fn provider_base_urls_default_to_production() {
        let config = ProviderConfig::default();
        assert_eq!(config.base_url_for(Provider::Openai), "https://api.openai.com");
        assert_eq!(config.base_url_for(Provider::Anthropic), "https://api.anthropic.com");
    }

    #[test]
    fn load_falls_back_to_defaults_without_env_or_file() {
        let config = Config::load_from(Some(PathBuf::from("/nonexistent/llmlab.toml"))).unwrap();
        assert_eq!(config.http.port, 8080);
        assert_eq!(config.upstream_timeout_secs, 120);
    }
}
