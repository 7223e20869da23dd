//! HTTP surface (§6): `AppState` composition and router assembly.
//!
//! Grounded on `ingestion/webhook.rs`'s router/layer composition order
//! (metrics → trace → cors) and bootstrap shape, generalized from one
//! webhook-ingestion route pair to the full set of non-proxy routes plus the
//! proxy catch-all.

mod auth;
mod budgets;
mod cache;
mod export;
mod keys;
mod logs;
mod stats;
mod tags;
mod webhooks;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{delete, get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};

use crate::anomaly::AnomalyDetector;
use crate::auth::{GithubIdentityProvider, IdentityProvider, JwtIssuer};
use crate::budget_watcher::BudgetWatcher;
use crate::cache::{CacheBackendKind, MemoryCache, RedisCache, ResponseCache};
use crate::config::AppConfig;
use crate::crypto::EncryptionKey;
use crate::proxy::PipelineDeps;
use crate::storage::{
    BudgetRepository, CredentialRepository, DatabasePool, SqliteBudgetRepository, SqliteCredentialRepository,
    SqliteTagRepository, SqliteTenantRepository, SqliteUsageLogRepository, SqliteWebhookRepository, TagRepository,
    TenantRepository, UsageLogRepository, WebhookRepository,
};
use crate::tags::TagRegistry;

/// Everything a handler might need, composed once at startup and cheap to
/// clone (every field is already an `Arc` or `Clone`-cheap value).
#[derive(Clone)]
pub struct AppState {
    pub pool: DatabasePool,
    pub tenants: Arc<dyn TenantRepository>,
    pub credentials: Arc<dyn CredentialRepository>,
    pub usage_logs: Arc<dyn UsageLogRepository>,
    pub tag_repo: Arc<dyn TagRepository>,
    pub tags: Arc<TagRegistry>,
    pub budgets: Arc<dyn BudgetRepository>,
    pub webhook_repo: Arc<dyn WebhookRepository>,
    pub cache: Arc<dyn ResponseCache>,
    pub aggregator: Arc<crate::aggregator::Aggregator>,
    pub budget_watcher: Arc<BudgetWatcher>,
    pub anomaly_detector: Arc<AnomalyDetector>,
    pub jwt_issuer: Arc<JwtIssuer>,
    pub encryption_key: EncryptionKey,
    pub identity_providers: Arc<HashMap<&'static str, Arc<dyn IdentityProvider>>>,
    pub pipeline_deps: Arc<PipelineDeps>,
    pub metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
}

impl AppState {
    pub async fn build(pool: DatabasePool, config: &AppConfig) -> anyhow::Result<Self> {
        let sqlite = pool.sqlite().clone();
        let pool_handle = pool.clone();
        let metrics_handle = crate::observability::metrics::install();

        let tenants: Arc<dyn TenantRepository> = Arc::new(SqliteTenantRepository::new(sqlite.clone()));
        let credentials: Arc<dyn CredentialRepository> = Arc::new(SqliteCredentialRepository::new(sqlite.clone()));
        let usage_logs: Arc<dyn UsageLogRepository> = Arc::new(SqliteUsageLogRepository::new(sqlite.clone()));
        let tag_repo: Arc<dyn TagRepository> = Arc::new(SqliteTagRepository::new(sqlite.clone()));
        let budgets: Arc<dyn BudgetRepository> = Arc::new(SqliteBudgetRepository::new(sqlite.clone()));
        let webhook_repo: Arc<dyn WebhookRepository> = Arc::new(SqliteWebhookRepository::new(sqlite.clone()));

        let tags = Arc::new(TagRegistry::new(tag_repo.clone()));

        let cache: Arc<dyn ResponseCache> = match config.cache.backend {
            CacheBackendKind::InProcess => Arc::new(MemoryCache::new(config.cache.max_entries)),
            CacheBackendKind::External => {
                let url = config
                    .cache
                    .redis_url
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("cache.backend = external requires cache.redis_url"))?;
                Arc::new(RedisCache::new(url).await?)
            }
        };

        let aggregator = Arc::new(crate::aggregator::Aggregator::new(sqlite.clone()));
        let webhook_timeout = std::time::Duration::from_secs(config.webhook_timeout_secs);
        let budget_watcher = Arc::new(BudgetWatcher::with_webhook_timeout(
            budgets.clone(),
            usage_logs.clone(),
            webhook_repo.clone(),
            webhook_timeout,
        ));
        let anomaly_detector = Arc::new(AnomalyDetector::with_webhook_timeout(
            usage_logs.clone(),
            webhook_repo.clone(),
            webhook_timeout,
        ));

        let jwt_issuer = Arc::new(JwtIssuer::new(
            &config.auth.jwt_secret,
            config.auth.jwt_issuer.clone(),
            config.auth.jwt_audience.clone(),
            config.auth.access_token_ttl_secs,
        ));

        let encryption_key = EncryptionKey::from_passphrase(&config.crypto.encryption_key);

        let mut identity_providers: HashMap<&'static str, Arc<dyn IdentityProvider>> = HashMap::new();
        identity_providers.insert("github", Arc::new(GithubIdentityProvider));

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.upstream_timeout_secs))
            .build()?;

        let budget_watcher_hook = budget_watcher.clone();
        let anomaly_detector_hook = anomaly_detector.clone();
        let on_metered: Arc<dyn Fn(uuid::Uuid) + Send + Sync> = Arc::new(move |tenant_id| {
            let budget_watcher = budget_watcher_hook.clone();
            let anomaly_detector = anomaly_detector_hook.clone();
            tokio::spawn(async move {
                budget_watcher.check(tenant_id).await;
                anomaly_detector.check(tenant_id).await;
            });
        });

        let pipeline_deps = Arc::new(PipelineDeps {
            http_client,
            credentials: credentials.clone(),
            usage_logs: usage_logs.clone(),
            cache: cache.clone(),
            cache_ttl: Duration::from_secs(config.cache.default_ttl_secs),
            tags: tags.clone(),
            upstream_timeout: Duration::from_secs(config.upstream_timeout_secs),
            encryption_key: encryption_key.clone(),
            providers: config.providers.clone(),
            on_metered: Some(on_metered),
        });

        Ok(Self {
            pool: pool_handle,
            tenants,
            credentials,
            usage_logs,
            tag_repo,
            tags,
            budgets,
            webhook_repo,
            cache,
            aggregator,
            budget_watcher,
            anomaly_detector,
            jwt_issuer,
            encryption_key,
            identity_providers: Arc::new(identity_providers),
            pipeline_deps,
            metrics_handle,
        })
    }
}

/// Builds the full router: unauthenticated `/health` and `/auth/*`, the
/// proxy catch-all (authenticated against a proxy key, not a JWT), and the
/// JWT-gated `/api/v1/*` surface.
pub fn build_router(state: AppState) -> Router {
    let public = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/auth/:provider", post(auth::exchange))
        .with_state(state.clone());

    let proxied = Router::new()
        .route(
            "/api/v1/proxy/:provider/*passthrough",
            get(crate::proxy::run).post(crate::proxy::run).put(crate::proxy::run).delete(crate::proxy::run),
        )
        .with_state(state.pipeline_deps.clone());

    let authenticated = Router::new()
        .route("/api/v1/me", get(auth::me))
        .route("/api/v1/keys", get(keys::list).post(keys::create))
        .route("/api/v1/keys/:id", delete(keys::deactivate))
        .route("/api/v1/stats", get(stats::summary))
        .route("/api/v1/stats/by-model", get(stats::by_model))
        .route("/api/v1/stats/by-day", get(stats::by_day))
        .route("/api/v1/stats/heatmap", get(stats::heatmap))
        .route("/api/v1/stats/comparison", get(stats::comparison))
        .route("/api/v1/stats/forecast", get(stats::forecast))
        .route("/api/v1/stats/anomalies", get(stats::anomalies))
        .route("/api/v1/stats/cache-savings", get(stats::cache_savings))
        .route("/api/v1/logs", get(logs::list))
        .route("/api/v1/logs/:id", get(logs::get))
        .route("/api/v1/logs/:id/tags", post(logs::attach_tag))
        .route("/api/v1/logs/:id/tags/:tag_id", delete(logs::detach_tag))
        .route("/api/v1/tags", get(tags::list).post(tags::create))
        .route("/api/v1/tags/:id", delete(tags::remove))
        .route("/api/v1/budgets", get(budgets::get).post(budgets::upsert))
        .route("/api/v1/webhooks", get(webhooks::list).post(webhooks::create))
        .route("/api/v1/webhooks/:id", delete(webhooks::remove))
        .route("/api/v1/export/csv", get(export::csv))
        .route("/api/v1/export/json", get(export::json))
        .route("/api/v1/cache/stats", get(cache::stats))
        .route("/api/v1/cache", delete(cache::clear))
        .route_layer(axum::middleware::from_fn_with_state(
            state.jwt_issuer.clone(),
            crate::auth::require_jwt,
        ))
        .with_state(state);

    public
        .merge(proxied)
        .merge(authenticated)
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(crate::observability::request_id))
                .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::new().level(tracing::Level::INFO)))
                .layer(CorsLayer::permissive()),
        )
}

async fn health_handler(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> axum::Json<crate::observability::HealthReport> {
    axum::Json(crate::observability::health_check(&state.pool).await)
}

async fn metrics_handler(axum::extract::State(state): axum::extract::State<AppState>) -> String {
    state.metrics_handle.render()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[tokio::test]
    async fn app_state_builds_with_defaults() {
        let config = AppConfig::default_sqlite();
        let pool = DatabasePool::new(&config.database).await.unwrap();
        let state = AppState::build(pool, &config).await.unwrap();
        assert!(state.tenants.get_by_id(uuid::Uuid::new_v4()).await.unwrap().is_none());
    }
}
