//! Shared fixtures for the integration suite: an `AppState` wired to an
//! in-memory SQLite database plus a few helpers to get a tenant, a proxy
//! key, and a JWT without going through the real OAuth exchange.

use llmlab::config::AppConfig;
use llmlab::domain::{Credential, Provider, Tenant};
use llmlab::{crypto, AppState, DatabasePool};
use uuid::Uuid;

pub struct TestApp {
    pub state: AppState,
}

impl TestApp {
    pub async fn build(config: AppConfig) -> Self {
        let pool = DatabasePool::new(&config.database).await.expect("failed to open test database");
        let state = AppState::build(pool, &config).await.expect("failed to build app state");
        Self { state }
    }

    pub fn router(&self) -> axum::Router {
        llmlab::api::build_router(self.state.clone())
    }

    /// Registers a tenant and mints a JWT for it, as if it had just
    /// completed the GitHub OAuth exchange (§4.12).
    pub async fn new_tenant_with_token(&self) -> (Uuid, String) {
        let tenant = Tenant::new(format!("gh-{}", Uuid::new_v4()), "tester@example.com");
        self.state.tenants.create(&tenant).await.unwrap();
        let token = self.state.jwt_issuer.mint(tenant.id).unwrap();
        (tenant.id, token)
    }

    /// Stores a provider credential for `tenant_id` and returns the opaque
    /// proxy key a caller would use against `/api/v1/proxy/{provider}/...`.
    pub async fn new_credential(&self, tenant_id: Uuid, provider: Provider, secret: &str) -> String {
        let encrypted = crypto::encrypt(secret, &self.state.encryption_key).unwrap();
        let credential = Credential::new(tenant_id, provider, encrypted);
        let proxy_key = credential.proxy_key.clone();
        self.state.credentials.create(&credential).await.unwrap();
        proxy_key
    }
}

/// A default-sqlite config pointed at `mock_uri` for every provider, so the
/// proxy pipeline forwards to a `wiremock` server instead of the real
/// internet (§9's Open Question on upstream base URLs).
pub fn config_pointed_at(mock_uri: &str) -> AppConfig {
    let mut config = AppConfig::default_sqlite();
    config.providers.openai_base_url = mock_uri.to_string();
    config.providers.anthropic_base_url = mock_uri.to_string();
    config.providers.google_base_url = mock_uri.to_string();
    config
}
