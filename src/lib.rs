//! LLMLab — a multi-tenant metering reverse proxy in front of third-party
//! LLM HTTP APIs (OpenAI, Anthropic, Google Gemini).
//!
//! A tenant stores a real provider credential once (encrypted at rest),
//! receives an opaque proxy key, and points their SDK's base URL at LLMLab.
//! Every request is forwarded transparently; the response is observed to
//! extract token counts, priced against a per-model table, logged, optionally
//! cached, optionally tagged, and counted against budgets and anomaly
//! detectors.

pub mod aggregator;
pub mod anomaly;
pub mod api;
pub mod auth;
pub mod budget_watcher;
pub mod cache;
pub mod config;
pub mod crypto;
pub mod domain;
pub mod forecast;
pub mod observability;
pub mod pricing;
pub mod providers;
pub mod proxy;
pub mod storage;
pub mod tags;
pub mod webhooks;

pub use domain::{
    Budget, BudgetAlertStatus, BudgetPeriod, Credential, CredentialView, LlmLabError, Provider,
    Result, Tag, Tenant, UsageLog, Webhook, WebhookEventType,
};

pub use api::{AppState, build_router};
pub use config::{AppConfig, Config};
pub use storage::DatabasePool;

/// Library version, echoed in `GET /health`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
