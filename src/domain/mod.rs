pub mod budget;
pub mod credential;
pub mod error;
pub mod provider;
pub mod tag;
pub mod tenant;
pub mod usage_log;
pub mod webhook;

pub use budget::{classify, Budget, BudgetAlertStatus, BudgetPeriod};
pub use credential::{generate_proxy_key, Credential, CredentialView, PROXY_KEY_PREFIX};
pub use error::{LlmLabError, Result};
pub use provider::Provider;
pub use tag::{is_valid_color, parse_tag_header, Tag, DEFAULT_TAG_COLOR};
pub use tenant::Tenant;
pub use usage_log::{LogFilter, SortDirection, UsageLog, SORT_WHITELIST};
pub use webhook::{Webhook, WebhookEventType};
