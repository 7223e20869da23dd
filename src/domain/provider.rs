use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::LlmLabError;

/// The three upstream LLM providers LLMLab knows how to meter (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Openai,
    Anthropic,
    Google,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Openai => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Google => "google",
        }
    }

    /// Parses the `{provider}` path segment of `/api/v1/proxy/{provider}/...`.
    pub fn from_path_segment(s: &str) -> Result<Self, LlmLabError> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::Openai),
            "anthropic" => Ok(Provider::Anthropic),
            "google" => Ok(Provider::Google),
            other => Err(LlmLabError::validation(format!(
                "unknown provider '{other}'"
            ))),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Provider {
    type Err = LlmLabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_path_segment(s)
    }
}
