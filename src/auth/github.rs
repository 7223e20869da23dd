//! The `/auth/github` identity source (§A.9). LLMLab never talks to
//! GitHub's OAuth endpoints itself — the caller (typically a thin frontend
//! that already completed the code exchange) posts the identity GitHub
//! returned, and this just validates shape and normalizes it into a
//! [`VerifiedIdentity`].

use serde::Deserialize;

use super::{IdentityProvider, VerifiedIdentity};
use crate::domain::{LlmLabError, Result};

#[derive(Debug, Deserialize)]
struct GithubIdentityPayload {
    id: i64,
    login: String,
    email: Option<String>,
    name: Option<String>,
    avatar_url: Option<String>,
}

pub struct GithubIdentityProvider;

#[async_trait::async_trait]
impl IdentityProvider for GithubIdentityProvider {
    fn name(&self) -> &'static str {
        "github"
    }

    /// `token` is the raw JSON body the caller received from GitHub's
    /// `/user` endpoint after its own code exchange, forwarded verbatim.
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity> {
        let payload: GithubIdentityPayload =
            serde_json::from_str(token).map_err(|e| LlmLabError::auth(format!("malformed github identity: {e}")))?;

        Ok(VerifiedIdentity {
            external_id: format!("github:{}", payload.id),
            email: payload.email.unwrap_or_else(|| format!("{}@users.noreply.github.com", payload.login)),
            display_name: payload.name.or(Some(payload.login)),
            avatar_url: payload.avatar_url,
        })
    }
}
