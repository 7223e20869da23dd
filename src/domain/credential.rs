use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::provider::Provider;

pub const PROXY_KEY_PREFIX: &str = "llmlab_pk_";

/// A stored, encrypted provider credential (§3, §4.2). The plaintext secret
/// never lives on this struct — only the encrypted blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub provider: Provider,
    pub encrypted_secret: String,
    pub proxy_key: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub active: bool,
}

impl Credential {
    pub fn new(tenant_id: Uuid, provider: Provider, encrypted_secret: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            provider,
            encrypted_secret,
            proxy_key: generate_proxy_key(),
            created_at: Utc::now(),
            last_used_at: None,
            active: true,
        }
    }
}

/// Generates a proxy key with the fixed namespaced prefix from §6:
/// `llmlab_pk_<32 hex chars>`. 16 random bytes hex-encoded give 32 chars and
/// 128 bits of entropy — collisions are astronomically unlikely, though
/// uniqueness is still enforced at the database layer per §4.2.
pub fn generate_proxy_key() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{PROXY_KEY_PREFIX}{}", hex::encode(bytes))
}

/// A safe-to-display summary of a credential: never exposes the encrypted
/// blob, only a masked hint derived from it (§A.6).
#[derive(Debug, Clone, Serialize)]
pub struct CredentialView {
    pub id: Uuid,
    pub provider: Provider,
    pub proxy_key: String,
    pub masked_hint: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxy_key_has_expected_shape() {
        let key = generate_proxy_key();
        assert!(key.starts_with(PROXY_KEY_PREFIX));
        assert_eq!(key.len(), PROXY_KEY_PREFIX.len() + 32);
        assert!(key[PROXY_KEY_PREFIX.len()..]
            .chars()
            .all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn proxy_keys_are_unique() {
        let a = generate_proxy_key();
        let b = generate_proxy_key();
        assert_ne!(a, b);
    }
}
