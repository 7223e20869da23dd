//! JWT minting/validation identifying a tenant on non-proxy routes (§4.12,
//! §6). LLMLab never performs the identity-provider code exchange itself
//! (§A.9) — `POST /auth/github` accepts an already-verified external
//! identity via [`crate::auth::IdentityProvider`] and mints a token here.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{LlmLabError, Result};

/// Claims identifying the tenant. `sub` is the tenant's internal id, not the
/// external identity-provider id — the one thing every non-proxy handler
/// needs to scope its query by.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub iss: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
}

pub struct JwtIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
    ttl_secs: i64,
}

impl JwtIssuer {
    pub fn new(secret: &str, issuer: impl Into<String>, audience: impl Into<String>, ttl_secs: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.into(),
            audience: audience.into(),
            ttl_secs,
        }
    }

    pub fn mint(&self, tenant_id: Uuid) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: tenant_id,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now.timestamp(),
            exp: (now + Duration::seconds(self.ttl_secs)).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| LlmLabError::internal(format!("jwt encoding failed: {e}")))
    }

    pub fn validate(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|_| LlmLabError::auth("invalid or expired token"))
    }
}
