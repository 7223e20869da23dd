//! Exact-match response cache (§4.3).
//!
//! Key = `SHA-256(provider ':' body_bytes)`. Two interchangeable backends
//! share the [`ResponseCache`] trait: an in-process LRU+TTL map and an
//! external Redis-backed KV. Writes only ever happen after a successful
//! unary response with at least one observed token (§4.3) — enforced by the
//! proxy pipeline, not by this module.

mod memory;
mod redis_backend;

pub use memory::MemoryCache;
pub use redis_backend::RedisCache;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::Provider;

/// Selects which `ResponseCache` implementation the proxy wires up (§4.3,
/// §A.3): an in-process LRU+TTL map, or an external Redis-backed KV shared
/// across replicas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    #[default]
    InProcess,
    External,
}

/// Metadata captured alongside a cached response body (§3 Cache Entry).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedMetadata {
    pub provider: Provider,
    pub model: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub content_type: String,
    pub status_code: u16,
}

#[derive(Debug, Clone)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub max_size: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Computes the cache key for a `(provider, body)` pair: `SHA-256(provider ‖
/// ':' ‖ body_bytes)`, hex-encoded. Deterministic — identical inputs always
/// produce identical keys (§8).
pub fn cache_key(provider: Provider, body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(provider.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(body);
    hex::encode(hasher.finalize())
}

#[async_trait]
pub trait ResponseCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<(Vec<u8>, CachedMetadata)>;
    async fn set(&self, key: String, body: Vec<u8>, metadata: CachedMetadata, ttl: std::time::Duration);
    async fn clear(&self);
    async fn stats(&self) -> CacheStats;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_deterministic() {
        let a = cache_key(Provider::Openai, b"{\"model\":\"gpt-4o\"}");
        let b = cache_key(Provider::Openai, b"{\"model\":\"gpt-4o\"}");
        assert_eq!(a, b);
    }

    #[test]
    fn cache_key_differs_by_provider() {
        let body = b"{\"model\":\"gpt-4o\"}";
        assert_ne!(
            cache_key(Provider::Openai, body),
            cache_key(Provider::Anthropic, body)
        );
    }

    #[test]
    fn cache_key_differs_by_body() {
        assert_ne!(
            cache_key(Provider::Openai, b"a"),
            cache_key(Provider::Openai, b"b")
        );
    }
}
