use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};

use super::{CacheStats, CachedMetadata, ResponseCache};

const KEY_PREFIX: &str = "llmlab:cache:";

/// External-KV wrapper stored as JSON with hex-encoded body (§4.3: "body
/// stored as hex-encoded bytes inside a JSON wrapper").
#[derive(Serialize, Deserialize)]
struct Wrapper {
    body_hex: String,
    metadata: CachedMetadata,
}

/// Redis-backed response cache. All errors degrade to a miss per §4.3 ("All
/// errors degrade to miss (never fail the request)") — a flaky cache must
/// never take down the proxy data plane.
pub struct RedisCache {
    client: redis::Client,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl RedisCache {
    pub fn new(redis_url: &str) -> Result<Self, redis::RedisError> {
        Ok(Self {
            client: redis::Client::open(redis_url)?,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    fn namespaced(key: &str) -> String {
        format!("{KEY_PREFIX}{key}")
    }
}

#[async_trait]
impl ResponseCache for RedisCache {
    async fn get(&self, key: &str) -> Option<(Vec<u8>, CachedMetadata)> {
        let result: redis::RedisResult<Option<String>> = async {
            let mut conn = self.client.get_multiplexed_async_connection().await?;
            conn.get(Self::namespaced(key)).await
        }
        .await;

        match result {
            Ok(Some(raw)) => match serde_json::from_str::<Wrapper>(&raw) {
                Ok(wrapper) => match hex::decode(&wrapper.body_hex) {
                    Ok(body) => {
                        self.hits.fetch_add(1, Ordering::Relaxed);
                        Some((body, wrapper.metadata))
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "corrupt cache entry body hex, treating as miss");
                        self.misses.fetch_add(1, Ordering::Relaxed);
                        None
                    }
                },
                Err(e) => {
                    tracing::warn!(error = %e, "corrupt cache entry json, treating as miss");
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    None
                }
            },
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "redis cache backend error, treating as miss");
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    async fn set(&self, key: String, body: Vec<u8>, metadata: CachedMetadata, ttl: Duration) {
        let wrapper = Wrapper {
            body_hex: hex::encode(&body),
            metadata,
        };
        let Ok(payload) = serde_json::to_string(&wrapper) else {
            tracing::warn!("failed to serialize cache entry, dropping write");
            return;
        };
        let ttl_secs = if ttl.is_zero() { 3600 } else { ttl.as_secs() };

        let result: redis::RedisResult<()> = async {
            let mut conn = self.client.get_multiplexed_async_connection().await?;
            conn.set_ex(Self::namespaced(&key), payload, ttl_secs).await
        }
        .await;

        if let Err(e) = result {
            tracing::warn!(error = %e, "redis cache write failed, request proceeds uncached");
        }
    }

    async fn clear(&self) {
        let result: redis::RedisResult<()> = async {
            let mut conn = self.client.get_multiplexed_async_connection().await?;
            let keys: Vec<String> = conn.keys(format!("{KEY_PREFIX}*")).await?;
            if !keys.is_empty() {
                conn.del(keys).await?;
            }
            Ok(())
        }
        .await;
        if let Err(e) = result {
            tracing::warn!(error = %e, "redis cache clear failed");
        }
    }

    async fn stats(&self) -> CacheStats {
        let size: usize = async {
            let mut conn = self.client.get_multiplexed_async_connection().await?;
            let keys: Vec<String> = conn.keys(format!("{KEY_PREFIX}*")).await?;
            redis::RedisResult::Ok(keys.len())
        }
        .await
        .unwrap_or(0);

        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            size,
            max_size: usize::MAX,
        }
    }
}
