use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;

use super::{CacheStats, CachedMetadata, ResponseCache};

struct Entry {
    body: Vec<u8>,
    metadata: CachedMetadata,
    expires_at: Instant,
}

/// In-process LRU+TTL cache (§4.3). Structural mutations (move-to-front,
/// eviction) serialize under a single lock per the concurrency model (§5):
/// "the in-process backend serializes structural mutations... under a single
/// lock".
pub struct MemoryCache {
    inner: Mutex<LruCache<String, Entry>>,
    default_ttl: Duration,
    hits: std::sync::atomic::AtomicU64,
    misses: std::sync::atomic::AtomicU64,
    max_size: usize,
}

impl MemoryCache {
    pub fn new(max_size: usize, default_ttl: Duration) -> Self {
        let cap = NonZeroUsize::new(max_size).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            inner: Mutex::new(LruCache::new(cap)),
            default_ttl,
            hits: std::sync::atomic::AtomicU64::new(0),
            misses: std::sync::atomic::AtomicU64::new(0),
            max_size,
        }
    }

    pub fn with_default_ttl(max_size: usize) -> Self {
        Self::new(max_size, Duration::from_secs(3600))
    }
}

#[async_trait]
impl ResponseCache for MemoryCache {
    async fn get(&self, key: &str) -> Option<(Vec<u8>, CachedMetadata)> {
        use std::sync::atomic::Ordering;
        let mut guard = self.inner.lock().expect("cache lock poisoned");
        match guard.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                let result = (entry.body.clone(), entry.metadata.clone());
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(result)
            }
            Some(_) => {
                // Expired hits evict on access and count as a miss (§4.3).
                guard.pop(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    async fn set(&self, key: String, body: Vec<u8>, metadata: CachedMetadata, ttl: Duration) {
        let ttl = if ttl.is_zero() { self.default_ttl } else { ttl };
        let mut guard = self.inner.lock().expect("cache lock poisoned");
        guard.put(
            key,
            Entry {
                body,
                metadata,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    async fn clear(&self) {
        let mut guard = self.inner.lock().expect("cache lock poisoned");
        guard.clear();
    }

    async fn stats(&self) -> CacheStats {
        use std::sync::atomic::Ordering;
        let guard = self.inner.lock().expect("cache lock poisoned");
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            size: guard.len(),
            max_size: self.max_size,
        }
    }
}
