use async_trait::async_trait;
use moka::future::Cache;
use moka::policy::EvictionPolicy;
use moka::Expiry;
use serde_json::Value;
use std::time::{Duration, Instant};

/// Backend behind [`crate::CacheManager`].
#[async_trait]
pub trait CacheStore: Send + Sync {
    fn name(&self) -> &str;

    async fn get(&self, key: &str) -> anyhow::Result<Option<Value>>;

    /// `ttl` of `None` uses the store default; `Some(Duration::ZERO)` never expires.
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> anyhow::Result<()>;

    async fn del(&self, key: &str) -> anyhow::Result<()>;

    async fn reset(&self) -> anyhow::Result<()>;
}

#[derive(Clone)]
struct Entry {
    value: Value,
    ttl: Option<Duration>,
}

/// Each entry carries its own time to live, resolved when it was set.
struct EntryTtl;

impl Expiry<String, Entry> for EntryTtl {
    fn expire_after_create(&self, _key: &String, entry: &Entry, _created_at: Instant) -> Option<Duration> {
        entry.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _updated_at: Instant,
        _remaining: Option<Duration>,
    ) -> Option<Duration> {
        entry.ttl
    }
}

/// In-process store on a moka cache. Once `max` entries are held the least
/// recently used one is evicted.
pub struct MemoryStore {
    cache: Cache<String, Entry>,
    ttl: Option<Duration>,
}

impl MemoryStore {
    pub fn new(max: Option<usize>, ttl: Option<Duration>) -> Self {
        let mut builder = Cache::builder()
            .eviction_policy(EvictionPolicy::lru())
            .expire_after(EntryTtl);
        if let Some(max) = max.filter(|m| *m > 0) {
            builder = builder.max_capacity(max as u64);
        }
        Self {
            cache: builder.build(),
            ttl: ttl.filter(|t| !t.is_zero()),
        }
    }

    /// Live entries, after pending evictions and expirations are applied.
    pub async fn len(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<Value>> {
        Ok(self.cache.get(key).await.map(|e| e.value))
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> anyhow::Result<()> {
        let ttl = match ttl {
            Some(t) if t.is_zero() => None,
            Some(t) => Some(t),
            None => self.ttl,
        };
        self.cache.insert(key.to_string(), Entry { value, ttl }).await;
        Ok(())
    }

    async fn del(&self, key: &str) -> anyhow::Result<()> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    async fn reset(&self) -> anyhow::Result<()> {
        self.cache.invalidate_all();
        Ok(())
    }
}
