use crate::store::{CacheStore, MemoryStore};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use thiserror::Error;
use wirekit::{register_component, ClassBuilder, Component, Handled, Registrator, Scope};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache manager used before its init hook ran")]
    NotInitialized,

    #[error("unknown cache store '{0}'")]
    UnknownStore(String),

    #[error("invalid cache configuration")]
    InvalidConfig(#[source] serde_json::Error),

    #[error("cache value for '{key}' could not be (de)serialized")]
    Codec {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    /// Maximum number of entries.
    pub max: Option<usize>,
    /// Default time to live in seconds; `0` or absent never expires.
    pub ttl: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub store: String,
    pub options: CacheOptions,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            store: "memory".to_string(),
            options: CacheOptions::default(),
        }
    }
}

impl CacheConfig {
    fn open_store(&self) -> Result<Arc<dyn CacheStore>, CacheError> {
        match self.store.as_str() {
            "memory" => Ok(Arc::new(MemoryStore::new(
                self.options.max,
                self.options.ttl.map(Duration::from_secs),
            ))),
            other => Err(CacheError::UnknownStore(other.to_string())),
        }
    }
}

/// Singleton cache facade. Values are stored as JSON.
#[derive(Default)]
pub struct CacheManager {
    config: Handled<Value>,
    store: OnceLock<Arc<dyn CacheStore>>,
}

impl Component for CacheManager {
    fn describe(c: &mut ClassBuilder<'_, Self>) {
        c.provide()
            .scope(Scope::Singleton)
            .default_factory()
            .config("config", Some("cache"), |m| &m.config)
            .init("init", |m: Arc<CacheManager>| async move {
                m.init().map_err(anyhow::Error::from)
            });
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager").finish_non_exhaustive()
    }
}

inventory::submit! {
    Registrator(register_component::<CacheManager>)
}

impl CacheManager {
    /// A manager over an explicit store, outside the container.
    pub fn with_store(store: Arc<dyn CacheStore>) -> Self {
        let manager = Self::default();
        let _ = manager.store.set(store);
        manager
    }

    /// Open the configured store. A store installed earlier is kept.
    pub fn init(&self) -> Result<(), CacheError> {
        if self.store.get().is_some() {
            return Ok(());
        }
        let config = self
            .config
            .get_as::<CacheConfig>()
            .map_err(CacheError::InvalidConfig)?
            .unwrap_or_default();
        let store = config.open_store()?;
        tracing::debug!(store = store.name(), max = ?config.options.max, ttl = ?config.options.ttl, "cache store opened");
        let _ = self.store.set(store);
        Ok(())
    }

    fn store(&self) -> Result<&Arc<dyn CacheStore>, CacheError> {
        self.store.get().ok_or(CacheError::NotInitialized)
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        match self.store()?.get(key).await? {
            Some(v) => serde_json::from_value(v)
                .map(Some)
                .map_err(|source| CacheError::Codec {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    /// Store `value`; `ttl` overrides the configured default.
    pub async fn set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let value = serde_json::to_value(value).map_err(|source| CacheError::Codec {
            key: key.to_string(),
            source,
        })?;
        self.store()?.set(key, value, ttl).await?;
        Ok(())
    }

    pub async fn del(&self, key: &str) -> Result<(), CacheError> {
        self.store()?.del(key).await?;
        Ok(())
    }

    pub async fn reset(&self) -> Result<(), CacheError> {
        self.store()?.reset().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_manager_defaults_to_memory() {
        let manager = CacheManager::default();
        assert!(matches!(
            manager.get::<u32>("x").await,
            Err(CacheError::NotInitialized)
        ));
        manager.init().unwrap();
        manager.set("x", &5u32, None).await.unwrap();
        assert_eq!(manager.get::<u32>("x").await.unwrap(), Some(5));
        assert!(matches!(
            manager.get::<String>("x").await,
            Err(CacheError::Codec { .. })
        ));
    }

    #[test]
    fn unknown_store_is_rejected() {
        let config = CacheConfig {
            store: "redis".into(),
            options: CacheOptions::default(),
        };
        assert!(matches!(config.open_store(), Err(CacheError::UnknownStore(s)) if s == "redis"));
    }
}
