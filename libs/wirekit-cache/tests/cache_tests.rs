//! CacheManager as a container component.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;
use wirekit::{bootstrap, BootstrapOptions, Catalog, ContainerError};
use wirekit_cache::{CacheError, CacheManager};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Profile {
    name: String,
    age: u32,
}

async fn manager_with(cache: serde_json::Value) -> Result<std::sync::Arc<CacheManager>, ContainerError> {
    let dir = TempDir::new().unwrap();
    let options = BootstrapOptions::from_tree(json!({ "cache": cache }), dir.path(), "test").unwrap();
    let mut catalog = Catalog::new();
    catalog.register::<CacheManager>();
    let ctx = bootstrap(options, catalog).await.unwrap();
    ctx.container.get::<CacheManager>().await
}

#[tokio::test]
async fn typed_values_round_trip_through_the_configured_store() {
    let cache = manager_with(json!({ "store": "memory", "options": { "max": 10, "ttl": 60 } }))
        .await
        .unwrap();

    let profile = Profile {
        name: "harry".into(),
        age: 18,
    };
    cache.set("user:1", &profile, None).await.unwrap();
    assert_eq!(cache.get::<Profile>("user:1").await.unwrap(), Some(profile));

    cache.del("user:1").await.unwrap();
    assert_eq!(cache.get::<Profile>("user:1").await.unwrap(), None);
}

#[tokio::test]
async fn per_call_ttl_overrides_the_default() {
    let cache = manager_with(json!({ "options": { "ttl": 60 } })).await.unwrap();

    cache
        .set("short", &"soon gone", Some(Duration::from_millis(20)))
        .await
        .unwrap();
    cache.set("long", &"still here", None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(cache.get::<String>("short").await.unwrap(), None);
    assert_eq!(
        cache.get::<String>("long").await.unwrap().as_deref(),
        Some("still here")
    );

    cache.reset().await.unwrap();
    assert_eq!(cache.get::<String>("long").await.unwrap(), None);
}

#[tokio::test]
async fn bounded_store_keeps_the_newest_entry() {
    let cache = manager_with(json!({ "options": { "max": 2 } })).await.unwrap();
    cache.set("a", &1u8, None).await.unwrap();
    cache.set("b", &2u8, None).await.unwrap();
    cache.set("c", &3u8, None).await.unwrap();

    assert_eq!(cache.get::<u8>("c").await.unwrap(), Some(3));
}

#[tokio::test]
async fn unknown_store_fails_the_init_hook() {
    let err = manager_with(json!({ "store": "redis" })).await.unwrap_err();
    match err {
        ContainerError::Initialization { id, source } => {
            assert_eq!(id.as_str(), "cacheManager");
            assert!(matches!(
                source.downcast_ref::<CacheError>(),
                Some(CacheError::UnknownStore(s)) if s == "redis"
            ));
        }
        other => panic!("expected Initialization, got {other:?}"),
    }
}
