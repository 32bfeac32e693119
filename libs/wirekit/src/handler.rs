//! Handler map behind handler-bound properties (`config`, `logger`, `app`, ...).
//!
//! Lookups happen on every read of a [`crate::Handled`] slot, so a handler
//! registered or replaced later is observed by objects created earlier.

use crate::definition::Instance;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

pub type HandlerValue = Arc<dyn Any + Send + Sync>;

/// `(property name, metadata, owning instance) → value`.
pub type HandlerFn =
    Arc<dyn Fn(&str, &HandlerMeta, Option<&Instance>) -> Option<HandlerValue> + Send + Sync>;

/// Metadata attached to a handler-bound property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerMeta {
    pub key: String,
    #[serde(default)]
    pub identifier: Option<String>,
}

#[derive(Default)]
pub struct HandlerMap {
    handlers: RwLock<HashMap<String, HandlerFn>>,
}

impl fmt::Debug for HandlerMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerMap")
            .field("keys", &self.keys())
            .finish()
    }
}

impl HandlerMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the handler for `key`.
    pub fn register<F>(&self, key: impl Into<String>, handler: F)
    where
        F: Fn(&str, &HandlerMeta, Option<&Instance>) -> Option<HandlerValue> + Send + Sync + 'static,
    {
        self.handlers.write().insert(key.into(), Arc::new(handler));
    }

    /// Register only when nothing is registered under `key`. Returns whether it was inserted.
    pub fn register_if_absent<F>(&self, key: impl Into<String>, handler: F) -> bool
    where
        F: Fn(&str, &HandlerMeta, Option<&Instance>) -> Option<HandlerValue> + Send + Sync + 'static,
    {
        let mut handlers = self.handlers.write();
        let key = key.into();
        if handlers.contains_key(&key) {
            return false;
        }
        handlers.insert(key, Arc::new(handler));
        true
    }

    pub fn get(&self, key: &str) -> Option<HandlerFn> {
        self.handlers.read().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.handlers.read().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.handlers.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Invoke the handler for `meta.key`; `None` when no handler is registered.
    pub fn resolve(
        &self,
        property: &str,
        meta: &HandlerMeta,
        instance: Option<&Instance>,
    ) -> Option<HandlerValue> {
        // clone out so user code never runs under the lock
        let handler = self.get(&meta.key)?;
        handler(property, meta, instance)
    }
}

/// Live link from a property slot to the handler map.
#[derive(Clone)]
pub struct HandlerBinding {
    handlers: Arc<HandlerMap>,
    property: String,
    meta: HandlerMeta,
    owner: Weak<dyn Any + Send + Sync>,
}

impl fmt::Debug for HandlerBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerBinding")
            .field("property", &self.property)
            .field("meta", &self.meta)
            .finish()
    }
}

impl HandlerBinding {
    pub fn new(
        handlers: Arc<HandlerMap>,
        property: impl Into<String>,
        meta: HandlerMeta,
        owner: &Instance,
    ) -> Self {
        Self {
            handlers,
            property: property.into(),
            meta,
            owner: Arc::downgrade(owner),
        }
    }

    pub fn property(&self) -> &str {
        &self.property
    }

    pub fn meta(&self) -> &HandlerMeta {
        &self.meta
    }

    pub fn resolve(&self) -> Option<HandlerValue> {
        let owner = self.owner.upgrade();
        self.handlers
            .resolve(&self.property, &self.meta, owner.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(key: &str, identifier: Option<&str>) -> HandlerMeta {
        HandlerMeta {
            key: key.into(),
            identifier: identifier.map(str::to_string),
        }
    }

    #[test]
    fn resolve_uses_identifier_or_property() {
        let map = HandlerMap::new();
        map.register("echo", |prop: &str, meta: &HandlerMeta, _: Option<&Instance>| {
            let name = meta.identifier.clone().unwrap_or_else(|| prop.to_string());
            Some(Arc::new(name) as HandlerValue)
        });

        let v = map.resolve("port", &meta("echo", None), None).unwrap();
        assert_eq!(v.downcast_ref::<String>().unwrap(), "port");
        let v = map.resolve("port", &meta("echo", Some("web.port")), None).unwrap();
        assert_eq!(v.downcast_ref::<String>().unwrap(), "web.port");
        assert!(map.resolve("port", &meta("missing", None), None).is_none());
    }

    #[test]
    fn register_if_absent_keeps_the_first_handler() {
        let map = HandlerMap::new();
        assert!(map.register_if_absent("config", |_: &str, _: &HandlerMeta, _: Option<&Instance>| {
            Some(Arc::new(1u32) as HandlerValue)
        }));
        assert!(!map.register_if_absent("config", |_: &str, _: &HandlerMeta, _: Option<&Instance>| {
            Some(Arc::new(2u32) as HandlerValue)
        }));

        let v = map.resolve("x", &meta("config", None), None).unwrap();
        assert_eq!(v.downcast_ref::<u32>(), Some(&1));
        assert_eq!(map.keys(), vec!["config".to_string()]);
    }

    #[test]
    fn bindings_observe_replaced_handlers() {
        let map = Arc::new(HandlerMap::new());
        let owner: Instance = Arc::new(());
        let binding = HandlerBinding::new(map.clone(), "level", meta("k", None), &owner);

        assert!(binding.resolve().is_none());
        map.register("k", |_: &str, _: &HandlerMeta, i: Option<&Instance>| {
            Some(Arc::new(i.is_some()) as HandlerValue)
        });
        let v = binding.resolve().unwrap();
        assert_eq!(v.downcast_ref::<bool>(), Some(&true));
    }
}
