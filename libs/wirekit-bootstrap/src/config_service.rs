use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::Path;

use crate::config::load_tree;

/// Read-mostly holder of the merged configuration tree.
///
/// Components never see how the tree was loaded; they read it through
/// dotted paths such as `hello.a` or `cache.options.ttl`.
#[derive(Debug, Default)]
pub struct ConfigService {
    tree: RwLock<Value>,
}

impl ConfigService {
    pub fn new(tree: Value) -> Self {
        Self {
            tree: RwLock::new(tree),
        }
    }

    /// Layered load from a config directory (see [`crate::config::load_tree`]).
    pub fn load(config_dir: Option<&Path>, env: &str) -> Result<Self> {
        Ok(Self::new(load_tree(config_dir, env)?))
    }

    /// The whole tree.
    pub fn configuration(&self) -> Value {
        self.tree.read().clone()
    }

    /// The subtree at a dotted path, `None` when any segment is missing.
    /// An empty path yields the whole tree.
    pub fn get_configuration(&self, path: &str) -> Option<Value> {
        let tree = self.tree.read();
        safely_get(path, &tree).cloned()
    }

    /// Deserialize the subtree at `path`; `Ok(None)` when the path is absent.
    pub fn get_typed<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        match self.get_configuration(path) {
            Some(v) => serde_json::from_value(v)
                .map(Some)
                .with_context(|| format!("Invalid configuration at '{path}'")),
            None => Ok(None),
        }
    }

    /// Deep-merge an object into the tree. Objects merge per key, anything else replaces.
    pub fn add_object(&self, value: Value) {
        let mut tree = self.tree.write();
        merge_config(&mut tree, value);
    }
}

/// Walk a dotted path. Numeric segments index into arrays.
pub fn safely_get<'a>(path: &str, value: &'a Value) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    let mut current = value;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Recursive merge used for configuration layering.
pub fn merge_config(dst: &mut Value, src: Value) {
    match (dst, src) {
        (Value::Object(dst_map), Value::Object(src_map)) => {
            for (k, v) in src_map {
                match dst_map.get_mut(&k) {
                    Some(existing) => merge_config(existing, v),
                    None => {
                        dst_map.insert(k, v);
                    }
                }
            }
        }
        (dst, src) => *dst = src,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> ConfigService {
        ConfigService::new(json!({
            "hello": { "a": 1, "b": 4, "c": 3, "d": [1, 2, 3] },
            "keys": "key",
            "plugins": { "bucLogin": false }
        }))
    }

    #[test]
    fn dotted_paths_resolve_scalars_and_subtrees() {
        let svc = sample();
        assert_eq!(svc.get_configuration("hello.a"), Some(json!(1)));
        assert_eq!(svc.get_configuration("hello.d.2"), Some(json!(3)));
        assert_eq!(svc.get_configuration("plugins"), Some(json!({ "bucLogin": false })));
        assert_eq!(svc.get_configuration(""), Some(svc.configuration()));
    }

    #[test]
    fn missing_paths_are_absent_not_errors() {
        let svc = sample();
        assert_eq!(svc.get_configuration("hello.zzz"), None);
        assert_eq!(svc.get_configuration("keys.inner"), None);
        assert_eq!(svc.get_configuration("hello.d.9"), None);
        assert!(svc.get_typed::<u32>("nope").unwrap().is_none());
    }

    #[test]
    fn add_object_merges_objects_and_replaces_arrays() {
        let svc = sample();
        svc.add_object(json!({ "hello": { "a": 10, "d": [9] }, "extra": true }));

        assert_eq!(svc.get_configuration("hello.a"), Some(json!(10)));
        assert_eq!(svc.get_configuration("hello.b"), Some(json!(4)));
        assert_eq!(svc.get_configuration("hello.d"), Some(json!([9])));
        assert_eq!(svc.get_configuration("extra"), Some(json!(true)));
    }

    #[test]
    fn typed_reads_deserialize_sections() {
        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct Hello {
            a: u32,
            b: u32,
        }
        let svc = sample();
        let hello: Hello = svc.get_typed("hello").unwrap().unwrap();
        assert_eq!(hello, Hello { a: 1, b: 4 });
        assert!(svc.get_typed::<Hello>("keys").is_err());
    }
}
