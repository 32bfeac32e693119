//! Explicit metadata registry: `(class, key) → JSON value`.
//!
//! Property and method targets store their entries inside the class value,
//! keyed by member name, so several decorators on one class merge into a
//! single object per key.

use crate::identifier::{ClassKey, Target};
use serde_json::{Map, Value};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct MetadataRegistry {
    entries: HashMap<(ClassKey, String), Value>,
    by_key: HashMap<String, Vec<ClassKey>>,
    parents: HashMap<ClassKey, ClassKey>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store or merge `value` under `(target class, key)`.
    pub fn save(&mut self, target: &Target, key: &str, value: Value) {
        let class = target.class();
        let value = match target.member() {
            Some(member) => {
                let mut wrapped = Map::new();
                wrapped.insert(member.to_string(), value);
                Value::Object(wrapped)
            }
            None => value,
        };

        match self.entries.get_mut(&(class, key.to_string())) {
            Some(existing) => merge_metadata(existing, value),
            None => {
                self.entries.insert((class, key.to_string()), value);
                let listed = self.by_key.entry(key.to_string()).or_default();
                if !listed.contains(&class) {
                    listed.push(class);
                }
            }
        }
    }

    /// Value saved on the class itself, ignoring parents.
    pub fn get_own(&self, class: &ClassKey, key: &str) -> Option<&Value> {
        self.entries.get(&(*class, key.to_string()))
    }

    /// Own value, else the nearest ancestor's.
    pub fn get(&self, class: &ClassKey, key: &str) -> Option<&Value> {
        std::iter::once(*class)
            .chain(self.ancestors(class))
            .find_map(|c| self.get_own(&c, key))
    }

    /// Ancestor values merged root-first, then the class's own value on top.
    pub fn get_merged(&self, class: &ClassKey, key: &str) -> Option<Value> {
        let mut chain = self.ancestors(class);
        chain.reverse();
        chain.push(*class);

        chain
            .iter()
            .filter_map(|c| self.get_own(c, key))
            .fold(None, |acc: Option<Value>, v| match acc {
                None => Some(v.clone()),
                Some(mut merged) => {
                    merge_metadata(&mut merged, v.clone());
                    Some(merged)
                }
            })
    }

    /// Every class that saved under `key`, in first registration order.
    pub fn list(&self, key: &str) -> &[ClassKey] {
        self.by_key.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn set_parent(&mut self, child: ClassKey, parent: ClassKey) {
        self.parents.insert(child, parent);
    }

    pub fn parent(&self, class: &ClassKey) -> Option<ClassKey> {
        self.parents.get(class).copied()
    }

    /// Parent chain, nearest first. Stops on a repeated class.
    pub fn ancestors(&self, class: &ClassKey) -> Vec<ClassKey> {
        let mut out = Vec::new();
        let mut current = *class;
        while let Some(parent) = self.parent(&current) {
            if parent == *class || out.contains(&parent) {
                break;
            }
            out.push(parent);
            current = parent;
        }
        out
    }

    pub fn is_ancestor(&self, ancestor: &ClassKey, of: &ClassKey) -> bool {
        self.ancestors(of).contains(ancestor)
    }
}

/// Objects merge per field, arrays union, scalars overwrite.
pub fn merge_metadata(dst: &mut Value, src: Value) {
    match (dst, src) {
        (Value::Object(dst_map), Value::Object(src_map)) => {
            for (k, v) in src_map {
                match dst_map.get_mut(&k) {
                    Some(existing) => merge_metadata(existing, v),
                    None => {
                        dst_map.insert(k, v);
                    }
                }
            }
        }
        (Value::Array(dst_items), Value::Array(src_items)) => {
            for item in src_items {
                if !dst_items.contains(&item) {
                    dst_items.push(item);
                }
            }
        }
        (dst, src) => *dst = src,
    }
}
