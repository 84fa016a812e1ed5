//! Configuration tree consumed by the engine.
//!
//! `Config` is a read-only, dot-path getter over a generic
//! [`serde_json::Value`] tree. Every typed accessor takes a default that is
//! returned when the path is missing or the value cannot be coerced, so
//! lookups never fail.
//!
//! The engine itself reads only three keys: `<node>.tasks.count`,
//! `<node>.tasks.buffer_size` and `close.timeout_ms`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

/// Immutable configuration item. Cloning is cheap; subtrees returned by
/// [`get`](Config::get) are detached snapshots.
#[derive(Debug, Clone, Default)]
pub struct Config {
    data: Option<Arc<Value>>,
}

impl Config {
    /// Wrap a JSON tree. `Value::Null` behaves like an empty config.
    pub fn new(data: Value) -> Config {
        match data {
            Value::Null => Config::default(),
            data => Config {
                data: Some(Arc::new(data)),
            },
        }
    }

    /// Fetch the item at `path`.
    ///
    /// A single-element path is split on dots (`get(&["a.nest.key"])`);
    /// multi-element paths are used verbatim, so node names containing
    /// dots stay addressable: `get(&[node, "tasks", "count"])`.
    /// Array elements are addressed by index.
    pub fn get(&self, path: &[&str]) -> Config {
        let Some(root) = &self.data else {
            return Config::default();
        };

        let parts: Vec<&str> = if path.len() == 1 {
            path[0].split('.').collect()
        } else {
            path.to_vec()
        };

        let mut current: &Value = root;
        for part in parts {
            match descend(current, part) {
                Some(next) => current = next,
                None => return Config::default(),
            }
        }

        match current {
            Value::Null => Config::default(),
            value => Config {
                data: Some(Arc::new(value.clone())),
            },
        }
    }

    /// Whether the path resolves to a non-null value.
    pub fn is_set(&self, path: &[&str]) -> bool {
        self.get(path).data.is_some()
    }

    /// String value of this item, or `default` on miss or mismatch.
    pub fn string(&self, default: &str) -> String {
        match self.data.as_deref() {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => default.to_string(),
        }
    }

    /// Boolean value of this item, or `default`.
    pub fn bool(&self, default: bool) -> bool {
        match self.data.as_deref() {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.parse().unwrap_or(default),
            Some(Value::Number(n)) => n.as_i64().map(|v| v != 0).unwrap_or(default),
            _ => default,
        }
    }

    /// Signed integer value of this item, or `default`.
    pub fn int(&self, default: i64) -> i64 {
        match self.data.as_deref() {
            Some(Value::Number(n)) => n.as_i64().unwrap_or(default),
            Some(Value::String(s)) => s.parse().unwrap_or(default),
            _ => default,
        }
    }

    /// Unsigned integer value of this item, or `default`.
    pub fn uint(&self, default: u64) -> u64 {
        match self.data.as_deref() {
            Some(Value::Number(n)) => n.as_u64().unwrap_or(default),
            Some(Value::String(s)) => s.parse().unwrap_or(default),
            _ => default,
        }
    }

    /// Floating point value of this item, or `default`.
    pub fn float(&self, default: f64) -> f64 {
        match self.data.as_deref() {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(default),
            Some(Value::String(s)) => s.parse().unwrap_or(default),
            _ => default,
        }
    }

    /// Duration read as integer milliseconds, or `default`.
    pub fn duration_ms(&self, default: Duration) -> Duration {
        Duration::from_millis(self.uint(default.as_millis() as u64))
    }

    /// Elements of an array item; empty when the item is not an array.
    pub fn array(&self) -> Vec<Config> {
        match self.data.as_deref() {
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| Config {
                    data: Some(Arc::new(v.clone())),
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Entries of an object item; empty when the item is not an object.
    pub fn map(&self) -> HashMap<String, Config> {
        match self.data.as_deref() {
            Some(Value::Object(map)) => map
                .iter()
                .map(|(k, v)| {
                    (
                        k.clone(),
                        Config {
                            data: Some(Arc::new(v.clone())),
                        },
                    )
                })
                .collect(),
            _ => HashMap::new(),
        }
    }
}

fn descend<'a>(current: &'a Value, part: &str) -> Option<&'a Value> {
    match current {
        Value::Object(map) => map.get(part),
        Value::Array(items) => part.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
