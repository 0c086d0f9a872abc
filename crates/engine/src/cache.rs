//! Bounded FIFO response cache.
//!
//! Entries are evicted strictly in insertion order: a hit never refreshes an
//! entry, and there is no time-based expiry. The key covers the resolved
//! model and the message list, not the backend identifier.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use decentra_core::{PromptMessage, RawResponse};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Cache key for a model call: SHA-256 hex of `"{model}:{canonical messages}"`.
pub fn cache_key(model: &str, messages: &[PromptMessage]) -> String {
    let value = serde_json::to_value(messages).unwrap_or(Value::Null);
    let mut hasher = Sha256::new();
    hasher.update(model.as_bytes());
    hasher.update(b":");
    hasher.update(canonical_json(&value).as_bytes());
    hex::encode(hasher.finalize())
}

/// Compact JSON with object keys sorted at every level.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Process-local FIFO cache of raw backend responses.
pub struct ResponseCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

#[derive(Default)]
struct CacheInner {
    order: VecDeque<String>,
    entries: HashMap<String, RawResponse>,
}

impl ResponseCache {
    /// Create a cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(CacheInner::default()),
        }
    }

    pub fn get(&self, key: &str) -> Option<RawResponse> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.get(key).cloned()
    }

    /// Store a response, evicting the oldest entry when full.
    ///
    /// Re-inserting an existing key replaces the value in place and keeps its
    /// original position in the eviction order.
    pub fn insert(&self, key: String, value: RawResponse) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(existing) = inner.entries.get_mut(&key) {
            *existing = value;
            return;
        }

        while inner.entries.len() >= self.capacity {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.entries.remove(&oldest);
                }
                None => break,
            }
        }

        inner.order.push_back(key.clone());
        inner.entries.insert(key, value);
    }

    pub fn contains(&self, key: &str) -> bool {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.order.clear();
        inner.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_json_sorts_nested_keys() {
        let value = json!({"b": 1, "a": {"d": [ {"y": 1, "x": 2} ], "c": null}});
        assert_eq!(
            canonical_json(&value),
            r#"{"a":{"c":null,"d":[{"x":2,"y":1}]},"b":1}"#
        );
    }

    #[test]
    fn key_ignores_mapping_key_order() {
        let first: Vec<PromptMessage> = serde_json::from_str(
            r#"[{"role":"system","content":"ctx"},
                {"role":"user","content":"mail","metadata":{"source":"gmail","count":2}}]"#,
        )
        .unwrap();
        let second: Vec<PromptMessage> = serde_json::from_str(
            r#"[{"content":"ctx","role":"system"},
                {"metadata":{"count":2,"source":"gmail"},"content":"mail","role":"user"}]"#,
        )
        .unwrap();

        assert_eq!(cache_key("gpt-4o", &first), cache_key("gpt-4o", &second));
    }

    #[test]
    fn key_depends_on_model_and_content() {
        let messages = vec![PromptMessage::user("hello")];
        let base = cache_key("gpt-4o", &messages);
        assert_ne!(base, cache_key("gpt-4o-mini", &messages));
        assert_ne!(base, cache_key("gpt-4o", &[PromptMessage::user("hello!")]));
        assert_eq!(base.len(), 64);
    }

    #[test]
    fn evicts_first_inserted_entry() {
        let cache = ResponseCache::new(3);
        for key in ["k1", "k2", "k3"] {
            cache.insert(key.into(), RawResponse::Text(key.into()));
        }
        cache.insert("k4".into(), RawResponse::Text("k4".into()));

        assert_eq!(cache.len(), 3);
        assert!(!cache.contains("k1"));
        assert!(cache.contains("k2"));
        assert!(cache.contains("k3"));
        assert!(cache.contains("k4"));
    }

    #[test]
    fn hits_do_not_refresh_position() {
        let cache = ResponseCache::new(2);
        cache.insert("old".into(), "a".into());
        cache.insert("new".into(), "b".into());

        assert!(cache.get("old").is_some());
        cache.insert("newest".into(), "c".into());

        assert!(!cache.contains("old"));
        assert!(cache.contains("new"));
    }

    #[test]
    fn reinsert_keeps_original_slot() {
        let cache = ResponseCache::new(2);
        cache.insert("a".into(), "1".into());
        cache.insert("b".into(), "2".into());
        cache.insert("a".into(), "3".into());

        assert_eq!(cache.get("a"), Some(RawResponse::Text("3".into())));
        cache.insert("c".into(), "4".into());
        assert!(!cache.contains("a"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn zero_capacity_holds_one() {
        let cache = ResponseCache::new(0);
        cache.insert("a".into(), "1".into());
        cache.insert("b".into(), "2".into());
        assert_eq!(cache.capacity(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains("b"));
    }
}
