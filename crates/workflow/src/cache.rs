//! Per-workflow node result cache.
//!
//! Scoped to one workflow registration, keyed by (node name, input
//! fingerprint). Nodes opt in; the vision analysis node uses it to avoid
//! duplicate screenshot calls within a research burst.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::Value;

pub use fc_model::vision_cache::fingerprint;

#[derive(Default)]
pub struct NodeCache {
    entries: Mutex<HashMap<(String, String), Value>>,
}

impl NodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, node: &str, input_fingerprint: &str) -> Option<Value> {
        self.entries
            .lock()
            .get(&(node.to_owned(), input_fingerprint.to_owned()))
            .cloned()
    }

    pub fn put(&self, node: &str, input_fingerprint: &str, value: Value) {
        self.entries
            .lock()
            .insert((node.to_owned(), input_fingerprint.to_owned()), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keyed_by_node_and_fingerprint() {
        let cache = NodeCache::new();
        cache.put("vision", "fp1", json!({"a": 1}));

        assert_eq!(cache.get("vision", "fp1"), Some(json!({"a": 1})));
        assert_eq!(cache.get("vision", "fp2"), None);
        assert_eq!(cache.get("other", "fp1"), None);
    }
}
