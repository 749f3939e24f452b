//! The mutable state record a workflow executes over.
//!
//! Channels are named slots holding JSON values; nodes read what they need
//! and return a patch that is merged channel-wise.

use std::collections::HashMap;

use serde_json::Value;

/// A workflow's state: named channels with JSON values.
#[derive(Debug, Clone, Default)]
pub struct WorkflowState {
    channels: HashMap<String, Value>,
}

impl WorkflowState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a state from (channel, value) pairs.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (&'static str, Value)>) -> Self {
        let mut state = Self::new();
        for (key, value) in pairs {
            state.set(key, value);
        }
        state
    }

    pub fn set(&mut self, channel: impl Into<String>, value: Value) {
        self.channels.insert(channel.into(), value);
    }

    pub fn get(&self, channel: &str) -> Option<&Value> {
        self.channels.get(channel)
    }

    pub fn str_channel(&self, channel: &str) -> Option<&str> {
        self.get(channel).and_then(Value::as_str)
    }

    pub fn f64_channel(&self, channel: &str) -> Option<f64> {
        self.get(channel).and_then(Value::as_f64)
    }

    pub fn bool_channel(&self, channel: &str) -> Option<bool> {
        self.get(channel).and_then(Value::as_bool)
    }

    pub fn list_channel(&self, channel: &str) -> Vec<String> {
        self.get(channel)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn merge(&mut self, patch: Patch) {
        for (channel, value) in patch.entries {
            self.channels.insert(channel, value);
        }
    }

    /// Snapshot as one JSON object (persisted as the task result).
    pub fn to_value(&self) -> Value {
        Value::Object(
            self.channels
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

/// A set of channel writes produced by one node.
#[derive(Debug, Clone, Default)]
pub struct Patch {
    entries: Vec<(String, Value)>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, channel: impl Into<String>, value: Value) -> Self {
        self.entries.push((channel.into(), value));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
