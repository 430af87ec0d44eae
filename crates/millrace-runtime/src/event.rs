//! Event types for the runtime

use indexmap::IndexMap;
use millrace_core::{FxIndexMap, Value};
use rustc_hash::FxBuildHasher;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Default event type for payloads that do not declare one.
pub const DEFAULT_EVENT_TYPE: &str = "Event";

/// One record flowing through a process chain.
///
/// Events are exclusively owned: the source hands out independent copies and
/// no instance is ever shared across worker threads. Stages mutate the
/// payload in place (or replace it) and the final stage's payload becomes the
/// committed observables of a row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event type name (Arc<str> for O(1) clone instead of O(n) String clone)
    #[serde(default = "default_event_type")]
    pub event_type: Arc<str>,
    /// Entry index in the input, assigned by the source; the event identifier.
    #[serde(default)]
    pub id: u64,
    /// Event payload (uses FxBuildHasher for faster field access)
    #[serde(default)]
    pub data: FxIndexMap<String, Value>,
}

fn default_event_type() -> Arc<str> {
    Arc::from(DEFAULT_EVENT_TYPE)
}

impl Event {
    pub fn new(event_type: impl Into<Arc<str>>) -> Self {
        Self {
            event_type: event_type.into(),
            id: 0,
            data: IndexMap::with_hasher(FxBuildHasher),
        }
    }

    /// Creates an event from a pre-built fields map (e.g. from JSON parsing).
    pub fn from_fields(event_type: impl Into<Arc<str>>, data: FxIndexMap<String, Value>) -> Self {
        Self {
            event_type: event_type.into(),
            id: 0,
            data,
        }
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn get_float(&self, key: &str) -> Option<f64> {
        self.data.get(key).and_then(|v| v.as_float())
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.data.get(key).and_then(|v| v.as_int())
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.shift_remove(key)
    }

    pub fn field_count(&self) -> usize {
        self.data.len()
    }
}
