//! Cycle catalysts - the external input to one master cycle.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::id::{generate_catalyst_id, now_ms};

/// Input to one master cycle: an arbitrary key/value payload, a source tag
/// and a timestamp.
///
/// Fields are private so a catalyst cannot change once built; the
/// orchestrator shares it with the loops behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleCatalyst {
    id: String,
    source: String,
    timestamp: i64,
    payload: Map<String, Value>,
}

impl CycleCatalyst {
    /// Create a catalyst stamped with the current time
    pub fn new(source: impl Into<String>, payload: Map<String, Value>) -> Self {
        Self::at(source, payload, now_ms())
    }

    /// Create a catalyst with an explicit timestamp (Unix ms)
    pub fn at(source: impl Into<String>, payload: Map<String, Value>, timestamp: i64) -> Self {
        Self {
            id: generate_catalyst_id(),
            source: source.into(),
            timestamp,
            payload,
        }
    }

    /// Build from a JSON value. Non-object values are wrapped as `{"value": v}`.
    pub fn from_value(source: impl Into<String>, value: Value) -> Self {
        let payload = match value {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        Self::new(source, payload)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    /// Raw value for a key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// Numeric feature for a key, if present and numeric
    pub fn feature(&self, key: &str) -> Option<f64> {
        self.payload.get(key).and_then(Value::as_f64)
    }

    /// Numeric feature clamped to [0, 1], falling back to `default`
    pub fn unit_feature(&self, key: &str, default: f64) -> f64 {
        self.feature(key)
            .filter(|v| v.is_finite())
            .unwrap_or(default)
            .clamp(0.0, 1.0)
    }

    /// String field for a key
    pub fn text(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    /// Number of keys in the payload
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
