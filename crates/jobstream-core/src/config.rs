//! Validated job configuration.

use serde::Serialize;
use serde_json::{Map, Value};

/// Validated, immutable mapping of job parameters.
///
/// Built once per request (see the server's `JobService::build_config`) and
/// handed to the worker by value. There are no mutating accessors; the worker
/// only ever borrows it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct JobConfig {
    params: Map<String, Value>,
}

impl JobConfig {
    /// Wrap an already-validated parameter map.
    pub fn new(params: Map<String, Value>) -> Self {
        Self { params }
    }

    /// Get a raw parameter value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    /// Get a string parameter.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    /// Get an unsigned integer parameter.
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.params.get(key).and_then(Value::as_u64)
    }

    /// Get a floating point parameter.
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.params.get(key).and_then(Value::as_f64)
    }

    /// Get a boolean parameter.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.params.get(key).and_then(Value::as_bool)
    }

    /// Check whether a parameter is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    /// Borrow the full parameter map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.params
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Returns true if there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}
