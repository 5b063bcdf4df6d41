use std::sync::Mutex;

use switchboard_core::traits::SessionState;
use switchboard_core::types::PathVariables;

/// Bare variable store for testing tools without a full session.
#[derive(Default)]
pub struct MemorySession {
    variables: Mutex<PathVariables>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionState for MemorySession {
    fn record_variable(&self, path_id: &str, name: &str, value: serde_json::Value) {
        self.variables
            .lock()
            .unwrap()
            .entry(path_id.to_string())
            .or_default()
            .insert(name.to_string(), value);
    }

    fn path_variables(&self, path_id: &str) -> serde_json::Map<String, serde_json::Value> {
        self.variables
            .lock()
            .unwrap()
            .get(path_id)
            .cloned()
            .unwrap_or_default()
    }
}
