use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use switchboard_core::graph::WorkflowGraph;

/// Loaded graphs keyed by version id. Unbounded, no expiry; shared by every
/// session started in this process.
#[derive(Default)]
pub struct ConfigCache {
    graphs: RwLock<HashMap<String, Arc<WorkflowGraph>>>,
}

impl ConfigCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, version_id: &str) -> Option<Arc<WorkflowGraph>> {
        self.graphs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(version_id)
            .cloned()
    }

    pub fn set(&self, version_id: &str, graph: Arc<WorkflowGraph>) {
        self.graphs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(version_id.to_string(), graph);
    }

    pub fn invalidate(&self, version_id: &str) {
        self.graphs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(version_id);
    }

    pub fn clear(&self) {
        self.graphs.write().unwrap_or_else(PoisonError::into_inner).clear();
    }

    pub fn len(&self) -> usize {
        self.graphs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
