use std::sync::Arc;

use tracing::{debug, info};

use switchboard_core::error::Result;
use switchboard_core::event::EventBus;
use switchboard_core::graph::WorkflowGraph;
use switchboard_core::traits::ConversationHost;

use crate::cache::ConfigCache;
use crate::factory::AgentFactory;
use crate::loader::GraphLoader;
use crate::session::SessionRuntime;

/// Which workflow a new session should run.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowTarget {
    /// An exact version.
    Version(String),
    /// The published version of a workflow, or its latest draft.
    Workflow { workflow_id: String, use_draft: bool },
}

/// Resolves graphs through the shared cache and starts sessions on them.
pub struct SessionLauncher {
    loader: GraphLoader,
    cache: Arc<ConfigCache>,
    factory: Arc<AgentFactory>,
    events: Arc<EventBus>,
    tool_timeout_secs: Option<u64>,
}

impl SessionLauncher {
    pub fn new(
        loader: GraphLoader,
        cache: Arc<ConfigCache>,
        factory: Arc<AgentFactory>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            loader,
            cache,
            factory,
            events,
            tool_timeout_secs: None,
        }
    }

    pub fn with_tool_timeout(mut self, secs: u64) -> Self {
        self.tool_timeout_secs = Some(secs);
        self
    }

    pub fn factory(&self) -> &AgentFactory {
        &self.factory
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub async fn resolve(&self, target: &WorkflowTarget) -> Result<Arc<WorkflowGraph>> {
        match target {
            WorkflowTarget::Version(version_id) => {
                if let Some(graph) = self.cache.get(version_id) {
                    debug!(version_id = %version_id, "Workflow graph served from cache");
                    return Ok(graph);
                }
                let graph = Arc::new(self.loader.load_version(version_id).await?);
                self.cache.set(version_id, graph.clone());
                Ok(graph)
            }
            WorkflowTarget::Workflow {
                workflow_id,
                use_draft,
            } => {
                let graph = Arc::new(self.loader.load(workflow_id, *use_draft).await?);
                self.cache.set(&graph.version_id, graph.clone());
                Ok(graph)
            }
        }
    }

    /// Build a session for `target` and start it on `host`.
    pub async fn launch(
        &self,
        target: &WorkflowTarget,
        host: Arc<dyn ConversationHost>,
    ) -> Result<SessionRuntime> {
        let graph = self.resolve(target).await?;
        let mut runtime = SessionRuntime::new(graph, &self.factory, host, self.events.clone())?;
        if let Some(secs) = self.tool_timeout_secs {
            runtime = runtime.with_tool_timeout(secs);
        }
        info!(session_id = %runtime.session_id(), "Session launched");
        runtime.start().await?;
        Ok(runtime)
    }
}
