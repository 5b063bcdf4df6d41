use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use switchboard_core::config::IntegrationsConfig;
use switchboard_core::error::{Result, SwitchboardError};
use switchboard_core::graph::{ToolConfig, WorkflowGraph};
use switchboard_core::traits::Tool;
use switchboard_credentials::CredentialResolver;

use crate::builtin::{AirtableFindRecordBuilder, GmailSendEmailBuilder};

/// Shared handles every integration tool needs at call time.
pub struct IntegrationEnv {
    pub credentials: Arc<CredentialResolver>,
    pub http: reqwest::Client,
    pub config: IntegrationsConfig,
}

impl IntegrationEnv {
    pub fn new(credentials: Arc<CredentialResolver>, config: IntegrationsConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .map_err(|e| SwitchboardError::Http(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            credentials,
            http,
            config,
        })
    }
}

/// Turns one stored tool row into a callable tool.
///
/// Returning `None` drops the tool; builders log why.
pub trait ToolBuilder: Send + Sync + 'static {
    fn build(&self, tool: &ToolConfig, graph: &WorkflowGraph) -> Option<Arc<dyn Tool>>;
}

/// Builders keyed by tool-type discriminator.
pub struct ToolRegistry {
    builders: HashMap<String, Arc<dyn ToolBuilder>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            builders: HashMap::new(),
        }
    }

    /// Register a builder, replacing any previous one for the same type.
    pub fn register(&mut self, tool_type: &str, builder: impl ToolBuilder) {
        self.builders.insert(tool_type.to_string(), Arc::new(builder));
    }

    pub fn supports(&self, tool_type: &str) -> bool {
        self.builders.contains_key(tool_type)
    }

    /// Registered tool types, sorted.
    pub fn tool_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.builders.keys().map(|s| s.as_str()).collect();
        types.sort_unstable();
        types
    }

    /// Build the tools for one agent, in configuration order. Unknown types
    /// and tools whose builder declines are left out.
    pub fn build(&self, tools: &[ToolConfig], graph: &WorkflowGraph) -> Vec<Arc<dyn Tool>> {
        let mut built = Vec::with_capacity(tools.len());
        for tool in tools {
            let Some(builder) = self.builders.get(&tool.tool_type) else {
                debug!(tool_type = %tool.tool_type, tool_id = %tool.id, "No runtime handler for tool type");
                continue;
            };
            if let Some(callable) = builder.build(tool, graph) {
                built.push(callable);
            }
        }
        built
    }

    /// A registry with the Airtable and Gmail builders bound to `env`.
    pub fn with_integrations(env: Arc<IntegrationEnv>) -> Self {
        let mut registry = Self::new();
        registry.register(
            crate::builtin::airtable::TOOL_TYPE,
            AirtableFindRecordBuilder::new(env.clone()),
        );
        registry.register(crate::builtin::gmail::TOOL_TYPE, GmailSendEmailBuilder::new(env));
        registry
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
