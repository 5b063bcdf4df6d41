use std::collections::HashSet;
use std::sync::Arc;

use tracing::warn;

use switchboard_core::traits::Tool;
use switchboard_core::types::{AgentProfile, ProviderSet, ToolDefinition};

/// A live agent: resolved providers plus the ordered tool list the
/// conversational engine may call while the agent is active.
pub struct Agent {
    pub id: String,
    pub name: String,
    pub instructions: String,
    pub providers: ProviderSet,
    tools: Vec<Arc<dyn Tool>>,
}

impl Agent {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        instructions: impl Into<String>,
        providers: ProviderSet,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            instructions: instructions.into(),
            providers,
            tools: Vec::new(),
        }
    }

    /// Append tools, skipping any already attached (by identity).
    pub fn attach(&mut self, tools: impl IntoIterator<Item = Arc<dyn Tool>>) {
        let mut names: HashSet<String> = self.tools.iter().map(|t| t.name().to_string()).collect();
        for tool in tools {
            if self.tools.iter().any(|existing| Arc::ptr_eq(existing, &tool)) {
                continue;
            }
            if !names.insert(tool.name().to_string()) {
                warn!(agent_id = %self.id, tool = %tool.name(), "Tool name already attached; lookups resolve to the first");
            }
            self.tools.push(tool);
        }
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name() == name)
    }

    pub fn tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    pub fn tools(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    pub fn profile(&self) -> AgentProfile {
        AgentProfile {
            agent_id: self.id.clone(),
            name: self.name.clone(),
            instructions: self.instructions.clone(),
            providers: self.providers.clone(),
            tools: self.definitions(),
        }
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("tools", &self.tools.iter().map(|t| t.name()).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::resolve_providers;
    use futures::future::BoxFuture;
    use serde_json::{json, Value};
    use switchboard_core::config::SpeechDefaults;
    use switchboard_core::error::Result;
    use switchboard_core::types::{ToolContext, ToolOutput};
    use switchboard_test_utils::agent_config;

    struct Named(&'static str);

    impl Tool for Named {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "test tool"
        }
        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }
        fn execute(&self, _input: Value, _ctx: ToolContext) -> BoxFuture<'_, Result<ToolOutput>> {
            Box::pin(async move { Ok(ToolOutput::Payload(json!(self.0))) })
        }
    }

    fn agent() -> Agent {
        let config = agent_config("a-1", "Auth");
        let providers = resolve_providers(&config, &SpeechDefaults::default());
        Agent::new(config.id, config.name, config.instructions, providers)
    }

    #[test]
    fn test_attach_dedups_by_identity() {
        let mut agent = agent();
        let lookup: Arc<dyn Tool> = Arc::new(Named("lookup"));
        let twin: Arc<dyn Tool> = Arc::new(Named("lookup"));
        let send: Arc<dyn Tool> = Arc::new(Named("send"));

        agent.attach([lookup.clone(), lookup.clone(), send]);
        agent.attach([twin, lookup.clone()]);

        let names: Vec<&str> = agent.tools().iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["lookup", "send", "lookup"]);
        assert!(Arc::ptr_eq(&agent.tool("lookup").unwrap(), &lookup));
        assert!(agent.has_tool("send"));
        assert!(agent.tool("missing").is_none());
    }

    #[test]
    fn test_profile() {
        let mut agent = agent();
        agent.attach([Arc::new(Named("send")) as Arc<dyn Tool>]);
        let profile = agent.profile();
        assert_eq!(profile.agent_id, "a-1");
        assert_eq!(profile.instructions, "You are the Auth agent.");
        assert_eq!(profile.tools.len(), 1);
        assert_eq!(profile.tools[0].name, "send");
        assert_eq!(profile.providers.llm.identifier(), "openai/gpt-4o-mini");
    }
}
