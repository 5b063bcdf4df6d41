use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use switchboard_core::config::SpeechDefaults;
use switchboard_core::graph::{AgentConfig, PathConfig, WorkflowGraph};
use switchboard_core::traits::Tool;
use switchboard_tools::schema::slugify;
use switchboard_tools::ToolRegistry;

use crate::agent::Agent;
use crate::capture::VariableCaptureTool;
use crate::providers::resolve_providers;
use crate::transfer::TransferTool;

/// Builds live agents from their configuration: providers, integration
/// tools, one capture tool per required path variable and one transfer tool
/// per outgoing path.
pub struct AgentFactory {
    registry: Arc<ToolRegistry>,
    speech: SpeechDefaults,
}

impl AgentFactory {
    pub fn new(registry: Arc<ToolRegistry>, speech: SpeechDefaults) -> Self {
        Self { registry, speech }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn create(&self, config: &AgentConfig, graph: &WorkflowGraph) -> Agent {
        let providers = resolve_providers(config, &self.speech);
        let mut agent = Agent::new(&config.id, &config.name, &config.instructions, providers);

        agent.attach(self.registry.build(&config.tools, graph));
        let mut taken: HashSet<String> = agent.tools().iter().map(|t| t.name().to_string()).collect();

        let mut captures: Vec<Arc<dyn Tool>> = Vec::new();
        for path in &config.paths {
            for variable in &path.required_variables {
                let tool = VariableCaptureTool::new(path, variable);
                let name = unique_name(&mut taken, tool.name(), path);
                captures.push(Arc::new(tool.with_name(name)));
            }
        }
        agent.attach(captures);

        let mut transfers: Vec<Arc<dyn Tool>> = Vec::new();
        for path in &config.paths {
            let tool = TransferTool::new(path, graph);
            let name = unique_name(&mut taken, tool.name(), path);
            transfers.push(Arc::new(tool.with_name(name)));
        }
        agent.attach(transfers);

        debug!(agent_id = %agent.id, tools = agent.tools().len(), "Agent created");
        agent
    }
}

/// `base` when free, else `base` plus the path id's first eight
/// alphanumerics, then a counter.
fn unique_name(taken: &mut HashSet<String>, base: &str, path: &PathConfig) -> String {
    if taken.insert(base.to_string()) {
        return base.to_string();
    }
    let suffix: String = slugify(&path.id, "path")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(8)
        .collect();
    let mut candidate = format!("{}_{}", base, suffix);
    let mut n = 2;
    while !taken.insert(candidate.clone()) {
        candidate = format!("{}_{}_{}", base, suffix, n);
        n += 1;
    }
    debug!(path_id = %path.id, tool = %candidate, "Generated tool name clashed; suffixed");
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use switchboard_core::graph::DataType;
    use switchboard_core::types::ToolKind;
    use switchboard_test_utils::{
        agent_config, auth_billing_graph, path_config, path_variable, tool_config, AUTH_AGENT_ID,
        BILLING_AGENT_ID,
    };

    fn factory() -> AgentFactory {
        AgentFactory::new(Arc::new(ToolRegistry::new()), SpeechDefaults::default())
    }

    #[test]
    fn test_auth_agent_tools() {
        let graph = auth_billing_graph();
        let agent = factory().create(graph.agent(AUTH_AGENT_ID).unwrap(), &graph);

        let tools: Vec<(&str, ToolKind)> = agent.tools().iter().map(|t| (t.name(), t.kind())).collect();
        assert_eq!(
            tools,
            vec![
                ("record_billing_accountid", ToolKind::VariableCapture),
                ("transfer_billing", ToolKind::Transfer),
            ]
        );
        assert_eq!(agent.providers.stt.identifier(), "deepgram/nova-3");
    }

    #[test]
    fn test_agent_without_paths_has_no_generated_tools() {
        let graph = auth_billing_graph();
        let agent = factory().create(graph.agent(BILLING_AGENT_ID).unwrap(), &graph);
        assert!(agent.tools().is_empty());
    }

    #[test]
    fn test_unknown_integration_types_are_skipped() {
        let graph = auth_billing_graph();
        let mut config = agent_config("agent-x", "X");
        config.tools = vec![tool_config("t-1", "calendar.create_event", json!({}))];
        let agent = factory().create(&config, &graph);
        assert!(agent.tools().is_empty());
    }

    #[test]
    fn test_colliding_generated_names_are_suffixed() {
        let graph = auth_billing_graph();
        let mut first = path_config("p-a", BILLING_AGENT_ID, "billing x");
        first.required_variables = vec![path_variable("y", DataType::String)];
        let mut second = path_config("p-b", BILLING_AGENT_ID, "billing");
        second.required_variables = vec![
            path_variable("x y", DataType::String),
            path_variable("z", DataType::String),
        ];

        let mut config = agent_config("agent-y", "Y");
        config.paths = vec![first, second];
        let agent = factory().create(&config, &graph);

        let names: Vec<&str> = agent.tools().iter().map(|t| t.name()).collect();
        assert_eq!(
            names,
            vec![
                "record_billing_x_y",
                "record_billing_x_y_pb",
                "record_billing_z",
                "transfer_billing_x",
                "transfer_billing",
            ]
        );
    }

    #[tokio::test]
    async fn test_suffixed_capture_unblocks_its_transfer() {
        use switchboard_core::types::{SessionId, ToolContext, ToolOutput};
        use switchboard_test_utils::MemorySession;

        let graph = auth_billing_graph();
        let mut first = path_config("p-a", BILLING_AGENT_ID, "billing x");
        first.required_variables = vec![path_variable("y", DataType::String)];
        let mut second = path_config("p-b", BILLING_AGENT_ID, "billing");
        second.required_variables = vec![path_variable("x y", DataType::String)];
        let mut config = agent_config("agent-y", "Y");
        config.paths = vec![first, second];
        let agent = factory().create(&config, &graph);

        let session = Arc::new(MemorySession::new());
        let ctx = || ToolContext {
            session_id: SessionId::new(),
            organization_id: "org".into(),
            session: session.clone(),
        };
        agent
            .tool("record_billing_x_y_pb")
            .unwrap()
            .execute(json!({"value": "42"}), ctx())
            .await
            .unwrap();
        let output = agent
            .tool("transfer_billing")
            .unwrap()
            .execute(json!({}), ctx())
            .await
            .unwrap();
        assert!(matches!(output, ToolOutput::Transfer(ref h) if h.target_agent_id == BILLING_AGENT_ID));
    }
}
