//! Assembles a stored workflow version into an immutable [`WorkflowGraph`].

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::try_join_all;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use switchboard_core::error::{Result, SwitchboardError};
use switchboard_core::graph::{
    AgentConfig, DataType, PathConfig, PathVariableConfig, ToolConfig, ToolParameterConfig,
    WorkflowGraph, WorkflowIdentity,
};
use switchboard_core::records::{AgentRecord, PathRecord, ToolRecord, VersionRecord, WorkflowRecord};
use switchboard_core::traits::WorkflowRepository;

/// Keys of a tool row's config blob that describe the LLM-facing surface
/// rather than the provider.
const LLM_DESCRIPTION_KEY: &str = "llmDescription";
const RUNTIME_PARAMETERS_KEY: &str = "runtimeParameters";

pub struct GraphLoader {
    repo: Arc<dyn WorkflowRepository>,
}

impl GraphLoader {
    pub fn new(repo: Arc<dyn WorkflowRepository>) -> Self {
        Self { repo }
    }

    /// Load the published version of a workflow, or its latest draft.
    pub async fn load(&self, workflow_id: &str, use_draft: bool) -> Result<WorkflowGraph> {
        let workflow = self
            .repo
            .get_workflow(workflow_id)
            .await?
            .ok_or_else(|| SwitchboardError::NotFound(format!("workflow {}", workflow_id)))?;

        let version = if use_draft {
            self.repo.get_latest_draft(workflow_id).await?
        } else {
            self.repo.get_published_version(workflow_id).await?
        };
        let version = version.ok_or_else(|| {
            SwitchboardError::NotFound(format!(
                "{} version of workflow {}",
                if use_draft { "draft" } else { "published" },
                workflow_id
            ))
        })?;

        self.assemble(workflow, version).await
    }

    /// Load one exact workflow version.
    pub async fn load_version(&self, version_id: &str) -> Result<WorkflowGraph> {
        let version = self
            .repo
            .get_version(version_id)
            .await?
            .ok_or_else(|| SwitchboardError::NotFound(format!("workflow version {}", version_id)))?;
        let workflow = self
            .repo
            .get_workflow(&version.workflow_id)
            .await?
            .ok_or_else(|| SwitchboardError::NotFound(format!("workflow {}", version.workflow_id)))?;

        self.assemble(workflow, version).await
    }

    async fn assemble(&self, workflow: WorkflowRecord, version: VersionRecord) -> Result<WorkflowGraph> {
        let agent_rows = self.repo.list_agents(&version.id).await?;
        if agent_rows.is_empty() {
            return Err(SwitchboardError::NotFound(format!(
                "workflow version {} has no agents",
                version.id
            )));
        }

        let mut agents = try_join_all(agent_rows.into_iter().map(|row| self.load_agent(row))).await?;

        let known: HashSet<String> = agents.iter().map(|a| a.id.clone()).collect();
        for agent in &mut agents {
            agent.paths.retain(|path| {
                let keep = known.contains(&path.target_agent_id);
                if !keep {
                    warn!(
                        path_id = %path.id,
                        agent_id = %agent.id,
                        target = %path.target_agent_id,
                        "Dropping path to an agent outside this version"
                    );
                }
                keep
            });
        }

        let entry_agent_id = match agents.iter().find(|a| a.is_marked_entry()) {
            Some(agent) => agent.id.clone(),
            None => {
                let first = agents[0].id.clone();
                warn!(version_id = %version.id, agent_id = %first, "No agent marked as entry; using the first agent");
                first
            }
        };

        let start_position = version.config.get("start_position").cloned();
        let identity = WorkflowIdentity {
            workflow_id: workflow.id,
            organization_id: workflow.organization_id,
            workflow_name: workflow.name,
            version_id: version.id,
            version_number: version.version,
        };

        let graph = WorkflowGraph::new(identity, agents, entry_agent_id, start_position)?;
        info!(
            workflow = %graph.workflow_name,
            version = graph.version_number,
            agents = graph.agent_count(),
            "Workflow graph loaded"
        );
        Ok(graph)
    }

    async fn load_agent(&self, row: AgentRecord) -> Result<AgentConfig> {
        let (tool_rows, path_rows) =
            futures::try_join!(self.repo.list_tools(&row.id), self.repo.list_paths(&row.id))?;

        let paths = try_join_all(path_rows.into_iter().map(|path| self.load_path(path))).await?;
        let tools = tool_rows.iter().map(tool_from_record).collect();
        debug!(agent_id = %row.id, paths = paths.len(), "Agent loaded");

        Ok(AgentConfig {
            id: row.id,
            name: row.name,
            instructions: row.instructions,
            stt_config: row.stt_config,
            llm_config: row.llm_config,
            tts_config: row.tts_config,
            vad_config: row.vad_config,
            turn_detection_config: row.turn_detection_config,
            tools,
            paths,
            metadata: row.metadata,
            position: row.position,
        })
    }

    async fn load_path(&self, row: PathRecord) -> Result<PathConfig> {
        let variables = self.repo.list_path_variables(&row.id).await?;
        Ok(PathConfig {
            id: row.id,
            target_agent_id: row.to_agent_id,
            name: row.name,
            description: row.description,
            guard_condition: row.guard_condition,
            required_variables: variables
                .into_iter()
                .map(|v| PathVariableConfig {
                    name: v.name,
                    description: v.description,
                    data_type: DataType::parse(v.data_type.as_deref()),
                })
                .collect(),
            metadata: row.metadata,
        })
    }
}

/// Split a tool row's config blob into the LLM description, the caller
/// parameters and the remaining provider configuration.
pub fn tool_from_record(record: &ToolRecord) -> ToolConfig {
    let mut config: Map<String, Value> = record.config.as_object().cloned().unwrap_or_default();

    let llm_description = match config.remove(LLM_DESCRIPTION_KEY) {
        Some(Value::String(s)) => s,
        _ => String::new(),
    };
    let runtime_parameters = match config.remove(RUNTIME_PARAMETERS_KEY) {
        Some(Value::Array(items)) => items.iter().filter_map(runtime_parameter).collect(),
        _ => Vec::new(),
    };

    ToolConfig {
        id: record.id.clone(),
        tool_type: record.tool_type.clone(),
        config,
        display_name: record.display_name.clone(),
        llm_description,
        runtime_parameters,
    }
}

fn runtime_parameter(item: &Value) -> Option<ToolParameterConfig> {
    let item = item.as_object()?;
    let name = item.get("name")?.as_str()?.trim();
    if name.is_empty() {
        return None;
    }
    Some(ToolParameterConfig {
        name: name.to_string(),
        description: item
            .get("llmDescription")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        required: item.get("required").and_then(Value::as_bool).unwrap_or(false),
        data_type: DataType::parse(item.get("dataType").and_then(Value::as_str)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use switchboard_core::records::{VersionRecord, VersionStatus};
    use switchboard_test_utils::{
        agent_record, auth_billing_repository, MemoryRepository, AUTH_AGENT_ID, BILLING_AGENT_ID,
        BILLING_PATH_ID, ORG_ID, VERSION_ID, WORKFLOW_ID,
    };

    fn loader(repo: MemoryRepository) -> GraphLoader {
        GraphLoader::new(Arc::new(repo))
    }

    #[tokio::test]
    async fn test_load_published_graph() {
        let graph = loader(auth_billing_repository()).load(WORKFLOW_ID, false).await.unwrap();
        assert_eq!(graph.version_id, VERSION_ID);
        assert_eq!(graph.organization_id, ORG_ID);
        assert_eq!(graph.entry_agent_id(), AUTH_AGENT_ID);
        assert_eq!(graph.start_position, Some(json!({"x": 0, "y": 0})));

        let auth = graph.agent(AUTH_AGENT_ID).unwrap();
        assert_eq!(auth.paths.len(), 1);
        let path = &auth.paths[0];
        assert_eq!(path.id, BILLING_PATH_ID);
        assert_eq!(path.target_agent_id, BILLING_AGENT_ID);
        assert_eq!(path.required_variables[0].name, "accountId");
        assert_eq!(path.required_variables[0].data_type, DataType::String);
    }

    #[tokio::test]
    async fn test_missing_draft_is_not_found() {
        let err = loader(auth_billing_repository()).load(WORKFLOW_ID, true).await.unwrap_err();
        assert!(matches!(err, SwitchboardError::NotFound(_)));
        assert!(err.to_string().contains("draft version"));
    }

    #[tokio::test]
    async fn test_load_exact_version() {
        let graph = loader(auth_billing_repository()).load_version(VERSION_ID).await.unwrap();
        assert_eq!(graph.workflow_id, WORKFLOW_ID);
        assert!(matches!(
            loader(auth_billing_repository()).load_version("nope").await,
            Err(SwitchboardError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_version_without_agents_is_not_found() {
        let repo = auth_billing_repository();
        repo.insert_version(VersionRecord {
            id: "ver-empty".into(),
            workflow_id: WORKFLOW_ID.into(),
            version: 2,
            status: VersionStatus::Draft,
            config: json!({}),
        });
        let err = loader(repo).load_version("ver-empty").await.unwrap_err();
        assert!(err.to_string().contains("has no agents"));
    }

    #[tokio::test]
    async fn test_first_agent_is_entry_when_none_marked() {
        let repo = auth_billing_repository();
        repo.insert_version(VersionRecord {
            id: "ver-2".into(),
            workflow_id: WORKFLOW_ID.into(),
            version: 2,
            status: VersionStatus::Draft,
            config: json!({}),
        });
        let mut first = agent_record("agent-greeter", "Greeter", None);
        first.workflow_version_id = "ver-2".into();
        let mut second = agent_record("agent-closer", "Closer", None);
        second.workflow_version_id = "ver-2".into();
        repo.insert_agent(first);
        repo.insert_agent(second);

        let graph = loader(repo).load(WORKFLOW_ID, true).await.unwrap();
        assert_eq!(graph.entry_agent_id(), "agent-greeter");
        assert_eq!(graph.start_position, None);
    }

    #[tokio::test]
    async fn test_dangling_paths_are_dropped() {
        let repo = auth_billing_repository();
        repo.insert_path(PathRecord {
            id: "path-ghost".into(),
            from_agent_id: BILLING_AGENT_ID.into(),
            to_agent_id: "agent-from-another-version".into(),
            name: "Ghost".into(),
            description: None,
            guard_condition: None,
            metadata: None,
        });
        let graph = loader(repo).load(WORKFLOW_ID, false).await.unwrap();
        assert!(graph.agent(BILLING_AGENT_ID).unwrap().paths.is_empty());
    }

    #[test]
    fn test_tool_config_cleaning() {
        let record = ToolRecord {
            id: "tool-1".into(),
            agent_id: AUTH_AGENT_ID.into(),
            tool_type: "airtable.find_record_by_field".into(),
            config: json!({
                "baseId": "app1",
                "llmDescription": "Look up a patient.",
                "runtimeParameters": [
                    {"name": " patientId ", "llmDescription": "Patient id", "required": true, "dataType": "string"},
                    {"name": "   ", "required": true},
                    {"llmDescription": "no name"},
                    "not an object",
                    {"name": "count", "dataType": "int"}
                ]
            }),
            display_name: Some("Find patient".into()),
        };
        let tool = tool_from_record(&record);
        assert_eq!(tool.llm_description, "Look up a patient.");
        assert_eq!(tool.config.len(), 1);
        assert_eq!(tool.config["baseId"], "app1");
        assert_eq!(tool.runtime_parameters.len(), 2);
        assert_eq!(tool.runtime_parameters[0].name, "patientId");
        assert!(tool.runtime_parameters[0].required);
        assert_eq!(tool.runtime_parameters[1].data_type, DataType::Integer);
        assert!(!tool.runtime_parameters[1].required);
    }
}
