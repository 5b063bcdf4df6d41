//! Immutable configuration graph for one workflow version.
//!
//! Agents are stored in an arena keyed by agent id; paths refer to their
//! target by id, never by owning reference, so cycles between agents are
//! harmless.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SwitchboardError};

/// Declared type of a path variable or tool parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    #[default]
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
}

impl DataType {
    /// Parse a stored type name; unrecognised names fall back to `String`.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_lowercase()).as_deref() {
            Some("number") | Some("float") => Self::Number,
            Some("integer") | Some("int") => Self::Integer,
            Some("boolean") | Some("bool") => Self::Boolean,
            Some("object") => Self::Object,
            Some("array") => Self::Array,
            _ => Self::String,
        }
    }

    /// JSON Schema type name.
    pub fn json_type(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        }
    }
}

/// A variable that must be captured before a path may be taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathVariableConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub data_type: DataType,
}

/// A guarded transfer edge from one agent to another.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathConfig {
    pub id: String,
    pub target_agent_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Advisory trigger text surfaced to the language model; never evaluated.
    #[serde(default)]
    pub guard_condition: Option<String>,
    #[serde(default)]
    pub required_variables: Vec<PathVariableConfig>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl PathConfig {
    /// Configured announcement spoken before the transfer, if any.
    pub fn transfer_message(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("transferMessage"))
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// Caller-supplied argument of an integration tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParameterConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub data_type: DataType,
}

/// An integration tool attached to an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    pub id: String,
    /// Selects the registry builder, e.g. `airtable.find_record_by_field`.
    pub tool_type: String,
    /// Provider-specific settings; interpreted only by the builder.
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub llm_description: String,
    #[serde(default)]
    pub runtime_parameters: Vec<ToolParameterConfig>,
}

/// One node of the workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: String,
    pub name: String,
    pub instructions: String,
    #[serde(default)]
    pub stt_config: Option<serde_json::Value>,
    #[serde(default)]
    pub llm_config: Option<serde_json::Value>,
    #[serde(default)]
    pub tts_config: Option<serde_json::Value>,
    #[serde(default)]
    pub vad_config: Option<serde_json::Value>,
    #[serde(default)]
    pub turn_detection_config: Option<serde_json::Value>,
    #[serde(default)]
    pub tools: Vec<ToolConfig>,
    #[serde(default)]
    pub paths: Vec<PathConfig>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    /// Editor layout position, passed through untouched.
    #[serde(default)]
    pub position: Option<serde_json::Value>,
}

impl AgentConfig {
    /// Whether the agent's metadata marks it as the workflow entry point.
    pub fn is_marked_entry(&self) -> bool {
        match self.metadata.as_ref().and_then(|m| m.get("is_entry")) {
            Some(serde_json::Value::Bool(b)) => *b,
            Some(serde_json::Value::String(s)) => {
                matches!(s.trim().to_lowercase().as_str(), "true" | "1" | "yes")
            }
            Some(serde_json::Value::Number(n)) => n.as_i64().is_some_and(|v| v != 0),
            _ => false,
        }
    }
}

/// A fully loaded workflow version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowGraph {
    pub workflow_id: String,
    pub organization_id: String,
    pub workflow_name: String,
    pub version_id: String,
    pub version_number: i64,
    agents: HashMap<String, AgentConfig>,
    /// Agent ids in load order.
    agent_order: Vec<String>,
    entry_agent_id: String,
    #[serde(default)]
    pub start_position: Option<serde_json::Value>,
}

/// Identity fields of a workflow version.
#[derive(Debug, Clone)]
pub struct WorkflowIdentity {
    pub workflow_id: String,
    pub organization_id: String,
    pub workflow_name: String,
    pub version_id: String,
    pub version_number: i64,
}

impl WorkflowGraph {
    /// Assemble a graph, enforcing that it has agents, that the entry agent
    /// exists and that every path targets an agent of this graph.
    pub fn new(
        identity: WorkflowIdentity,
        agents: Vec<AgentConfig>,
        entry_agent_id: impl Into<String>,
        start_position: Option<serde_json::Value>,
    ) -> Result<Self> {
        if agents.is_empty() {
            return Err(SwitchboardError::InvalidGraph(format!(
                "workflow version {} has no agents",
                identity.version_id
            )));
        }

        let entry_agent_id = entry_agent_id.into();
        let agent_order: Vec<String> = agents.iter().map(|a| a.id.clone()).collect();
        let mut map = HashMap::with_capacity(agents.len());
        for agent in agents {
            if map.contains_key(&agent.id) {
                return Err(SwitchboardError::InvalidGraph(format!(
                    "duplicate agent id {}",
                    agent.id
                )));
            }
            map.insert(agent.id.clone(), agent);
        }

        if !map.contains_key(&entry_agent_id) {
            return Err(SwitchboardError::InvalidGraph(format!(
                "entry agent {} is not part of the workflow",
                entry_agent_id
            )));
        }

        for agent in map.values() {
            for path in &agent.paths {
                if !map.contains_key(&path.target_agent_id) {
                    return Err(SwitchboardError::InvalidGraph(format!(
                        "path {} from agent {} targets unknown agent {}",
                        path.id, agent.id, path.target_agent_id
                    )));
                }
            }
        }

        Ok(Self {
            workflow_id: identity.workflow_id,
            organization_id: identity.organization_id,
            workflow_name: identity.workflow_name,
            version_id: identity.version_id,
            version_number: identity.version_number,
            agents: map,
            agent_order,
            entry_agent_id,
            start_position,
        })
    }

    pub fn agent(&self, agent_id: &str) -> Option<&AgentConfig> {
        self.agents.get(agent_id)
    }

    pub fn entry_agent_id(&self) -> &str {
        &self.entry_agent_id
    }

    pub fn entry_agent(&self) -> &AgentConfig {
        // Presence is checked in `new`.
        &self.agents[&self.entry_agent_id]
    }

    /// Agents in load order.
    pub fn agents(&self) -> impl Iterator<Item = &AgentConfig> {
        self.agent_order.iter().filter_map(|id| self.agents.get(id))
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }
}
