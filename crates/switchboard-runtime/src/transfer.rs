use futures::future::BoxFuture;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use switchboard_core::error::{Result, SwitchboardError};
use switchboard_core::graph::{PathConfig, WorkflowGraph};
use switchboard_core::traits::Tool;
use switchboard_core::types::{Handoff, ToolContext, ToolKind, ToolOutput};
use switchboard_tools::schema::slugify;

/// Hands the conversation to a path's target agent once every required
/// variable of the path has been captured.
pub struct TransferTool {
    name: String,
    description: String,
    path: PathConfig,
}

impl TransferTool {
    pub fn new(path: &PathConfig, graph: &WorkflowGraph) -> Self {
        let target_name = graph
            .agent(&path.target_agent_id)
            .map(|a| a.name.as_str())
            .filter(|n| !n.trim().is_empty());

        let base = if path.name.trim().is_empty() {
            path.target_agent_id.as_str()
        } else {
            path.name.as_str()
        };
        let slug = slugify(base, "transfer");
        let name = if slug.starts_with("transfer_") {
            slug
        } else {
            format!("transfer_{}", slug)
        };

        Self {
            name,
            description: describe(path, target_name),
            path: path.clone(),
        }
    }

    /// Replace the generated name, e.g. to keep names unique on one agent.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn path_id(&self) -> &str {
        &self.path.id
    }

    pub fn target_agent_id(&self) -> &str {
        &self.path.target_agent_id
    }
}

fn describe(path: &PathConfig, target_name: Option<&str>) -> String {
    let mut parts = Vec::new();
    if let Some(description) = path.description.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        parts.push(description.to_string());
    }
    if let Some(guard) = path.guard_condition.as_deref().map(str::trim).filter(|g| !g.is_empty()) {
        parts.push(format!("Recommended trigger: {}.", guard));
    }
    if !path.required_variables.is_empty() {
        let names: Vec<&str> = path.required_variables.iter().map(|v| v.name.as_str()).collect();
        parts.push(format!("Collect these variables first: {}.", names.join(", ")));
    }
    if parts.is_empty() {
        return format!(
            "Use this tool to transfer the conversation to {}.",
            target_name.unwrap_or("the target agent")
        );
    }
    parts.join(" ")
}

impl Tool for TransferTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false,
        })
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Transfer
    }

    fn execute(&self, _input: Value, ctx: ToolContext) -> BoxFuture<'_, Result<ToolOutput>> {
        Box::pin(async move {
            let captured = ctx.session.path_variables(&self.path.id);

            let variables: Map<String, Value> = if self.path.required_variables.is_empty() {
                captured
            } else {
                let missing: Vec<&str> = self
                    .path
                    .required_variables
                    .iter()
                    .filter(|v| !captured.contains_key(&v.name))
                    .map(|v| v.name.as_str())
                    .collect();
                if !missing.is_empty() {
                    debug!(path_id = %self.path.id, missing = ?missing, "Transfer blocked");
                    return Err(SwitchboardError::missing_variables(missing));
                }
                self.path
                    .required_variables
                    .iter()
                    .filter_map(|v| captured.get(&v.name).map(|value| (v.name.clone(), value.clone())))
                    .collect()
            };

            info!(
                session_id = %ctx.session_id,
                path_id = %self.path.id,
                target = %self.path.target_agent_id,
                "Transfer requested"
            );
            Ok(ToolOutput::Transfer(Handoff {
                path_id: self.path.id.clone(),
                path_name: self.path.label().to_string(),
                target_agent_id: self.path.target_agent_id.clone(),
                variables,
                announcement: self.path.transfer_message().map(str::to_string),
            }))
        })
    }
}
