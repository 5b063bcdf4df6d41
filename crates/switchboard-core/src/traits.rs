use std::collections::HashMap;

use futures::future::BoxFuture;

use crate::error::Result;
use crate::records::*;
use crate::types::*;

/// Tool — a named, schema-described callable the conversational engine may invoke.
pub trait Tool: Send + Sync + 'static {
    /// Tool name (used in LLM tool calls).
    fn name(&self) -> &str;

    /// Description shown to the language model.
    fn description(&self) -> &str;

    /// JSON Schema for tool input.
    fn input_schema(&self) -> serde_json::Value;

    /// Execute the tool with given input and context.
    fn execute(
        &self,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolOutput>>;

    /// Timeout in seconds for this tool.
    fn timeout_secs(&self) -> u64 {
        30
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Integration
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

/// Per-session variable store seen by capture and transfer tools.
pub trait SessionState: Send + Sync + 'static {
    /// Store a captured value for a path variable.
    fn record_variable(&self, path_id: &str, name: &str, value: serde_json::Value);

    /// Snapshot of the values captured so far for a path.
    fn path_variables(&self, path_id: &str) -> serde_json::Map<String, serde_json::Value>;
}

/// Read access to stored workflows.
pub trait WorkflowRepository: Send + Sync + 'static {
    fn get_workflow(&self, workflow_id: &str) -> BoxFuture<'_, Result<Option<WorkflowRecord>>>;

    fn get_version(&self, version_id: &str) -> BoxFuture<'_, Result<Option<VersionRecord>>>;

    /// Highest-numbered published version.
    fn get_published_version(
        &self,
        workflow_id: &str,
    ) -> BoxFuture<'_, Result<Option<VersionRecord>>>;

    /// Highest-numbered draft version.
    fn get_latest_draft(&self, workflow_id: &str) -> BoxFuture<'_, Result<Option<VersionRecord>>>;

    fn list_agents(&self, version_id: &str) -> BoxFuture<'_, Result<Vec<AgentRecord>>>;

    fn list_tools(&self, agent_id: &str) -> BoxFuture<'_, Result<Vec<ToolRecord>>>;

    /// Outgoing paths of an agent.
    fn list_paths(&self, agent_id: &str) -> BoxFuture<'_, Result<Vec<PathRecord>>>;

    fn list_path_variables(&self, path_id: &str) -> BoxFuture<'_, Result<Vec<PathVariableRecord>>>;
}

/// Secret storage holding raw token values by opaque id.
pub trait SecretVault: Send + Sync + 'static {
    fn create_secret(
        &self,
        name: &str,
        value: &str,
        description: Option<&str>,
    ) -> BoxFuture<'_, Result<SecretRef>>;

    fn get_secret(&self, secret_id: &str) -> BoxFuture<'_, Result<String>>;

    fn update_secret(
        &self,
        secret_id: &str,
        value: &str,
        description: Option<&str>,
    ) -> BoxFuture<'_, Result<SecretRef>>;

    /// Idempotent: only authorization failures are reported.
    fn delete_secret(&self, secret_id: &str) -> BoxFuture<'_, Result<()>>;
}

/// Integration connection records, keyed by organization and provider.
pub trait ConnectionStore: Send + Sync + 'static {
    fn get_connection(
        &self,
        organization_id: &str,
        provider: &str,
    ) -> BoxFuture<'_, Result<Option<ConnectionRecord>>>;

    /// Insert or partially update the record for `(organization_id, provider)`.
    fn upsert_connection(
        &self,
        organization_id: &str,
        provider: &str,
        update: ConnectionUpdate,
    ) -> BoxFuture<'_, Result<ConnectionRecord>>;
}

/// Provider token endpoint exchanging a refresh token for a new access token.
pub trait TokenRefresher: Send + Sync + 'static {
    /// Provider key, e.g. `airtable`.
    fn provider(&self) -> &str;

    fn refresh(&self, refresh_token: &str) -> BoxFuture<'_, Result<TokenGrant>>;
}

/// The external conversational engine hosting a live session.
pub trait ConversationHost: Send + Sync + 'static {
    /// Begin driving turns with the given agent.
    fn start(&self, agent: AgentProfile) -> BoxFuture<'_, Result<()>>;

    /// Current conversation history.
    fn history(&self) -> Vec<ChatMessage>;

    /// Speak a message to the caller.
    fn announce(&self, text: String) -> BoxFuture<'_, Result<()>>;

    /// Replace the context the host uses for an agent.
    fn update_context(
        &self,
        agent: AgentProfile,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<()>>;

    /// Ask the engine to produce the next turn.
    fn generate_reply(&self) -> BoxFuture<'_, Result<()>>;

    /// Externally visible presence attributes.
    fn set_attributes(&self, attributes: HashMap<String, String>) -> BoxFuture<'_, Result<()>>;
}
