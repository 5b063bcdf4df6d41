use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique session identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_str(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single turn of conversation history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: text.into(),
            timestamp: Some(Utc::now()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
            timestamp: Some(Utc::now()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
            timestamp: Some(Utc::now()),
        }
    }
}

/// Tool definition handed to the conversational engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Which family a tool belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Integration,
    VariableCapture,
    Transfer,
}

/// A request to switch the active agent, produced by a transfer tool once its
/// preconditions hold.
#[derive(Debug, Clone, Serialize)]
pub struct Handoff {
    pub path_id: String,
    pub path_name: String,
    pub target_agent_id: String,
    /// Captured variables handed to the target agent.
    pub variables: serde_json::Map<String, serde_json::Value>,
    /// Spoken before switching, when configured on the path.
    #[serde(skip)]
    pub announcement: Option<String>,
}

impl Handoff {
    /// System note appended to the target agent's context, or `None` when
    /// there is nothing to hand over.
    pub fn summary_note(&self) -> Option<String> {
        if self.variables.is_empty() {
            return None;
        }
        let payload = serde_json::json!({
            "path_id": self.path_id,
            "path_name": self.path_name,
            "variables": self.variables,
        });
        Some(format!("Structured handoff context: {}", payload))
    }
}

/// Result of a tool invocation.
#[derive(Debug, Clone)]
pub enum ToolOutput {
    /// Structured payload returned to the conversation.
    Payload(serde_json::Value),
    /// Switch to another agent.
    Transfer(Handoff),
}

impl ToolOutput {
    pub fn payload(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Payload(v) => Some(v),
            Self::Transfer(_) => None,
        }
    }
}

/// Context passed to tools during execution.
#[derive(Clone)]
pub struct ToolContext {
    pub session_id: SessionId,
    pub organization_id: String,
    pub session: Arc<dyn crate::traits::SessionState>,
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("session_id", &self.session_id)
            .field("organization_id", &self.organization_id)
            .finish()
    }
}

/// Provider slot an agent fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    SpeechToText,
    LanguageModel,
    TextToSpeech,
    VoiceActivity,
    TurnDetection,
}

/// A resolved provider selection, ready for the speech host to instantiate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderHandle {
    pub kind: ProviderKind,
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub voice: Option<String>,
    /// Route through the hosting platform's inference gateway rather than a
    /// direct plugin.
    #[serde(default)]
    pub hosted: bool,
}

impl ProviderHandle {
    /// `provider/model` identifier used by hosted inference.
    pub fn identifier(&self) -> String {
        match self.model.as_deref().or(self.voice.as_deref()) {
            Some(detail) => format!("{}/{}", self.provider, detail),
            None => self.provider.clone(),
        }
    }
}

/// Providers selected for one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSet {
    pub stt: ProviderHandle,
    pub llm: ProviderHandle,
    pub tts: ProviderHandle,
    pub vad: ProviderHandle,
    #[serde(default)]
    pub turn_detection: Option<ProviderHandle>,
}

/// What the conversational host needs to drive an agent.
#[derive(Debug, Clone, Serialize)]
pub struct AgentProfile {
    pub agent_id: String,
    pub name: String,
    pub instructions: String,
    pub providers: ProviderSet,
    pub tools: Vec<ToolDefinition>,
}

/// Response of a provider token-refresh endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenGrant {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Identifier and timestamp returned by vault writes.
#[derive(Debug, Clone, PartialEq)]
pub struct SecretRef {
    pub id: String,
    pub at: DateTime<Utc>,
}

/// Session lifecycle event broadcast to all subscribers.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Started {
        session_id: SessionId,
        workflow_id: String,
        version_id: String,
    },
    AgentEntered {
        session_id: SessionId,
        agent_id: String,
        agent_name: String,
    },
    ToolStarted {
        session_id: SessionId,
        tool: String,
    },
    ToolFinished {
        session_id: SessionId,
        tool: String,
        is_error: bool,
    },
    VariableCaptured {
        session_id: SessionId,
        path_id: String,
        variable: String,
    },
    Transferred {
        session_id: SessionId,
        from_agent_id: String,
        to_agent_id: String,
    },
}

/// Captured path variables, keyed by path id then variable name.
pub type PathVariables = HashMap<String, serde_json::Map<String, serde_json::Value>>;
