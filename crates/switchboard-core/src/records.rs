//! Rows exchanged with the persistence and connection-record collaborators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionStatus {
    Draft,
    Published,
    Archived,
}

impl VersionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Archived => "archived",
        }
    }
}

impl std::str::FromStr for VersionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "published" => Ok(Self::Published),
            "archived" => Ok(Self::Archived),
            other => Err(format!("unknown version status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionRecord {
    pub id: String,
    pub workflow_id: String,
    pub version: i64,
    pub status: VersionStatus,
    #[serde(default)]
    pub config: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: String,
    pub workflow_version_id: String,
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
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub position: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRecord {
    pub id: String,
    pub agent_id: String,
    pub tool_type: String,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathRecord {
    pub id: String,
    pub from_agent_id: String,
    pub to_agent_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub guard_condition: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathVariableRecord {
    pub id: String,
    pub path_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub data_type: Option<String>,
}

/// Stored association between an organization and an integration's
/// credentials. Raw tokens live in the vault; only their ids are kept here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub id: String,
    pub organization_id: String,
    pub provider: String,
    pub access_token_secret_id: Option<String>,
    pub access_token_secret_created_at: Option<DateTime<Utc>>,
    pub refresh_token_secret_id: Option<String>,
    pub refresh_token_secret_created_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
    pub profile_email: Option<String>,
}

/// Partial-update field: leave as is, overwrite, or clear.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Patch<T> {
    #[default]
    Keep,
    Set(T),
    Clear,
}

impl<T> Patch<T> {
    pub fn is_keep(&self) -> bool {
        matches!(self, Self::Keep)
    }

    /// Apply this patch to a stored value.
    pub fn apply(self, target: &mut Option<T>) {
        match self {
            Self::Keep => {}
            Self::Set(v) => *target = Some(v),
            Self::Clear => *target = None,
        }
    }
}

impl<T> From<Option<T>> for Patch<T> {
    /// `Some` sets, `None` keeps.
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Self::Set(v),
            None => Self::Keep,
        }
    }
}

/// Fields to change on a connection record. Omitted fields stay untouched.
#[derive(Debug, Clone, Default)]
pub struct ConnectionUpdate {
    pub access_token_secret_id: Patch<String>,
    pub access_token_secret_created_at: Patch<DateTime<Utc>>,
    pub refresh_token_secret_id: Patch<String>,
    pub refresh_token_secret_created_at: Patch<DateTime<Utc>>,
    pub expires_at: Patch<DateTime<Utc>>,
    pub scope: Patch<String>,
    pub profile_email: Patch<String>,
}

impl ConnectionUpdate {
    pub fn apply_to(self, record: &mut ConnectionRecord) {
        self.access_token_secret_id.apply(&mut record.access_token_secret_id);
        self.access_token_secret_created_at
            .apply(&mut record.access_token_secret_created_at);
        self.refresh_token_secret_id.apply(&mut record.refresh_token_secret_id);
        self.refresh_token_secret_created_at
            .apply(&mut record.refresh_token_secret_created_at);
        self.expires_at.apply(&mut record.expires_at);
        self.scope.apply(&mut record.scope);
        self.profile_email.apply(&mut record.profile_email);
    }
}
