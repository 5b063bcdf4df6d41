//! Graph and record fixtures. The canonical scenario is a two-agent support
//! workflow: `Auth` collects an `accountId` before transferring to `Billing`.

use serde_json::json;

use switchboard_core::graph::{
    AgentConfig, DataType, PathConfig, PathVariableConfig, ToolConfig, WorkflowGraph,
    WorkflowIdentity,
};
use switchboard_core::records::*;

use crate::MemoryRepository;

pub const WORKFLOW_ID: &str = "wf-support";
pub const ORG_ID: &str = "org-acme";
pub const VERSION_ID: &str = "ver-support-1";
pub const AUTH_AGENT_ID: &str = "agent-auth";
pub const BILLING_AGENT_ID: &str = "agent-billing";
pub const BILLING_PATH_ID: &str = "path-auth-billing";
pub const TRANSFER_MESSAGE: &str = "Transferring you to billing now.";

pub fn identity() -> WorkflowIdentity {
    WorkflowIdentity {
        workflow_id: WORKFLOW_ID.into(),
        organization_id: ORG_ID.into(),
        workflow_name: "Support".into(),
        version_id: VERSION_ID.into(),
        version_number: 1,
    }
}

/// Agent with no providers, tools or paths.
pub fn agent_config(id: &str, name: &str) -> AgentConfig {
    AgentConfig {
        id: id.into(),
        name: name.into(),
        instructions: format!("You are the {} agent.", name),
        stt_config: None,
        llm_config: None,
        tts_config: None,
        vad_config: None,
        turn_detection_config: None,
        tools: vec![],
        paths: vec![],
        metadata: None,
        position: None,
    }
}

pub fn path_config(id: &str, target: &str, name: &str) -> PathConfig {
    PathConfig {
        id: id.into(),
        target_agent_id: target.into(),
        name: name.into(),
        description: None,
        guard_condition: None,
        required_variables: vec![],
        metadata: None,
    }
}

pub fn path_variable(name: &str, data_type: DataType) -> PathVariableConfig {
    PathVariableConfig {
        name: name.into(),
        description: None,
        data_type,
    }
}

pub fn tool_config(id: &str, tool_type: &str, config: serde_json::Value) -> ToolConfig {
    ToolConfig {
        id: id.into(),
        tool_type: tool_type.into(),
        config: config.as_object().cloned().unwrap_or_default(),
        display_name: None,
        llm_description: String::new(),
        runtime_parameters: vec![],
    }
}

/// The Auth → Billing graph, already assembled.
pub fn auth_billing_graph() -> WorkflowGraph {
    let mut path = path_config(BILLING_PATH_ID, BILLING_AGENT_ID, "Billing");
    path.description = Some("Send verified callers to billing.".into());
    path.guard_condition = Some("the caller is verified".into());
    path.required_variables = vec![path_variable("accountId", DataType::String)];
    path.metadata = Some(json!({ "transferMessage": TRANSFER_MESSAGE }));

    let mut auth = agent_config(AUTH_AGENT_ID, "Auth");
    auth.metadata = Some(json!({ "is_entry": true }));
    auth.paths = vec![path];

    let billing = agent_config(BILLING_AGENT_ID, "Billing");

    WorkflowGraph::new(identity(), vec![auth, billing], AUTH_AGENT_ID, None)
        .expect("fixture graph is valid")
}

/// Repository rows for the Auth → Billing workflow with one published version.
pub fn auth_billing_repository() -> MemoryRepository {
    let repo = MemoryRepository::new();
    repo.insert_workflow(WorkflowRecord {
        id: WORKFLOW_ID.into(),
        organization_id: ORG_ID.into(),
        name: "Support".into(),
        description: None,
    });
    repo.insert_version(VersionRecord {
        id: VERSION_ID.into(),
        workflow_id: WORKFLOW_ID.into(),
        version: 1,
        status: VersionStatus::Published,
        config: json!({ "start_position": { "x": 0, "y": 0 } }),
    });
    repo.insert_agent(agent_record(AUTH_AGENT_ID, "Auth", Some(json!({ "is_entry": true }))));
    repo.insert_agent(agent_record(BILLING_AGENT_ID, "Billing", None));
    repo.insert_path(PathRecord {
        id: BILLING_PATH_ID.into(),
        from_agent_id: AUTH_AGENT_ID.into(),
        to_agent_id: BILLING_AGENT_ID.into(),
        name: "Billing".into(),
        description: Some("Send verified callers to billing.".into()),
        guard_condition: Some("the caller is verified".into()),
        metadata: Some(json!({ "transferMessage": TRANSFER_MESSAGE })),
    });
    repo.insert_path_variable(PathVariableRecord {
        id: "var-account".into(),
        path_id: BILLING_PATH_ID.into(),
        name: "accountId".into(),
        description: Some("The caller's account number".into()),
        data_type: Some("string".into()),
    });
    repo
}

pub fn agent_record(id: &str, name: &str, metadata: Option<serde_json::Value>) -> AgentRecord {
    AgentRecord {
        id: id.into(),
        workflow_version_id: VERSION_ID.into(),
        name: name.into(),
        instructions: format!("You are the {} agent.", name),
        stt_config: None,
        llm_config: None,
        tts_config: None,
        vad_config: None,
        turn_detection_config: None,
        metadata,
        position: None,
    }
}

/// Connection whose access token is valid for `expires_in_secs` more seconds.
pub fn connection(
    provider: &str,
    access_secret: Option<&str>,
    refresh_secret: Option<&str>,
    expires_in_secs: i64,
) -> ConnectionRecord {
    ConnectionRecord {
        id: format!("conn-{}", provider),
        organization_id: ORG_ID.into(),
        provider: provider.into(),
        access_token_secret_id: access_secret.map(String::from),
        refresh_token_secret_id: refresh_secret.map(String::from),
        expires_at: Some(chrono::Utc::now() + chrono::Duration::seconds(expires_in_secs)),
        ..Default::default()
    }
}
