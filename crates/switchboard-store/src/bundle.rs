//! JSON export format for a workflow and its rows, used by `switchboard import`.

use serde::{Deserialize, Serialize};
use tracing::info;

use switchboard_core::error::Result;
use switchboard_core::records::*;

use crate::store::SqliteStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowBundle {
    pub workflow: WorkflowRecord,
    #[serde(default)]
    pub versions: Vec<VersionRecord>,
    #[serde(default)]
    pub agents: Vec<AgentRecord>,
    #[serde(default)]
    pub tools: Vec<ToolRecord>,
    #[serde(default)]
    pub paths: Vec<PathRecord>,
    #[serde(default)]
    pub path_variables: Vec<PathVariableRecord>,
    #[serde(default)]
    pub connections: Vec<ConnectionRecord>,
}

impl SqliteStore {
    /// Insert every row of a bundle in dependency order.
    pub fn import_bundle(&self, bundle: &WorkflowBundle) -> Result<()> {
        self.insert_workflow(&bundle.workflow)?;
        for version in &bundle.versions {
            self.insert_version(version)?;
        }
        for agent in &bundle.agents {
            self.insert_agent(agent)?;
        }
        for tool in &bundle.tools {
            self.insert_tool(tool)?;
        }
        for path in &bundle.paths {
            self.insert_path(path)?;
        }
        for variable in &bundle.path_variables {
            self.insert_path_variable(variable)?;
        }
        for connection in &bundle.connections {
            self.insert_connection(connection)?;
        }

        info!(
            workflow_id = %bundle.workflow.id,
            versions = bundle.versions.len(),
            agents = bundle.agents.len(),
            "Workflow imported"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_core::traits::WorkflowRepository;

    #[tokio::test]
    async fn test_import_from_json() {
        let bundle: WorkflowBundle = serde_json::from_str(
            r#"{
                "workflow": {"id": "wf", "organization_id": "org", "name": "Support"},
                "versions": [{"id": "v1", "workflow_id": "wf", "version": 1, "status": "published"}],
                "agents": [
                    {"id": "a", "workflow_version_id": "v1", "name": "Auth", "instructions": "verify"}
                ],
                "paths": [],
                "connections": [{
                    "id": "c1", "organization_id": "org", "provider": "gmail",
                    "access_token_secret_id": null, "access_token_secret_created_at": null,
                    "refresh_token_secret_id": "r1", "refresh_token_secret_created_at": null,
                    "expires_at": null, "scope": null, "profile_email": null
                }]
            }"#,
        )
        .unwrap();

        let store = SqliteStore::in_memory().unwrap();
        store.import_bundle(&bundle).unwrap();

        let version = store.get_published_version("wf").await.unwrap().unwrap();
        assert_eq!(version.id, "v1");
        assert_eq!(store.list_agents("v1").await.unwrap()[0].name, "Auth");
    }
}
