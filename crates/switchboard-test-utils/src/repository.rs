use std::sync::Mutex;

use futures::future::BoxFuture;

use switchboard_core::error::Result;
use switchboard_core::records::*;
use switchboard_core::traits::WorkflowRepository;

#[derive(Default)]
struct Tables {
    workflows: Vec<WorkflowRecord>,
    versions: Vec<VersionRecord>,
    agents: Vec<AgentRecord>,
    tools: Vec<ToolRecord>,
    paths: Vec<PathRecord>,
    variables: Vec<PathVariableRecord>,
}

/// Workflow rows held in insertion order.
#[derive(Default)]
pub struct MemoryRepository {
    tables: Mutex<Tables>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_workflow(&self, record: WorkflowRecord) {
        self.tables.lock().unwrap().workflows.push(record);
    }

    pub fn insert_version(&self, record: VersionRecord) {
        self.tables.lock().unwrap().versions.push(record);
    }

    pub fn insert_agent(&self, record: AgentRecord) {
        self.tables.lock().unwrap().agents.push(record);
    }

    pub fn insert_tool(&self, record: ToolRecord) {
        self.tables.lock().unwrap().tools.push(record);
    }

    pub fn insert_path(&self, record: PathRecord) {
        self.tables.lock().unwrap().paths.push(record);
    }

    pub fn insert_path_variable(&self, record: PathVariableRecord) {
        self.tables.lock().unwrap().variables.push(record);
    }

    fn latest_with_status(&self, workflow_id: &str, status: VersionStatus) -> Option<VersionRecord> {
        self.tables
            .lock()
            .unwrap()
            .versions
            .iter()
            .filter(|v| v.workflow_id == workflow_id && v.status == status)
            .max_by_key(|v| v.version)
            .cloned()
    }
}

impl WorkflowRepository for MemoryRepository {
    fn get_workflow(&self, workflow_id: &str) -> BoxFuture<'_, Result<Option<WorkflowRecord>>> {
        let found = self
            .tables
            .lock()
            .unwrap()
            .workflows
            .iter()
            .find(|w| w.id == workflow_id)
            .cloned();
        Box::pin(async move { Ok(found) })
    }

    fn get_version(&self, version_id: &str) -> BoxFuture<'_, Result<Option<VersionRecord>>> {
        let found = self
            .tables
            .lock()
            .unwrap()
            .versions
            .iter()
            .find(|v| v.id == version_id)
            .cloned();
        Box::pin(async move { Ok(found) })
    }

    fn get_published_version(
        &self,
        workflow_id: &str,
    ) -> BoxFuture<'_, Result<Option<VersionRecord>>> {
        let found = self.latest_with_status(workflow_id, VersionStatus::Published);
        Box::pin(async move { Ok(found) })
    }

    fn get_latest_draft(&self, workflow_id: &str) -> BoxFuture<'_, Result<Option<VersionRecord>>> {
        let found = self.latest_with_status(workflow_id, VersionStatus::Draft);
        Box::pin(async move { Ok(found) })
    }

    fn list_agents(&self, version_id: &str) -> BoxFuture<'_, Result<Vec<AgentRecord>>> {
        let rows = self
            .tables
            .lock()
            .unwrap()
            .agents
            .iter()
            .filter(|a| a.workflow_version_id == version_id)
            .cloned()
            .collect();
        Box::pin(async move { Ok(rows) })
    }

    fn list_tools(&self, agent_id: &str) -> BoxFuture<'_, Result<Vec<ToolRecord>>> {
        let rows = self
            .tables
            .lock()
            .unwrap()
            .tools
            .iter()
            .filter(|t| t.agent_id == agent_id)
            .cloned()
            .collect();
        Box::pin(async move { Ok(rows) })
    }

    fn list_paths(&self, agent_id: &str) -> BoxFuture<'_, Result<Vec<PathRecord>>> {
        let rows = self
            .tables
            .lock()
            .unwrap()
            .paths
            .iter()
            .filter(|p| p.from_agent_id == agent_id)
            .cloned()
            .collect();
        Box::pin(async move { Ok(rows) })
    }

    fn list_path_variables(&self, path_id: &str) -> BoxFuture<'_, Result<Vec<PathVariableRecord>>> {
        let rows = self
            .tables
            .lock()
            .unwrap()
            .variables
            .iter()
            .filter(|v| v.path_id == path_id)
            .cloned()
            .collect();
        Box::pin(async move { Ok(rows) })
    }
}
