use chrono::{SecondsFormat, Utc};
use futures::future::BoxFuture;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

use switchboard_core::error::{Result, SwitchboardError};
use switchboard_core::records::*;
use switchboard_core::traits::WorkflowRepository;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS workflows (
        id TEXT PRIMARY KEY,
        organization_id TEXT NOT NULL,
        name TEXT NOT NULL,
        description TEXT,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS workflow_versions (
        id TEXT PRIMARY KEY,
        workflow_id TEXT NOT NULL REFERENCES workflows(id),
        version INTEGER NOT NULL,
        status TEXT NOT NULL,
        config TEXT,
        created_at TEXT NOT NULL,
        UNIQUE (workflow_id, version)
    );

    CREATE TABLE IF NOT EXISTS agent_nodes (
        id TEXT PRIMARY KEY,
        workflow_version_id TEXT NOT NULL REFERENCES workflow_versions(id),
        name TEXT NOT NULL,
        instructions TEXT NOT NULL,
        stt_config TEXT,
        llm_config TEXT,
        tts_config TEXT,
        vad_config TEXT,
        turn_detection_config TEXT,
        metadata TEXT,
        position TEXT,
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_agent_nodes_version
        ON agent_nodes(workflow_version_id, created_at);

    CREATE TABLE IF NOT EXISTS agent_tools (
        id TEXT PRIMARY KEY,
        agent_id TEXT NOT NULL REFERENCES agent_nodes(id),
        tool_type TEXT NOT NULL,
        config TEXT,
        display_name TEXT,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS agent_paths (
        id TEXT PRIMARY KEY,
        from_agent_id TEXT NOT NULL REFERENCES agent_nodes(id),
        to_agent_id TEXT NOT NULL,
        name TEXT NOT NULL,
        description TEXT,
        guard_condition TEXT,
        metadata TEXT,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS path_variables (
        id TEXT PRIMARY KEY,
        path_id TEXT NOT NULL REFERENCES agent_paths(id),
        name TEXT NOT NULL,
        description TEXT,
        data_type TEXT,
        created_at TEXT NOT NULL,
        UNIQUE (path_id, name)
    );

    CREATE TABLE IF NOT EXISTS integration_connections (
        id TEXT PRIMARY KEY,
        organization_id TEXT NOT NULL,
        provider TEXT NOT NULL,
        access_token_secret_id TEXT,
        access_token_secret_created_at TEXT,
        refresh_token_secret_id TEXT,
        refresh_token_secret_created_at TEXT,
        expires_at TEXT,
        scope TEXT,
        profile_email TEXT,
        updated_at TEXT NOT NULL,
        UNIQUE (organization_id, provider)
    );
";

/// SQLite-backed workflow and connection store.
pub struct SqliteStore {
    pub(crate) conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SwitchboardError::Database(format!("Failed to create db directory: {}", e))
            })?;
        }

        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;

        debug!(path = %path.display(), "SQLite store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| SwitchboardError::Database(e.to_string()))
    }
}

// Writes. The runtime itself only reads; these back imports and tests.
impl SqliteStore {
    pub fn insert_workflow(&self, w: &WorkflowRecord) -> Result<()> {
        self.lock()?
            .execute(
                "INSERT INTO workflows (id, organization_id, name, description, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![w.id, w.organization_id, w.name, w.description, now()],
            )
            .map_err(db_err)?;
        Ok(())
    }

    pub fn insert_version(&self, v: &VersionRecord) -> Result<()> {
        self.lock()?
            .execute(
                "INSERT INTO workflow_versions (id, workflow_id, version, status, config, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    v.id,
                    v.workflow_id,
                    v.version,
                    v.status.as_str(),
                    v.config.to_string(),
                    now()
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    pub fn insert_agent(&self, a: &AgentRecord) -> Result<()> {
        self.lock()?
            .execute(
                "INSERT INTO agent_nodes (id, workflow_version_id, name, instructions, stt_config,
                    llm_config, tts_config, vad_config, turn_detection_config, metadata, position,
                    created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    a.id,
                    a.workflow_version_id,
                    a.name,
                    a.instructions,
                    json_text(&a.stt_config),
                    json_text(&a.llm_config),
                    json_text(&a.tts_config),
                    json_text(&a.vad_config),
                    json_text(&a.turn_detection_config),
                    json_text(&a.metadata),
                    json_text(&a.position),
                    now()
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    pub fn insert_tool(&self, t: &ToolRecord) -> Result<()> {
        self.lock()?
            .execute(
                "INSERT INTO agent_tools (id, agent_id, tool_type, config, display_name, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    t.id,
                    t.agent_id,
                    t.tool_type,
                    t.config.to_string(),
                    t.display_name,
                    now()
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    pub fn insert_path(&self, p: &PathRecord) -> Result<()> {
        self.lock()?
            .execute(
                "INSERT INTO agent_paths (id, from_agent_id, to_agent_id, name, description,
                    guard_condition, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    p.id,
                    p.from_agent_id,
                    p.to_agent_id,
                    p.name,
                    p.description,
                    p.guard_condition,
                    json_text(&p.metadata),
                    now()
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    pub fn insert_path_variable(&self, v: &PathVariableRecord) -> Result<()> {
        self.lock()?
            .execute(
                "INSERT INTO path_variables (id, path_id, name, description, data_type, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![v.id, v.path_id, v.name, v.description, v.data_type, now()],
            )
            .map_err(db_err)?;
        Ok(())
    }

    /// Workflows with their newest version number, for listing.
    pub fn list_workflows(&self) -> Result<Vec<(WorkflowRecord, Option<i64>)>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT w.id, w.organization_id, w.name, w.description, MAX(v.version)
                 FROM workflows w
                 LEFT JOIN workflow_versions v ON v.workflow_id = w.id
                 GROUP BY w.id
                 ORDER BY w.created_at, w.rowid",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| Ok((workflow_from_row(row)?, row.get(4)?)))
            .map_err(db_err)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(db_err)?);
        }
        Ok(out)
    }

    fn query_version(&self, sql: &str, key: &str, status: Option<&str>) -> Result<Option<VersionRecord>> {
        let conn = self.lock()?;
        let row = match status {
            Some(status) => conn.query_row(sql, params![key, status], version_from_row),
            None => conn.query_row(sql, params![key], version_from_row),
        };
        row.optional().map_err(db_err)?.transpose()
    }

    fn query_all<T, F>(&self, sql: &str, key: &str, map: F) -> Result<Vec<T>>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql).map_err(db_err)?;
        let rows = stmt.query_map(params![key], map).map_err(db_err)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(db_err)?);
        }
        Ok(out)
    }
}

const VERSION_COLUMNS: &str = "id, workflow_id, version, status, config";

impl WorkflowRepository for SqliteStore {
    fn get_workflow(&self, workflow_id: &str) -> BoxFuture<'_, Result<Option<WorkflowRecord>>> {
        let workflow_id = workflow_id.to_string();
        Box::pin(async move {
            let conn = self.lock()?;
            conn.query_row(
                "SELECT id, organization_id, name, description FROM workflows WHERE id = ?1",
                params![workflow_id],
                workflow_from_row,
            )
            .optional()
            .map_err(db_err)
        })
    }

    fn get_version(&self, version_id: &str) -> BoxFuture<'_, Result<Option<VersionRecord>>> {
        let version_id = version_id.to_string();
        Box::pin(async move {
            let sql = format!("SELECT {} FROM workflow_versions WHERE id = ?1", VERSION_COLUMNS);
            self.query_version(&sql, &version_id, None)
        })
    }

    fn get_published_version(
        &self,
        workflow_id: &str,
    ) -> BoxFuture<'_, Result<Option<VersionRecord>>> {
        let workflow_id = workflow_id.to_string();
        Box::pin(async move {
            let sql = format!(
                "SELECT {} FROM workflow_versions WHERE workflow_id = ?1 AND status = ?2
                 ORDER BY version DESC LIMIT 1",
                VERSION_COLUMNS
            );
            self.query_version(&sql, &workflow_id, Some(VersionStatus::Published.as_str()))
        })
    }

    fn get_latest_draft(&self, workflow_id: &str) -> BoxFuture<'_, Result<Option<VersionRecord>>> {
        let workflow_id = workflow_id.to_string();
        Box::pin(async move {
            let sql = format!(
                "SELECT {} FROM workflow_versions WHERE workflow_id = ?1 AND status = ?2
                 ORDER BY version DESC LIMIT 1",
                VERSION_COLUMNS
            );
            self.query_version(&sql, &workflow_id, Some(VersionStatus::Draft.as_str()))
        })
    }

    fn list_agents(&self, version_id: &str) -> BoxFuture<'_, Result<Vec<AgentRecord>>> {
        let version_id = version_id.to_string();
        Box::pin(async move {
            self.query_all(
                "SELECT id, workflow_version_id, name, instructions, stt_config, llm_config,
                        tts_config, vad_config, turn_detection_config, metadata, position
                 FROM agent_nodes WHERE workflow_version_id = ?1
                 ORDER BY created_at, rowid",
                &version_id,
                |row| {
                    Ok(AgentRecord {
                        id: row.get(0)?,
                        workflow_version_id: row.get(1)?,
                        name: row.get(2)?,
                        instructions: row.get(3)?,
                        stt_config: json_column(row, 4)?,
                        llm_config: json_column(row, 5)?,
                        tts_config: json_column(row, 6)?,
                        vad_config: json_column(row, 7)?,
                        turn_detection_config: json_column(row, 8)?,
                        metadata: json_column(row, 9)?,
                        position: json_column(row, 10)?,
                    })
                },
            )
        })
    }

    fn list_tools(&self, agent_id: &str) -> BoxFuture<'_, Result<Vec<ToolRecord>>> {
        let agent_id = agent_id.to_string();
        Box::pin(async move {
            self.query_all(
                "SELECT id, agent_id, tool_type, config, display_name
                 FROM agent_tools WHERE agent_id = ?1
                 ORDER BY created_at, rowid",
                &agent_id,
                |row| {
                    Ok(ToolRecord {
                        id: row.get(0)?,
                        agent_id: row.get(1)?,
                        tool_type: row.get(2)?,
                        config: json_column(row, 3)?.unwrap_or(serde_json::Value::Null),
                        display_name: row.get(4)?,
                    })
                },
            )
        })
    }

    fn list_paths(&self, agent_id: &str) -> BoxFuture<'_, Result<Vec<PathRecord>>> {
        let agent_id = agent_id.to_string();
        Box::pin(async move {
            self.query_all(
                "SELECT id, from_agent_id, to_agent_id, name, description, guard_condition, metadata
                 FROM agent_paths WHERE from_agent_id = ?1
                 ORDER BY created_at, rowid",
                &agent_id,
                |row| {
                    Ok(PathRecord {
                        id: row.get(0)?,
                        from_agent_id: row.get(1)?,
                        to_agent_id: row.get(2)?,
                        name: row.get(3)?,
                        description: row.get(4)?,
                        guard_condition: row.get(5)?,
                        metadata: json_column(row, 6)?,
                    })
                },
            )
        })
    }

    fn list_path_variables(&self, path_id: &str) -> BoxFuture<'_, Result<Vec<PathVariableRecord>>> {
        let path_id = path_id.to_string();
        Box::pin(async move {
            self.query_all(
                "SELECT id, path_id, name, description, data_type
                 FROM path_variables WHERE path_id = ?1
                 ORDER BY created_at, rowid",
                &path_id,
                |row| {
                    Ok(PathVariableRecord {
                        id: row.get(0)?,
                        path_id: row.get(1)?,
                        name: row.get(2)?,
                        description: row.get(3)?,
                        data_type: row.get(4)?,
                    })
                },
            )
        })
    }
}

pub(crate) fn db_err(e: impl std::fmt::Display) -> SwitchboardError {
    SwitchboardError::Database(e.to_string())
}

/// Fixed-width timestamps so text ordering matches time ordering.
pub(crate) fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn json_text(value: &Option<serde_json::Value>) -> Option<String> {
    value.as_ref().map(|v| v.to_string())
}

/// Read a nullable JSON text column. Unparseable text is treated as absent.
fn json_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<serde_json::Value>> {
    let text: Option<String> = row.get(idx)?;
    Ok(text
        .and_then(|t| serde_json::from_str(&t).ok())
        .filter(|v: &serde_json::Value| !v.is_null()))
}

fn workflow_from_row(row: &Row<'_>) -> rusqlite::Result<WorkflowRecord> {
    Ok(WorkflowRecord {
        id: row.get(0)?,
        organization_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
    })
}

/// Status text is validated after the row is read, so an unknown status
/// surfaces as a database error rather than a panic.
fn version_from_row(row: &Row<'_>) -> rusqlite::Result<Result<VersionRecord>> {
    let status: String = row.get(3)?;
    let config = json_column(row, 4)?.unwrap_or(serde_json::Value::Null);
    let id: String = row.get(0)?;
    let workflow_id: String = row.get(1)?;
    let version: i64 = row.get(2)?;
    Ok(status
        .parse::<VersionStatus>()
        .map_err(SwitchboardError::Database)
        .map(|status| VersionRecord {
            id,
            workflow_id,
            version,
            status,
            config,
        }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seed(store: &SqliteStore) {
        store
            .insert_workflow(&WorkflowRecord {
                id: "wf".into(),
                organization_id: "org".into(),
                name: "Support".into(),
                description: None,
            })
            .unwrap();
        for (id, version, status) in [
            ("v1", 1, VersionStatus::Published),
            ("v2", 2, VersionStatus::Published),
            ("v3", 3, VersionStatus::Draft),
            ("v4", 4, VersionStatus::Archived),
        ] {
            store
                .insert_version(&VersionRecord {
                    id: id.into(),
                    workflow_id: "wf".into(),
                    version,
                    status,
                    config: json!({"start_position": {"x": version}}),
                })
                .unwrap();
        }
    }

    fn agent(id: &str, metadata: Option<serde_json::Value>) -> AgentRecord {
        AgentRecord {
            id: id.into(),
            workflow_version_id: "v2".into(),
            name: id.to_uppercase(),
            instructions: "help".into(),
            stt_config: Some(json!({"provider": "deepgram"})),
            llm_config: None,
            tts_config: None,
            vad_config: None,
            turn_detection_config: None,
            metadata,
            position: Some(json!({"x": 1, "y": 2})),
        }
    }

    #[tokio::test]
    async fn test_version_selection_by_status() {
        let store = SqliteStore::in_memory().unwrap();
        seed(&store);

        let published = store.get_published_version("wf").await.unwrap().unwrap();
        assert_eq!(published.id, "v2");
        let draft = store.get_latest_draft("wf").await.unwrap().unwrap();
        assert_eq!(draft.id, "v3");
        assert_eq!(draft.config["start_position"]["x"], 3);

        assert!(store.get_published_version("nope").await.unwrap().is_none());
        assert_eq!(store.get_version("v4").await.unwrap().unwrap().status, VersionStatus::Archived);
    }

    #[tokio::test]
    async fn test_agents_listed_in_insertion_order() {
        let store = SqliteStore::in_memory().unwrap();
        seed(&store);
        for id in ["zeta", "alpha", "mid"] {
            store.insert_agent(&agent(id, None)).unwrap();
        }

        let agents = store.list_agents("v2").await.unwrap();
        let ids: Vec<&str> = agents.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["zeta", "alpha", "mid"]);
        assert_eq!(agents[0].stt_config, Some(json!({"provider": "deepgram"})));
        assert_eq!(agents[0].llm_config, None);
        assert!(store.list_agents("v1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tools_paths_and_variables() {
        let store = SqliteStore::in_memory().unwrap();
        seed(&store);
        store.insert_agent(&agent("a", Some(json!({"is_entry": true})))).unwrap();
        store.insert_agent(&agent("b", None)).unwrap();
        store
            .insert_tool(&ToolRecord {
                id: "t1".into(),
                agent_id: "a".into(),
                tool_type: "airtable.find_record_by_field".into(),
                config: json!({"baseId": "app1"}),
                display_name: Some("Lookup".into()),
            })
            .unwrap();
        store
            .insert_path(&PathRecord {
                id: "p1".into(),
                from_agent_id: "a".into(),
                to_agent_id: "b".into(),
                name: "To B".into(),
                description: None,
                guard_condition: Some("verified".into()),
                metadata: Some(json!({"transferMessage": "hold on"})),
            })
            .unwrap();
        store
            .insert_path_variable(&PathVariableRecord {
                id: "pv1".into(),
                path_id: "p1".into(),
                name: "accountId".into(),
                description: None,
                data_type: Some("string".into()),
            })
            .unwrap();

        let tools = store.list_tools("a").await.unwrap();
        assert_eq!(tools[0].config["baseId"], "app1");
        let paths = store.list_paths("a").await.unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].guard_condition.as_deref(), Some("verified"));
        assert!(store.list_paths("b").await.unwrap().is_empty());
        let vars = store.list_path_variables("p1").await.unwrap();
        assert_eq!(vars[0].name, "accountId");
    }

    #[test]
    fn test_open_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("switchboard.db");
        let store = SqliteStore::open(&path).unwrap();
        seed(&store);
        assert!(path.exists());
        let listed = store.list_workflows().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].1, Some(4));
    }
}
