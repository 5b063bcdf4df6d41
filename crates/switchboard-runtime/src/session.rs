//! Per-session state and the runtime that drives one conversation through a
//! workflow graph.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{info, warn};

use switchboard_core::error::{Result, SwitchboardError};
use switchboard_core::event::EventBus;
use switchboard_core::graph::WorkflowGraph;
use switchboard_core::traits::{ConversationHost, SessionState};
use switchboard_core::types::{
    ChatMessage, Handoff, PathVariables, SessionEvent, SessionId, ToolContext, ToolOutput,
};

use crate::agent::Agent;
use crate::factory::AgentFactory;

/// Session-owned state: every instantiated agent, the captured path
/// variables and the active agent id. Never shared between sessions.
pub struct UserData {
    session_id: SessionId,
    agents: HashMap<String, Arc<Agent>>,
    variables: Mutex<PathVariables>,
    active: Mutex<String>,
    events: Arc<EventBus>,
}

impl UserData {
    fn new(
        session_id: SessionId,
        agents: HashMap<String, Arc<Agent>>,
        active: String,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            session_id,
            agents,
            variables: Mutex::new(PathVariables::new()),
            active: Mutex::new(active),
            events,
        }
    }

    pub fn agent(&self, agent_id: &str) -> Option<Arc<Agent>> {
        self.agents.get(agent_id).cloned()
    }

    pub fn active_agent_id(&self) -> String {
        self.active.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn set_active(&self, agent_id: &str) {
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = agent_id.to_string();
    }

    /// Snapshot of everything captured so far.
    pub fn variables(&self) -> PathVariables {
        self.variables.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl SessionState for UserData {
    fn record_variable(&self, path_id: &str, name: &str, value: Value) {
        self.variables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(path_id.to_string())
            .or_default()
            .insert(name.to_string(), value);
        self.events.publish(SessionEvent::VariableCaptured {
            session_id: self.session_id.clone(),
            path_id: path_id.to_string(),
            variable: name.to_string(),
        });
    }

    fn path_variables(&self, path_id: &str) -> Map<String, Value> {
        self.variables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path_id)
            .cloned()
            .unwrap_or_default()
    }
}

/// Outcome of a tool call as seen by the conversational engine.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolReply {
    Payload(Value),
    Transferred { agent_id: String, agent_name: String },
}

pub struct SessionRuntime {
    session_id: SessionId,
    graph: Arc<WorkflowGraph>,
    userdata: Arc<UserData>,
    host: Arc<dyn ConversationHost>,
    events: Arc<EventBus>,
    tool_timeout_secs: Option<u64>,
}

impl SessionRuntime {
    /// Instantiate every agent of the graph for a new session.
    pub fn new(
        graph: Arc<WorkflowGraph>,
        factory: &AgentFactory,
        host: Arc<dyn ConversationHost>,
        events: Arc<EventBus>,
    ) -> Result<Self> {
        let session_id = SessionId::new();
        let agents: HashMap<String, Arc<Agent>> = graph
            .agents()
            .map(|config| (config.id.clone(), Arc::new(factory.create(config, &graph))))
            .collect();

        let entry = graph.entry_agent_id().to_string();
        if !agents.contains_key(&entry) {
            return Err(SwitchboardError::UnknownAgent(entry));
        }

        let userdata = Arc::new(UserData::new(session_id.clone(), agents, entry, events.clone()));
        Ok(Self {
            session_id,
            graph,
            userdata,
            host,
            events,
            tool_timeout_secs: None,
        })
    }

    /// Apply one timeout to every tool call instead of each tool's own.
    pub fn with_tool_timeout(mut self, secs: u64) -> Self {
        self.tool_timeout_secs = Some(secs);
        self
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    pub fn userdata(&self) -> &Arc<UserData> {
        &self.userdata
    }

    pub fn active_agent(&self) -> Result<Arc<Agent>> {
        let id = self.userdata.active_agent_id();
        self.userdata
            .agent(&id)
            .ok_or(SwitchboardError::UnknownAgent(id))
    }

    /// Hand the entry agent to the host and run its entry hooks.
    pub async fn start(&self) -> Result<()> {
        let entry = self.active_agent()?;
        info!(
            session_id = %self.session_id,
            workflow = %self.graph.workflow_name,
            version = self.graph.version_number,
            entry = %entry.name,
            "Session starting"
        );
        self.events.publish(SessionEvent::Started {
            session_id: self.session_id.clone(),
            workflow_id: self.graph.workflow_id.clone(),
            version_id: self.graph.version_id.clone(),
        });

        self.host.start(entry.profile()).await?;
        self.enter_agent(&entry, Vec::new()).await
    }

    /// Invoke a tool of the active agent. Transfers are applied before
    /// returning.
    pub async fn call_tool(&self, name: &str, input: Value) -> Result<ToolReply> {
        let agent = self.active_agent()?;
        let tool = agent
            .tool(name)
            .ok_or_else(|| SwitchboardError::ToolNotFound(name.to_string()))?;

        self.events.publish(SessionEvent::ToolStarted {
            session_id: self.session_id.clone(),
            tool: name.to_string(),
        });

        let ctx = ToolContext {
            session_id: self.session_id.clone(),
            organization_id: self.graph.organization_id.clone(),
            session: self.userdata.clone(),
        };
        let timeout_secs = self.tool_timeout_secs.unwrap_or_else(|| tool.timeout_secs());
        let result = match tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            tool.execute(input, ctx),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(SwitchboardError::ToolTimeout {
                tool: name.to_string(),
                timeout_secs,
            }),
        };

        self.events.publish(SessionEvent::ToolFinished {
            session_id: self.session_id.clone(),
            tool: name.to_string(),
            is_error: result.is_err(),
        });

        match result {
            Ok(ToolOutput::Payload(value)) => Ok(ToolReply::Payload(value)),
            Ok(ToolOutput::Transfer(handoff)) => {
                let target = self.apply_handoff(handoff).await?;
                Ok(ToolReply::Transferred {
                    agent_id: target.id.clone(),
                    agent_name: target.name.clone(),
                })
            }
            Err(e) => {
                if e.is_tool_failure() {
                    warn!(session_id = %self.session_id, tool = %name, error = %e, "Tool call failed");
                }
                Err(e)
            }
        }
    }

    /// Switch the active agent. A target outside this session is fatal.
    pub async fn apply_handoff(&self, handoff: Handoff) -> Result<Arc<Agent>> {
        let target = self
            .userdata
            .agent(&handoff.target_agent_id)
            .ok_or_else(|| SwitchboardError::UnknownAgent(handoff.target_agent_id.clone()))?;
        let from = self.userdata.active_agent_id();

        if let Some(text) = handoff.announcement.clone() {
            self.host.announce(text).await?;
        }

        self.userdata.set_active(&target.id);
        self.events.publish(SessionEvent::Transferred {
            session_id: self.session_id.clone(),
            from_agent_id: from.clone(),
            to_agent_id: target.id.clone(),
        });
        info!(
            session_id = %self.session_id,
            from = %from,
            to = %target.id,
            path = %handoff.path_name,
            "Transferred"
        );

        let notes: Vec<String> = handoff.summary_note().into_iter().collect();
        self.enter_agent(&target, notes).await?;
        Ok(target)
    }

    /// Entry hooks: presence attributes, one merged context update, next turn.
    async fn enter_agent(&self, agent: &Agent, notes: Vec<String>) -> Result<()> {
        info!(session_id = %self.session_id, agent_id = %agent.id, agent = %agent.name, "Entering agent");

        let attributes = HashMap::from([
            ("agent".to_string(), agent.name.clone()),
            ("agent_id".to_string(), agent.id.clone()),
        ]);
        if let Err(e) = self.host.set_attributes(attributes).await {
            warn!(session_id = %self.session_id, agent_id = %agent.id, error = %e, "Failed to update presence attributes");
        }

        let mut messages = self.host.history();
        messages.extend(notes.into_iter().map(ChatMessage::system));
        messages.push(ChatMessage::system(format!(
            "You are now {}. Continue the conversation naturally.",
            agent.name
        )));
        self.host.update_context(agent.profile(), messages).await?;

        self.events.publish(SessionEvent::AgentEntered {
            session_id: self.session_id.clone(),
            agent_id: agent.id.clone(),
            agent_name: agent.name.clone(),
        });

        self.host.generate_reply().await
    }
}
