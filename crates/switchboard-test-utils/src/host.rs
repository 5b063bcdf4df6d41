use std::collections::HashMap;
use std::sync::Mutex;

use futures::future::BoxFuture;

use switchboard_core::error::{Result, SwitchboardError};
use switchboard_core::traits::ConversationHost;
use switchboard_core::types::{AgentProfile, ChatMessage};

/// One interaction with the host, in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum HostCall {
    Start(String),
    Announce(String),
    UpdateContext(String),
    GenerateReply,
    SetAttributes(HashMap<String, String>),
}

/// Conversation host that records everything the runtime asks of it.
#[derive(Default)]
pub struct RecordingHost {
    history: Mutex<Vec<ChatMessage>>,
    calls: Mutex<Vec<HostCall>>,
    contexts: Mutex<HashMap<String, Vec<ChatMessage>>>,
    fail_attributes: bool,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Presence updates fail, to exercise best-effort handling.
    pub fn with_failing_attributes() -> Self {
        Self {
            fail_attributes: true,
            ..Self::default()
        }
    }

    pub fn push_user(&self, text: &str) {
        self.history.lock().unwrap().push(ChatMessage::user(text));
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn announcements(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                HostCall::Announce(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Last context pushed for an agent.
    pub fn context_of(&self, agent_id: &str) -> Option<Vec<ChatMessage>> {
        self.contexts.lock().unwrap().get(agent_id).cloned()
    }

    pub fn reply_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, HostCall::GenerateReply))
            .count()
    }
}

impl ConversationHost for RecordingHost {
    fn start(&self, agent: AgentProfile) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(HostCall::Start(agent.agent_id));
            Ok(())
        })
    }

    fn history(&self) -> Vec<ChatMessage> {
        self.history.lock().unwrap().clone()
    }

    fn announce(&self, text: String) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.history
                .lock()
                .unwrap()
                .push(ChatMessage::assistant(text.clone()));
            self.calls.lock().unwrap().push(HostCall::Announce(text));
            Ok(())
        })
    }

    fn update_context(
        &self,
        agent: AgentProfile,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.calls
                .lock()
                .unwrap()
                .push(HostCall::UpdateContext(agent.agent_id.clone()));
            self.contexts.lock().unwrap().insert(agent.agent_id, messages);
            Ok(())
        })
    }

    fn generate_reply(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(HostCall::GenerateReply);
            Ok(())
        })
    }

    fn set_attributes(&self, attributes: HashMap<String, String>) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.fail_attributes {
                return Err(SwitchboardError::Session("participant not connected".into()));
            }
            self.calls
                .lock()
                .unwrap()
                .push(HostCall::SetAttributes(attributes));
            Ok(())
        })
    }
}
