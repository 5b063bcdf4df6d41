use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::sync::{Mutex, PoisonError};

use futures::future::BoxFuture;
use serde_json::Value;

use switchboard_core::error::Result;
use switchboard_core::traits::ConversationHost;
use switchboard_core::types::{AgentProfile, ChatMessage};
use switchboard_runtime::{SessionRuntime, ToolReply};

/// Terminal stand-in for the conversational engine: announcements and turn
/// requests are printed, user turns come from stdin.
#[derive(Default)]
pub struct ConsoleHost {
    history: Mutex<Vec<ChatMessage>>,
}

impl ConsoleHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, message: ChatMessage) {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
    }
}

impl ConversationHost for ConsoleHost {
    fn start(&self, agent: AgentProfile) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            println!(
                "[session] starting with {} (llm {}, stt {}, tts {})",
                agent.name,
                agent.providers.llm.identifier(),
                agent.providers.stt.identifier(),
                agent.providers.tts.identifier()
            );
            Ok(())
        })
    }

    fn history(&self) -> Vec<ChatMessage> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn announce(&self, text: String) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            println!("agent: {}", text);
            self.push(ChatMessage::assistant(text));
            Ok(())
        })
    }

    fn update_context(
        &self,
        agent: AgentProfile,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            println!(
                "[context] {} now has {} messages and {} tools",
                agent.name,
                messages.len(),
                agent.tools.len()
            );
            *self.history.lock().unwrap_or_else(PoisonError::into_inner) = messages;
            Ok(())
        })
    }

    fn generate_reply(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            println!("[turn] waiting for the next reply");
            Ok(())
        })
    }

    fn set_attributes(&self, attributes: HashMap<String, String>) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut pairs: Vec<String> = attributes
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            pairs.sort();
            println!("[presence] {}", pairs.join(" "));
            Ok(())
        })
    }
}

/// Drive a started session from stdin until EOF or `/quit`.
pub async fn run_chat(runtime: &SessionRuntime, host: &ConsoleHost) -> anyhow::Result<()> {
    println!("Session: {}", runtime.session_id());
    println!("Commands: /tools, /call <tool> <json>, /vars, /quit\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        let (command, rest) = input.split_once(char::is_whitespace).unwrap_or((input, ""));
        match command {
            "/quit" | "/exit" | "/q" => break,
            "/tools" => {
                let agent = runtime.active_agent()?;
                println!("{} tools:", agent.name);
                for definition in agent.definitions() {
                    println!("  {:<40} {}", definition.name, definition.description);
                }
            }
            "/vars" => {
                let variables = runtime.userdata().variables();
                if variables.is_empty() {
                    println!("(nothing captured yet)");
                } else {
                    println!("{}", serde_json::to_string_pretty(&variables)?);
                }
            }
            "/call" => {
                let (tool, raw_args) = rest
                    .trim()
                    .split_once(char::is_whitespace)
                    .unwrap_or((rest.trim(), "{}"));
                if tool.is_empty() {
                    println!("usage: /call <tool> <json>");
                    continue;
                }
                let args: Value = match serde_json::from_str(raw_args.trim()) {
                    Ok(v) => v,
                    Err(e) => {
                        println!("invalid JSON arguments: {}", e);
                        continue;
                    }
                };
                match runtime.call_tool(tool, args).await {
                    Ok(ToolReply::Payload(value)) => {
                        println!("{}", serde_json::to_string_pretty(&value)?)
                    }
                    Ok(ToolReply::Transferred { agent_name, .. }) => {
                        println!("[transfer] now speaking with {}", agent_name)
                    }
                    Err(e) if e.is_fatal() => return Err(e.into()),
                    Err(e) => println!("error: {}", e),
                }
            }
            _ if command.starts_with('/') => println!("unknown command {}", command),
            _ => host.push(ChatMessage::user(input)),
        }
    }

    println!("Goodbye!");
    Ok(())
}
