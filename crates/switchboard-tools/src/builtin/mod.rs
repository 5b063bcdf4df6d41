pub mod airtable;
pub mod gmail;
pub mod message;

pub use airtable::AirtableFindRecordBuilder;
pub use gmail::GmailSendEmailBuilder;

use serde_json::{json, Value};

use switchboard_core::error::SwitchboardError;

/// Response body as JSON; non-JSON bodies are wrapped as `{"raw": text}`.
pub(crate) async fn read_body(resp: reqwest::Response) -> Value {
    let text = resp.text().await.unwrap_or_default();
    serde_json::from_str(&text).unwrap_or_else(|_| json!({ "raw": text }))
}

/// Map a non-success provider response to a typed error. Authorization
/// failures become `Unauthorized` so the caller can refresh and retry.
pub(crate) fn provider_error(provider: &str, status: u16, body: &Value, fallback: &str) -> SwitchboardError {
    if status == 401 || status == 403 {
        return SwitchboardError::Unauthorized {
            provider: provider.to_string(),
            status,
        };
    }
    let message = body
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .unwrap_or(fallback);
    SwitchboardError::Integration {
        provider: provider.to_string(),
        status: Some(status),
        message: message.to_string(),
    }
}

pub(crate) fn transport_error(provider: &str, e: reqwest::Error) -> SwitchboardError {
    SwitchboardError::Integration {
        provider: provider.to_string(),
        status: None,
        message: format!("Request failed: {}", e),
    }
}

/// LLM-facing description: configured text, then display name, then `fallback`.
pub(crate) fn tool_description(
    tool: &switchboard_core::graph::ToolConfig,
    fallback: &str,
) -> String {
    if !tool.llm_description.trim().is_empty() {
        return tool.llm_description.clone();
    }
    tool.display_name
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or(fallback)
        .to_string()
}
