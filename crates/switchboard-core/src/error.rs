use thiserror::Error;

#[derive(Debug, Error)]
pub enum SwitchboardError {
    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Graph errors
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid workflow graph: {0}")]
    InvalidGraph(String),

    // Storage errors
    #[error("Database error: {0}")]
    Database(String),

    // Vault errors
    #[error("Vault error: {0}")]
    Vault(String),

    #[error("Vault authorization failed: {0}")]
    VaultAuth(String),

    // Credential errors
    #[error("{provider} is not connected for this organization.")]
    NotConnected { provider: String },

    #[error("{0}")]
    MissingCredential(String),

    #[error("{provider} rejected the access token (HTTP {status})")]
    Unauthorized { provider: String, status: u16 },

    // Integration errors
    #[error("{provider}: {message}")]
    Integration {
        provider: String,
        status: Option<u16>,
        message: String,
    },

    // Tool errors
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("{0}")]
    ToolValidation(String),

    #[error("{0}")]
    ToolFailed(String),

    #[error("Tool timeout after {timeout_secs}s: {tool}")]
    ToolTimeout { tool: String, timeout_secs: u64 },

    #[error("Collect required variables before transferring: {}", .names.join(", "))]
    MissingVariables { names: Vec<String> },

    // Session errors
    #[error("Agent {0} is not part of this session")]
    UnknownAgent(String),

    #[error("Session error: {0}")]
    Session(String),

    // Transport errors
    #[error("HTTP error: {0}")]
    Http(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SwitchboardError {
    /// Build a `MissingVariables` error with names sorted for stable messages.
    pub fn missing_variables<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = names.into_iter().map(Into::into).collect();
        names.sort();
        names.dedup();
        Self::MissingVariables { names }
    }

    /// Errors that are reported back to the conversation as a tool failure
    /// rather than aborting the session.
    pub fn is_tool_failure(&self) -> bool {
        matches!(
            self,
            Self::NotConnected { .. }
                | Self::MissingCredential(_)
                | Self::Unauthorized { .. }
                | Self::Integration { .. }
                | Self::ToolValidation(_)
                | Self::ToolFailed(_)
                | Self::ToolTimeout { .. }
                | Self::MissingVariables { .. }
        )
    }

    /// Errors that signal a broken deployment or programming error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::UnknownAgent(_) | Self::VaultAuth(_) | Self::Config(_) | Self::InvalidGraph(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SwitchboardError>;
