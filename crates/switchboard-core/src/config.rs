use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SwitchboardError};

/// Top-level Switchboard configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub vault: VaultConfig,
    #[serde(default)]
    pub integrations: IntegrationsConfig,
    #[serde(default)]
    pub speech: SpeechDefaults,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

/// Secret vault RPC endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            timeout_secs: default_http_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationsConfig {
    /// Timeout applied to every provider call (token refresh, lookup, send).
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
    /// Access tokens expiring within this many seconds are refreshed first.
    #[serde(default = "default_refresh_margin")]
    pub refresh_margin_secs: i64,
    #[serde(default)]
    pub airtable: AirtableConfig,
    #[serde(default)]
    pub gmail: GmailConfig,
}

impl Default for IntegrationsConfig {
    fn default() -> Self {
        Self {
            http_timeout_secs: default_http_timeout(),
            refresh_margin_secs: default_refresh_margin(),
            airtable: AirtableConfig::default(),
            gmail: GmailConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AirtableConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_airtable_token_url")]
    pub token_url: String,
    #[serde(default = "default_airtable_api_base")]
    pub api_base: String,
    #[serde(default = "default_max_records")]
    pub default_max_records: u32,
    #[serde(default = "default_limit_ceiling")]
    pub max_records_limit: u32,
}

impl Default for AirtableConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            token_url: default_airtable_token_url(),
            api_base: default_airtable_api_base(),
            default_max_records: default_max_records(),
            max_records_limit: default_limit_ceiling(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GmailConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_gmail_token_url")]
    pub token_url: String,
    #[serde(default = "default_gmail_send_url")]
    pub send_url: String,
    #[serde(default = "default_gmail_userinfo_url")]
    pub userinfo_url: String,
    #[serde(default = "default_max_recipients")]
    pub default_max_recipients: u32,
    #[serde(default = "default_limit_ceiling")]
    pub max_recipients_limit: u32,
}

impl Default for GmailConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            token_url: default_gmail_token_url(),
            send_url: default_gmail_send_url(),
            userinfo_url: default_gmail_userinfo_url(),
            default_max_recipients: default_max_recipients(),
            max_recipients_limit: default_limit_ceiling(),
        }
    }
}

/// Fallback provider selection when an agent leaves a slot unconfigured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechDefaults {
    #[serde(default = "default_stt_provider")]
    pub stt_provider: String,
    #[serde(default = "default_stt_model")]
    pub stt_model: String,
    #[serde(default = "default_llm_provider")]
    pub llm_provider: String,
    #[serde(default = "default_llm_model")]
    pub llm_model: String,
    #[serde(default = "default_tts_provider")]
    pub tts_provider: String,
    #[serde(default = "default_tts_voice")]
    pub tts_voice: String,
    #[serde(default = "default_vad_provider")]
    pub vad_provider: String,
}

impl Default for SpeechDefaults {
    fn default() -> Self {
        Self {
            stt_provider: default_stt_provider(),
            stt_model: default_stt_model(),
            llm_provider: default_llm_provider(),
            llm_model: default_llm_model(),
            tts_provider: default_tts_provider(),
            tts_voice: default_tts_voice(),
            vad_provider: default_vad_provider(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout(),
        }
    }
}

fn default_database_path() -> String { "~/.switchboard/switchboard.db".to_string() }
fn default_http_timeout() -> u64 { 10 }
fn default_refresh_margin() -> i64 { 30 }
fn default_tool_timeout() -> u64 { 30 }
fn default_max_records() -> u32 { 1 }
fn default_max_recipients() -> u32 { 5 }
fn default_limit_ceiling() -> u32 { 20 }
fn default_airtable_token_url() -> String { "https://airtable.com/oauth2/v1/token".to_string() }
fn default_airtable_api_base() -> String { "https://api.airtable.com/v0".to_string() }
fn default_gmail_token_url() -> String { "https://oauth2.googleapis.com/token".to_string() }
fn default_gmail_send_url() -> String {
    "https://gmail.googleapis.com/gmail/v1/users/me/messages/send".to_string()
}
fn default_gmail_userinfo_url() -> String {
    "https://openidconnect.googleapis.com/v1/userinfo".to_string()
}
fn default_stt_provider() -> String { "deepgram".to_string() }
fn default_stt_model() -> String { "nova-3".to_string() }
fn default_llm_provider() -> String { "openai".to_string() }
fn default_llm_model() -> String { "gpt-4o-mini".to_string() }
fn default_tts_provider() -> String { "cartesia".to_string() }
fn default_tts_voice() -> String { "5ee9feff-1265-424a-9d7f-8e4d431a12c7".to_string() }
fn default_vad_provider() -> String { "silero".to_string() }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| SwitchboardError::ConfigNotFound(path.display().to_string()))?;

        let expanded = expand_env_vars(&content);

        toml::from_str(&expanded).map_err(|e| SwitchboardError::Config(e.to_string()))
    }

    /// Resolve the database path (expand ~).
    pub fn database_path(&self) -> PathBuf {
        let path = &self.database.path;
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = dirs_home() {
                return home.join(rest);
            }
        }
        PathBuf::from(path)
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                // Keep original if env var not set
                Err(_) => result.push_str(&format!("${{{}}}", var_name)),
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
