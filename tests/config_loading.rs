use std::io::Write;

use switchboard_core::config::AppConfig;
use switchboard_core::error::SwitchboardError;

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
[database]
path = "/tmp/switchboard-test.db"

[vault]
url = "https://vault.example.test"
api_key = "service-key"
timeout_secs = 5

[integrations]
http_timeout_secs = 8
refresh_margin_secs = 45

[integrations.airtable]
client_id = "air-client"
client_secret = "air-secret"
api_base = "http://localhost:9000/v0"
default_max_records = 3
max_records_limit = 50

[integrations.gmail]
client_id = "gmail-client"
client_secret = "gmail-secret"
max_recipients_limit = 10

[speech]
stt_provider = "assemblyai"
llm_model = "gpt-4.1"
tts_voice = "voice-1"

[session]
tool_timeout_secs = 12
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.database_path().to_str(), Some("/tmp/switchboard-test.db"));
    assert_eq!(config.vault.url, "https://vault.example.test");
    assert_eq!(config.vault.timeout_secs, 5);

    assert_eq!(config.integrations.http_timeout_secs, 8);
    assert_eq!(config.integrations.refresh_margin_secs, 45);
    assert_eq!(config.integrations.airtable.client_id, "air-client");
    assert_eq!(config.integrations.airtable.api_base, "http://localhost:9000/v0");
    assert_eq!(config.integrations.airtable.default_max_records, 3);
    assert_eq!(config.integrations.airtable.max_records_limit, 50);
    assert_eq!(
        config.integrations.airtable.token_url,
        "https://airtable.com/oauth2/v1/token"
    );
    assert_eq!(config.integrations.gmail.max_recipients_limit, 10);
    assert_eq!(config.integrations.gmail.default_max_recipients, 5);

    assert_eq!(config.speech.stt_provider, "assemblyai");
    assert_eq!(config.speech.stt_model, "nova-3");
    assert_eq!(config.speech.llm_model, "gpt-4.1");
    assert_eq!(config.speech.tts_voice, "voice-1");
    assert_eq!(config.session.tool_timeout_secs, 12);
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("SWITCHBOARD_TEST_VAULT_KEY", "expanded-key-value");

    let toml_content = r#"
[vault]
url = "https://vault.example.test"
api_key = "${SWITCHBOARD_TEST_VAULT_KEY}"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.vault.api_key, "expanded-key-value");

    std::env::remove_var("SWITCHBOARD_TEST_VAULT_KEY");
}

#[test]
fn test_empty_config_uses_defaults() {
    let tmp = tempfile::NamedTempFile::new().expect("create temp file");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert!(config.vault.url.is_empty());
    assert_eq!(config.vault.timeout_secs, 10);
    assert_eq!(config.integrations.refresh_margin_secs, 30);
    assert_eq!(config.integrations.airtable.default_max_records, 1);
    assert_eq!(config.integrations.airtable.max_records_limit, 20);
    assert_eq!(config.integrations.gmail.max_recipients_limit, 20);
    assert_eq!(config.speech.llm_provider, "openai");
    assert_eq!(config.speech.tts_provider, "cartesia");
    assert_eq!(config.speech.vad_provider, "silero");
    assert_eq!(config.session.tool_timeout_secs, 30);
    assert!(config.database_path().ends_with("switchboard.db"));
}

#[test]
fn test_missing_file_and_bad_toml() {
    let err = AppConfig::load(std::path::Path::new("/nonexistent/switchboard.toml")).unwrap_err();
    assert!(matches!(err, SwitchboardError::ConfigNotFound(_)));

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"[integrations]\nhttp_timeout_secs = \"soon\"\n")
        .expect("write toml");
    let err = AppConfig::load(tmp.path()).unwrap_err();
    assert!(matches!(err, SwitchboardError::Config(_)));
}
