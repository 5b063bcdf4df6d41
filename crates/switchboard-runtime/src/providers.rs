//! Maps an agent's provider configuration blobs to concrete provider handles.
//!
//! Each blob looks like `{"provider": "...", "model": "...", "hosted": true}`.
//! Missing or unrecognised selections fall back to the configured speech
//! defaults; resolution never fails.

use serde_json::Value;
use tracing::{debug, warn};

use switchboard_core::config::SpeechDefaults;
use switchboard_core::graph::AgentConfig;
use switchboard_core::types::{ProviderHandle, ProviderKind, ProviderSet};

pub fn resolve_providers(agent: &AgentConfig, defaults: &SpeechDefaults) -> ProviderSet {
    ProviderSet {
        stt: resolve_stt(agent.stt_config.as_ref(), defaults),
        llm: resolve_llm(agent.llm_config.as_ref(), defaults),
        tts: resolve_tts(agent.tts_config.as_ref(), defaults),
        vad: resolve_vad(agent.vad_config.as_ref(), defaults),
        turn_detection: resolve_turn_detection(agent.turn_detection_config.as_ref()),
    }
}

fn text<'a>(config: Option<&'a Value>, key: &str) -> Option<&'a str> {
    config
        .and_then(|c| c.get(key))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn provider_name(config: Option<&Value>, default: &str) -> String {
    text(config, "provider").unwrap_or(default).to_lowercase()
}

/// Hosted inference is requested with `hosted` (or the older `use_livekit`).
fn hosted(config: Option<&Value>) -> bool {
    ["hosted", "use_livekit"].iter().any(|key| {
        config
            .and_then(|c| c.get(*key))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    })
}

fn handle(kind: ProviderKind, provider: &str) -> ProviderHandle {
    ProviderHandle {
        kind,
        provider: provider.to_string(),
        model: None,
        voice: None,
        hosted: false,
    }
}

pub fn resolve_stt(config: Option<&Value>, defaults: &SpeechDefaults) -> ProviderHandle {
    let provider = provider_name(config, &defaults.stt_provider);
    let hosted = hosted(config);
    let mut stt = handle(ProviderKind::SpeechToText, &provider);
    stt.hosted = hosted;
    match provider.as_str() {
        "deepgram" => {
            stt.model = Some(text(config, "model").unwrap_or(&defaults.stt_model).to_string());
        }
        "assemblyai" => {
            stt.model = text(config, "model")
                .or(hosted.then_some("best"))
                .map(str::to_string);
        }
        other => {
            warn!(provider = %other, "Unknown STT provider; defaulting to {}", defaults.stt_provider);
            stt = handle(ProviderKind::SpeechToText, &defaults.stt_provider);
            stt.model = Some(defaults.stt_model.clone());
        }
    }
    stt
}

pub fn resolve_llm(config: Option<&Value>, defaults: &SpeechDefaults) -> ProviderHandle {
    if config.is_none() {
        debug!(provider = %defaults.llm_provider, model = %defaults.llm_model, "LLM config missing; using defaults");
    }
    let provider = provider_name(config, &defaults.llm_provider);
    let model = text(config, "model").unwrap_or(&defaults.llm_model).to_string();
    let mut llm = handle(ProviderKind::LanguageModel, &defaults.llm_provider);
    if provider == defaults.llm_provider {
        llm.hosted = hosted(config);
    } else {
        warn!(provider = %provider, "Unsupported LLM provider; defaulting to {}", defaults.llm_provider);
    }
    llm.model = Some(model);
    llm
}

pub fn resolve_tts(config: Option<&Value>, defaults: &SpeechDefaults) -> ProviderHandle {
    let provider = provider_name(config, &defaults.tts_provider);
    let mut tts = handle(ProviderKind::TextToSpeech, &defaults.tts_provider);
    if provider == defaults.tts_provider {
        tts.voice = Some(text(config, "voice_id").unwrap_or(&defaults.tts_voice).to_string());
        tts.hosted = hosted(config);
    } else {
        warn!(provider = %provider, "Unknown TTS provider; defaulting to {}", defaults.tts_provider);
        tts.voice = Some(defaults.tts_voice.clone());
    }
    tts
}

pub fn resolve_vad(config: Option<&Value>, defaults: &SpeechDefaults) -> ProviderHandle {
    let provider = provider_name(config, &defaults.vad_provider);
    if provider != defaults.vad_provider {
        warn!(provider = %provider, "Unknown VAD provider; defaulting to {}", defaults.vad_provider);
    }
    handle(ProviderKind::VoiceActivity, &defaults.vad_provider)
}

/// Turn detection is optional; without a configured provider none is used.
pub fn resolve_turn_detection(config: Option<&Value>) -> Option<ProviderHandle> {
    let provider = text(config, "provider")?.to_lowercase();
    let mut turn = handle(ProviderKind::TurnDetection, &provider);
    turn.model = text(config, "model").map(str::to_string);
    Some(turn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn defaults() -> SpeechDefaults {
        SpeechDefaults::default()
    }

    #[test]
    fn test_missing_config_uses_defaults() {
        let stt = resolve_stt(None, &defaults());
        assert_eq!(stt.identifier(), "deepgram/nova-3");
        assert!(!stt.hosted);

        let llm = resolve_llm(None, &defaults());
        assert_eq!(llm.identifier(), "openai/gpt-4o-mini");

        let tts = resolve_tts(None, &defaults());
        assert_eq!(tts.voice.as_deref(), Some("5ee9feff-1265-424a-9d7f-8e4d431a12c7"));

        assert_eq!(resolve_vad(None, &defaults()).provider, "silero");
        assert!(resolve_turn_detection(None).is_none());
    }

    #[test]
    fn test_configured_selection() {
        let stt = resolve_stt(Some(&json!({"provider": "AssemblyAI", "use_livekit": true})), &defaults());
        assert_eq!(stt.identifier(), "assemblyai/best");
        assert!(stt.hosted);

        let llm = resolve_llm(Some(&json!({"provider": "openai", "model": "gpt-4.1", "hosted": true})), &defaults());
        assert_eq!(llm.identifier(), "openai/gpt-4.1");
        assert!(llm.hosted);

        let tts = resolve_tts(Some(&json!({"voice_id": "voice-9"})), &defaults());
        assert_eq!(tts.identifier(), "cartesia/voice-9");
    }

    #[test]
    fn test_unknown_providers_fall_back() {
        let stt = resolve_stt(Some(&json!({"provider": "whisperx", "model": "large"})), &defaults());
        assert_eq!(stt.identifier(), "deepgram/nova-3");

        let llm = resolve_llm(Some(&json!({"provider": "mystery", "model": "m1"})), &defaults());
        assert_eq!(llm.provider, "openai");
        assert_eq!(llm.model.as_deref(), Some("m1"));

        let tts = resolve_tts(Some(&json!({"provider": "elevenlabs", "voice_id": "x"})), &defaults());
        assert_eq!(tts.identifier(), "cartesia/5ee9feff-1265-424a-9d7f-8e4d431a12c7");

        assert_eq!(resolve_vad(Some(&json!({"provider": "webrtc"})), &defaults()).provider, "silero");
    }

    #[test]
    fn test_turn_detection() {
        let turn = resolve_turn_detection(Some(&json!({"provider": "Multilingual"}))).unwrap();
        assert_eq!(turn.kind, ProviderKind::TurnDetection);
        assert_eq!(turn.provider, "multilingual");
    }
}
