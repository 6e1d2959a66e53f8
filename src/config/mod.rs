//! Job configuration types and the settings provider seam.
//!
//! Settings are owned by an external configuration subsystem; the pipeline
//! only ever reads an immutable snapshot, resolved fresh for each job.

use serde::{Deserialize, Serialize};

/// Engine tuning knobs for a single transcription job.
///
/// Every field maps to one whisper.cpp command-line flag (local strategy) and
/// one field of the remote options object (remote strategy). `None` / `false`
/// means "engine default" and produces no flag at all.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TranscriptionSettings {
    /// Spoken language, `"auto"` for auto-detection.
    pub language: Option<String>,
    /// Thread count.
    pub threads: Option<u32>,
    /// Processor count.
    pub processors: Option<u32>,
    /// Maximum number of text context tokens to store.
    pub max_context: Option<u32>,
    /// Maximum segment length in characters.
    pub max_len: Option<u32>,
    /// Split on word rather than on token.
    pub split_on_word: bool,
    /// Number of best candidates to keep.
    pub best_of: Option<u32>,
    /// Beam size for beam search.
    pub beam_size: Option<u32>,
    /// Audio context size.
    pub audio_ctx: Option<u32>,
    /// Word timestamp probability threshold.
    pub word_thold: Option<f32>,
    /// Entropy threshold for decoder fail.
    pub entropy_thold: Option<f32>,
    /// Log probability threshold for decoder fail.
    pub logprob_thold: Option<f32>,
    /// Translate the transcription to English.
    pub translate: bool,
    /// Attribute segments to distinct speakers/input sources.
    pub diarize: bool,
    /// Do not use temperature fallback while decoding.
    pub no_fallback: bool,
}

/// Connection details for the remote transcription service.
///
/// Required only when the remote strategy is selected; absence in that case is
/// a configuration error, never a silent fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteTranscriptionConfig {
    /// Full endpoint URL of the remote service.
    pub server_url: String,
    /// Optional bearer token sent as `Authorization: Bearer <token>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    /// Hard upper bound on the request, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    300_000
}

/// The settings snapshot handed to the pipeline for one job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    /// Engine settings, always present (all-defaults when unset).
    pub whisper: TranscriptionSettings,
    /// Remote service config, present only when a remote endpoint is set up.
    pub remote_whisper: Option<RemoteTranscriptionConfig>,
}

/// Source of configuration snapshots. Resolved fresh per job so that settings
/// edits between jobs take effect without restarting anything.
pub trait SettingsProvider: Send + Sync {
    fn settings(&self) -> anyhow::Result<AppSettings>;
}

/// Fixed in-memory settings, for the CLI (which loads them once from a file)
/// and for tests.
#[derive(Debug, Clone, Default)]
pub struct StaticSettings(pub AppSettings);

impl SettingsProvider for StaticSettings {
    fn settings(&self) -> anyhow::Result<AppSettings> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_default_is_all_unset() {
        let settings = TranscriptionSettings::default();
        assert_eq!(settings.language, None);
        assert_eq!(settings.threads, None);
        assert!(!settings.translate);
        assert!(!settings.diarize);
        assert!(!settings.no_fallback);
        assert!(!settings.split_on_word);
    }

    #[test]
    fn test_app_settings_from_partial_json() {
        let json = r#"{
            "whisper": { "language": "auto", "threads": 8, "translate": true }
        }"#;
        let settings: AppSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.whisper.language.as_deref(), Some("auto"));
        assert_eq!(settings.whisper.threads, Some(8));
        assert!(settings.whisper.translate);
        assert_eq!(settings.whisper.beam_size, None);
        assert!(settings.remote_whisper.is_none());
    }

    #[test]
    fn test_remote_config_defaults() {
        let json = r#"{ "serverUrl": "http://localhost:9000/transcribe" }"#;
        let config: RemoteTranscriptionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.server_url, "http://localhost:9000/transcribe");
        assert_eq!(config.auth_token, None);
        assert_eq!(config.timeout_ms, 300_000);
    }

    #[test]
    fn test_settings_use_camel_case_field_names() {
        let json = r#"{
            "whisper": {
                "maxContext": 64,
                "maxLen": 40,
                "splitOnWord": true,
                "bestOf": 5,
                "beamSize": 8,
                "audioCtx": 512,
                "wordThold": 0.01,
                "entropyThold": 2.4,
                "logprobThold": -1.0,
                "noFallback": true
            },
            "remoteWhisper": {
                "serverUrl": "http://example.test",
                "authToken": "secret",
                "timeoutMs": 5000
            }
        }"#;
        let settings: AppSettings = serde_json::from_str(json).unwrap();
        let whisper = &settings.whisper;
        assert_eq!(whisper.max_context, Some(64));
        assert_eq!(whisper.max_len, Some(40));
        assert!(whisper.split_on_word);
        assert_eq!(whisper.best_of, Some(5));
        assert_eq!(whisper.beam_size, Some(8));
        assert_eq!(whisper.audio_ctx, Some(512));
        assert_eq!(whisper.word_thold, Some(0.01));
        assert_eq!(whisper.entropy_thold, Some(2.4));
        assert_eq!(whisper.logprob_thold, Some(-1.0));
        assert!(whisper.no_fallback);

        let remote = settings.remote_whisper.unwrap();
        assert_eq!(remote.auth_token.as_deref(), Some("secret"));
        assert_eq!(remote.timeout_ms, 5000);
    }
}
