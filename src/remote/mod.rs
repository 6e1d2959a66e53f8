//! Remote transcription client.
//!
//! Sends the whole audio payload to a configured HTTP endpoint in a single
//! POST and maps the response into the shared transcript model. The response
//! shape is validated at the boundary; anything that does not match is
//! rejected with a typed error instead of leaking malformed fields into the
//! model.

use crate::config::{RemoteTranscriptionConfig, TranscriptionSettings};
use crate::transcript::{OffsetSpan, TimeSpan, Transcript, TranscriptItem};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Failure of the remote strategy. Recovered by the orchestrator via local
/// fallback, never surfaced to the caller.
#[derive(Error, Debug)]
pub enum RemoteTranscriptionError {
    /// Connection failure or timeout expiry.
    #[error("remote transcription request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("remote transcription server returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    /// The response body does not match the expected segment list shape.
    #[error("malformed remote transcription response: {0}")]
    MalformedResponse(String),
}

/// Request body: raw audio plus a serialized options object mirroring the
/// engine settings.
#[derive(Debug, Serialize)]
struct TranscribeRequest<'a> {
    audio: &'a [u8],
    options: RequestOptions<'a>,
}

// Unset optional settings are omitted from the wire entirely rather than
// sent as null.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestOptions<'a> {
    task: &'static str,
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    threads: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    processors: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_context: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_len: Option<u32>,
    split_on_word: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    best_of: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    beam_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    audio_ctx: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    word_thold: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    entropy_thold: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    logprob_thold: Option<f32>,
    translate: bool,
    diarize: bool,
    no_fallback: bool,
}

impl<'a> RequestOptions<'a> {
    fn new(model: &'a str, settings: &'a TranscriptionSettings) -> Self {
        Self {
            task: "transcribe",
            model,
            language: settings.language.as_deref(),
            threads: settings.threads,
            processors: settings.processors,
            max_context: settings.max_context,
            max_len: settings.max_len,
            split_on_word: settings.split_on_word,
            best_of: settings.best_of,
            beam_size: settings.beam_size,
            audio_ctx: settings.audio_ctx,
            word_thold: settings.word_thold,
            entropy_thold: settings.entropy_thold,
            logprob_thold: settings.logprob_thold,
            translate: settings.translate,
            diarize: settings.diarize,
            no_fallback: settings.no_fallback,
        }
    }
}

/// Response body: detected language plus the raw segment list.
#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    language: String,
    segments: Vec<RemoteSegment>,
}

/// One segment as the remote service reports it.
#[derive(Debug, Deserialize)]
struct RemoteSegment {
    start: f64,
    end: f64,
    start_offset: u64,
    end_offset: u64,
    text: String,
    #[serde(default)]
    speaker: Option<String>,
}

impl From<RemoteSegment> for TranscriptItem {
    fn from(segment: RemoteSegment) -> Self {
        Self {
            timestamps: TimeSpan {
                from: segment.start,
                to: segment.end,
            },
            offsets: OffsetSpan {
                from: segment.start_offset,
                to: segment.end_offset,
            },
            text: segment.text,
            speaker: segment.speaker,
        }
    }
}

/// HTTP client for the remote transcription service.
pub struct RemoteClient {
    http: reqwest::Client,
}

impl RemoteClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// Send `audio` for transcription and wait for the full result.
    ///
    /// Issues exactly one POST with the configured timeout as a hard upper
    /// bound. A bearer header is attached only when a token is configured.
    pub async fn send(
        &self,
        audio: &[u8],
        model: &str,
        config: &RemoteTranscriptionConfig,
        settings: &TranscriptionSettings,
    ) -> Result<Transcript, RemoteTranscriptionError> {
        let payload = TranscribeRequest {
            audio,
            options: RequestOptions::new(model, settings),
        };

        debug!(
            url = config.server_url.as_str(),
            audio_bytes = audio.len(),
            timeout_ms = config.timeout_ms,
            "sending audio to remote transcription server"
        );

        let mut request = self
            .http
            .post(&config.server_url)
            .timeout(Duration::from_millis(config.timeout_ms))
            .json(&payload);

        if let Some(ref token) = config.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteTranscriptionError::Status { status, body });
        }

        let body = response.text().await?;
        let parsed: TranscribeResponse = serde_json::from_str(&body)
            .map_err(|e| RemoteTranscriptionError::MalformedResponse(e.to_string()))?;

        debug!(
            language = parsed.language.as_str(),
            segments = parsed.segments.len(),
            "remote transcription complete"
        );

        let items = parsed.segments.into_iter().map(TranscriptItem::from).collect();
        Ok(Transcript::new(parsed.language, items))
    }
}

impl Default for RemoteClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{capturing_one_shot_server, one_shot_server};
    use std::net::TcpListener;

    const EMPTY_RESULT: &str = r#"{ "language": "en", "segments": [] }"#;

    fn remote_config(url: String) -> RemoteTranscriptionConfig {
        RemoteTranscriptionConfig {
            server_url: url,
            auth_token: None,
            timeout_ms: 5000,
        }
    }

    #[test]
    fn test_segment_maps_field_for_field() {
        let segment = RemoteSegment {
            start: 1.0,
            end: 2.0,
            start_offset: 10,
            end_offset: 20,
            text: "hi".to_string(),
            speaker: Some("A".to_string()),
        };

        let item = TranscriptItem::from(segment);
        assert_eq!(item.timestamps, TimeSpan { from: 1.0, to: 2.0 });
        assert_eq!(item.offsets, OffsetSpan { from: 10, to: 20 });
        assert_eq!(item.text, "hi");
        assert_eq!(item.speaker.as_deref(), Some("A"));
    }

    #[test]
    fn test_request_options_serialize_as_camel_case() {
        let settings = TranscriptionSettings {
            language: Some("auto".to_string()),
            threads: Some(4),
            split_on_word: true,
            ..Default::default()
        };
        let options = RequestOptions::new("base.en", &settings);
        let json = serde_json::to_value(&options).unwrap();

        assert_eq!(json["task"], "transcribe");
        assert_eq!(json["model"], "base.en");
        assert_eq!(json["language"], "auto");
        assert_eq!(json["threads"], 4);
        assert_eq!(json["splitOnWord"], true);
        assert_eq!(json["noFallback"], false);
    }

    #[test]
    fn test_request_options_omit_unset_settings() {
        let settings = TranscriptionSettings::default();
        let options = RequestOptions::new("base.en", &settings);
        let json = serde_json::to_value(&options).unwrap();
        let object = json.as_object().unwrap();

        // Unset options never reach the wire, not even as null.
        for key in [
            "language", "threads", "processors", "maxContext", "maxLen", "bestOf", "beamSize",
            "audioCtx", "wordThold", "entropyThold", "logprobThold",
        ] {
            assert!(!object.contains_key(key), "unexpected {key}");
        }
        // Booleans and fixed fields are always present.
        for key in ["task", "model", "splitOnWord", "translate", "diarize", "noFallback"] {
            assert!(object.contains_key(key), "missing {key}");
        }
    }

    #[tokio::test]
    async fn test_send_parses_successful_response() {
        let url = one_shot_server(
            "HTTP/1.1 200 OK",
            r#"{
                "language": "en",
                "segments": [
                    { "start": 0.0, "end": 1.5, "start_offset": 0, "end_offset": 1500, "text": " hello" },
                    { "start": 1.5, "end": 3.0, "start_offset": 1500, "end_offset": 3000, "text": " world", "speaker": "B" }
                ]
            }"#,
        );

        let client = RemoteClient::new();
        let transcript = client
            .send(
                &[1, 2, 3],
                "base.en",
                &remote_config(url),
                &TranscriptionSettings::default(),
            )
            .await
            .unwrap();

        assert_eq!(transcript.language, "en");
        assert_eq!(transcript.items.len(), 2);
        assert_eq!(transcript.items[0].offsets.to, 1500);
        assert_eq!(transcript.items[1].speaker.as_deref(), Some("B"));
    }

    #[tokio::test]
    async fn test_send_attaches_bearer_header_when_token_configured() {
        let (url, request) = capturing_one_shot_server("HTTP/1.1 200 OK", EMPTY_RESULT);
        let config = RemoteTranscriptionConfig {
            auth_token: Some("secret".to_string()),
            ..remote_config(url)
        };

        let client = RemoteClient::new();
        client
            .send(&[0u8; 4], "base.en", &config, &TranscriptionSettings::default())
            .await
            .unwrap();

        let request = request
            .recv_timeout(std::time::Duration::from_secs(5))
            .unwrap()
            .to_lowercase();
        assert!(
            request.contains("authorization: bearer secret"),
            "missing bearer header in request:\n{request}"
        );
    }

    #[tokio::test]
    async fn test_send_omits_authorization_without_token() {
        let (url, request) = capturing_one_shot_server("HTTP/1.1 200 OK", EMPTY_RESULT);

        let client = RemoteClient::new();
        client
            .send(
                &[0u8; 4],
                "base.en",
                &remote_config(url),
                &TranscriptionSettings::default(),
            )
            .await
            .unwrap();

        let request = request
            .recv_timeout(std::time::Duration::from_secs(5))
            .unwrap()
            .to_lowercase();
        assert!(
            !request.contains("authorization:"),
            "unexpected authorization header in request:\n{request}"
        );
    }

    #[tokio::test]
    async fn test_send_times_out_against_a_silent_server() {
        // Accept the connection but never answer; the configured timeout is
        // the only thing that ends the call.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            if let Ok((stream, _)) = listener.accept() {
                std::thread::sleep(std::time::Duration::from_secs(10));
                drop(stream);
            }
        });

        let config = RemoteTranscriptionConfig {
            server_url: format!("http://{addr}/transcribe"),
            auth_token: None,
            timeout_ms: 250,
        };

        let client = RemoteClient::new();
        let started = std::time::Instant::now();
        let err = client
            .send(
                &[0u8; 4],
                "base.en",
                &config,
                &TranscriptionSettings::default(),
            )
            .await
            .unwrap_err();

        assert!(started.elapsed() < std::time::Duration::from_secs(5));
        match err {
            RemoteTranscriptionError::Transport(e) => assert!(e.is_timeout()),
            other => panic!("expected transport error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_send_rejects_non_success_status() {
        let url = one_shot_server("HTTP/1.1 503 Service Unavailable", "overloaded");

        let client = RemoteClient::new();
        let err = client
            .send(
                &[0u8; 4],
                "base.en",
                &remote_config(url),
                &TranscriptionSettings::default(),
            )
            .await
            .unwrap_err();

        match err {
            RemoteTranscriptionError::Status { status, body } => {
                assert_eq!(status.as_u16(), 503);
                assert_eq!(body, "overloaded");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_send_rejects_body_without_segments() {
        let url = one_shot_server("HTTP/1.1 200 OK", r#"{ "language": "en" }"#);

        let client = RemoteClient::new();
        let err = client
            .send(
                &[0u8; 4],
                "base.en",
                &remote_config(url),
                &TranscriptionSettings::default(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, RemoteTranscriptionError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_send_reports_connection_failure_as_transport() {
        // Bind to grab a free port, then drop the listener so nothing answers.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = RemoteClient::new();
        let err = client
            .send(
                &[0u8; 4],
                "base.en",
                &remote_config(format!("http://{addr}/transcribe")),
                &TranscriptionSettings::default(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, RemoteTranscriptionError::Transport(_)));
    }
}
