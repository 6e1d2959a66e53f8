//! Whisper Pipeline - transcription orchestration over local and remote engines
//!
//! This crate turns a recorded audio file into a time-aligned transcript by
//! driving either a locally spawned whisper.cpp-style engine or a remote
//! transcription service. It features:
//!
//! - One orchestration entry point that picks the execution strategy
//! - Automatic one-shot fallback from the remote service to the local engine
//! - Incremental progress derived from the engine's streamed output
//! - A single normalized transcript model for both strategies
//! - Explicit, injectable collaborators (duration, settings, models, progress)
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use whisper_pipeline::config::StaticSettings;
//! use whisper_pipeline::pipeline::{DurationProvider, ModelResolver, Transcriber};
//! use whisper_pipeline::progress::LogReporter;
//!
//! struct FixedDuration;
//!
//! impl DurationProvider for FixedDuration {
//!     async fn duration_ms(&self, _path: &Path) -> anyhow::Result<u64> {
//!         Ok(60_000)
//!     }
//! }
//!
//! struct FlatModels;
//!
//! impl ModelResolver for FlatModels {
//!     fn model_path(&self, model_id: &str) -> anyhow::Result<std::path::PathBuf> {
//!         Ok(format!("models/ggml-{model_id}.bin").into())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let transcriber = Transcriber::new(
//!         FixedDuration,
//!         StaticSettings::default(),
//!         FlatModels,
//!         LogReporter,
//!         "whisper",
//!     );
//!
//!     let transcript = transcriber
//!         .transcribe(Path::new("talk.wav"), Path::new("talk.json"), "base.en", false)
//!         .await?;
//!     println!("{}", transcript.plain_text());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod local;
pub mod pipeline;
pub mod progress;
pub mod remote;
pub mod transcript;

#[cfg(test)]
pub(crate) mod testutil;

// Re-export commonly used types for convenience
pub use config::{
    AppSettings, RemoteTranscriptionConfig, SettingsProvider, StaticSettings,
    TranscriptionSettings,
};
pub use local::{LocalRunner, ProcessExecutionError};
pub use pipeline::{DurationProvider, ModelResolver, Transcriber, STEP};
pub use progress::{LogReporter, MemoryReporter, ProgressEvent, ProgressReporter, WatchReporter};
pub use remote::{RemoteClient, RemoteTranscriptionError};
pub use transcript::{OffsetSpan, TimeSpan, Transcript, TranscriptItem};

use thiserror::Error;

/// Fatal outcomes of a transcription job.
///
/// Remote failures never show up here: they are recovered inside the pipeline
/// by falling back to the local engine and surface only as a step warning on
/// the progress stream.
#[derive(Error, Debug)]
pub enum TranscribeError {
    /// Misconfiguration that must be visible rather than worked around, e.g.
    /// the remote strategy was requested without a remote server configured.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The input audio is unreadable or has no duration.
    #[error("input error: {0}")]
    Input(String),

    /// The local engine could not be started or exited non-zero.
    #[error(transparent)]
    Process(#[from] ProcessExecutionError),
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, TranscribeError>;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_constants() {
        assert!(!VERSION.is_empty());
        assert_eq!(NAME, "whisper-pipeline");
    }

    #[test]
    fn test_process_error_converts_into_transcribe_error() {
        let err = TranscribeError::from(ProcessExecutionError::ExitStatus {
            code: 1,
            stderr_tail: String::new(),
        });
        assert!(matches!(err, TranscribeError::Process(_)));
    }
}
