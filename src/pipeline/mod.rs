//! Transcription orchestrator.
//!
//! Top-level entry point for one job: picks the execution strategy, drives it
//! to completion, and reports the step lifecycle. The remote strategy is
//! attempted at most once; on failure the job degrades to the local engine
//! with a non-fatal warning instead of being lost.

use crate::config::SettingsProvider;
use crate::local::{self, LocalRunner};
use crate::progress::ProgressReporter;
use crate::remote::RemoteClient;
use crate::transcript::Transcript;
use crate::TranscribeError;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use uuid::Uuid;

/// Step name under which all transcription progress and warnings are reported.
pub const STEP: &str = "transcription";

/// Computes the total duration of a media file. Must handle every audio
/// container the system accepts; the pipeline only consumes the result as the
/// denominator for local progress normalization.
#[allow(async_fn_in_trait)]
pub trait DurationProvider: Send + Sync {
    async fn duration_ms(&self, path: &Path) -> anyhow::Result<u64>;
}

/// Resolves a model identifier to the model file on disk.
pub trait ModelResolver: Send + Sync {
    fn model_path(&self, model_id: &str) -> anyhow::Result<PathBuf>;
}

/// One-job-at-a-time transcription pipeline with explicit collaborators.
///
/// All external dependencies are injected at construction, so a job is fully
/// deterministic given its collaborators. The caller guarantees at most one
/// active job per input file; no file-level locking happens here.
pub struct Transcriber<D, S, M, R> {
    duration: D,
    settings: S,
    models: M,
    progress: R,
    remote: RemoteClient,
    local: LocalRunner,
}

impl<D, S, M, R> Transcriber<D, S, M, R>
where
    D: DurationProvider,
    S: SettingsProvider,
    M: ModelResolver,
    R: ProgressReporter,
{
    pub fn new(
        duration: D,
        settings: S,
        models: M,
        progress: R,
        engine_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            duration,
            settings,
            models,
            progress,
            remote: RemoteClient::new(),
            local: LocalRunner::new(engine_path),
        }
    }

    /// Transcribe `input`, producing the engine result artifact next to
    /// `output` and returning the normalized transcript.
    ///
    /// With `use_remote` set the remote service is tried first; a missing
    /// remote configuration is an error (misconfiguration must be visible,
    /// never silently papered over), while a remote *call* failure is
    /// reported as a step warning and the job falls back to the local engine.
    /// Local failures are fatal.
    pub async fn transcribe(
        &self,
        input: &Path,
        output: &Path,
        model_id: &str,
        use_remote: bool,
    ) -> Result<Transcript, TranscribeError> {
        let job_id = Uuid::new_v4();
        info!(
            %job_id,
            input = %input.display(),
            model = model_id,
            use_remote,
            "starting transcription job"
        );
        self.progress.set_step(STEP);

        // The denominator for local progress normalization; resolved up front
        // so a corrupt input fails before any strategy runs.
        let total_duration_ms = self
            .duration
            .duration_ms(input)
            .await
            .map_err(|e| TranscribeError::Input(format!("cannot read audio duration: {e}")))?;
        if total_duration_ms == 0 {
            return Err(TranscribeError::Input(format!(
                "audio file {} has zero duration",
                input.display()
            )));
        }

        let output_base = output_base(output);

        if use_remote {
            let settings = self
                .settings
                .settings()
                .map_err(|e| TranscribeError::Configuration(e.to_string()))?;
            let remote_config = settings.remote_whisper.ok_or_else(|| {
                TranscribeError::Configuration(
                    "remote transcription requested but no remote server is configured".to_string(),
                )
            })?;

            let audio = tokio::fs::read(input)
                .await
                .map_err(|e| TranscribeError::Input(format!("cannot read audio file: {e}")))?;

            match self
                .remote
                .send(&audio, model_id, &remote_config, &settings.whisper)
                .await
            {
                Ok(transcript) => {
                    self.emit_synthetic_progress(&transcript);
                    info!(%job_id, segments = transcript.items.len(), "remote transcription succeeded");
                    return Ok(transcript);
                }
                Err(e) => {
                    // One-shot fallback: the remote strategy is never retried.
                    error!(%job_id, error = %e, "remote transcription failed");
                    info!(%job_id, "falling back to local transcription");
                    self.progress.set_error(
                        STEP,
                        "remote transcription failed, falling back to local processing",
                    );
                }
            }
        }

        // Settings are resolved fresh again: the fallback path must see the
        // same snapshot a local-only job would.
        let settings = self
            .settings
            .settings()
            .map_err(|e| TranscribeError::Configuration(e.to_string()))?
            .whisper;
        let model = self
            .models
            .model_path(model_id)
            .map_err(|e| TranscribeError::Configuration(e.to_string()))?;

        self.local
            .run(
                input,
                &output_base,
                &model,
                &settings,
                total_duration_ms,
                &self.progress,
            )
            .await?;

        let transcript = local::load_transcript(&output_base)?;
        info!(%job_id, segments = transcript.items.len(), "transcription job finished");
        Ok(transcript)
    }

    /// Replay a remote result as progress events.
    ///
    /// The whole remote result arrives in one response, so progress is
    /// synthetic by nature: one event per segment, `offsets.to / max_offset`,
    /// a rapid monotone ramp ending at 1.0. That is an intentional
    /// simplification, not something to smooth out.
    fn emit_synthetic_progress(&self, transcript: &Transcript) {
        let Some(max_offset) = transcript.max_end_offset().filter(|max| *max > 0) else {
            return;
        };
        for item in &transcript.items {
            self.progress
                .set_progress(STEP, item.offsets.to as f64 / max_offset as f64);
        }
    }
}

/// Strip the extension from the requested output path; the engine appends its
/// own format suffixes to this base.
fn output_base(output: &Path) -> PathBuf {
    match output.file_stem() {
        Some(stem) => output.with_file_name(stem),
        None => output.to_path_buf(),
    }
}
