//! Local transcription runner.
//!
//! Drives the whisper.cpp-style engine as an external process: serializes the
//! job settings into the engine's argument convention, streams its stdout to
//! derive progress, and waits for the process to finish. The authoritative
//! transcript is the JSON file the engine writes next to the output base path;
//! stdout is only ever used for progress extraction.

use crate::config::TranscriptionSettings;
use crate::progress::ProgressReporter;
use crate::transcript::{timestamp_to_ms, OffsetSpan, TimeSpan, Transcript, TranscriptItem};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Failure of the local engine process. Fatal for the job, no retry.
#[derive(thiserror::Error, Debug)]
pub enum ProcessExecutionError {
    /// The engine binary could not be started at all.
    #[error("failed to start transcription engine {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Reading the engine's output or waiting for it failed.
    #[error("transcription engine i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The engine exited with a non-zero status.
    #[error("transcription engine exited with {code}: {stderr_tail}")]
    ExitStatus { code: i32, stderr_tail: String },

    /// The engine's JSON result file is missing or does not parse.
    #[error("unreadable engine result file {path}: {message}")]
    ResultFile { path: PathBuf, message: String },
}

/// Matches the engine's segment lines, e.g.
/// `[00:00:01.000 --> 00:00:04.520]  and so it begins`.
/// The end timestamp of the first match on a line drives progress.
static SEGMENT_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[\d{2}:\d{2}:\d{2}\.\d{3} --> (\d{2}:\d{2}:\d{2}\.\d{3})\]")
        .expect("segment line pattern is valid")
});

/// Extract the end timestamp (in milliseconds) of the first segment range on
/// a complete output line.
pub fn segment_end_ms(line: &str) -> Option<u64> {
    let captures = SEGMENT_LINE.captures(line)?;
    timestamp_to_ms(&captures[1])
}

/// Serialize the settings into the engine's command-line convention.
///
/// The input file is positional; every set numeric/string setting becomes one
/// flag+value pair, every `true` boolean becomes one presence flag, and unset
/// settings produce nothing. The fixed tail requests JSON output at
/// `output_base` with the resolved model.
pub fn build_args(
    input: &Path,
    output_base: &Path,
    model: &Path,
    settings: &TranscriptionSettings,
) -> Vec<String> {
    let mut args = vec![input.to_string_lossy().into_owned()];

    let mut pair = |flag: &str, value: String| {
        args.push(flag.to_string());
        args.push(value);
    };

    if let Some(threads) = settings.threads {
        pair("-t", threads.to_string());
    }
    if let Some(processors) = settings.processors {
        pair("-p", processors.to_string());
    }
    if let Some(max_context) = settings.max_context {
        pair("-mc", max_context.to_string());
    }
    if let Some(max_len) = settings.max_len {
        pair("-ml", max_len.to_string());
    }
    if let Some(best_of) = settings.best_of {
        pair("-bo", best_of.to_string());
    }
    if let Some(beam_size) = settings.beam_size {
        pair("-bs", beam_size.to_string());
    }
    if let Some(audio_ctx) = settings.audio_ctx {
        pair("-ac", audio_ctx.to_string());
    }
    if let Some(word_thold) = settings.word_thold {
        pair("-wt", word_thold.to_string());
    }
    if let Some(entropy_thold) = settings.entropy_thold {
        pair("-et", entropy_thold.to_string());
    }
    if let Some(logprob_thold) = settings.logprob_thold {
        pair("-lpt", logprob_thold.to_string());
    }
    if let Some(ref language) = settings.language {
        pair("-l", language.clone());
    }

    if settings.split_on_word {
        args.push("-sow".to_string());
    }
    if settings.translate {
        args.push("-tr".to_string());
    }
    if settings.diarize {
        args.push("-di".to_string());
    }
    if settings.no_fallback {
        args.push("-nf".to_string());
    }

    args.push("-oj".to_string());
    args.push("-of".to_string());
    args.push(output_base.to_string_lossy().into_owned());
    args.push("-m".to_string());
    args.push(model.to_string_lossy().into_owned());

    args
}

/// Runs the engine binary for one job.
pub struct LocalRunner {
    engine_path: PathBuf,
}

impl LocalRunner {
    pub fn new(engine_path: impl Into<PathBuf>) -> Self {
        Self {
            engine_path: engine_path.into(),
        }
    }

    /// Run the engine to completion.
    ///
    /// Stdout is consumed line by line as it arrives; each complete line is
    /// scanned for a segment timestamp range and the end timestamp, when
    /// positive, is reported as `end_ms / total_duration_ms` on the
    /// transcription step. Line framing is owned by the buffered reader, so a
    /// timestamp split across two reads still produces exactly one event.
    ///
    /// A non-zero exit aborts the job; the result file at
    /// `<output_base>.json` is only trustworthy after this returns `Ok`.
    pub async fn run(
        &self,
        input: &Path,
        output_base: &Path,
        model: &Path,
        settings: &TranscriptionSettings,
        total_duration_ms: u64,
        reporter: &impl ProgressReporter,
    ) -> Result<(), ProcessExecutionError> {
        let args = build_args(input, output_base, model, settings);
        info!(
            engine = %self.engine_path.display(),
            ?args,
            "starting local transcription engine"
        );

        let mut child = Command::new(&self.engine_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessExecutionError::Spawn {
                program: self.engine_path.to_string_lossy().into_owned(),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("engine stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("engine stderr not captured"))?;

        // Keep a bounded tail of stderr for the error message on failure.
        let stderr_task = tokio::spawn(async move {
            let mut tail: Vec<String> = Vec::new();
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(target: "engine", "{}", line);
                if tail.len() >= 20 {
                    tail.remove(0);
                }
                tail.push(line);
            }
            tail.join("\n")
        });

        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            if let Some(end_ms) = segment_end_ms(&line) {
                if end_ms > 0 {
                    let fraction = end_ms as f64 / total_duration_ms as f64;
                    reporter.set_progress(crate::pipeline::STEP, fraction);
                }
            }
        }

        let status = child.wait().await?;
        let stderr_tail = stderr_task.await.unwrap_or_default();

        if !status.success() {
            let code = status.code().unwrap_or(-1);
            warn!(code, "local transcription engine failed");
            return Err(ProcessExecutionError::ExitStatus { code, stderr_tail });
        }

        info!("local transcription engine finished");
        Ok(())
    }
}

/// Shape of the engine's `-oj` JSON result file.
#[derive(Debug, Deserialize)]
struct EngineResultFile {
    result: EngineResult,
    transcription: Vec<EngineSegment>,
}

#[derive(Debug, Deserialize)]
struct EngineResult {
    language: String,
}

#[derive(Debug, Deserialize)]
struct EngineSegment {
    timestamps: EngineTimestamps,
    offsets: OffsetSpan,
    text: String,
    #[serde(default)]
    speaker: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EngineTimestamps {
    from: String,
    to: String,
}

/// Load the engine's on-disk result at `<output_base>.json` into the shared
/// transcript model. The engine writes timestamps as `HH:MM:SS,mmm` strings;
/// they are parsed into seconds here.
pub fn load_transcript(output_base: &Path) -> Result<Transcript, ProcessExecutionError> {
    let path = output_base.with_extension("json");
    let result_file = |message: String| ProcessExecutionError::ResultFile {
        path: path.clone(),
        message,
    };

    let raw = std::fs::read_to_string(&path).map_err(|e| result_file(e.to_string()))?;
    let parsed: EngineResultFile =
        serde_json::from_str(&raw).map_err(|e| result_file(e.to_string()))?;

    let mut items = Vec::with_capacity(parsed.transcription.len());
    for segment in parsed.transcription {
        let from = timestamp_to_ms(&segment.timestamps.from)
            .ok_or_else(|| result_file(format!("bad timestamp {:?}", segment.timestamps.from)))?;
        let to = timestamp_to_ms(&segment.timestamps.to)
            .ok_or_else(|| result_file(format!("bad timestamp {:?}", segment.timestamps.to)))?;

        items.push(TranscriptItem {
            timestamps: TimeSpan {
                from: from as f64 / 1000.0,
                to: to as f64 / 1000.0,
            },
            offsets: segment.offsets,
            text: segment.text,
            speaker: segment.speaker,
        });
    }

    Ok(Transcript::new(parsed.result.language, items))
}
