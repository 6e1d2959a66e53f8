use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{error, info};
use whisper_pipeline::config::{AppSettings, StaticSettings};
use whisper_pipeline::pipeline::{DurationProvider, ModelResolver, Transcriber};
use whisper_pipeline::progress::LogReporter;

#[derive(Parser)]
#[command(name = "whisper-pipeline")]
#[command(about = "Transcribe an audio file via a local whisper engine or a remote server")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Args {
    /// Audio file to transcribe
    pub input: PathBuf,

    /// Where to write the normalized transcript JSON
    pub output: PathBuf,

    /// Model identifier (resolved to ggml-<id>.bin in the models directory)
    #[arg(long, default_value = "base.en")]
    pub model: String,

    /// Try the configured remote transcription server first
    #[arg(long, default_value = "false")]
    pub remote: bool,

    /// Path to the local whisper engine binary
    #[arg(long, default_value = "whisper")]
    pub engine: PathBuf,

    /// Directory containing the ggml model files
    #[arg(long, default_value = "models")]
    pub models_dir: PathBuf,

    /// Settings file (JSON); engine defaults are used when omitted
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Path to the ffprobe binary used for duration detection
    #[arg(long, default_value = "ffprobe")]
    pub ffprobe: PathBuf,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Duration detection through ffprobe.
pub struct FfprobeDuration {
    ffprobe: PathBuf,
}

impl FfprobeDuration {
    pub fn new(ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffprobe: ffprobe.into(),
        }
    }
}

impl DurationProvider for FfprobeDuration {
    async fn duration_ms(&self, path: &Path) -> Result<u64> {
        let output = Command::new(&self.ffprobe)
            .arg("-v")
            .arg("error")
            .arg("-show_entries")
            .arg("format=duration")
            .arg("-of")
            .arg("default=noprint_wrappers=1:nokey=1")
            .arg(path)
            .output()
            .await
            .with_context(|| format!("failed to run {}", self.ffprobe.display()))?;

        if !output.status.success() {
            bail!(
                "ffprobe failed on {}: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let seconds: f64 = stdout
            .trim()
            .parse()
            .with_context(|| format!("unparseable ffprobe duration {:?}", stdout.trim()))?;
        Ok((seconds * 1000.0) as u64)
    }
}

/// Model lookup by identifier in a flat models directory.
pub struct DirModelResolver {
    dir: PathBuf,
}

impl DirModelResolver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ModelResolver for DirModelResolver {
    fn model_path(&self, model_id: &str) -> Result<PathBuf> {
        let path = self.dir.join(format!("ggml-{model_id}.bin"));
        if !path.exists() {
            bail!("model {} not found at {}", model_id, path.display());
        }
        Ok(path)
    }
}

fn load_settings(path: Option<&Path>) -> Result<AppSettings> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read settings file {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("invalid settings file {}", path.display()))
        }
        None => Ok(AppSettings::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level: tracing::Level = args.log_level.into();
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    info!("Starting Whisper Pipeline v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Input: {}", args.input.display());
    info!("  Output: {}", args.output.display());
    info!("  Model: {}", args.model);
    info!("  Remote first: {}", args.remote);
    info!("  Engine: {}", args.engine.display());

    let settings = load_settings(args.settings.as_deref())?;

    let transcriber = Transcriber::new(
        FfprobeDuration::new(&args.ffprobe),
        StaticSettings(settings),
        DirModelResolver::new(&args.models_dir),
        LogReporter,
        &args.engine,
    );

    let transcript = match transcriber
        .transcribe(&args.input, &args.output, &args.model, args.remote)
        .await
    {
        Ok(transcript) => transcript,
        Err(e) => {
            error!("Transcription failed: {}", e);
            return Err(e.into());
        }
    };

    let json = serde_json::to_string_pretty(&transcript)
        .context("failed to serialize transcript")?;
    std::fs::write(&args.output, json)
        .with_context(|| format!("failed to write transcript to {}", args.output.display()))?;

    info!(
        "Wrote {} segments ({} language) to {}",
        transcript.items.len(),
        transcript.language,
        args.output.display()
    );

    Ok(())
}
