//! Shared transcript data model.
//!
//! Both execution strategies (remote service, local engine) normalize their
//! output into [`Transcript`], so everything downstream of the pipeline works
//! with one shape regardless of where the recognition ran.

use serde::{Deserialize, Serialize};

/// Wall-clock span of a recognized segment, in seconds from the start of the
/// audio.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSpan {
    pub from: f64,
    pub to: f64,
}

/// Engine offset span (token or byte offsets, engine-defined).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetSpan {
    pub from: u64,
    pub to: u64,
}

/// A single recognized speech segment. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptItem {
    /// Start/end timestamps into the audio.
    pub timestamps: TimeSpan,
    /// Start/end offsets as reported by the engine.
    pub offsets: OffsetSpan,
    /// Recognized text for this segment.
    pub text: String,
    /// Speaker label when diarization is enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
}

/// A complete transcription result: detected (or declared) language plus the
/// segments in engine order. Segments are never reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    /// ISO 639-1 language code reported by the engine.
    pub language: String,
    /// Segments in chronological order, as produced.
    pub items: Vec<TranscriptItem>,
}

impl Transcript {
    /// Create a transcript with the given language and segments.
    pub fn new(language: impl Into<String>, items: Vec<TranscriptItem>) -> Self {
        Self {
            language: language.into(),
            items,
        }
    }

    /// Largest `offsets.to` across all segments, if any.
    ///
    /// Used as the denominator when deriving synthetic progress from a remote
    /// result.
    pub fn max_end_offset(&self) -> Option<u64> {
        self.items.iter().map(|item| item.offsets.to).max()
    }

    /// Concatenated segment text, trimmed per segment.
    pub fn plain_text(&self) -> String {
        self.items
            .iter()
            .map(|item| item.text.trim())
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Parse an engine timestamp of the form `HH:MM:SS.mmm` (or `HH:MM:SS,mmm`,
/// the separator whisper.cpp uses in its JSON output) into milliseconds.
///
/// Returns `None` for anything that does not match the expected shape.
pub fn timestamp_to_ms(value: &str) -> Option<u64> {
    let normalized = value.trim().replace(',', ".");
    let mut parts = normalized.splitn(3, ':');

    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds_part = parts.next()?;

    let (seconds, millis) = match seconds_part.split_once('.') {
        Some((secs, ms)) => {
            if ms.len() != 3 {
                return None;
            }
            (secs.parse::<u64>().ok()?, ms.parse::<u64>().ok()?)
        }
        None => (seconds_part.parse::<u64>().ok()?, 0),
    };

    if minutes >= 60 || seconds >= 60 {
        return None;
    }

    Some(((hours * 60 + minutes) * 60 + seconds) * 1000 + millis)
}
