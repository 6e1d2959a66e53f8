//! Progress reporting seam.
//!
//! The pipeline pushes step lifecycle, fractional progress, and non-fatal
//! warnings into a [`ProgressReporter`]. Events are fire-and-forget: there is
//! no return value and no acknowledgment, and several progress events for the
//! same step may land in quick succession. Consumers must treat the latest
//! value as authoritative rather than accumulate.

use std::sync::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// A single progress notification.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// A named pipeline step has started; consumers reset their progress state.
    Step { step: String },
    /// Fractional progress in `[0, 1]` for a step.
    Progress { step: String, fraction: f64 },
    /// A non-fatal warning attached to a step.
    Error { step: String, message: String },
}

/// Sink for progress notifications, injected into the pipeline.
pub trait ProgressReporter: Send + Sync {
    /// Announce that `step` has started.
    fn set_step(&self, step: &str);
    /// Report fractional progress in `[0, 1]` for `step`.
    fn set_progress(&self, step: &str, fraction: f64);
    /// Attach a non-fatal warning message to `step`.
    fn set_error(&self, step: &str, message: &str);
}

impl<T: ProgressReporter + ?Sized> ProgressReporter for std::sync::Arc<T> {
    fn set_step(&self, step: &str) {
        (**self).set_step(step);
    }

    fn set_progress(&self, step: &str, fraction: f64) {
        (**self).set_progress(step, fraction);
    }

    fn set_error(&self, step: &str, message: &str) {
        (**self).set_error(step, message);
    }
}

/// Latest-wins reporter backed by a tokio watch channel.
///
/// Only the most recent event is retained; a slow consumer sees the newest
/// state rather than a backlog, which matches the overwrite-don't-accumulate
/// consumer contract.
pub struct WatchReporter {
    tx: watch::Sender<Option<ProgressEvent>>,
}

impl WatchReporter {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// Subscribe to the latest event. The receiver starts out with `None`
    /// until the first event is reported.
    pub fn subscribe(&self) -> watch::Receiver<Option<ProgressEvent>> {
        self.tx.subscribe()
    }

    fn send(&self, event: ProgressEvent) {
        // Fire-and-forget: with no subscribers the send fails, which is fine.
        let _ = self.tx.send(Some(event));
    }
}

impl Default for WatchReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for WatchReporter {
    fn set_step(&self, step: &str) {
        self.send(ProgressEvent::Step {
            step: step.to_string(),
        });
    }

    fn set_progress(&self, step: &str, fraction: f64) {
        self.send(ProgressEvent::Progress {
            step: step.to_string(),
            fraction,
        });
    }

    fn set_error(&self, step: &str, message: &str) {
        self.send(ProgressEvent::Error {
            step: step.to_string(),
            message: message.to_string(),
        });
    }
}

/// Reporter that forwards everything to the tracing subscriber. Used by the
/// CLI binary.
#[derive(Debug, Default)]
pub struct LogReporter;

impl ProgressReporter for LogReporter {
    fn set_step(&self, step: &str) {
        info!(step, "step started");
    }

    fn set_progress(&self, step: &str, fraction: f64) {
        debug!(step, fraction, "progress");
    }

    fn set_error(&self, step: &str, message: &str) {
        warn!(step, message, "step warning");
    }
}

/// Reporter that records every event in order. Useful for tests that assert
/// exact event sequences.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    events: Mutex<Vec<ProgressEvent>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events reported so far, in order.
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().expect("reporter lock poisoned").clone()
    }

    /// All progress fractions reported for `step`, in order.
    pub fn fractions(&self, step: &str) -> Vec<f64> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ProgressEvent::Progress { step: s, fraction } if s == step => Some(fraction),
                _ => None,
            })
            .collect()
    }

    /// All warning messages reported for `step`, in order.
    pub fn errors(&self, step: &str) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ProgressEvent::Error { step: s, message } if s == step => Some(message),
                _ => None,
            })
            .collect()
    }
}

impl ProgressReporter for MemoryReporter {
    fn set_step(&self, step: &str) {
        self.events
            .lock()
            .expect("reporter lock poisoned")
            .push(ProgressEvent::Step {
                step: step.to_string(),
            });
    }

    fn set_progress(&self, step: &str, fraction: f64) {
        self.events
            .lock()
            .expect("reporter lock poisoned")
            .push(ProgressEvent::Progress {
                step: step.to_string(),
                fraction,
            });
    }

    fn set_error(&self, step: &str, message: &str) {
        self.events
            .lock()
            .expect("reporter lock poisoned")
            .push(ProgressEvent::Error {
                step: step.to_string(),
                message: message.to_string(),
            });
    }
}
