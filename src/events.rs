//! Outward event surface for download and install attempts.
//!
//! Consumers (a UI layer, the CLI progress bar, tests) implement
//! [`EventSink`]. The pipeline never emits events directly; it goes through an
//! [`Attempt`], which emits `start` when created, filters progress so it never
//! decreases, and emits exactly one terminal event.

use crate::core::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// One event of a download or install attempt.
///
/// Serialized as tagged JSON, e.g. `{"type":"downloading","progress":42}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum UpdateEvent {
    Start,
    Downloading {
        /// Integer percentage, 1..=100
        progress: u8,
    },
    Complete,
    Error {
        message: String,
    },
}

/// Receives [`UpdateEvent`]s.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: UpdateEvent);
}

impl<F> EventSink for F
where
    F: Fn(UpdateEvent) + Send + Sync,
{
    fn emit(&self, event: UpdateEvent) {
        self(event);
    }
}

/// Sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: UpdateEvent) {}
}

/// A single attempt's view of the event stream.
///
/// Dropping an attempt without calling [`Attempt::finish`] emits an `error`
/// event, so a cancelled future still closes its stream.
pub struct Attempt {
    sink: Arc<dyn EventSink>,
    progress: u8,
    finished: bool,
}

impl Attempt {
    /// Emits `start` and returns the handle for the rest of the attempt.
    pub fn start(sink: Arc<dyn EventSink>) -> Self {
        sink.emit(UpdateEvent::Start);
        Self {
            sink,
            progress: 0,
            finished: false,
        }
    }

    /// Emits `downloading` if `percent` is higher than anything sent before.
    pub fn progress(&mut self, percent: u8) {
        let percent = percent.min(100);
        if percent > self.progress {
            self.progress = percent;
            self.sink.emit(UpdateEvent::Downloading {
                progress: percent,
            });
        }
    }

    /// Emits `complete` or `error` depending on `result`.
    pub fn finish<T>(mut self, result: &Result<T>) {
        self.finished = true;
        match result {
            Ok(_) => self.sink.emit(UpdateEvent::Complete),
            Err(e) => self.sink.emit(UpdateEvent::Error {
                message: e.to_string(),
            }),
        }
    }
}

impl Drop for Attempt {
    fn drop(&mut self) {
        if !self.finished {
            debug!("Attempt dropped before finishing");
            self.sink.emit(UpdateEvent::Error {
                message: "attempt abandoned".to_string(),
            });
        }
    }
}
