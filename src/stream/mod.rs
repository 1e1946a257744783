//! Continuous recognition over a live capture stream.
//!
//! The capture producer sends fixed-size [`crate::audio::AudioChunk`]s over a
//! bounded channel; a worker thread owns the ring buffer, runs activity
//! detection every tick, and pushes [`RecognizerEvent`]s to the consumer.
//! Exactly two actors touch the audio path, and the ring buffer never leaves
//! the worker, so readers cannot observe a partially written chunk.

pub mod recognizer;

pub use recognizer::{RecognizerHandle, StreamingRecognizer};

use crate::classify::RejectReason;

// ---------------------------------------------------------------------------
// RecognizerState
// ---------------------------------------------------------------------------

/// Streaming recognizer lifecycle.
///
/// `start()` → `Listening`; `pause()` ⇄ `resume()` toggle `Suspended`;
/// `stop()` (or producer loss) → `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognizerState {
    /// Not running; no worker thread alive.
    Idle,
    /// Consuming audio and classifying on activity.
    Listening,
    /// Worker alive and draining audio, but recognition is skipped.
    Suspended,
}

// ---------------------------------------------------------------------------
// RecognizerEvent
// ---------------------------------------------------------------------------

/// Events emitted by the streaming worker, in occurrence order.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognizerEvent {
    /// Signal level rose above the adaptive activity threshold.
    Activity,
    /// The stream stayed below the silence floor past the hold duration.
    Silence,
    /// A debounced, accepted classification.
    Recognized { label: String, confidence: f32 },
    /// A classification ran but was explicitly rejected.
    Rejected { reason: RejectReason },
    /// The worker ended, by request or because the producer went away.
    Stopped { reason: String },
}
