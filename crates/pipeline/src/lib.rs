//! Per-connection streaming orchestrator
//!
//! This crate holds the hard part of the server: the pipeline that takes raw
//! microphone audio to spoken replies while staying interruptible.
//!
//! - Voice activity segmentation ([`segmenter`]) over a stateful scorer
//!   ([`vad`])
//! - Single-flight transcription gating ([`gate`])
//! - Token-stream sentence splitting ([`splitter`])
//! - Synthesis pacing against the client's playback buffer ([`pacing`])
//! - The session controller tying them together ([`session`])

pub mod events;
pub mod gate;
pub mod pacing;
pub mod resample;
pub mod segmenter;
pub mod session;
pub mod splitter;
pub mod vad;

pub use events::SessionEvent;
pub use gate::{GateRejection, TranscriptionGate};
pub use pacing::{PlaybackClock, SynthJob, SynthesisQueue};
pub use segmenter::{SegmenterEvent, SpeechSegmenter};
pub use session::{spawn_session, ReplyEvent, SessionHandle, SessionInput};
pub use splitter::SentenceSplitter;
pub use vad::{EnergyVad, SpeechScorer};
#[cfg(feature = "onnx")]
pub use vad::SileroVad;

use thiserror::Error;

/// Pipeline errors.
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    #[error("vad error: {0}")]
    Vad(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("audio error: {0}")]
    Audio(String),

    #[error("channel closed")]
    ChannelClosed,
}
