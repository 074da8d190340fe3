//! Voice activity scoring
//!
//! The segmenter consumes per-frame speech probabilities from a stateful
//! scorer. The Silero ONNX adapter (feature `onnx`) carries recurrent state
//! across frames; the energy scorer is the always-available fallback and the
//! engine the tests drive.

mod energy;
#[cfg(feature = "onnx")]
mod silero;

pub use energy::EnergyVad;
#[cfg(feature = "onnx")]
pub use silero::SileroVad;

use crate::PipelineError;

/// Per-frame speech scorer. Implementations may carry recurrent state across
/// calls; `reset` clears it.
pub trait SpeechScorer: Send + Sync {
    /// Score one analysis frame of normalized samples. Returns the speech
    /// probability in 0.0..=1.0.
    fn score(&mut self, frame: &[f32]) -> Result<f32, PipelineError>;

    /// Clear any recurrent state.
    fn reset(&mut self);
}
