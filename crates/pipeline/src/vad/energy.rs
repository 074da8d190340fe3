//! RMS-energy speech scoring

use crate::PipelineError;

use super::SpeechScorer;

/// Stateless energy scorer: maps frame RMS onto 0.0..=1.0 against a
/// reference level. Good enough for tests and for builds without the ONNX
/// runtime; real deployments want the Silero scorer.
pub struct EnergyVad {
    /// RMS at which the score saturates to 1.0
    reference_rms: f32,
}

impl EnergyVad {
    pub fn new(reference_rms: f32) -> Self {
        Self { reference_rms }
    }
}

impl Default for EnergyVad {
    fn default() -> Self {
        // -20 dBFS reference: ordinary close-mic speech scores near 1.0.
        Self::new(0.1)
    }
}

impl SpeechScorer for EnergyVad {
    fn score(&mut self, frame: &[f32]) -> Result<f32, PipelineError> {
        if frame.is_empty() {
            return Ok(0.0);
        }
        let mean_square: f32 =
            frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32;
        let rms = mean_square.sqrt();
        Ok((rms / self.reference_rms).min(1.0))
    }

    fn reset(&mut self) {}
}
