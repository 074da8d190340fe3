//! Silero VAD scoring via ONNX Runtime
//!
//! The merged-state Silero model takes a 512-sample window, a `[2, 1, 128]`
//! recurrent state tensor, and the sample rate; it returns the speech
//! probability and the next state. The state lives in this adapter and is
//! fed back on every call, so one instance serves exactly one audio stream.

use std::path::Path;

use ndarray::{Array1, Array2, Array3};
use ort::{GraphOptimizationLevel, Session};

use crate::PipelineError;

use super::SpeechScorer;

const STATE_SHAPE: (usize, usize, usize) = (2, 1, 128);

/// Silero VAD adapter.
pub struct SileroVad {
    session: Session,
    state: Array3<f32>,
    sample_rate: i64,
    chunk_size: usize,
}

impl SileroVad {
    /// Load the model from disk. Failure here is fatal at startup; a missing
    /// model must not surface as a per-frame error later.
    pub fn new(model_path: impl AsRef<Path>, sample_rate: u32, chunk_size: usize) -> Result<Self, PipelineError> {
        let session = Session::builder()
            .map_err(|e| PipelineError::Model(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| PipelineError::Model(e.to_string()))?
            .with_intra_threads(1)
            .map_err(|e| PipelineError::Model(e.to_string()))?
            .commit_from_file(model_path)
            .map_err(|e| PipelineError::Model(e.to_string()))?;

        Ok(Self {
            session,
            state: Array3::zeros(STATE_SHAPE),
            sample_rate: sample_rate as i64,
            chunk_size,
        })
    }

    /// Verify the model loads at all. Called once at process startup so a
    /// broken install fails fast instead of per connection.
    pub fn preflight(model_path: impl AsRef<Path>) -> Result<(), PipelineError> {
        Self::new(model_path, 16_000, 512).map(|_| ())
    }
}

impl SpeechScorer for SileroVad {
    fn score(&mut self, frame: &[f32]) -> Result<f32, PipelineError> {
        // Pad short frames, truncate long ones; the model wants exactly
        // `chunk_size` samples.
        let mut input = Array2::<f32>::zeros((1, self.chunk_size));
        for (i, sample) in frame.iter().take(self.chunk_size).enumerate() {
            input[[0, i]] = *sample;
        }
        let sr = Array1::from_vec(vec![self.sample_rate]);

        let outputs = self
            .session
            .run(
                ort::inputs![
                    "input" => input.view(),
                    "state" => self.state.view(),
                    "sr" => sr.view(),
                ]
                .map_err(|e| PipelineError::Model(e.to_string()))?,
            )
            .map_err(|e| PipelineError::Model(e.to_string()))?;

        let next_state = outputs
            .get("stateN")
            .ok_or_else(|| PipelineError::Model("missing stateN output".to_string()))?
            .try_extract_tensor::<f32>()
            .map_err(|e| PipelineError::Model(e.to_string()))?;
        let next_state = next_state
            .view()
            .to_owned()
            .into_shape(STATE_SHAPE)
            .map_err(|e| PipelineError::Model(e.to_string()))?;
        self.state = next_state;

        let probability = outputs
            .get("output")
            .ok_or_else(|| PipelineError::Model("missing output tensor".to_string()))?
            .try_extract_tensor::<f32>()
            .map_err(|e| PipelineError::Model(e.to_string()))?
            .view()
            .iter()
            .copied()
            .next()
            .ok_or_else(|| PipelineError::Model("empty output tensor".to_string()))?;

        Ok(probability)
    }

    fn reset(&mut self) {
        self.state.fill(0.0);
    }
}
