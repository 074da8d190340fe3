//! Shared application state

use std::sync::Arc;

use voice_loop_config::Settings;
use voice_loop_pipeline::{PipelineError, SpeechScorer};
use voice_loop_providers::ProviderSet;

use crate::registry::SessionRegistry;

/// State handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub providers: ProviderSet,
    pub registry: Arc<SessionRegistry>,
}

impl AppState {
    pub fn new(settings: Settings, providers: ProviderSet) -> Self {
        let registry = Arc::new(SessionRegistry::new(settings.server.max_connections));
        Self {
            settings: Arc::new(settings),
            providers,
            registry,
        }
    }

    /// Build the per-session speech scorer. Each session gets its own
    /// instance because the scorer carries recurrent state.
    #[cfg(feature = "onnx")]
    pub fn build_scorer(&self) -> Result<Box<dyn SpeechScorer>, PipelineError> {
        let vad = &self.settings.pipeline.vad;
        Ok(Box::new(voice_loop_pipeline::vad::SileroVad::new(
            &self.settings.models.vad,
            vad.sample_rate,
            vad.frame_samples,
        )?))
    }

    /// Energy fallback when the ONNX runtime is compiled out.
    #[cfg(not(feature = "onnx"))]
    pub fn build_scorer(&self) -> Result<Box<dyn SpeechScorer>, PipelineError> {
        Ok(Box::new(voice_loop_pipeline::EnergyVad::default()))
    }
}
