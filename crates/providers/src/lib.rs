//! Provider contracts for the voice-loop server
//!
//! The orchestrator is vendor-agnostic by construction: it consumes
//! transcription, completion, and synthesis exclusively through the traits in
//! this crate. The `loopback` module ships offline stand-ins used by tests
//! and local development.

pub mod completion;
pub mod loopback;
pub mod normalize;
pub mod synthesize;
pub mod transcribe;

pub use completion::{Completion, PromptMessage, TokenStream};
pub use normalize::{NoopNormalizer, SpeechNormalizer, TextNormalizer};
pub use synthesize::{AudioStream, Synthesizer};
pub use transcribe::{Transcriber, Transcription};

use std::sync::Arc;

use thiserror::Error;

/// Provider errors. All of these are transient from the session's point of
/// view: they surface as a typed error event and the conversation continues.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    #[error("transcription failed: {0}")]
    Transcription(String),

    #[error("completion failed: {0}")]
    Completion(String),

    #[error("synthesis failed: {0}")]
    Synthesis(String),

    #[error("provider stream error: {0}")]
    Stream(String),
}

/// The full set of collaborators one session needs.
#[derive(Clone)]
pub struct ProviderSet {
    pub transcriber: Arc<dyn Transcriber>,
    pub completion: Arc<dyn Completion>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub normalizer: Arc<dyn TextNormalizer>,
}

impl ProviderSet {
    /// Loopback providers: scripted completion, fixed transcriber, tone
    /// synthesizer, passthrough-free normalizer. Runs the whole pipeline
    /// offline.
    pub fn loopback() -> Self {
        Self {
            transcriber: Arc::new(loopback::FixedTranscriber::new("hello")),
            completion: Arc::new(loopback::ScriptedCompletion::echo()),
            synthesizer: Arc::new(loopback::ToneSynthesizer::target_format()),
            normalizer: Arc::new(SpeechNormalizer),
        }
    }
}
