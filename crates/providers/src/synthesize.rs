//! Synthesis provider contract

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::ProviderError;

/// Streamed synthesis output. The byte sequence begins with a RIFF/WAV
/// header carrying the provider's native format; dropping the stream cancels
/// the request.
pub type AudioStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, ProviderError>> + Send>>;

/// Text-to-speech provider.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize one sentence to audio.
    async fn synthesize(&self, text: &str) -> Result<AudioStream, ProviderError>;
}
