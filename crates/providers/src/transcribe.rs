//! Transcription provider contract

use async_trait::async_trait;

use crate::ProviderError;

/// Successful transcription of one speech segment.
#[derive(Debug, Clone)]
pub struct Transcription {
    /// Transcribed text
    pub text: String,
    /// Detected language (ISO 639-1), if the provider reports one
    pub language: Option<String>,
    /// Audio duration the provider reports (ms)
    pub duration_ms: u64,
    /// Confidence score (0.0 - 1.0)
    pub confidence: f32,
}

/// Speech-to-text provider.
///
/// One call per finalized speech segment; the transcription gate guarantees
/// at most one call is in flight per session.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe a raw 16 kHz mono 16-bit PCM segment.
    async fn transcribe(&self, pcm: &[u8]) -> Result<Transcription, ProviderError>;
}
