//! Loopback providers
//!
//! Offline stand-ins for the three provider contracts. They exercise the
//! full pipeline (streaming deltas, WAV-headed audio, realistic timing
//! metadata) without any network backend, and are what the integration tests
//! and local development runs are wired to.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use voice_loop_core::{wav, PcmFormat, TARGET_FORMAT};

use crate::{
    AudioStream, Completion, ProviderError, Synthesizer, TokenStream, Transcriber, Transcription,
};
use crate::completion::PromptMessage;

/// Transcriber returning scripted texts in order, then a fixed fallback.
pub struct FixedTranscriber {
    scripted: Mutex<VecDeque<String>>,
    fallback: String,
}

impl FixedTranscriber {
    pub fn new(fallback: impl Into<String>) -> Self {
        Self {
            scripted: Mutex::new(VecDeque::new()),
            fallback: fallback.into(),
        }
    }

    /// Queue texts to be returned by successive calls.
    pub fn with_script(texts: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            scripted: Mutex::new(texts.into_iter().map(Into::into).collect()),
            fallback: String::new(),
        }
    }
}

#[async_trait]
impl Transcriber for FixedTranscriber {
    async fn transcribe(&self, pcm: &[u8]) -> Result<Transcription, ProviderError> {
        let text = self
            .scripted
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        Ok(Transcription {
            text,
            language: Some("en".to_string()),
            duration_ms: TARGET_FORMAT.duration_ms(pcm.len()),
            confidence: 1.0,
        })
    }
}

/// Completion provider that replays scripted token-delta sequences, or echoes
/// the final user message when no script is queued.
pub struct ScriptedCompletion {
    scripts: Mutex<VecDeque<Vec<String>>>,
    echo: bool,
}

impl ScriptedCompletion {
    /// Replay `scripts` in order; error once exhausted.
    pub fn new(scripts: impl IntoIterator<Item = Vec<String>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into_iter().collect()),
            echo: false,
        }
    }

    /// Echo mode: every reply restates the last user message.
    pub fn echo() -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            echo: true,
        }
    }
}

#[async_trait]
impl Completion for ScriptedCompletion {
    async fn stream(
        &self,
        messages: &[PromptMessage],
        _max_tokens: u32,
    ) -> Result<TokenStream, ProviderError> {
        let deltas = match self.scripts.lock().pop_front() {
            Some(deltas) => deltas,
            None if self.echo => {
                let last_user = messages
                    .iter()
                    .rev()
                    .find(|m| m.role == "user")
                    .map(|m| m.content.clone())
                    .unwrap_or_default();
                vec!["You said: ".to_string(), last_user, ".".to_string()]
            }
            None => {
                return Err(ProviderError::Completion(
                    "no scripted reply queued".to_string(),
                ))
            }
        };

        Ok(Box::pin(
            tokio_stream::iter(deltas.into_iter().map(Ok)),
        ))
    }
}

/// Synthesizer producing a quiet sine tone in WAV form, duration scaled to
/// text length. The output format is configurable so tests can exercise both
/// the direct and the resample path.
pub struct ToneSynthesizer {
    format: PcmFormat,
    ms_per_char: u64,
}

impl ToneSynthesizer {
    pub fn new(format: PcmFormat, ms_per_char: u64) -> Self {
        Self {
            format,
            ms_per_char,
        }
    }

    /// Tone synthesizer emitting the playback target format directly.
    pub fn target_format() -> Self {
        Self::new(TARGET_FORMAT, 50)
    }
}

#[async_trait]
impl Synthesizer for ToneSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<AudioStream, ProviderError> {
        let duration_ms = (text.chars().count() as u64).max(1) * self.ms_per_char;
        let samples_per_channel =
            (self.format.sample_rate as u64 * duration_ms / 1000) as usize;

        let mut body =
            Vec::with_capacity(samples_per_channel * self.format.channels as usize * 2);
        for i in 0..samples_per_channel {
            let t = i as f32 / self.format.sample_rate as f32;
            let value = ((t * 220.0 * std::f32::consts::TAU).sin() * 0.1 * 32767.0) as i16;
            for _ in 0..self.format.channels {
                body.extend_from_slice(&value.to_le_bytes());
            }
        }

        let mut bytes = wav::header_for(self.format, body.len()).to_vec();
        bytes.extend_from_slice(&body);

        // Yield in chunks so consumers see a genuine stream.
        let chunks: Vec<Result<Vec<u8>, ProviderError>> = bytes
            .chunks(1024)
            .map(|c| Ok(c.to_vec()))
            .collect();
        Ok(Box::pin(tokio_stream::iter(chunks)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn test_fixed_transcriber_reports_duration() {
        let transcriber = FixedTranscriber::new("fallback");
        let result = transcriber.transcribe(&[0u8; 32_000]).await.unwrap();
        assert_eq!(result.text, "fallback");
        assert_eq!(result.duration_ms, 1000);
    }

    #[tokio::test]
    async fn test_scripted_completion_replays_in_order() {
        let completion = ScriptedCompletion::new(vec![vec![
            "Hi".to_string(),
            "!".to_string(),
        ]]);

        let mut stream = completion.stream(&[], 64).await.unwrap();
        let mut text = String::new();
        while let Some(delta) = stream.next().await {
            text.push_str(&delta.unwrap());
        }
        assert_eq!(text, "Hi!");

        assert!(completion.stream(&[], 64).await.is_err());
    }

    #[tokio::test]
    async fn test_tone_synthesizer_emits_valid_wav() {
        let synth = ToneSynthesizer::target_format();
        let mut stream = synth.synthesize("hello").await.unwrap();

        let mut bytes = Vec::new();
        while let Some(chunk) = stream.next().await {
            bytes.extend(chunk.unwrap());
        }

        let info = wav::parse_header(&bytes).unwrap().unwrap();
        assert_eq!(info.format, TARGET_FORMAT);
        assert_eq!(info.declared_len, bytes.len() - info.data_offset);
    }
}
