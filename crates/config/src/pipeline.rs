//! Pipeline configuration

use serde::{Deserialize, Serialize};

/// Configuration for one session's processing pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Voice activity segmentation knobs
    #[serde(default)]
    pub vad: VadConfig,

    /// Transcription gating knobs
    #[serde(default)]
    pub stt: SttConfig,

    /// Reply generation knobs
    #[serde(default)]
    pub reply: ReplyConfig,

    /// Synthesis pacing knobs
    #[serde(default)]
    pub pacing: PacingConfig,
}

/// Voice activity segmentation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VadConfig {
    /// Speech probability threshold (0.0 - 1.0)
    #[serde(default = "default_vad_threshold")]
    pub threshold: f32,

    /// Analysis frame length in samples (the Silero model wants 512)
    #[serde(default = "default_frame_samples")]
    pub frame_samples: usize,

    /// Inbound sample rate in Hz
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Minimum voiced span for a segment to be kept (ms)
    #[serde(default = "default_min_speech_ms")]
    pub min_speech_ms: u64,

    /// Silence gap that ends a segment (ms)
    #[serde(default = "default_max_silence_ms")]
    pub max_silence_ms: u64,
}

fn default_vad_threshold() -> f32 {
    0.5
}
fn default_frame_samples() -> usize {
    512
}
fn default_sample_rate() -> u32 {
    16_000
}
fn default_min_speech_ms() -> u64 {
    250
}
fn default_max_silence_ms() -> u64 {
    500
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            threshold: default_vad_threshold(),
            frame_samples: default_frame_samples(),
            sample_rate: default_sample_rate(),
            min_speech_ms: default_min_speech_ms(),
            max_silence_ms: default_max_silence_ms(),
        }
    }
}

/// Transcription gate configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SttConfig {
    /// Segments shorter than this never reach the provider (ms)
    #[serde(default = "default_min_audio_ms")]
    pub min_audio_ms: u64,
}

fn default_min_audio_ms() -> u64 {
    100
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            min_audio_ms: default_min_audio_ms(),
        }
    }
}

/// Reply generation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyConfig {
    /// Token budget per completion request
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// How many trailing history messages accompany each request
    #[serde(default = "default_history_context")]
    pub history_context: usize,

    /// System prompt prepended to every request
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_max_tokens() -> u32 {
    4096
}
fn default_history_context() -> usize {
    20
}
fn default_system_prompt() -> String {
    "You are a helpful AI assistant.".to_string()
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            history_context: default_history_context(),
            system_prompt: default_system_prompt(),
        }
    }
}

/// Synthesis pacing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingConfig {
    /// Synthesis of the next sentence is deferred while the client still has
    /// more than this much audio to play (ms)
    #[serde(default = "default_max_buffered_ms")]
    pub max_buffered_ms: u64,

    /// Re-check interval while deferred (ms)
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,

    /// Playback quantum: size of each forwarded audio chunk (ms)
    #[serde(default = "default_quantum_ms")]
    pub quantum_ms: u64,
}

fn default_max_buffered_ms() -> u64 {
    5000
}
fn default_retry_interval_ms() -> u64 {
    100
}
fn default_quantum_ms() -> u64 {
    50
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            max_buffered_ms: default_max_buffered_ms(),
            retry_interval_ms: default_retry_interval_ms(),
            quantum_ms: default_quantum_ms(),
        }
    }
}
