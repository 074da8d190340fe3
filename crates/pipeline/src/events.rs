//! Events a session emits toward the connected client
//!
//! The server crate maps these onto wire messages; the pipeline stays
//! protocol-agnostic.

use voice_loop_core::{ChatMessage, MessageId, PcmFormat};

/// Outbound session events, in emission order semantics: the consumer must
/// forward them in the order received.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The user started speaking; client should stop and clear playback.
    SpeechStart,
    /// The user's utterance ended.
    SpeechEnd,
    /// A segment was accepted for transcription.
    SttStart { duration_ms: u64 },
    /// Finalized transcript.
    Transcript {
        text: String,
        message_id: MessageId,
        language: Option<String>,
        confidence: f32,
    },
    /// Transcription failed.
    SttError { error: String },
    /// Reply generation began.
    LlmStart,
    /// First token of the reply arrived.
    LlmFirstToken { message_id: MessageId },
    /// A complete sentence of the reply.
    LlmSentence { text: String, message_id: MessageId },
    /// First complete sentence of the reply.
    LlmFirstSentence { message_id: MessageId },
    /// The reply stream finished.
    ResponseComplete { message_id: MessageId },
    /// Synthesis of one sentence began.
    TtsStart,
    /// Audio for one sentence begins, in the given format.
    AudioStart { format: PcmFormat },
    /// One playback quantum of raw audio.
    AudioChunk(Vec<u8>),
    /// Synthesis of one sentence finished.
    TtsComplete { synthesis_time_ms: u64 },
    /// Audio for one sentence is fully forwarded.
    AudioEnd,
    /// History suffix starting at `start_index` changed.
    HistoryDelta {
        start_index: usize,
        messages: Vec<ChatMessage>,
    },
    /// A stage failed; the session remains usable.
    Error { message: String },
}
