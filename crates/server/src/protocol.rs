//! Wire protocol
//!
//! One JSON-tagged message per event; raw audio quanta travel as binary
//! WebSocket frames out of band of the JSON channel.

use serde::{Deserialize, Serialize};

use voice_loop_core::{ChatMessage, MessageId, PcmFormat};
use voice_loop_pipeline::SessionEvent;

/// Messages the server sends to the client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    SpeechStart,
    SpeechEnd,
    SttStart {
        duration_ms: u64,
    },
    Transcript {
        text: String,
        is_final: bool,
        message_id: MessageId,
        #[serde(skip_serializing_if = "Option::is_none")]
        language: Option<String>,
        confidence: f32,
    },
    SttError {
        error: String,
    },
    LlmStart,
    LlmFirstToken {
        message_id: MessageId,
    },
    LlmSentence {
        text: String,
        message_id: MessageId,
    },
    LlmFirstSentence {
        message_id: MessageId,
    },
    AiResponseComplete {
        message_id: MessageId,
    },
    TtsStart,
    AudioStart {
        format: PcmFormat,
    },
    TtsComplete {
        synthesis_time_ms: u64,
    },
    AudioEnd,
    ChatHistoryDelta {
        start_index: usize,
        messages: Vec<ChatMessage>,
    },
    Error {
        message: String,
    },
    Pong {
        timestamp: u64,
    },
}

/// Control messages the client sends on the JSON channel. Binary frames are
/// raw PCM audio and never reach this type.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping { timestamp: u64 },
}

/// One outbound WebSocket frame.
#[derive(Debug)]
pub enum OutboundFrame {
    Message(ServerMessage),
    Audio(Vec<u8>),
    /// WebSocket-level pong carrying the ping payload.
    Pong(Vec<u8>),
}

/// Map a session event onto its wire representation.
pub fn frame_for(event: SessionEvent) -> OutboundFrame {
    match event {
        SessionEvent::SpeechStart => OutboundFrame::Message(ServerMessage::SpeechStart),
        SessionEvent::SpeechEnd => OutboundFrame::Message(ServerMessage::SpeechEnd),
        SessionEvent::SttStart { duration_ms } => {
            OutboundFrame::Message(ServerMessage::SttStart { duration_ms })
        }
        SessionEvent::Transcript {
            text,
            message_id,
            language,
            confidence,
        } => OutboundFrame::Message(ServerMessage::Transcript {
            text,
            is_final: true,
            message_id,
            language,
            confidence,
        }),
        SessionEvent::SttError { error } => {
            OutboundFrame::Message(ServerMessage::SttError { error })
        }
        SessionEvent::LlmStart => OutboundFrame::Message(ServerMessage::LlmStart),
        SessionEvent::LlmFirstToken { message_id } => {
            OutboundFrame::Message(ServerMessage::LlmFirstToken { message_id })
        }
        SessionEvent::LlmSentence { text, message_id } => {
            OutboundFrame::Message(ServerMessage::LlmSentence { text, message_id })
        }
        SessionEvent::LlmFirstSentence { message_id } => {
            OutboundFrame::Message(ServerMessage::LlmFirstSentence { message_id })
        }
        SessionEvent::ResponseComplete { message_id } => {
            OutboundFrame::Message(ServerMessage::AiResponseComplete { message_id })
        }
        SessionEvent::TtsStart => OutboundFrame::Message(ServerMessage::TtsStart),
        SessionEvent::AudioStart { format } => {
            OutboundFrame::Message(ServerMessage::AudioStart { format })
        }
        SessionEvent::AudioChunk(bytes) => OutboundFrame::Audio(bytes),
        SessionEvent::TtsComplete { synthesis_time_ms } => {
            OutboundFrame::Message(ServerMessage::TtsComplete { synthesis_time_ms })
        }
        SessionEvent::AudioEnd => OutboundFrame::Message(ServerMessage::AudioEnd),
        SessionEvent::HistoryDelta {
            start_index,
            messages,
        } => OutboundFrame::Message(ServerMessage::ChatHistoryDelta {
            start_index,
            messages,
        }),
        SessionEvent::Error { message } => {
            OutboundFrame::Message(ServerMessage::Error { message })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_loop_core::TARGET_FORMAT;

    #[test]
    fn test_tagged_snake_case_types() {
        let json = serde_json::to_value(ServerMessage::AiResponseComplete {
            message_id: MessageId::new(),
        })
        .unwrap();
        assert_eq!(json["type"], "ai_response_complete");
        assert!(json["messageId"].is_string());
    }

    #[test]
    fn test_transcript_field_names() {
        let json = serde_json::to_value(ServerMessage::Transcript {
            text: "hi".to_string(),
            is_final: true,
            message_id: MessageId::new(),
            language: Some("en".to_string()),
            confidence: 0.9,
        })
        .unwrap();
        assert_eq!(json["type"], "transcript");
        assert_eq!(json["isFinal"], true);
        assert_eq!(json["language"], "en");
    }

    #[test]
    fn test_audio_start_format_shape() {
        let json = serde_json::to_value(ServerMessage::AudioStart {
            format: TARGET_FORMAT,
        })
        .unwrap();
        assert_eq!(json["format"]["sampleRate"], 16_000);
        assert_eq!(json["format"]["numChannels"], 1);
        assert_eq!(json["format"]["bitsPerSample"], 16);
    }

    #[test]
    fn test_history_delta_shape() {
        let json = serde_json::to_value(ServerMessage::ChatHistoryDelta {
            start_index: 5,
            messages: vec![],
        })
        .unwrap();
        assert_eq!(json["type"], "chat_history_delta");
        assert_eq!(json["startIndex"], 5);
    }

    #[test]
    fn test_ping_parses() {
        let message: ClientMessage =
            serde_json::from_str(r#"{"type":"ping","timestamp":123456}"#).unwrap();
        let ClientMessage::Ping { timestamp } = message;
        assert_eq!(timestamp, 123_456);
    }

    #[test]
    fn test_unknown_client_message_rejected() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"image","data":"x"}"#).is_err());
    }
}
