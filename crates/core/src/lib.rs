//! Core types for the voice-loop server
//!
//! This crate provides foundational types used across all other crates:
//! - PCM format arithmetic and frame buffering
//! - Chat message and history types
//! - WAV header reading and writing

pub mod audio;
pub mod message;
pub mod wav;

pub use audio::{pcm16_to_f32, FrameBuffer, PcmFormat, TARGET_FORMAT};
pub use message::{ChatMessage, History, MessageId, Role};
pub use wav::{WavError, WavInfo};
