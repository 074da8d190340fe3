//! Voice Loop server
//!
//! Real-time voice conversation over WebSocket: inbound microphone PCM is
//! segmented, transcribed, answered by a streaming language model, and
//! spoken back sentence by sentence, paced against the client's playback
//! buffer.

pub mod http;
pub mod protocol;
pub mod registry;
pub mod state;
pub mod ws;

pub use http::create_router;
pub use protocol::{ClientMessage, OutboundFrame, ServerMessage};
pub use registry::SessionRegistry;
pub use state::AppState;
