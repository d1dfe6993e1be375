//! LiveKit transport for phone callers.
//!
//! Each call gets its own LiveKit room. The caller and the navigator join it
//! with separately signed tokens; recognition, synthesis and voice-activity
//! detection happen in the media pipeline attached to the room, which talks
//! to the navigator over the session WebSocket.

pub mod config;
pub mod error;
pub mod service;

pub use config::LiveKitConfig;
pub use error::VoiceError;
pub use service::{CallTokens, VoiceService};
