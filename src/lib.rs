//! Beacon Live - realtime voice front-end for conversational assistants
//!
//! This library provides the core of a wake-word gated voice session:
//! - Microphone capture and PCM16 framing
//! - Gapless playback of streamed speech with barge-in flush
//! - Wake word and sleep phrase detection on live transcription
//! - Session status, console log and local tools
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  frames   ┌──────────────────────┐  realtimeInput  ┌─────────────┐
//! │   Capture    ├──────────►│                      ├────────────────►│             │
//! └──────────────┘           │       Session        │   toolResponse  │   Realtime  │
//! ┌──────────────┐  chunks   │  status · wake word  │◄────────────────┤   service   │
//! │   Playback   │◄──────────┤  tools · console log │  serverContent  │             │
//! └──────┬───────┘           └──────────▲───────────┘   toolCall      └─────────────┘
//!        └──── completions ─────────────┘
//! ```

pub mod config;
pub mod daemon;
pub mod error;
pub mod live;
pub mod session;
pub mod voice;

pub use config::Config;
pub use daemon::Daemon;
pub use error::{Error, Result};
