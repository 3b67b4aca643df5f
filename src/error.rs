//! Error types for Beacon Live

use thiserror::Error;

/// Result type alias for Beacon Live operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in a realtime voice session
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// No API key available, no session is attempted
    #[error("credential missing: {0}")]
    CredentialMissing(String),

    /// Audio device error (enumeration, stream configuration)
    #[error("audio error: {0}")]
    Audio(String),

    /// Microphone capture fault or permission denial
    #[error("capture error: {0}")]
    Capture(String),

    /// Speaker output fault
    #[error("playback error: {0}")]
    Playback(String),

    /// Inbound audio payload could not be decoded
    #[error("malformed audio: {0}")]
    MalformedAudio(String),

    /// Handshake or mid-session network fault
    #[error("transport error: {0}")]
    Transport(String),

    /// Handshake did not complete before the deadline
    #[error("handshake timed out after {0}s")]
    HandshakeTimeout(u64),

    /// Tool call carried missing or invalid arguments
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Tool call named a function this client does not provide
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// WebSocket protocol error
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

impl Error {
    /// Whether this error ends the session
    ///
    /// Malformed audio and bad tool arguments are confined to a single
    /// message; everything else moves the session to `Error`.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::MalformedAudio(_) | Self::InvalidArgument(_) | Self::UnknownTool(_)
        )
    }
}
