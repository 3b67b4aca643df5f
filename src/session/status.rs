//! Coarse operating mode of the session
//!
//! One authoritative [`SessionStatus`] at a time, driven by lifecycle and
//! playback events. `Error` is left only by a new session open.

use serde::Serialize;

use crate::voice::WakeState;

/// Operating mode shown to the user
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum SessionStatus {
    /// No session
    #[default]
    Idle,
    /// Session open, waiting for the wake word
    Standby,
    /// Awake, waiting for the user to speak
    Listening,
    /// Connecting or waiting on the remote
    Thinking,
    /// Reply audio is playing
    Speaking,
    /// Unrecoverable fault
    Error,
}

impl SessionStatus {
    /// Lowercase name, used in logs
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Standby => "standby",
            Self::Listening => "listening",
            Self::Thinking => "thinking",
            Self::Speaking => "speaking",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs to the status machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvent {
    /// Handshake started
    Connecting,
    /// Handshake completed
    Opened,
    /// A chunk of reply audio became available
    ReplyAudio,
    /// The last scheduled chunk finished playing
    SpeechEnded(WakeState),
    /// The remote finished its turn
    TurnComplete(WakeState),
    /// Transport, credential or device fault
    Fault,
    /// Session torn down
    Teardown,
}

/// Status state machine
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusMachine {
    status: SessionStatus,
}

impl StatusMachine {
    /// Start in `Idle`
    #[must_use]
    pub const fn new() -> Self {
        Self {
            status: SessionStatus::Idle,
        }
    }

    /// Current status
    #[must_use]
    pub const fn status(&self) -> SessionStatus {
        self.status
    }

    /// Apply an event, returning the new status if it changed
    pub fn handle(&mut self, event: StatusEvent) -> Option<SessionStatus> {
        use SessionStatus::{Error, Idle, Listening, Speaking, Standby, Thinking};

        let next = match (self.status, event) {
            (_, StatusEvent::Fault) => Error,

            // A new session open is the only way out of Error
            (Idle | Error, StatusEvent::Connecting) => Thinking,
            (Idle | Thinking, StatusEvent::Opened) => Standby,

            (Error, _) => return None,

            (Standby | Listening | Thinking, StatusEvent::ReplyAudio) => Speaking,
            (Speaking, StatusEvent::SpeechEnded(wake)) => {
                if wake.is_awake() {
                    Listening
                } else {
                    Standby
                }
            }
            (Idle, StatusEvent::TurnComplete(_)) => return None,
            (_, StatusEvent::TurnComplete(WakeState::Awake)) => Listening,
            (_, StatusEvent::Teardown) => Idle,

            _ => return None,
        };

        if next == self.status {
            return None;
        }

        tracing::debug!(from = %self.status, to = %next, ?event, "status transition");
        self.status = next;
        Some(next)
    }
}
