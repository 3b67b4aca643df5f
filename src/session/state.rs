//! Session state with a single writer
//!
//! [`SessionState`] is owned by the session task, which is the only writer.
//! Every change is published as an immutable [`Snapshot`] on a watch
//! channel; [`StateHandle`]s read snapshots and subscribe to log events.

use serde::Serialize;
use tokio::sync::{broadcast, watch};

use super::log::{EventLog, LogEvent, LogKind};
use super::status::{SessionStatus, StatusEvent, StatusMachine};
use crate::voice::{Sensitivity, WakeState, WakeTransition};

/// Read-only view of the session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub status: SessionStatus,
    pub wake: WakeState,
    pub sensitivity: Sensitivity,
    /// Latest user transcription of the current turn
    pub transcription: String,
}

/// Reader side of the session state
#[derive(Debug, Clone)]
pub struct StateHandle {
    snapshot: watch::Receiver<Snapshot>,
    log: broadcast::Sender<LogEvent>,
}

impl StateHandle {
    /// Latest snapshot
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    /// Wait for the next change and return it
    ///
    /// Returns `None` once the state owner is gone.
    pub async fn changed(&mut self) -> Option<Snapshot> {
        self.snapshot.changed().await.ok()?;
        Some(self.snapshot.borrow_and_update().clone())
    }

    /// Receive future log events
    #[must_use]
    pub fn subscribe_log(&self) -> broadcast::Receiver<LogEvent> {
        self.log.subscribe()
    }
}

/// Writer side of the session state
#[derive(Debug)]
pub struct SessionState {
    status: StatusMachine,
    wake: WakeState,
    sensitivity: Sensitivity,
    transcription: String,
    log: EventLog,
    publisher: watch::Sender<Snapshot>,
}

impl SessionState {
    /// Idle, asleep state with the default sensitivity
    #[must_use]
    pub fn new(log_capacity: usize) -> Self {
        let (publisher, _) = watch::channel(Snapshot::default());
        Self {
            status: StatusMachine::new(),
            wake: WakeState::default(),
            sensitivity: Sensitivity::default(),
            transcription: String::new(),
            log: EventLog::new(log_capacity),
            publisher,
        }
    }

    /// Create a reader
    #[must_use]
    pub fn handle(&self) -> StateHandle {
        StateHandle {
            snapshot: self.publisher.subscribe(),
            log: self.log.sender(),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            status: self.status.status(),
            wake: self.wake,
            sensitivity: self.sensitivity,
            transcription: self.transcription.clone(),
        }
    }

    #[must_use]
    pub const fn status(&self) -> SessionStatus {
        self.status.status()
    }

    #[must_use]
    pub const fn wake(&self) -> WakeState {
        self.wake
    }

    #[must_use]
    pub const fn sensitivity(&self) -> Sensitivity {
        self.sensitivity
    }

    #[must_use]
    pub fn transcription(&self) -> &str {
        &self.transcription
    }

    #[must_use]
    pub const fn log(&self) -> &EventLog {
        &self.log
    }

    /// Feed the status machine, returning the new status if it changed
    pub fn on_status(&mut self, event: StatusEvent) -> Option<SessionStatus> {
        let changed = self.status.handle(event);
        if changed.is_some() {
            self.publish();
        }
        changed
    }

    /// Status event that depends on the current wake state
    pub fn on_speech_ended(&mut self) -> Option<SessionStatus> {
        self.on_status(StatusEvent::SpeechEnded(self.wake))
    }

    /// Turn completion: clears the transcription, listens again if awake
    pub fn on_turn_complete(&mut self) -> Option<SessionStatus> {
        self.transcription.clear();
        let changed = self.status.handle(StatusEvent::TurnComplete(self.wake));
        self.publish();
        changed
    }

    /// Change the wake word sensitivity
    ///
    /// The single setter for both user-side and tool-call changes.
    pub fn set_sensitivity(&mut self, level: Sensitivity) {
        self.sensitivity = level;
        self.log
            .system(format!("Wake sensitivity set to {level}."));
        self.publish();
    }

    /// Apply a wake state transition
    pub fn apply_wake(&mut self, transition: WakeTransition) {
        let target = transition.target();
        match transition {
            WakeTransition::Sleep => self.log.system("Entering standby mode."),
            WakeTransition::Wake => self.log.system("Wake word confirmed. Assistant is active."),
        };
        if self.wake != target {
            tracing::info!(from = %self.wake, to = %target, "wake state changed");
        }
        self.wake = target;
        self.publish();
    }

    /// Replace the current transcription
    pub fn set_transcription(&mut self, text: &str) {
        text.clone_into(&mut self.transcription);
        self.publish();
    }

    /// Append a system log entry
    pub fn log_system(&mut self, message: impl Into<String>) {
        self.log.system(message);
    }

    /// Append a log entry of any kind
    pub fn log_entry(&mut self, kind: LogKind, message: impl Into<String>) {
        self.log.push(kind, message);
    }

    /// Remove every log entry
    pub fn clear_log(&mut self) -> usize {
        self.log.clear()
    }

    fn publish(&self) {
        let next = self.snapshot();
        self.publisher.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_sees_published_changes() {
        let mut state = SessionState::new(50);
        let handle = state.handle();

        state.on_status(StatusEvent::Connecting);
        state.on_status(StatusEvent::Opened);
        state.apply_wake(WakeTransition::Wake);
        state.set_sensitivity(Sensitivity::High);
        state.set_transcription("jarvis");

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.status, SessionStatus::Standby);
        assert_eq!(snapshot.wake, WakeState::Awake);
        assert_eq!(snapshot.sensitivity, Sensitivity::High);
        assert_eq!(snapshot.transcription, "jarvis");
    }

    #[test]
    fn test_turn_complete_clears_transcription() {
        let mut state = SessionState::new(50);
        state.on_status(StatusEvent::Connecting);
        state.on_status(StatusEvent::Opened);
        state.set_transcription("what time is it");

        assert_eq!(state.on_turn_complete(), None);
        assert_eq!(state.transcription(), "");
        assert_eq!(state.status(), SessionStatus::Standby);
    }

    #[test]
    fn test_sensitivity_change_is_logged() {
        let mut state = SessionState::new(50);
        let mut events = state.handle().subscribe_log();

        state.set_sensitivity(Sensitivity::Low);
        assert_eq!(
            state.log().latest().unwrap().message,
            "Wake sensitivity set to Low."
        );
        assert!(matches!(events.try_recv().unwrap(), LogEvent::Appended(_)));
    }

    #[tokio::test]
    async fn test_changed_wakes_reader() {
        let mut state = SessionState::new(50);
        let mut handle = state.handle();

        state.on_status(StatusEvent::Connecting);
        let snapshot = handle.changed().await.unwrap();
        assert_eq!(snapshot.status, SessionStatus::Thinking);

        drop(state);
        assert!(handle.changed().await.is_none());
    }
}
