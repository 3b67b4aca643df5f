//! Bounded console log
//!
//! Keeps the most recent entries, newest first, and broadcasts every change
//! to subscribers. Entries are mirrored to tracing.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Capacity of the log event channel
const EVENT_CAPACITY: usize = 128;

/// Who produced a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LogKind {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for LogKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// One console line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: LogKind,
    pub message: String,
}

/// Change notifications for log subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEvent {
    Appended(LogEntry),
    Cleared,
}

/// Console log with a fixed capacity
#[derive(Debug)]
pub struct EventLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    events: broadcast::Sender<LogEvent>,
}

impl EventLog {
    /// Create an empty log retaining at most `capacity` entries
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            events,
        }
    }

    /// Append an entry, evicting the oldest one when full
    pub fn push(&mut self, kind: LogKind, message: impl Into<String>) -> &LogEntry {
        let entry = LogEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            kind,
            message: message.into(),
        };

        match kind {
            LogKind::System => tracing::info!(kind = %kind, "{}", entry.message),
            LogKind::User | LogKind::Assistant => {
                tracing::debug!(kind = %kind, "{}", entry.message);
            }
        }

        self.entries.truncate(self.capacity - 1);
        let _ = self.events.send(LogEvent::Appended(entry.clone()));
        self.entries.push_front(entry);
        &self.entries[0]
    }

    /// Append a system entry
    pub fn system(&mut self, message: impl Into<String>) -> &LogEntry {
        self.push(LogKind::System, message)
    }

    /// Remove every entry, returning how many were removed
    pub fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        let _ = self.events.send(LogEvent::Cleared);
        tracing::debug!(removed, "console log cleared");
        removed
    }

    /// Entries, newest first
    #[must_use = "iterators are lazy"]
    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    /// Most recent entry
    #[must_use]
    pub fn latest(&self) -> Option<&LogEntry> {
        self.entries.front()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Receive future log changes
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LogEvent> {
        self.events.subscribe()
    }

    pub(crate) fn sender(&self) -> broadcast::Sender<LogEvent> {
        self.events.clone()
    }
}
