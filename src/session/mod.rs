//! Conversation session
//!
//! Status machine, shared state, console log, local tools, and the
//! orchestrator that ties them to the audio pipeline and the remote link.

mod log;
mod metrics;
mod orchestrator;
mod state;
mod status;
pub mod tools;

pub use log::{EventLog, LogEntry, LogEvent, LogKind};
pub use metrics::{MetricsSource, SysinfoMetrics, SystemStats};
pub use orchestrator::{Session, SessionEnd, SessionIo, connect};
pub use state::{SessionState, Snapshot, StateHandle};
pub use status::{SessionStatus, StatusEvent, StatusMachine};
pub use tools::ToolDispatcher;
