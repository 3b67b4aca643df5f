//! Shared test utilities

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use beacon_live::live::ClientMessage;
use beacon_live::session::{
    MetricsSource, Session, SessionState, StatusEvent, SystemStats, ToolDispatcher,
};
use beacon_live::voice::{
    AudioSink, ChunkId, OUTPUT_SAMPLE_RATE, PlaybackChunk, PlaybackScheduler, WakeWordDetector,
};
use tokio::sync::mpsc;

/// Audio sink with a hand-driven clock
///
/// Clones share the clock and the schedule record, so a test can keep one
/// while the scheduler owns the other.
#[derive(Clone, Default)]
pub struct ManualSink {
    now: Rc<Cell<f64>>,
    scheduled: Rc<RefCell<Vec<(ChunkId, f64)>>>,
    stops: Rc<Cell<usize>>,
}

impl ManualSink {
    /// Move the output clock to `seconds`
    pub fn set_now(&self, seconds: f64) {
        self.now.set(seconds);
    }

    /// (id, start) of every scheduled chunk, in schedule order
    pub fn scheduled(&self) -> Vec<(ChunkId, f64)> {
        self.scheduled.borrow().clone()
    }

    /// Number of `stop_all` calls
    pub fn stops(&self) -> usize {
        self.stops.get()
    }
}

impl AudioSink for ManualSink {
    fn now(&self) -> f64 {
        self.now.get()
    }

    fn schedule(
        &mut self,
        id: ChunkId,
        start: f64,
        _chunk: PlaybackChunk,
    ) -> beacon_live::Result<()> {
        self.scheduled.borrow_mut().push((id, start));
        Ok(())
    }

    fn stop_all(&mut self) {
        self.stops.set(self.stops.get() + 1);
    }
}

/// Metrics source returning a fixed reading
pub struct FixedMetrics(pub SystemStats);

impl Default for FixedMetrics {
    fn default() -> Self {
        Self(SystemStats {
            cpu_percent: 21.0,
            memory_percent: 64.0,
            uptime: Duration::from_secs(90 * 60),
        })
    }
}

impl MetricsSource for FixedMetrics {
    fn sample(&mut self) -> SystemStats {
        self.0
    }
}

/// An open session wired to test doubles
pub struct Harness {
    pub session: Session<ManualSink>,
    pub sink: ManualSink,
    pub outbound: mpsc::UnboundedReceiver<ClientMessage>,
}

impl Harness {
    /// Session that has completed its handshake (status Standby, asleep)
    pub fn open() -> Self {
        let mut state = SessionState::new(50);
        state.on_status(StatusEvent::Connecting);
        state.on_status(StatusEvent::Opened);

        let sink = ManualSink::default();
        let (tx, outbound) = mpsc::unbounded_channel();
        let session = Session::new(
            state,
            WakeWordDetector::default(),
            PlaybackScheduler::new(sink.clone()),
            ToolDispatcher::new(Box::new(FixedMetrics::default())),
            tx,
        );

        Self {
            session,
            sink,
            outbound,
        }
    }

    /// Drain every message sent so far as JSON values
    pub fn sent(&mut self) -> Vec<serde_json::Value> {
        let mut messages = Vec::new();
        while let Ok(message) = self.outbound.try_recv() {
            let text = message.to_json().expect("client message serializes");
            messages.push(serde_json::from_str(&text).expect("valid json"));
        }
        messages
    }
}

/// PCM16 speech chunk of `frames` samples, base64-encoded for the wire
pub fn speech_payload(frames: usize) -> String {
    let samples = vec![0.25_f32; frames];
    beacon_live::voice::encode_frame(&samples).to_base64()
}

/// Seconds of audio in `frames` output samples
#[allow(clippy::cast_precision_loss)]
pub fn output_seconds(frames: usize) -> f64 {
    frames as f64 / f64::from(OUTPUT_SAMPLE_RATE)
}
