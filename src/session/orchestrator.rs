//! Session orchestration
//!
//! [`Session`] owns everything a live conversation touches: the state
//! writer, the wake word detector, the playback timeline, the tool
//! dispatcher and the outbound channel. Its handlers are synchronous and
//! are driven in arrival order by [`Session::run`], a single `select!` loop
//! over capture frames, remote events and playback completions.

use std::ops::ControlFlow;

use tokio::sync::mpsc;

use super::log::LogKind;
use super::state::SessionState;
use super::status::{SessionStatus, StatusEvent};
use super::tools::ToolDispatcher;
use crate::live::{self, ClientMessage, FunctionCall, InboundEvent, LiveClient, LiveLink, TransportEvent};
use crate::voice::{
    AudioCapture, AudioFrame, AudioSink, CaptureEvent, OUTPUT_SAMPLE_RATE, PlaybackChunk,
    PlaybackEvent, PlaybackScheduler, WakeWordDetector, codec,
};
use crate::{Config, Error, Result};

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// Local shutdown request
    Shutdown,
    /// The remote closed the connection
    RemoteClosed(Option<String>),
    /// An unrecoverable fault; the status is `Error`
    Failed(String),
}

/// Receivers driving a running session
pub struct SessionIo {
    pub capture: mpsc::Receiver<CaptureEvent>,
    pub inbound: mpsc::Receiver<TransportEvent>,
    pub playback: mpsc::UnboundedReceiver<PlaybackEvent>,
}

/// Open the remote session
///
/// Moves the status Idle → Thinking → Standby, or to Error on failure. A
/// missing credential fails before anything is attempted.
///
/// # Errors
///
/// Returns `CredentialMissing`, `HandshakeTimeout` or a transport error
pub async fn connect(state: &mut SessionState, config: &Config) -> Result<LiveLink> {
    let client = match LiveClient::from_config(config) {
        Ok(client) => client,
        Err(e) => {
            state.log_system("No API key found; cannot start a session.");
            state.on_status(StatusEvent::Fault);
            return Err(e);
        }
    };

    state.on_status(StatusEvent::Connecting);
    state.log_system("Initiating handshake with the realtime service...");

    match client.connect(live::build_setup(config)).await {
        Ok(link) => {
            state.on_status(StatusEvent::Opened);
            state.log_system("Voice link established. Standing by.");
            Ok(link)
        }
        Err(e) => {
            tracing::error!(error = %e, "session handshake failed");
            state.log_system(format!("Connection failed: {e}"));
            state.on_status(StatusEvent::Fault);
            Err(e)
        }
    }
}

/// A live conversation
pub struct Session<S> {
    state: SessionState,
    detector: WakeWordDetector,
    playback: PlaybackScheduler<S>,
    tools: ToolDispatcher,
    outbound: Option<mpsc::UnboundedSender<ClientMessage>>,
    capture: Option<AudioCapture>,
    /// First unrecoverable error, reported when the loop ends
    fault: Option<String>,
    user_turn: String,
    assistant_turn: String,
}

impl<S: AudioSink> Session<S> {
    /// Assemble a session around an open link's outbound channel
    pub fn new(
        state: SessionState,
        detector: WakeWordDetector,
        playback: PlaybackScheduler<S>,
        tools: ToolDispatcher,
        outbound: mpsc::UnboundedSender<ClientMessage>,
    ) -> Self {
        Self {
            state,
            detector,
            playback,
            tools,
            outbound: Some(outbound),
            capture: None,
            fault: None,
            user_turn: String::new(),
            assistant_turn: String::new(),
        }
    }

    /// Attach the microphone so closing the session releases it
    #[must_use]
    pub fn with_capture(mut self, capture: AudioCapture) -> Self {
        self.capture = Some(capture);
        self
    }

    #[must_use]
    pub const fn state(&self) -> &SessionState {
        &self.state
    }

    #[must_use]
    pub const fn playback(&self) -> &PlaybackScheduler<S> {
        &self.playback
    }

    /// Whether the session has been closed
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.outbound.is_none()
    }

    /// Drive the session until shutdown, remote close or a fault
    ///
    /// The session is closed before returning.
    pub async fn run(&mut self, mut io: SessionIo, mut shutdown: mpsc::Receiver<()>) -> SessionEnd {
        let end = loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("shutdown requested");
                    break SessionEnd::Shutdown;
                }
                Some(event) = io.capture.recv() => self.handle_capture(event),
                event = io.inbound.recv() => {
                    let event = event.unwrap_or(TransportEvent::Closed(None));
                    if let ControlFlow::Break(end) = self.handle_transport(event) {
                        break end;
                    }
                }
                Some(event) = io.playback.recv() => self.handle_playback(event),
            }

            if self.state.status() == SessionStatus::Error {
                let cause = self.fault.take().unwrap_or_else(|| "session fault".to_string());
                break SessionEnd::Failed(cause);
            }
        };

        self.close();
        end
    }

    /// Encode one captured frame and send it
    pub fn handle_frame(&mut self, frame: &AudioFrame) {
        let Some(outbound) = &self.outbound else {
            return;
        };
        let blob = codec::encode_frame(frame.samples());
        if outbound.send(ClientMessage::audio(&blob)).is_err() {
            tracing::debug!("outbound channel closed, frame dropped");
        }
    }

    pub fn handle_capture(&mut self, event: CaptureEvent) {
        match event {
            CaptureEvent::Frame(frame) => self.handle_frame(&frame),
            CaptureEvent::Fault(message) => self.fault(&Error::Capture(message)),
        }
    }

    /// React to the reader task
    pub fn handle_transport(&mut self, event: TransportEvent) -> ControlFlow<SessionEnd> {
        match event {
            TransportEvent::Message(message) => {
                for event in message.into_events() {
                    self.handle_event(event);
                }
                ControlFlow::Continue(())
            }
            TransportEvent::Closed(reason) => {
                tracing::info!(reason = ?reason, "remote closed the session");
                self.state.log_system("Voice link closed by the remote.");
                ControlFlow::Break(SessionEnd::RemoteClosed(reason))
            }
            TransportEvent::Error(message) => {
                let error = Error::Transport(message.clone());
                self.fault(&error);
                ControlFlow::Break(SessionEnd::Failed(message))
            }
        }
    }

    /// Handle one event from a server message
    pub fn handle_event(&mut self, event: InboundEvent) {
        match event {
            InboundEvent::SetupComplete => tracing::debug!("duplicate setup acknowledgment"),
            InboundEvent::Transcription(text) => self.on_transcription(&text),
            InboundEvent::OutputTranscription(text) => self.assistant_turn.push_str(&text),
            InboundEvent::ToolCalls(calls) => self.on_tool_calls(&calls),
            InboundEvent::Interrupted => self.on_interrupted(),
            InboundEvent::Audio { data, sample_rate } => self.on_audio(&data, sample_rate),
            InboundEvent::TurnComplete => self.on_turn_complete(),
            InboundEvent::GoAway(time_left) => {
                tracing::warn!(time_left = ?time_left, "remote announced disconnect");
                self.state.log_system(match time_left {
                    Some(left) => format!("Remote session ending in {left}."),
                    None => "Remote session ending soon.".to_string(),
                });
            }
        }
    }

    /// React to the output device
    pub fn handle_playback(&mut self, event: PlaybackEvent) {
        match event {
            PlaybackEvent::Finished(id) => {
                if self.playback.complete(id) {
                    self.state.on_speech_ended();
                }
            }
            PlaybackEvent::Fault(message) => self.fault(&Error::Playback(message)),
        }
    }

    /// Record an unrecoverable fault
    ///
    /// The first fault is kept as the cause the session ends with.
    pub fn fault(&mut self, error: &Error) {
        tracing::error!(error = %error, "session fault");
        if self.fault.is_none() {
            self.fault = Some(error.to_string());
        }
        self.state.log_system(format!("System fault: {error}"));
        self.state.on_status(StatusEvent::Fault);
    }

    /// Tear the session down
    ///
    /// Releases the microphone, flushes playback and closes the socket.
    /// The status becomes Idle unless it is Error. Idempotent.
    pub fn close(&mut self) {
        if self.outbound.take().is_none() {
            return;
        }

        if let Some(mut capture) = self.capture.take() {
            capture.stop();
        }
        self.playback.flush();
        self.state.on_status(StatusEvent::Teardown);
        self.state.log_system("Session closed.");
    }

    fn on_transcription(&mut self, text: &str) {
        self.state.set_transcription(text);
        self.user_turn.push_str(text);

        let transition = self
            .detector
            .evaluate(text, self.state.sensitivity(), self.state.wake());
        if let Some(transition) = transition {
            self.state.apply_wake(transition);
        }
    }

    fn on_tool_calls(&mut self, calls: &[FunctionCall]) {
        for call in calls {
            let response = self.tools.dispatch(call, &mut self.state);
            self.send(ClientMessage::tool_response(response));
        }
    }

    fn on_interrupted(&mut self) {
        let had_active = self.playback.flush();
        tracing::debug!(had_active, "reply interrupted");
        if self.state.status() == SessionStatus::Speaking {
            self.state.on_speech_ended();
        }
    }

    fn on_audio(&mut self, data: &str, sample_rate: u32) {
        let scheduled =
            decode_reply(data, sample_rate).and_then(|chunk| self.playback.enqueue(chunk));
        match scheduled {
            Ok(_) => {
                self.state.on_status(StatusEvent::ReplyAudio);
            }
            Err(e) if e.is_fatal() => self.fault(&e),
            Err(e) => tracing::warn!(error = %e, "dropping reply audio chunk"),
        }
    }

    fn on_turn_complete(&mut self) {
        let user = std::mem::take(&mut self.user_turn);
        let assistant = std::mem::take(&mut self.assistant_turn);

        if !user.trim().is_empty() {
            self.state.log_entry(LogKind::User, user.trim());
        }
        if !assistant.trim().is_empty() {
            self.state.log_entry(LogKind::Assistant, assistant.trim());
        }

        self.state.on_turn_complete();
    }

    fn send(&self, message: ClientMessage) {
        match &self.outbound {
            Some(outbound) if outbound.send(message).is_ok() => {}
            _ => tracing::warn!("outbound channel closed, message dropped"),
        }
    }
}

/// Decode one reply audio payload
fn decode_reply(data: &str, sample_rate: u32) -> Result<PlaybackChunk> {
    if sample_rate != OUTPUT_SAMPLE_RATE {
        return Err(Error::MalformedAudio(format!(
            "expected {OUTPUT_SAMPLE_RATE} Hz, got {sample_rate} Hz"
        )));
    }
    let bytes = codec::from_base64(data)?;
    codec::decode_frame(&bytes, sample_rate, 1)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::session::metrics::{MetricsSource, SystemStats};
    use crate::voice::{ChunkId, Sensitivity, WakeState};

    #[derive(Default)]
    struct NullSink {
        stops: usize,
        unplugged: bool,
    }

    impl AudioSink for NullSink {
        fn now(&self) -> f64 {
            0.0
        }

        fn schedule(&mut self, _id: ChunkId, _start: f64, _chunk: PlaybackChunk) -> Result<()> {
            if self.unplugged {
                return Err(Error::Playback("output device removed".into()));
            }
            Ok(())
        }

        fn stop_all(&mut self) {
            self.stops += 1;
        }
    }

    struct ZeroMetrics;

    impl MetricsSource for ZeroMetrics {
        fn sample(&mut self) -> SystemStats {
            SystemStats {
                cpu_percent: 0.0,
                memory_percent: 0.0,
                uptime: Duration::ZERO,
            }
        }
    }

    fn open_session() -> (Session<NullSink>, mpsc::UnboundedReceiver<ClientMessage>) {
        let mut state = SessionState::new(50);
        state.on_status(StatusEvent::Connecting);
        state.on_status(StatusEvent::Opened);

        let (tx, rx) = mpsc::unbounded_channel();
        let session = Session::new(
            state,
            WakeWordDetector::default(),
            PlaybackScheduler::new(NullSink::default()),
            ToolDispatcher::new(Box::new(ZeroMetrics)),
            tx,
        );
        (session, rx)
    }

    fn audio_event() -> InboundEvent {
        InboundEvent::Audio {
            data: codec::to_base64(&[0, 0, 0, 64]),
            sample_rate: OUTPUT_SAMPLE_RATE,
        }
    }

    #[test]
    fn test_frames_are_sent_in_order() {
        let (mut session, mut rx) = open_session();
        session.handle_frame(&AudioFrame::new(vec![0.0]));
        session.handle_frame(&AudioFrame::new(vec![0.5]));

        let first = rx.try_recv().unwrap().to_json().unwrap();
        let second = rx.try_recv().unwrap().to_json().unwrap();
        assert!(first.contains("\"AAA=\""));
        assert!(second.contains("\"AEA=\""));
    }

    #[test]
    fn test_wake_then_reply_then_listen() {
        let (mut session, _rx) = open_session();

        session.handle_event(InboundEvent::Transcription("Hey Jarvis".into()));
        assert_eq!(session.state().wake(), WakeState::Awake);
        assert_eq!(session.state().transcription(), "Hey Jarvis");

        session.handle_event(audio_event());
        assert_eq!(session.state().status(), SessionStatus::Speaking);

        session.handle_playback(PlaybackEvent::Finished(0));
        assert_eq!(session.state().status(), SessionStatus::Listening);
    }

    #[test]
    fn test_malformed_audio_is_dropped() {
        let (mut session, _rx) = open_session();

        session.handle_event(InboundEvent::Audio {
            data: codec::to_base64(&[1, 2, 3]),
            sample_rate: OUTPUT_SAMPLE_RATE,
        });
        session.handle_event(InboundEvent::Audio {
            data: "%%%".into(),
            sample_rate: OUTPUT_SAMPLE_RATE,
        });
        session.handle_event(InboundEvent::Audio {
            data: codec::to_base64(&[0, 0]),
            sample_rate: 16_000,
        });

        assert!(session.playback().is_idle());
        assert_eq!(session.state().status(), SessionStatus::Standby);
    }

    #[test]
    fn test_sink_failure_is_a_fault() {
        let mut state = SessionState::new(50);
        state.on_status(StatusEvent::Connecting);
        state.on_status(StatusEvent::Opened);
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut session = Session::new(
            state,
            WakeWordDetector::default(),
            PlaybackScheduler::new(NullSink {
                unplugged: true,
                ..NullSink::default()
            }),
            ToolDispatcher::new(Box::new(ZeroMetrics)),
            tx,
        );

        session.handle_event(audio_event());
        assert_eq!(session.state().status(), SessionStatus::Error);
        assert_eq!(
            session.fault.as_deref(),
            Some("playback error: output device removed")
        );
    }

    #[test]
    fn test_interruption_flushes_and_ignores_stale_completion() {
        let (mut session, _rx) = open_session();
        session.handle_event(audio_event());
        session.handle_event(audio_event());

        session.handle_event(InboundEvent::Interrupted);
        assert!(session.playback().is_idle());
        assert_eq!(session.state().status(), SessionStatus::Standby);

        session.handle_event(audio_event());
        session.handle_playback(PlaybackEvent::Finished(0));
        assert_eq!(session.state().status(), SessionStatus::Speaking);
    }

    #[test]
    fn test_tool_calls_answered_in_order() {
        let (mut session, mut rx) = open_session();
        let call = |id: &str, name: &str, args: serde_json::Value| FunctionCall {
            id: Some(id.to_string()),
            name: name.to_string(),
            args: args.as_object().cloned().unwrap_or_default(),
        };

        session.handle_event(InboundEvent::ToolCalls(vec![
            call("a", "setConfiguration", serde_json::json!({ "sensitivity": "Low" })),
            call("b", "clearConsoleLogs", serde_json::json!({})),
        ]));

        let first = rx.try_recv().unwrap().to_json().unwrap();
        let second = rx.try_recv().unwrap().to_json().unwrap();
        assert!(first.contains("\"id\":\"a\""));
        assert!(second.contains("\"id\":\"b\""));
        assert_eq!(session.state().sensitivity(), Sensitivity::Low);
        assert!(session.state().log().is_empty());
    }

    #[test]
    fn test_turn_complete_logs_transcripts() {
        let (mut session, _rx) = open_session();
        session.handle_event(InboundEvent::Transcription("jarvis".into()));
        session.handle_event(InboundEvent::Transcription(" what's up".into()));
        session.handle_event(InboundEvent::OutputTranscription("All systems".into()));
        session.handle_event(InboundEvent::OutputTranscription(" nominal.".into()));
        session.handle_event(InboundEvent::TurnComplete);

        let latest: Vec<(LogKind, &str)> = session
            .state()
            .log()
            .entries()
            .take(2)
            .map(|e| (e.kind, e.message.as_str()))
            .collect();
        assert_eq!(
            latest,
            vec![
                (LogKind::Assistant, "All systems nominal."),
                (LogKind::User, "jarvis what's up"),
            ]
        );
        assert_eq!(session.state().transcription(), "");
        assert_eq!(session.state().status(), SessionStatus::Listening);
    }

    #[test]
    fn test_close_is_idempotent() {
        let (mut session, mut rx) = open_session();
        session.handle_event(audio_event());

        session.close();
        session.close();
        assert!(session.is_closed());
        assert_eq!(session.state().status(), SessionStatus::Idle);
        assert_eq!(session.playback().sink().stops, 1);

        // Channel closed once the session dropped its sender
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));

        session.handle_frame(&AudioFrame::new(vec![0.1]));
    }

    #[test]
    fn test_fault_survives_close() {
        let (mut session, _rx) = open_session();
        session.handle_capture(CaptureEvent::Fault("device unplugged".into()));
        assert_eq!(session.state().status(), SessionStatus::Error);

        session.close();
        assert_eq!(session.state().status(), SessionStatus::Error);
    }

    #[tokio::test]
    async fn test_run_until_remote_close() {
        let (mut session, _rx) = open_session();
        let (_capture_tx, capture) = mpsc::channel(4);
        let (inbound_tx, inbound) = mpsc::channel(4);
        let (_playback_tx, playback) = mpsc::unbounded_channel();
        let (_shutdown_tx, shutdown) = mpsc::channel(1);

        inbound_tx
            .send(TransportEvent::Closed(Some("bye".into())))
            .await
            .unwrap();

        let end = session
            .run(
                SessionIo {
                    capture,
                    inbound,
                    playback,
                },
                shutdown,
            )
            .await;

        assert_eq!(end, SessionEnd::RemoteClosed(Some("bye".into())));
        assert_eq!(session.state().status(), SessionStatus::Idle);
    }
}
