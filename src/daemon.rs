//! Daemon - runs one voice session
//!
//! Connects the realtime session, opens the speaker, starts the microphone
//! and drives the session until Ctrl-C, a remote close or a fault.

use tokio::sync::mpsc;

use crate::session::{
    self, Session, SessionEnd, SessionIo, SessionState, StateHandle, StatusEvent,
    SysinfoMetrics, ToolDispatcher,
};
use crate::voice::{AudioCapture, CpalSink, PlaybackScheduler, Sensitivity, WakeWordDetector};
use crate::{Config, Error, Result};

/// The Beacon Live daemon
pub struct Daemon {
    config: Config,
    state: SessionState,
    detector: WakeWordDetector,
}

impl Daemon {
    /// Create a daemon with idle session state
    ///
    /// A non-default configured sensitivity is applied through the same
    /// setter the tools use.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the wake word is blank
    pub fn new(config: Config) -> Result<Self> {
        let detector = WakeWordDetector::new(&config.wake_word, config.sleep_phrases.clone())?;
        let mut state = SessionState::new(config.log_capacity);
        if config.sensitivity != Sensitivity::default() {
            state.set_sensitivity(config.sensitivity);
        }
        Ok(Self {
            config,
            state,
            detector,
        })
    }

    /// Reader for status, wake state, transcription and log events
    #[must_use]
    pub fn state_handle(&self) -> StateHandle {
        self.state.handle()
    }

    /// Get the configured wake word
    #[must_use]
    pub fn wake_word(&self) -> &str {
        self.detector.wake_word()
    }

    /// Run the session until it ends
    ///
    /// # Errors
    ///
    /// Returns error if the credential is missing, a device cannot be
    /// opened or the handshake fails
    #[allow(clippy::future_not_send)]
    pub async fn run(self) -> Result<SessionEnd> {
        let Self {
            config,
            mut state,
            detector,
        } = self;

        tracing::info!(
            model = %config.model,
            voice = %config.voice_name,
            wake_word = %detector.wake_word(),
            sensitivity = %state.sensitivity(),
            "daemon running"
        );

        let reporter = tokio::spawn(report_status(state.handle()));

        // Set up shutdown signal
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = shutdown_tx.send(()).await;
            }
        });

        let link = session::connect(&mut state, &config).await?;

        let (playback_tx, playback_rx) = mpsc::unbounded_channel();
        let sink = CpalSink::new(playback_tx).map_err(|e| device_fault(&mut state, e))?;

        // Microphone starts only once the session is open
        let (capture_tx, capture_rx) = mpsc::channel(config.capture_queue);
        let mut capture = AudioCapture::new(capture_tx).map_err(|e| device_fault(&mut state, e))?;
        capture.start().map_err(|e| device_fault(&mut state, e))?;

        let tools = ToolDispatcher::new(Box::new(SysinfoMetrics::new()));

        let mut session = Session::new(
            state,
            detector,
            PlaybackScheduler::new(sink),
            tools,
            link.outbound,
        )
        .with_capture(capture);

        let end = session
            .run(
                SessionIo {
                    capture: capture_rx,
                    inbound: link.inbound,
                    playback: playback_rx,
                },
                shutdown_rx,
            )
            .await;

        tracing::info!(end = ?end, status = %session.state().status(), "session ended");

        drop(session);
        let _ = reporter.await;

        Ok(end)
    }
}

/// Move the status to Error for a device failure
fn device_fault(state: &mut SessionState, error: Error) -> Error {
    tracing::error!(error = %error, "audio device unavailable");
    state.log_system(format!("Audio device unavailable: {error}"));
    state.on_status(StatusEvent::Fault);
    error
}

/// Log every published status change until the state owner is gone
async fn report_status(mut handle: StateHandle) {
    while let Some(snapshot) = handle.changed().await {
        tracing::info!(
            status = %snapshot.status,
            wake = %snapshot.wake,
            sensitivity = %snapshot.sensitivity,
            "session status"
        );
    }
}
