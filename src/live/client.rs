//! WebSocket client for the realtime session
//!
//! After the handshake the socket is split into a writer task, fed by an
//! ordered channel of [`ClientMessage`]s, and a reader task that forwards
//! parsed [`ServerMessage`]s. Dropping the outbound sender closes the
//! socket.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use super::protocol::{ClientMessage, ServerMessage, Setup};
use crate::{Config, Error, Result};

/// Capacity of the inbound event channel
const INBOUND_CAPACITY: usize = 64;

/// What the reader task reports
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A parsed server message
    Message(ServerMessage),
    /// The remote closed the socket
    Closed(Option<String>),
    /// The socket failed
    Error(String),
}

/// Channels of an open session
#[derive(Debug)]
pub struct LiveLink {
    /// Messages to the remote, sent in order
    pub outbound: mpsc::UnboundedSender<ClientMessage>,
    /// Events from the remote, in receipt order
    pub inbound: mpsc::Receiver<TransportEvent>,
}

/// Connects to the realtime endpoint
pub struct LiveClient {
    endpoint: String,
    api_key: SecretString,
    handshake_timeout: Duration,
}

impl LiveClient {
    /// Create a client from configuration
    ///
    /// # Errors
    ///
    /// Returns `CredentialMissing` if no API key is configured
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config
            .api_key
            .as_ref()
            .map(|key| SecretString::from(key.expose_secret().to_owned()))
            .ok_or_else(|| Error::CredentialMissing("GEMINI_API_KEY is not set".to_string()))?;

        Ok(Self {
            endpoint: config.endpoint.clone(),
            api_key,
            handshake_timeout: config.handshake_timeout,
        })
    }

    /// Open the socket, send `setup` and wait for the acknowledgment
    ///
    /// # Errors
    ///
    /// Returns `HandshakeTimeout` if the session is not ready before the
    /// deadline, or `Transport`/`WebSocket` on connection failures
    pub async fn connect(&self, setup: Setup) -> Result<LiveLink> {
        let url = self.url()?;
        let timeout = self.handshake_timeout;

        tracing::info!(endpoint = %self.endpoint, model = %setup.model, "connecting to realtime session");

        let ws = tokio::time::timeout(timeout, handshake(url, setup))
            .await
            .map_err(|_| Error::HandshakeTimeout(timeout.as_secs()))??;

        let (mut sink, mut stream) = ws.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ClientMessage>();
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);

        let writer_events = inbound_tx.clone();
        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let text = match message.to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to serialize client message");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(text)).await {
                    let _ = writer_events.send(TransportEvent::Error(e.to_string())).await;
                    return;
                }
            }
            let _ = sink.close().await;
            tracing::debug!("session writer closed");
        });

        tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                let event = match frame {
                    Ok(Message::Text(text)) => parse_frame(&text),
                    Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                        Ok(text) => parse_frame(&text),
                        Err(_) => {
                            tracing::warn!("ignoring non-UTF-8 binary frame");
                            None
                        }
                    },
                    Ok(Message::Close(frame)) => {
                        let reason = frame.map(|f| f.reason.to_string());
                        let _ = inbound_tx.send(TransportEvent::Closed(reason)).await;
                        return;
                    }
                    Ok(_) => None,
                    Err(e) => {
                        let _ = inbound_tx.send(TransportEvent::Error(e.to_string())).await;
                        return;
                    }
                };

                if let Some(message) = event
                    && inbound_tx.send(TransportEvent::Message(message)).await.is_err()
                {
                    return;
                }
            }
            let _ = inbound_tx.send(TransportEvent::Closed(None)).await;
        });

        tracing::info!("realtime session ready");

        Ok(LiveLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }

    /// Endpoint URL with the API key attached
    fn url(&self) -> Result<url::Url> {
        let mut url = url::Url::parse(&self.endpoint)
            .map_err(|e| Error::Config(format!("invalid endpoint {}: {e}", self.endpoint)))?;
        url.query_pairs_mut()
            .append_pair("key", self.api_key.expose_secret());
        Ok(url)
    }
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Connect, send the setup message and wait for `setupComplete`
async fn handshake(url: url::Url, setup: Setup) -> Result<WsStream> {
    let (mut ws, _response) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(|e| Error::Transport(format!("connect failed: {e}")))?;

    let setup = ClientMessage::Setup(setup).to_json()?;
    ws.send(Message::Text(setup)).await?;

    while let Some(frame) = ws.next().await {
        let text = match frame? {
            Message::Text(text) => text,
            Message::Binary(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Message::Close(frame) => {
                let reason = frame.map(|f| f.reason.to_string()).unwrap_or_default();
                return Err(Error::Transport(format!("closed during handshake: {reason}")));
            }
            _ => continue,
        };

        match ServerMessage::parse(&text) {
            Ok(message) if message.setup_complete.is_some() => return Ok(ws),
            Ok(_) => tracing::debug!("message before setup complete ignored"),
            Err(e) => tracing::warn!(error = %e, "unparseable handshake frame"),
        }
    }

    Err(Error::Transport("connection ended during handshake".to_string()))
}

fn parse_frame(text: &str) -> Option<ServerMessage> {
    match ServerMessage::parse(text) {
        Ok(message) => Some(message),
        Err(e) => {
            tracing::warn!(error = %e, "ignoring unparseable server frame");
            None
        }
    }
}
