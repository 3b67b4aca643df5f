//! Session open tests against a local socket server

use std::time::Duration;

use beacon_live::config::DEFAULT_MODEL;
use beacon_live::live::ClientMessage;
use beacon_live::session::{LogKind, SessionState, SessionStatus, connect};
use beacon_live::voice::encode_frame;
use beacon_live::{Config, Error};
use futures::{SinkExt, StreamExt};
use secrecy::SecretString;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_test::{assert_err, assert_ok};
use tokio_tungstenite::tungstenite::Message;

fn config_for(endpoint: String, handshake_timeout: Duration) -> Config {
    Config {
        api_key: Some(SecretString::from("test-key".to_string())),
        endpoint,
        handshake_timeout,
        ..Config::default()
    }
}

fn handshake_attempted(state: &SessionState) -> bool {
    state
        .log()
        .entries()
        .any(|e| e.kind == LogKind::System && e.message.starts_with("Initiating handshake"))
}

#[tokio::test]
async fn test_missing_credential_attempts_nothing() {
    let mut state = SessionState::new(50);

    let err = assert_err!(connect(&mut state, &Config::default()).await);

    assert!(matches!(err, Error::CredentialMissing(_)));
    assert_eq!(state.status(), SessionStatus::Error);
    assert!(!handshake_attempted(&state));
}

#[tokio::test]
async fn test_silent_server_hits_handshake_deadline() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    // Accept the connection and never answer the upgrade
    let _server = tokio::spawn(async move {
        let (_stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
    });

    let mut state = SessionState::new(50);
    let config = config_for(format!("ws://{addr}/live"), Duration::from_secs(1));

    let err = assert_err!(connect(&mut state, &config).await);

    assert!(matches!(err, Error::HandshakeTimeout(1)));
    assert_eq!(state.status(), SessionStatus::Error);
    assert!(handshake_attempted(&state));
}

#[tokio::test]
async fn test_close_during_handshake_is_an_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let _setup = ws.next().await;
        let _ = ws.close(None).await;
    });

    let mut state = SessionState::new(50);
    let config = config_for(format!("ws://{addr}/live"), Duration::from_secs(5));

    let err = assert_err!(connect(&mut state, &config).await);

    assert!(matches!(err, Error::Transport(_) | Error::WebSocket(_)));
    assert_eq!(state.status(), SessionStatus::Error);
}

#[tokio::test]
async fn test_session_opens_after_setup_complete() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (setup_tx, setup_rx) = oneshot::channel();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        let Some(Ok(Message::Text(setup))) = ws.next().await else {
            panic!("first frame should be the setup message");
        };
        setup_tx.send(setup).unwrap();

        ws.send(Message::Text(r#"{"setupComplete":{}}"#.to_string()))
            .await
            .unwrap();

        // First message after the handshake
        match ws.next().await {
            Some(Ok(Message::Text(text))) => text,
            other => panic!("expected a text frame, got {other:?}"),
        }
    });

    let mut state = SessionState::new(50);
    let config = config_for(format!("ws://{addr}/live"), Duration::from_secs(5));

    let link = assert_ok!(connect(&mut state, &config).await);
    assert_eq!(state.status(), SessionStatus::Standby);
    assert!(handshake_attempted(&state));

    let setup: serde_json::Value = serde_json::from_str(&setup_rx.await.unwrap()).unwrap();
    assert_eq!(setup["setup"]["model"], format!("models/{DEFAULT_MODEL}"));
    assert_eq!(
        setup["setup"]["generationConfig"]["responseModalities"][0],
        "AUDIO"
    );
    assert_eq!(
        setup["setup"]["tools"][0]["functionDeclarations"]
            .as_array()
            .unwrap()
            .len(),
        3
    );

    link.outbound
        .send(ClientMessage::audio(&encode_frame(&[0.0; 4])))
        .unwrap();

    let frame: serde_json::Value = serde_json::from_str(&server.await.unwrap()).unwrap();
    assert_eq!(
        frame["realtimeInput"]["mediaChunks"][0]["mimeType"],
        "audio/pcm;rate=16000"
    );
}
