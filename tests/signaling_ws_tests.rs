// End-to-end tests for the signaling WebSocket
//
// A real listener is bound on an ephemeral port and clients connect with
// tokio-tungstenite, so the upgrade, the relay and the close codes are all
// exercised together.

use anyhow::{bail, Context, Result};
use futures::{SinkExt, StreamExt};
use proctor_monitor::config::TokenEntry;
use proctor_monitor::streaming::MemorySegmentStore;
use proctor_monitor::{create_router, AppState, Config, Role, StaticTokenAuthenticator};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const TOKEN: &str = "ws-teacher-token";
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

async fn start_server() -> Result<(AppState, SocketAddr)> {
    let tokens = vec![TokenEntry {
        token: TOKEN.to_string(),
        user_id: "teacher-1".to_string(),
        role: Role::Teacher,
    }];
    let state = AppState::with_parts(
        Config::default(),
        Arc::new(MemorySegmentStore),
        Arc::new(StaticTokenAuthenticator::new(&tokens)),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = create_router(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    Ok((state, addr))
}

async fn open(addr: SocketAddr, session_id: &str) -> Result<Client> {
    let url = format!("ws://{}/ws?sessionId={}&token={}", addr, session_id, TOKEN);
    let (client, _) = connect_async(url).await?;
    Ok(client)
}

/// Next frame that is not a ping or pong
async fn next_message(client: &mut Client) -> Result<Message> {
    loop {
        let message = timeout(RECV_TIMEOUT, client.next())
            .await
            .context("Timed out waiting for a frame")?
            .context("Socket closed")??;
        match message {
            Message::Ping(_) | Message::Pong(_) => continue,
            other => return Ok(other),
        }
    }
}

async fn next_json(client: &mut Client) -> Result<Value> {
    match next_message(client).await? {
        Message::Text(text) => Ok(serde_json::from_str(&text)?),
        other => bail!("Expected a text frame, got {:?}", other),
    }
}

async fn expect_close(client: &mut Client, expected: CloseCode) -> Result<()> {
    match next_message(client).await? {
        Message::Close(Some(frame)) => {
            assert_eq!(frame.code, expected);
            Ok(())
        }
        other => bail!("Expected a close frame, got {:?}", other),
    }
}

#[tokio::test]
async fn test_connect_is_acknowledged() -> Result<()> {
    let (state, addr) = start_server().await?;

    let mut client = open(addr, "A").await?;
    let ack = next_json(&mut client).await?;

    assert_eq!(ack, json!({ "type": "connected", "payload": { "sessionId": "A" } }));
    assert!(state.relay.is_connected("A"));

    Ok(())
}

#[tokio::test]
async fn test_offer_is_relayed_between_sockets() -> Result<()> {
    let (_state, addr) = start_server().await?;

    let mut a = open(addr, "A").await?;
    let mut b = open(addr, "B").await?;
    next_json(&mut a).await?;
    next_json(&mut b).await?;

    let offer = json!({
        "type": "offer",
        "targetSessionId": "B",
        "payload": { "type": "offer", "sdp": "v=0" }
    });
    a.send(Message::Text(offer.to_string())).await?;

    let relayed = next_json(&mut b).await?;
    assert_eq!(relayed["type"], "offer");
    assert_eq!(relayed["senderSessionId"], "A");
    assert_eq!(relayed["payload"]["sdp"], "v=0");

    // Errors come back to the sender
    let stray = json!({ "type": "answer", "targetSessionId": "Z", "payload": {} });
    a.send(Message::Text(stray.to_string())).await?;

    let error = next_json(&mut a).await?;
    assert_eq!(error["type"], "error");
    assert_eq!(error["payload"]["message"], "Target session Z not found");

    Ok(())
}

#[tokio::test]
async fn test_missing_session_id_is_closed_with_policy_violation() -> Result<()> {
    let (_state, addr) = start_server().await?;

    let url = format!("ws://{}/ws?token={}", addr, TOKEN);
    let (mut client, _) = connect_async(url).await?;

    expect_close(&mut client, CloseCode::Policy).await
}

#[tokio::test]
async fn test_upgrade_without_token_is_refused() -> Result<()> {
    let (_state, addr) = start_server().await?;

    let result = connect_async(format!("ws://{}/ws?sessionId=A", addr)).await;
    assert!(result.is_err(), "Upgrade should be rejected with 401");

    Ok(())
}

#[tokio::test]
async fn test_ending_session_closes_its_channel() -> Result<()> {
    let (state, addr) = start_server().await?;
    let session = state
        .registry
        .create_session("exam-1", "student-1", "teacher-1")?;

    let mut client = open(addr, &session.id).await?;
    next_json(&mut client).await?;

    // The socket is bound to the session once connected
    assert!(state.registry.get_session(&session.id)?.peer_handle.is_some());

    state.registry.end_session(&session.id, "teacher-1").await?;

    expect_close(&mut client, CloseCode::Normal).await?;
    assert!(!state.relay.is_connected(&session.id));

    Ok(())
}
