// Tests for the signaling relay
//
// The relay is exercised directly through its connection API: every channel
// is just the receiving end of the relay's outbound queue, so forwarding and
// error behaviour can be asserted without a socket.

use anyhow::Result;
use proctor_monitor::signaling::{Connection, Negotiation, SignalingMessage};
use proctor_monitor::{MonitorError, SessionReleaser, SignalingRelay};
use serde_json::json;
use tokio::sync::mpsc::error::TryRecvError;

/// Connect and consume the `connected` acknowledgement
fn connect(relay: &SignalingRelay, session_id: &str) -> Result<Connection> {
    let mut connection = relay.connect(Some(session_id))?;
    assert_eq!(
        connection.outbound.try_recv()?,
        SignalingMessage::connected(session_id)
    );
    Ok(connection)
}

fn assert_error(connection: &mut Connection, expected_fragment: &str) -> Result<()> {
    match connection.outbound.try_recv()? {
        SignalingMessage::Error { payload } => {
            assert!(
                payload.message.contains(expected_fragment),
                "Unexpected error message: {}",
                payload.message
            );
            Ok(())
        }
        other => anyhow::bail!("Expected error, got {:?}", other),
    }
}

#[test]
fn test_connect_requires_session_id() {
    let relay = SignalingRelay::new();

    assert!(matches!(relay.connect(None), Err(MonitorError::InvalidArgument(_))));
    assert!(matches!(relay.connect(Some("")), Err(MonitorError::InvalidArgument(_))));
    assert_eq!(relay.connection_count(), 0);
}

#[test]
fn test_offer_is_forwarded_once_with_sender_id() -> Result<()> {
    let relay = SignalingRelay::new();
    let mut a = connect(&relay, "A")?;
    let mut b = connect(&relay, "B")?;

    let sdp = json!({ "type": "offer", "sdp": "v=0\r\no=- 1 2 IN IP4 127.0.0.1" });
    let frame = json!({ "type": "offer", "targetSessionId": "B", "payload": sdp.clone() });
    relay.handle_text("A", a.handle, &frame.to_string());

    let expected = SignalingMessage::Offer(Negotiation {
        target_session_id: Some("B".to_string()),
        payload: sdp,
        sender_session_id: Some("A".to_string()),
    });
    assert_eq!(b.outbound.try_recv()?, expected);

    // Exactly one message to B, nothing back to A
    assert_eq!(b.outbound.try_recv(), Err(TryRecvError::Empty));
    assert_eq!(a.outbound.try_recv(), Err(TryRecvError::Empty));

    Ok(())
}

#[test]
fn test_answer_and_ice_candidates_flow_back() -> Result<()> {
    let relay = SignalingRelay::new();
    let mut a = connect(&relay, "A")?;
    let b = connect(&relay, "B")?;

    let answer = json!({ "type": "answer", "targetSessionId": "A", "payload": { "sdp": "answer" } });
    relay.handle_text("B", b.handle, &answer.to_string());

    let candidate = json!({
        "type": "ice-candidate",
        "targetSessionId": "A",
        "payload": { "candidate": "candidate:1 1 UDP 2122260223 10.0.0.2 54400 typ host" }
    });
    relay.handle_text("B", b.handle, &candidate.to_string());

    match a.outbound.try_recv()? {
        SignalingMessage::Answer(body) => {
            assert_eq!(body.sender_session_id.as_deref(), Some("B"));
            assert_eq!(body.payload, json!({ "sdp": "answer" }));
        }
        other => anyhow::bail!("Expected answer, got {:?}", other),
    }
    assert!(matches!(a.outbound.try_recv()?, SignalingMessage::IceCandidate(_)));

    Ok(())
}

#[test]
fn test_missing_target_reports_error_to_sender_only() -> Result<()> {
    let relay = SignalingRelay::new();
    let mut a = connect(&relay, "A")?;
    let mut b = connect(&relay, "B")?;

    let frame = json!({ "type": "offer", "targetSessionId": "C", "payload": {} });
    relay.handle_text("A", a.handle, &frame.to_string());

    assert_error(&mut a, "Target session C not found")?;
    assert_eq!(b.outbound.try_recv(), Err(TryRecvError::Empty));

    // The sender's channel stays registered
    assert!(relay.is_connected("A"));

    Ok(())
}

#[test]
fn test_unknown_and_malformed_frames_are_rejected() -> Result<()> {
    let relay = SignalingRelay::new();
    let mut a = connect(&relay, "A")?;
    let mut b = connect(&relay, "B")?;

    relay.handle_text("A", a.handle, r#"{"type":"renegotiate","targetSessionId":"B"}"#);
    assert_error(&mut a, "Unknown message type: renegotiate")?;

    // Clients may not send relay-generated types
    relay.handle_text("A", a.handle, r#"{"type":"connected","targetSessionId":"B"}"#);
    assert_error(&mut a, "Unknown message type: connected")?;

    relay.handle_text("A", a.handle, "not json");
    assert_error(&mut a, "Invalid message format")?;

    relay.handle_text("A", a.handle, r#"{"type":"offer","payload":{}}"#);
    assert_error(&mut a, "targetSessionId")?;

    assert_eq!(b.outbound.try_recv(), Err(TryRecvError::Empty));

    Ok(())
}

#[test]
fn test_client_supplied_sender_id_is_replaced() -> Result<()> {
    let relay = SignalingRelay::new();
    let a = connect(&relay, "A")?;
    let mut b = connect(&relay, "B")?;

    let spoofed = json!({
        "type": "offer",
        "targetSessionId": "B",
        "senderSessionId": "Mallory",
        "payload": "sdp"
    });
    relay.handle_text("A", a.handle, &spoofed.to_string());

    match b.outbound.try_recv()? {
        SignalingMessage::Offer(body) => assert_eq!(body.sender_session_id.as_deref(), Some("A")),
        other => anyhow::bail!("Expected offer, got {:?}", other),
    }

    Ok(())
}

#[test]
fn test_reconnect_replaces_channel_and_stale_disconnect_is_ignored() -> Result<()> {
    let relay = SignalingRelay::new();
    let mut old = connect(&relay, "A")?;
    let new = connect(&relay, "A")?;

    // The replaced channel's queue is closed
    assert_eq!(old.outbound.try_recv(), Err(TryRecvError::Disconnected));

    assert!(!relay.disconnect("A", old.handle));
    assert!(relay.is_connected("A"));

    assert!(relay.disconnect("A", new.handle));
    assert!(!relay.is_connected("A"));
    assert_eq!(relay.connection_count(), 0);

    Ok(())
}

#[test]
fn test_disconnected_target_is_not_found() -> Result<()> {
    let relay = SignalingRelay::new();
    let mut a = connect(&relay, "A")?;
    let b = connect(&relay, "B")?;

    relay.disconnect("B", b.handle);

    let frame = json!({ "type": "ice-candidate", "targetSessionId": "B", "payload": {} });
    relay.handle_text("A", a.handle, &frame.to_string());
    assert_error(&mut a, "Target session B not found")?;

    Ok(())
}

#[tokio::test]
async fn test_release_closes_the_channel() -> Result<()> {
    let relay = SignalingRelay::new();
    let mut a = connect(&relay, "A")?;

    relay.release("A").await?;

    assert!(!relay.is_connected("A"));
    assert!(a.outbound.recv().await.is_none());

    // Releasing an unknown session is a no-op
    relay.release("unknown").await?;

    Ok(())
}
