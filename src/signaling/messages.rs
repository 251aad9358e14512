use crate::error::{MonitorError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body shared by offer, answer and ICE candidate messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Negotiation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_session_id: Option<String>,

    /// Opaque to the relay, forwarded verbatim
    #[serde(default)]
    pub payload: Value,

    /// Set by the relay on forwarded messages; client-supplied values are discarded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedPayload {
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

/// Signaling wire envelope (JSON text frames)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SignalingMessage {
    Offer(Negotiation),
    Answer(Negotiation),
    IceCandidate(Negotiation),
    Connected { payload: ConnectedPayload },
    Error { payload: ErrorPayload },
}

impl SignalingMessage {
    pub fn connected(session_id: impl Into<String>) -> Self {
        SignalingMessage::Connected {
            payload: ConnectedPayload {
                session_id: session_id.into(),
            },
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        SignalingMessage::Error {
            payload: ErrorPayload {
                message: message.into(),
            },
        }
    }

    pub fn negotiation(kind: NegotiationKind, body: Negotiation) -> Self {
        match kind {
            NegotiationKind::Offer => SignalingMessage::Offer(body),
            NegotiationKind::Answer => SignalingMessage::Answer(body),
            NegotiationKind::IceCandidate => SignalingMessage::IceCandidate(body),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SignalingMessage::Offer(_) => "offer",
            SignalingMessage::Answer(_) => "answer",
            SignalingMessage::IceCandidate(_) => "ice-candidate",
            SignalingMessage::Connected { .. } => "connected",
            SignalingMessage::Error { .. } => "error",
        }
    }
}

/// The message types a client may send for forwarding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationKind {
    Offer,
    Answer,
    IceCandidate,
}

impl NegotiationKind {
    fn from_type(value: &str) -> Option<Self> {
        match value {
            "offer" => Some(NegotiationKind::Offer),
            "answer" => Some(NegotiationKind::Answer),
            "ice-candidate" => Some(NegotiationKind::IceCandidate),
            _ => None,
        }
    }
}

/// A client frame that passed envelope validation
#[derive(Debug, Clone, PartialEq)]
pub struct ClientFrame {
    pub kind: NegotiationKind,
    pub target_session_id: String,
    pub payload: Value,
}

/// Validate an inbound text frame
pub fn parse_client_frame(text: &str) -> Result<ClientFrame> {
    let value: Value = serde_json::from_str(text)
        .map_err(|_| MonitorError::InvalidArgument("Invalid message format".to_string()))?;

    let type_name = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| MonitorError::InvalidArgument("Message type is missing".to_string()))?;

    let kind = NegotiationKind::from_type(type_name).ok_or_else(|| {
        MonitorError::InvalidArgument(format!("Unknown message type: {}", type_name))
    })?;

    let body: Negotiation = serde_json::from_value(value)
        .map_err(|e| MonitorError::InvalidArgument(format!("Invalid message format: {}", e)))?;

    let target_session_id = body
        .target_session_id
        .filter(|target| !target.is_empty())
        .ok_or_else(|| MonitorError::InvalidArgument("targetSessionId is required".to_string()))?;

    Ok(ClientFrame {
        kind,
        target_session_id,
        payload: body.payload,
    })
}
