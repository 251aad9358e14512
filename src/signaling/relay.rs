use super::messages::{parse_client_frame, Negotiation, SignalingMessage};
use crate::error::{MonitorError, Result};
use crate::session::SessionReleaser;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// The relay's end of one connected channel
#[derive(Debug, Clone)]
struct ChannelHandle {
    id: u64,
    tx: mpsc::UnboundedSender<SignalingMessage>,
}

/// A registered channel, held by the transport task that owns the socket
///
/// `outbound` yields messages addressed to this channel. It returns `None`
/// once the relay drops its handle (replaced by a newer connection for the
/// same session id, or released when the session ended).
#[derive(Debug)]
pub struct Connection {
    pub session_id: String,
    pub handle: u64,
    pub outbound: mpsc::UnboundedReceiver<SignalingMessage>,
}

/// Forwards negotiation messages between channels keyed by session id
///
/// The relay never interprets payloads and never buffers undeliverable
/// messages; its only state is the connection map.
pub struct SignalingRelay {
    connections: DashMap<String, ChannelHandle>,
    next_handle: AtomicU64,
}

impl SignalingRelay {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Register a channel for `session_id` and queue the `connected` acknowledgement
    ///
    /// A later connection for the same id replaces the earlier one.
    pub fn connect(&self, session_id: Option<&str>) -> Result<Connection> {
        let session_id = session_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| MonitorError::InvalidArgument("No sessionId provided".to_string()))?;

        let (tx, outbound) = mpsc::unbounded_channel();
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);

        // The receiver is alive, so this cannot fail
        let _ = tx.send(SignalingMessage::connected(session_id));

        if let Some(previous) = self.connections.insert(
            session_id.to_string(),
            ChannelHandle { id: handle, tx },
        ) {
            info!(
                "Session {} reconnected, replacing channel {}",
                session_id, previous.id
            );
        }

        info!("Signaling channel {} connected for session {}", handle, session_id);

        Ok(Connection {
            session_id: session_id.to_string(),
            handle,
            outbound,
        })
    }

    /// Process one text frame received from `sender_session_id`'s channel
    pub fn handle_text(&self, sender_session_id: &str, handle: u64, text: &str) {
        let frame = match parse_client_frame(text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("Rejected frame from session {}: {}", sender_session_id, e);
                self.reply(sender_session_id, handle, SignalingMessage::error(reason(&e)));
                return;
            }
        };

        let target = &frame.target_session_id;
        let message = SignalingMessage::negotiation(
            frame.kind,
            Negotiation {
                target_session_id: Some(target.clone()),
                payload: frame.payload,
                sender_session_id: Some(sender_session_id.to_string()),
            },
        );
        let kind = message.kind();

        let delivered = self
            .sender_for(target)
            .map(|tx| tx.send(message).is_ok())
            .unwrap_or(false);

        if delivered {
            debug!(
                "Forwarded {} from session {} to session {}",
                kind, sender_session_id, target
            );
        } else {
            debug!(
                "Target session {} not connected ({} from {})",
                target, kind, sender_session_id
            );
            self.reply(
                sender_session_id,
                handle,
                SignalingMessage::error(format!("Target session {} not found", target)),
            );
        }
    }

    /// Remove the entry for `session_id` if it still belongs to `handle`
    pub fn disconnect(&self, session_id: &str, handle: u64) -> bool {
        let removed = self
            .connections
            .remove_if(session_id, |_, channel| channel.id == handle)
            .is_some();

        if removed {
            info!("Signaling channel {} closed for session {}", handle, session_id);
        }
        removed
    }

    pub fn is_connected(&self, session_id: &str) -> bool {
        self.connections.contains_key(session_id)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn sender_for(&self, session_id: &str) -> Option<mpsc::UnboundedSender<SignalingMessage>> {
        self.connections
            .get(session_id)
            .map(|channel| channel.tx.clone())
    }

    /// Send to the sender's own channel, unless it has since been replaced
    fn reply(&self, session_id: &str, handle: u64, message: SignalingMessage) {
        let tx = self
            .connections
            .get(session_id)
            .filter(|channel| channel.id == handle)
            .map(|channel| channel.tx.clone());

        match tx {
            Some(tx) => {
                if tx.send(message).is_err() {
                    warn!("Channel {} for session {} is closing", handle, session_id);
                }
            }
            None => debug!("Dropping reply for stale channel {} ({})", handle, session_id),
        }
    }
}

impl Default for SignalingRelay {
    fn default() -> Self {
        Self::new()
    }
}

/// Error text without the taxonomy prefix
fn reason(error: &MonitorError) -> String {
    match error {
        MonitorError::InvalidArgument(message) | MonitorError::NotFound(message) => {
            message.clone()
        }
        other => other.to_string(),
    }
}

#[async_trait]
impl SessionReleaser for SignalingRelay {
    async fn release(&self, session_id: &str) -> anyhow::Result<()> {
        // Dropping the handle ends the transport task's outbound stream
        if let Some((_, channel)) = self.connections.remove(session_id) {
            info!(
                "Released signaling channel {} for ended session {}",
                channel.id, session_id
            );
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "signaling"
    }
}
