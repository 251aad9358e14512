//! WebRTC signaling relay
//!
//! Pairs of parties exchange offer/answer/ICE-candidate messages through the
//! relay, addressed by opaque session ids. The relay holds one channel per
//! session id and forwards messages verbatim, stamping the sender's id.

mod messages;
mod relay;
mod ws;

pub use messages::{
    parse_client_frame, ClientFrame, ConnectedPayload, ErrorPayload, Negotiation,
    NegotiationKind, SignalingMessage,
};
pub use relay::{Connection, SignalingRelay};
pub use ws::{signaling_handler, SignalingQuery};
