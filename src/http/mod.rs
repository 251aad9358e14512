//! HTTP API for the live monitoring core
//!
//! - POST /sessions - Start a monitoring session
//! - GET /sessions?teacherId=&examId= - List the caller's active sessions
//! - GET /sessions/:id - Session details
//! - POST /sessions/:id/end - End a session
//! - GET /sessions/:id/signaling - Signaling info (teacher, peer handle)
//! - POST|GET /sessions/:id/violations - Report a violation / statistics
//! - POST /sessions/:id/segments - Upload a video segment
//! - GET /sessions/:id/segments/latest - Retained segments as one stream
//! - GET /sessions/active - Sessions currently streaming
//! - GET /ws?sessionId= - Signaling WebSocket
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use handlers::{
    CreateSessionRequest, HealthResponse, ListSessionsQuery, SignalingInfo,
    UploadSegmentResponse,
};
pub use routes::create_router;
pub use state::AppState;
