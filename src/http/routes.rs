use super::handlers;
use super::state::AppState;
use crate::signaling::signaling_handler;
use axum::{
    extract::DefaultBodyLimit,
    http::header,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Multipart framing allowance on top of the segment size cap
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    let upload_limit = state.config.streaming.max_segment_bytes + MULTIPART_OVERHEAD;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([header::CONTENT_LENGTH]);

    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Session lifecycle
        .route(
            "/sessions",
            get(handlers::list_sessions).post(handlers::create_session),
        )
        .route("/sessions/active", get(handlers::active_streams))
        .route("/sessions/:session_id", get(handlers::get_session))
        .route("/sessions/:session_id/end", post(handlers::end_session))
        .route(
            "/sessions/:session_id/signaling",
            get(handlers::signaling_info),
        )
        // Violations
        .route(
            "/sessions/:session_id/violations",
            get(handlers::violation_stats).post(handlers::report_violation),
        )
        // Live stream segments
        .route(
            "/sessions/:session_id/segments",
            post(handlers::upload_segment).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/sessions/:session_id/segments/latest",
            get(handlers::latest_stream),
        )
        // Signaling channel
        .route("/ws", get(signaling_handler))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
