use super::state::AppState;
use crate::auth::{Actor, Role};
use crate::error::{MonitorError, Result};
use crate::session::MonitoringSession;
use crate::streaming::ActiveStream;
use crate::violation::{ReportOutcome, ViolationReport, ViolationStats};
use axum::{
    body::Body,
    extract::{multipart::MultipartError, rejection::JsonRejection, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub exam_id: String,
    pub student_id: String,

    /// Defaults to the caller when the caller is a teacher
    pub teacher_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSessionsQuery {
    pub teacher_id: Option<String>,
    pub exam_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalingInfo {
    pub session_id: String,
    pub teacher_id: String,
    pub peer_handle: Option<u64>,
    pub connected: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSegmentResponse {
    pub session_id: String,
    pub retained_segments: usize,
    pub received_at: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

// ============================================================================
// Helpers
// ============================================================================

/// Fetch a session the caller participates in
fn participant_session(state: &AppState, session_id: &str, actor: &Actor) -> Result<MonitoringSession> {
    let session = state.registry.get_session(session_id)?;
    if !session.is_participant(&actor.user_id) {
        return Err(MonitorError::Forbidden(format!(
            "{} is not a participant of session {}",
            actor.user_id, session_id
        )));
    }
    Ok(session)
}

fn multipart_error(error: MultipartError, limit: usize) -> MonitorError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        MonitorError::PayloadTooLarge { limit }
    } else {
        MonitorError::InvalidArgument(format!("Malformed upload: {}", error.body_text()))
    }
}

// ============================================================================
// Sessions
// ============================================================================

/// POST /sessions
/// Start a monitoring session for one student and exam
pub async fn create_session(
    State(state): State<AppState>,
    actor: Actor,
    body: std::result::Result<Json<CreateSessionRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(req) = body?;
    let teacher_id = match (req.teacher_id, actor.role) {
        (Some(teacher_id), _) => teacher_id,
        (None, Role::Teacher) => actor.user_id.clone(),
        (None, Role::Student) => {
            return Err(MonitorError::InvalidArgument("teacherId is required".to_string()))
        }
    };

    if actor.user_id != teacher_id && actor.user_id != req.student_id {
        return Err(MonitorError::Forbidden(
            "Caller must be the session's teacher or student".to_string(),
        ));
    }

    let session = state
        .registry
        .create_session(&req.exam_id, &req.student_id, &teacher_id)?;

    Ok((StatusCode::CREATED, Json(session)))
}

/// GET /sessions?teacherId=&examId=
/// Active sessions owned by the calling teacher
pub async fn list_sessions(
    State(state): State<AppState>,
    actor: Actor,
    Query(query): Query<ListSessionsQuery>,
) -> Result<Json<Vec<MonitoringSession>>> {
    actor.require_role(Role::Teacher)?;

    let teacher_id = query.teacher_id.unwrap_or_else(|| actor.user_id.clone());
    if teacher_id != actor.user_id {
        return Err(MonitorError::Forbidden(
            "Teachers may only list their own sessions".to_string(),
        ));
    }

    let sessions = state
        .registry
        .list_active_sessions(&teacher_id, query.exam_id.as_deref());

    Ok(Json(sessions))
}

/// GET /sessions/:session_id
pub async fn get_session(
    State(state): State<AppState>,
    actor: Actor,
    Path(session_id): Path<String>,
) -> Result<Json<MonitoringSession>> {
    participant_session(&state, &session_id, &actor).map(Json)
}

/// POST /sessions/:session_id/end
/// End a session; repeated calls return the ended session
pub async fn end_session(
    State(state): State<AppState>,
    actor: Actor,
    Path(session_id): Path<String>,
) -> Result<Json<MonitoringSession>> {
    let session = state
        .registry
        .end_session(&session_id, &actor.user_id)
        .await?;

    Ok(Json(session))
}

/// GET /sessions/:session_id/signaling
/// Who to signal and whether the session's channel is connected
pub async fn signaling_info(
    State(state): State<AppState>,
    actor: Actor,
    Path(session_id): Path<String>,
) -> Result<Json<SignalingInfo>> {
    let session = participant_session(&state, &session_id, &actor)?;

    Ok(Json(SignalingInfo {
        connected: state.relay.is_connected(&session.id),
        session_id: session.id,
        teacher_id: session.teacher_id,
        peer_handle: session.peer_handle,
    }))
}

// ============================================================================
// Violations
// ============================================================================

/// POST /sessions/:session_id/violations
pub async fn report_violation(
    State(state): State<AppState>,
    actor: Actor,
    Path(session_id): Path<String>,
    body: std::result::Result<Json<ViolationReport>, JsonRejection>,
) -> Result<Json<ReportOutcome>> {
    participant_session(&state, &session_id, &actor)?;
    let Json(report) = body?;

    let outcome = state.aggregator.report(&session_id, report)?;

    Ok(Json(outcome))
}

/// GET /sessions/:session_id/violations
pub async fn violation_stats(
    State(state): State<AppState>,
    actor: Actor,
    Path(session_id): Path<String>,
) -> Result<Json<ViolationStats>> {
    participant_session(&state, &session_id, &actor)?;

    state.aggregator.stats(&session_id).map(Json)
}

// ============================================================================
// Streaming
// ============================================================================

/// POST /sessions/:session_id/segments
/// Upload one video segment (multipart field `video`)
pub async fn upload_segment(
    State(state): State<AppState>,
    actor: Actor,
    Path(session_id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<UploadSegmentResponse>> {
    let session = participant_session(&state, &session_id, &actor)?;
    if !session.is_active() {
        return Err(MonitorError::Gone(format!("Session {} has ended", session_id)));
    }

    let limit = state.buffer.policy().max_segment_bytes;
    let mut data: Option<Bytes> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        if field.name() == Some("video") || field.file_name().is_some() {
            data = Some(field.bytes().await.map_err(|e| multipart_error(e, limit))?);
            break;
        }
    }

    let data = data
        .ok_or_else(|| MonitorError::InvalidArgument("No video file provided".to_string()))?;

    let received_at = Utc::now();
    let retained = state
        .buffer
        .push_segment(&session_id, data, received_at)
        .await?;

    Ok(Json(UploadSegmentResponse {
        session_id,
        retained_segments: retained,
        received_at,
        message: "Stream chunk received successfully".to_string(),
    }))
}

/// GET /sessions/:session_id/segments/latest
/// Retained segments concatenated in arrival order
pub async fn latest_stream(
    State(state): State<AppState>,
    actor: Actor,
    Path(session_id): Path<String>,
) -> Result<Response> {
    participant_session(&state, &session_id, &actor)?;

    let snapshot = state.buffer.latest_stream(&session_id)?;
    debug!(
        "Serving {} segment(s), {} bytes for session {}",
        snapshot.segment_count(),
        snapshot.content_length(),
        session_id
    );

    Ok((
        [
            (header::CONTENT_TYPE, "video/webm".to_string()),
            (header::CONTENT_LENGTH, snapshot.content_length().to_string()),
            (
                header::CACHE_CONTROL,
                "no-cache, no-store, must-revalidate".to_string(),
            ),
            (header::PRAGMA, "no-cache".to_string()),
            (header::EXPIRES, "0".to_string()),
        ],
        Body::from_stream(snapshot.into_stream()),
    )
        .into_response())
}

/// GET /sessions/active
/// The caller's sessions that uploaded a segment recently
pub async fn active_streams(
    State(state): State<AppState>,
    actor: Actor,
) -> Result<Json<Vec<ActiveStream>>> {
    actor.require_role(Role::Teacher)?;

    let streams: Vec<ActiveStream> = state
        .buffer
        .list_active_streams()
        .into_iter()
        .filter(|stream| {
            state
                .registry
                .read(&stream.session_id, |session| session.teacher_id == actor.user_id)
                .unwrap_or(false)
        })
        .collect();

    debug!("{} active stream(s) for {}", streams.len(), actor.user_id);

    Ok(Json(streams))
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}
