// Integration tests for the session registry
//
// These tests verify the session lifecycle: one active session per
// exam/student pair, participant checks on end, idempotent ending and
// release of resources held by other components.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use proctor_monitor::{MonitorError, SessionRegistry, SessionReleaser, SessionStatus};
use std::sync::Arc;

/// Records every release request
#[derive(Default)]
struct RecordingReleaser {
    released: Mutex<Vec<String>>,
}

#[async_trait]
impl SessionReleaser for RecordingReleaser {
    async fn release(&self, session_id: &str) -> anyhow::Result<()> {
        self.released.lock().push(session_id.to_string());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

struct FailingReleaser;

#[async_trait]
impl SessionReleaser for FailingReleaser {
    async fn release(&self, _session_id: &str) -> anyhow::Result<()> {
        anyhow::bail!("storage unavailable")
    }

    fn name(&self) -> &str {
        "failing"
    }
}

#[test]
fn test_create_session_starts_active_and_empty() -> Result<()> {
    let registry = SessionRegistry::new();

    let session = registry.create_session("exam-1", "student-1", "teacher-1")?;

    assert_eq!(session.status, SessionStatus::Active);
    assert_eq!(session.exam_id, "exam-1");
    assert_eq!(session.student_id, "student-1");
    assert_eq!(session.teacher_id, "teacher-1");
    assert!(session.violation_counts.is_empty());
    assert!(session.last_violation.is_none());
    assert!(session.peer_handle.is_none());
    assert!(session.ended_at.is_none());

    let fetched = registry.get_session(&session.id)?;
    assert_eq!(fetched.id, session.id);

    Ok(())
}

#[test]
fn test_create_session_rejects_blank_ids() {
    let registry = SessionRegistry::new();

    let result = registry.create_session("exam-1", "  ", "teacher-1");
    assert!(matches!(result, Err(MonitorError::InvalidArgument(_))));
    assert!(registry.is_empty());
}

#[test]
fn test_get_unknown_session_is_not_found() {
    let registry = SessionRegistry::new();

    let result = registry.get_session("missing");
    assert!(matches!(result, Err(MonitorError::NotFound(_))));
}

#[tokio::test]
async fn test_duplicate_active_session_conflicts_until_ended() -> Result<()> {
    let registry = SessionRegistry::new();

    let first = registry.create_session("exam-1", "student-1", "teacher-1")?;

    let duplicate = registry.create_session("exam-1", "student-1", "teacher-1");
    assert!(
        matches!(duplicate, Err(MonitorError::Conflict(_))),
        "Second active session for the same pair should conflict"
    );

    // A different exam for the same student is fine
    registry.create_session("exam-2", "student-1", "teacher-1")?;

    registry.end_session(&first.id, "teacher-1").await?;

    let second = registry.create_session("exam-1", "student-1", "teacher-1")?;
    assert_ne!(second.id, first.id);
    assert_eq!(second.status, SessionStatus::Active);

    Ok(())
}

#[tokio::test]
async fn test_end_session_is_idempotent() -> Result<()> {
    let registry = SessionRegistry::new();
    let session = registry.create_session("exam-1", "student-1", "teacher-1")?;

    let ended = registry.end_session(&session.id, "student-1").await?;
    assert_eq!(ended.status, SessionStatus::Ended);
    assert!(ended.ended_at.is_some());

    let again = registry.end_session(&session.id, "teacher-1").await?;
    assert_eq!(again.status, SessionStatus::Ended);
    assert_eq!(again.ended_at, ended.ended_at, "Second end must not move endedAt");

    Ok(())
}

#[tokio::test]
async fn test_end_session_checks_actor_and_existence() -> Result<()> {
    let registry = SessionRegistry::new();
    let session = registry.create_session("exam-1", "student-1", "teacher-1")?;

    let stranger = registry.end_session(&session.id, "student-2").await;
    assert!(matches!(stranger, Err(MonitorError::Forbidden(_))));
    assert_eq!(registry.get_session(&session.id)?.status, SessionStatus::Active);

    let missing = registry.end_session("missing", "teacher-1").await;
    assert!(matches!(missing, Err(MonitorError::NotFound(_))));

    Ok(())
}

#[tokio::test]
async fn test_end_session_notifies_releasers_once() -> Result<()> {
    let recorder = Arc::new(RecordingReleaser::default());
    let releasers: Vec<Arc<dyn SessionReleaser>> =
        vec![Arc::new(FailingReleaser), recorder.clone()];
    let registry = SessionRegistry::with_releasers(releasers);

    let session = registry.create_session("exam-1", "student-1", "teacher-1")?;

    // A failing releaser is logged, not surfaced, and does not stop the others
    registry.end_session(&session.id, "teacher-1").await?;
    registry.end_session(&session.id, "teacher-1").await?;

    assert_eq!(*recorder.released.lock(), vec![session.id.clone()]);

    Ok(())
}

#[tokio::test]
async fn test_list_active_sessions_filters_by_teacher_and_exam() -> Result<()> {
    let registry = SessionRegistry::new();

    let a = registry.create_session("exam-1", "student-1", "teacher-1")?;
    let b = registry.create_session("exam-1", "student-2", "teacher-1")?;
    let c = registry.create_session("exam-2", "student-3", "teacher-1")?;
    registry.create_session("exam-3", "student-4", "teacher-2")?;

    registry.end_session(&b.id, "teacher-1").await?;

    let all: Vec<String> = registry
        .list_active_sessions("teacher-1", None)
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(all.len(), 2);
    assert!(all.contains(&a.id));
    assert!(all.contains(&c.id));

    // Same call twice yields the same order
    let again: Vec<String> = registry
        .list_active_sessions("teacher-1", None)
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(all, again);

    let exam_1 = registry.list_active_sessions("teacher-1", Some("exam-1"));
    assert_eq!(exam_1.len(), 1);
    assert_eq!(exam_1[0].id, a.id);

    assert!(registry.list_active_sessions("teacher-3", None).is_empty());

    Ok(())
}

#[tokio::test]
async fn test_peer_handle_binding() -> Result<()> {
    let registry = SessionRegistry::new();
    let session = registry.create_session("exam-1", "student-1", "teacher-1")?;

    registry.bind_peer(&session.id, 7)?;
    assert_eq!(registry.get_session(&session.id)?.peer_handle, Some(7));

    // A stale handle does not clear a newer binding
    registry.bind_peer(&session.id, 8)?;
    assert!(!registry.clear_peer(&session.id, 7)?);
    assert_eq!(registry.get_session(&session.id)?.peer_handle, Some(8));

    assert!(registry.clear_peer(&session.id, 8)?);
    assert_eq!(registry.get_session(&session.id)?.peer_handle, None);

    // Ended sessions refuse new bindings
    registry.end_session(&session.id, "teacher-1").await?;
    assert!(matches!(
        registry.bind_peer(&session.id, 9),
        Err(MonitorError::Gone(_))
    ));

    Ok(())
}
