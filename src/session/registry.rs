use super::model::{MonitoringSession, SessionStatus};
use crate::error::{MonitorError, Result};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A component holding per-session resources that must be freed when a session ends
#[async_trait]
pub trait SessionReleaser: Send + Sync {
    /// Release everything held for `session_id`
    async fn release(&self, session_id: &str) -> anyhow::Result<()>;

    /// Name used in logs
    fn name(&self) -> &str;
}

/// (exam_id, student_id)
type PairKey = (String, String);

/// Authoritative store of monitoring sessions
///
/// Each session sits behind its own lock inside a sharded map, so mutations
/// of one session never wait on another.
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<Mutex<MonitoringSession>>>,

    /// Active session id per (exam_id, student_id)
    active_pairs: DashMap<PairKey, String>,

    releasers: Vec<Arc<dyn SessionReleaser>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::with_releasers(Vec::new())
    }

    pub fn with_releasers(releasers: Vec<Arc<dyn SessionReleaser>>) -> Self {
        Self {
            sessions: DashMap::new(),
            active_pairs: DashMap::new(),
            releasers,
        }
    }

    /// Start a new active session
    pub fn create_session(
        &self,
        exam_id: &str,
        student_id: &str,
        teacher_id: &str,
    ) -> Result<MonitoringSession> {
        for (field, value) in [
            ("examId", exam_id),
            ("studentId", student_id),
            ("teacherId", teacher_id),
        ] {
            if value.trim().is_empty() {
                return Err(MonitorError::InvalidArgument(format!("{} is required", field)));
            }
        }

        let key = (exam_id.to_string(), student_id.to_string());

        // The pair entry stays locked until the session is stored
        match self.active_pairs.entry(key) {
            Entry::Occupied(existing) => Err(MonitorError::Conflict(format!(
                "Student {} already has active session {} for exam {}",
                student_id,
                existing.get(),
                exam_id
            ))),
            Entry::Vacant(slot) => {
                let session = MonitoringSession::new(
                    exam_id.to_string(),
                    student_id.to_string(),
                    teacher_id.to_string(),
                );
                self.sessions
                    .insert(session.id.clone(), Arc::new(Mutex::new(session.clone())));
                slot.insert(session.id.clone());

                info!(
                    "Created monitoring session {} (exam={}, student={}, teacher={})",
                    session.id, exam_id, student_id, teacher_id
                );
                Ok(session)
            }
        }
    }

    pub fn get_session(&self, id: &str) -> Result<MonitoringSession> {
        self.read(id, MonitoringSession::clone)
    }

    /// End a session and release the resources other components hold for it
    ///
    /// Ending an already-ended session returns its current state.
    pub async fn end_session(&self, id: &str, actor_id: &str) -> Result<MonitoringSession> {
        let entry = self.entry(id)?;

        let (snapshot, newly_ended) = {
            let mut session = entry.lock();
            if !session.is_participant(actor_id) {
                return Err(MonitorError::Forbidden(format!(
                    "{} is not a participant of session {}",
                    actor_id, id
                )));
            }

            let newly_ended = session.is_active();
            if newly_ended {
                session.status = SessionStatus::Ended;
                session.ended_at = Some(Utc::now());
                session.peer_handle = None;
            }
            (session.clone(), newly_ended)
        };

        if !newly_ended {
            debug!("Session {} already ended", id);
            return Ok(snapshot);
        }

        self.active_pairs.remove_if(
            &(snapshot.exam_id.clone(), snapshot.student_id.clone()),
            |_, active_id| active_id == id,
        );

        info!("Ended monitoring session {} (by {})", id, actor_id);

        for releaser in &self.releasers {
            if let Err(e) = releaser.release(id).await {
                warn!(
                    "Failed to release {} resources for session {}: {:#}",
                    releaser.name(),
                    id,
                    e
                );
            }
        }

        Ok(snapshot)
    }

    /// Active sessions owned by `teacher_id`, optionally limited to one exam
    ///
    /// Ordered by start time, then id.
    pub fn list_active_sessions(
        &self,
        teacher_id: &str,
        exam_id: Option<&str>,
    ) -> Vec<MonitoringSession> {
        let entries: Vec<Arc<Mutex<MonitoringSession>>> = self
            .sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut sessions: Vec<MonitoringSession> = entries
            .iter()
            .filter_map(|entry| {
                let session = entry.lock();
                let matches = session.is_active()
                    && session.teacher_id == teacher_id
                    && exam_id.map_or(true, |exam| session.exam_id == exam);
                if !matches {
                    return None;
                }
                Some(session.clone())
            })
            .collect();

        sessions.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));
        sessions
    }

    /// Run `f` against a session's current state
    pub fn read<R>(&self, id: &str, f: impl FnOnce(&MonitoringSession) -> R) -> Result<R> {
        let entry = self.entry(id)?;
        let session = entry.lock();
        Ok(f(&session))
    }

    /// Mutate an active session under its lock
    ///
    /// Fails with `NotFound` for unknown ids and `Gone` for ended sessions.
    pub(crate) fn update_active<R>(
        &self,
        id: &str,
        f: impl FnOnce(&mut MonitoringSession) -> R,
    ) -> Result<R> {
        let entry = self.entry(id)?;
        let mut session = entry.lock();
        if !session.is_active() {
            return Err(MonitorError::Gone(format!("Session {} has ended", id)));
        }
        Ok(f(&mut session))
    }

    /// Record the signaling channel bound to an active session
    pub fn bind_peer(&self, id: &str, handle: u64) -> Result<()> {
        self.update_active(id, |session| session.peer_handle = Some(handle))
    }

    /// Clear the peer handle if it still refers to `handle`
    pub fn clear_peer(&self, id: &str, handle: u64) -> Result<bool> {
        let entry = self.entry(id)?;
        let mut session = entry.lock();
        if session.peer_handle == Some(handle) {
            session.peer_handle = None;
            return Ok(true);
        }
        Ok(false)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn entry(&self, id: &str) -> Result<Arc<Mutex<MonitoringSession>>> {
        self.sessions
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| MonitorError::NotFound(format!("Session {} not found", id)))
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
