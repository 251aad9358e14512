use crate::violation::ViolationType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Ended,
}

/// The most recent violation recorded for a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastViolation {
    #[serde(rename = "type")]
    pub violation_type: ViolationType,
    pub timestamp: DateTime<Utc>,
}

/// One entry of the bounded recent-violation log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationRecord {
    #[serde(rename = "type")]
    pub violation_type: ViolationType,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A bounded monitoring relationship between one student and one teacher for one exam
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringSession {
    pub id: String,
    pub exam_id: String,
    pub student_id: String,
    pub teacher_id: String,
    pub status: SessionStatus,

    /// Per-type violation counts; types never reported are absent
    pub violation_counts: BTreeMap<ViolationType, u64>,

    pub last_violation: Option<LastViolation>,

    /// Newest last, capped by the aggregator's history limit
    #[serde(skip)]
    pub(crate) recent_violations: VecDeque<ViolationRecord>,

    /// Identifier of the signaling channel currently bound to this session
    pub peer_handle: Option<u64>,

    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl MonitoringSession {
    pub(crate) fn new(exam_id: String, student_id: String, teacher_id: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            exam_id,
            student_id,
            teacher_id,
            status: SessionStatus::Active,
            violation_counts: BTreeMap::new(),
            last_violation: None,
            recent_violations: VecDeque::new(),
            peer_handle: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// True if `user_id` is this session's student or teacher
    pub fn is_participant(&self, user_id: &str) -> bool {
        self.student_id == user_id || self.teacher_id == user_id
    }

    pub fn total_violations(&self) -> u64 {
        self.violation_counts.values().sum()
    }

    pub fn recent_violations(&self) -> impl Iterator<Item = &ViolationRecord> {
        self.recent_violations.iter()
    }
}
