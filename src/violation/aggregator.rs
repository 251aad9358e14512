use super::types::{ReportOutcome, ViolationReport, ViolationType};
use crate::error::Result;
use crate::session::{LastViolation, SessionRegistry, ViolationRecord};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Violation statistics for one session
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationStats {
    pub total_violations: u64,
    pub violations_by_type: BTreeMap<ViolationType, u64>,
    pub last_violation: Option<LastViolation>,
    pub recent_violations: Vec<ViolationRecord>,
}

/// Folds violation reports into the registry's per-session counters
pub struct ViolationAggregator {
    registry: Arc<SessionRegistry>,
    history_limit: usize,
}

impl ViolationAggregator {
    pub fn new(registry: Arc<SessionRegistry>, history_limit: usize) -> Self {
        Self {
            registry,
            history_limit,
        }
    }

    /// Validate and record one report
    pub fn report(&self, session_id: &str, report: ViolationReport) -> Result<ReportOutcome> {
        // Validate before touching any session state
        let violation_type: ViolationType = report.violation_type.parse()?;
        let timestamp = report.timestamp.parse()?;
        let history_limit = self.history_limit;

        let new_count = self.registry.update_active(session_id, |session| {
            let count = session.violation_counts.entry(violation_type).or_insert(0);
            *count += 1;
            let new_count = *count;

            session.last_violation = Some(LastViolation {
                violation_type,
                timestamp,
            });

            if history_limit > 0 {
                while session.recent_violations.len() >= history_limit {
                    session.recent_violations.pop_front();
                }
                session.recent_violations.push_back(ViolationRecord {
                    violation_type,
                    timestamp,
                    description: report.description,
                });
            }

            new_count
        })?;

        debug!(
            "Session {}: {} violation #{}",
            session_id, violation_type, new_count
        );

        Ok(ReportOutcome {
            violation_type,
            new_count,
        })
    }

    /// Current statistics; totals are computed from the counters at read time
    pub fn stats(&self, session_id: &str) -> Result<ViolationStats> {
        self.registry.read(session_id, |session| ViolationStats {
            total_violations: session.total_violations(),
            violations_by_type: session.violation_counts.clone(),
            last_violation: session.last_violation.clone(),
            recent_violations: session.recent_violations().cloned().collect(),
        })
    }
}
