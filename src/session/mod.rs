//! Monitoring session registry
//!
//! This module provides the authoritative record of monitoring sessions:
//! - Session identity and participants (exam, student, teacher)
//! - Lifecycle (active → ended) with one active session per exam/student pair
//! - Violation counters and the recent violation log
//! - The transient signaling peer handle
//!
//! Other components reach session state only through the registry API;
//! resources they hold per session are released via [`SessionReleaser`].

mod model;
mod registry;

pub use model::{LastViolation, MonitoringSession, SessionStatus, ViolationRecord};
pub use registry::{SessionRegistry, SessionReleaser};
