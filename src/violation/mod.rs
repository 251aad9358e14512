//! Violation reporting
//!
//! Reports come from untrusted capture clients. They are validated against a
//! closed taxonomy before any counter is touched, then folded into the
//! owning session's counters and recent-violation log.

mod aggregator;
mod types;

pub use aggregator::{ViolationAggregator, ViolationStats};
pub use types::{ReportOutcome, TimestampInput, ViolationReport, ViolationType};
