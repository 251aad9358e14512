use crate::error::{MonitorError, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The closed set of reportable violations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationType {
    MultipleFaces,
    NoFace,
    LookingAway,
    PhoneDetected,
    PersonDetected,
    TabChange,
}

impl ViolationType {
    pub const ALL: [ViolationType; 6] = [
        ViolationType::MultipleFaces,
        ViolationType::NoFace,
        ViolationType::LookingAway,
        ViolationType::PhoneDetected,
        ViolationType::PersonDetected,
        ViolationType::TabChange,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationType::MultipleFaces => "multiple_faces",
            ViolationType::NoFace => "no_face",
            ViolationType::LookingAway => "looking_away",
            ViolationType::PhoneDetected => "phone_detected",
            ViolationType::PersonDetected => "person_detected",
            ViolationType::TabChange => "tab_change",
        }
    }
}

impl fmt::Display for ViolationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViolationType {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| MonitorError::InvalidArgument(format!("Unknown violation type: {}", s)))
    }
}

/// A client-supplied point in time: RFC 3339 text or epoch milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimestampInput {
    Millis(i64),
    Text(String),
}

impl TimestampInput {
    pub fn parse(&self) -> Result<DateTime<Utc>> {
        match self {
            TimestampInput::Millis(ms) => Utc
                .timestamp_millis_opt(*ms)
                .single()
                .ok_or_else(|| MonitorError::InvalidArgument(format!("Invalid timestamp: {}", ms))),
            TimestampInput::Text(text) => DateTime::parse_from_rfc3339(text)
                .map(|ts| ts.with_timezone(&Utc))
                .map_err(|e| {
                    MonitorError::InvalidArgument(format!("Invalid timestamp {:?}: {}", text, e))
                }),
        }
    }
}

impl From<DateTime<Utc>> for TimestampInput {
    fn from(ts: DateTime<Utc>) -> Self {
        TimestampInput::Text(ts.to_rfc3339())
    }
}

/// An incoming, not yet validated, violation report
#[derive(Debug, Clone, Deserialize)]
pub struct ViolationReport {
    #[serde(rename = "type", alias = "violationType")]
    pub violation_type: String,
    pub timestamp: TimestampInput,
    #[serde(default)]
    pub description: Option<String>,
}

impl ViolationReport {
    pub fn new(violation_type: impl Into<String>, timestamp: impl Into<TimestampInput>) -> Self {
        Self {
            violation_type: violation_type.into(),
            timestamp: timestamp.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Result of a successful report
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportOutcome {
    #[serde(rename = "type")]
    pub violation_type: ViolationType,
    pub new_count: u64,
}
