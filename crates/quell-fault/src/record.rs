//! Fault records and severities.

use std::fmt;
use std::panic::Location;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::TerminationDecision;

/// How far a fault is allowed to reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Expected condition, handled by ordinary `Result` returns. Never raised here.
    Recoverable,
    /// Severe misuse in a context that can be isolated to the session.
    SessionFatal,
    /// No safe isolation possible; the process aborts.
    ProcessFatal,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Recoverable => "recoverable",
            Severity::SessionFatal => "session_fatal",
            Severity::ProcessFatal => "process_fatal",
        }
    }

    /// The termination a logged record of this severity went through.
    pub fn decision(&self) -> Option<TerminationDecision> {
        match self {
            Severity::Recoverable => None,
            Severity::SessionFatal => Some(TerminationDecision::SafeSessionTerminate),
            Severity::ProcessFatal => Some(TerminationDecision::HardFault),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source location of the fault call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Origin {
    pub file: &'static str,
    pub line: u32,
    pub column: u32,
}

impl Origin {
    /// Location of the nearest non-`#[track_caller]` caller.
    #[track_caller]
    pub fn caller() -> Self {
        Self::from(Location::caller())
    }
}

impl From<&'static Location<'static>> for Origin {
    fn from(loc: &'static Location<'static>) -> Self {
        Self {
            file: loc.file(),
            line: loc.line(),
            column: loc.column(),
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// A single fault, immutable once built.
#[derive(Debug, Clone)]
pub struct FaultRecord {
    message: String,
    severity: Severity,
    origin: Origin,
    timestamp: DateTime<Utc>,
}

impl FaultRecord {
    pub fn new(message: impl Into<String>, severity: Severity, origin: Origin) -> Self {
        Self {
            message: message.into(),
            severity,
            origin,
            timestamp: Utc::now(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Same fault, widened to a process abort.
    pub fn escalate(self) -> Self {
        Self {
            severity: Severity::ProcessFatal,
            ..self
        }
    }
}

impl fmt::Display for FaultRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({})", self.severity, self.message, self.origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_tracks_caller() {
        let line = line!() + 1;
        let origin = Origin::caller();
        assert_eq!(origin.line, line);
        assert!(origin.file.ends_with("record.rs"));
    }

    #[test]
    fn test_escalate_keeps_message_and_time() {
        let record = FaultRecord::new("bad call", Severity::SessionFatal, Origin::caller());
        let ts = record.timestamp();
        let escalated = record.escalate();
        assert_eq!(escalated.severity(), Severity::ProcessFatal);
        assert_eq!(escalated.message(), "bad call");
        assert_eq!(escalated.timestamp(), ts);
    }

    #[test]
    fn test_severity_decision() {
        assert_eq!(Severity::Recoverable.decision(), None);
        assert_eq!(
            Severity::ProcessFatal.decision(),
            Some(TerminationDecision::HardFault)
        );
    }

    #[test]
    fn test_display() {
        let record = FaultRecord::new("boom", Severity::ProcessFatal, Origin::caller());
        let s = record.to_string();
        assert!(s.starts_with("[process_fatal] boom ("));
    }
}
