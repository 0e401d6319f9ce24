//! Execution context classification.
//!
//! The classifier decides the blast radius of a fault. It reads ambient host
//! state only through an [`EnvironmentProbe`], and every query that cannot be
//! answered counts as `false`, which pushes the decision toward a hard fault.

use std::panic::{catch_unwind, AssertUnwindSafe};

use serde::{Deserialize, Serialize};

use crate::error::ProbeError;
use crate::record::Severity;

/// Host queries the classifier depends on.
pub trait EnvironmentProbe {
    /// Is this run a restartable session rather than a standalone run?
    fn is_sandboxed_session(&self) -> Result<bool, ProbeError>;

    /// Is the shell that owns the session alive and reachable?
    fn host_shell_present(&self) -> Result<bool, ProbeError>;

    /// Is an interpreted frame on the current call chain?
    fn call_from_interpreted_code(&self) -> Result<bool, ProbeError>;
}

/// Snapshot of the environment at fault time. Never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub is_sandboxed_session: bool,
    pub host_shell_present: bool,
    pub call_originated_from_interpreted_code: bool,
}

impl ExecutionContext {
    /// All three conditions for session-scoped termination hold.
    pub fn is_isolatable(&self) -> bool {
        self.is_sandboxed_session
            && self.host_shell_present
            && self.call_originated_from_interpreted_code
    }

    pub fn decision(&self) -> TerminationDecision {
        if self.is_isolatable() {
            TerminationDecision::SafeSessionTerminate
        } else {
            TerminationDecision::HardFault
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationDecision {
    SafeSessionTerminate,
    HardFault,
}

impl TerminationDecision {
    /// Decision for a fault of `severity` raised in `context`.
    ///
    /// `ProcessFatal` always hard faults.
    pub fn for_fault(context: &ExecutionContext, severity: Severity) -> Self {
        match severity {
            Severity::ProcessFatal => TerminationDecision::HardFault,
            Severity::SessionFatal | Severity::Recoverable => context.decision(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationDecision::SafeSessionTerminate => "safe_session_terminate",
            TerminationDecision::HardFault => "hard_fault",
        }
    }
}

/// Builds an [`ExecutionContext`] from a probe.
pub struct ContextClassifier<'a> {
    probe: &'a dyn EnvironmentProbe,
}

impl<'a> ContextClassifier<'a> {
    pub fn new(probe: &'a dyn EnvironmentProbe) -> Self {
        Self { probe }
    }

    pub fn classify(&self) -> ExecutionContext {
        ExecutionContext {
            is_sandboxed_session: evaluate("session", || self.probe.is_sandboxed_session()),
            host_shell_present: evaluate("shell", || self.probe.host_shell_present()),
            call_originated_from_interpreted_code: evaluate("interpreted_origin", || {
                self.probe.call_from_interpreted_code()
            }),
        }
    }
}

/// Run one probe query; errors and panics both read as `false`.
fn evaluate(check: &'static str, query: impl FnOnce() -> Result<bool, ProbeError>) -> bool {
    match catch_unwind(AssertUnwindSafe(query)) {
        Ok(Ok(value)) => value,
        Ok(Err(e)) => {
            quell_config::log_fault_debug!(
                "Probe unavailable",
                check = check,
                error = tracing::field::display(&e)
            );
            false
        }
        Err(_) => {
            quell_config::log_fault_warn!("Probe panicked", check = check);
            false
        }
    }
}
