//! # quell-fault
//!
//! Scoped fault isolation for code running inside a restartable session.
//!
//! A soft fault ends only the enclosing session when that can be done safely:
//! the run is a session, its shell is alive, and the fault came from an
//! interpreted frame. Otherwise it aborts the whole process. Either way the
//! fault is written to the operator fault log first, and the call never returns.
//!
//! ```ignore
//! use quell_fault::{soft_check, soft_fault};
//!
//! fn apply_damage(target: Option<&mut Actor>, amount: i32) {
//!     let Some(target) = target else {
//!         soft_fault!("apply_damage called without a target");
//!     };
//!     soft_check!(amount >= 0, "negative damage {amount}");
//!     target.hp -= amount;
//! }
//! ```
//!
//! Code after a fault call is dead by type (`-> !`). It can still observe one
//! effect: native code already running inside a script step finishes that step
//! before the scheduler notices the suspend request.

pub mod context;
pub mod error;
pub mod handler;
pub mod hard;
pub mod logger;
mod macros;
pub mod probe;
pub mod record;
pub mod script;
pub mod session;

pub use context::{ContextClassifier, EnvironmentProbe, ExecutionContext, TerminationDecision};
pub use error::{ProbeError, SinkError};
pub use handler::{
    fatal, handler, install, soft_fault, FaultHandler, FaultHandlerBuilder, FaultPhase,
};
pub use hard::{debugger_attached, HardFaultTrigger, ProcessAbort};
pub use logger::{
    read_fault_log, FaultLogEntry, FaultLogger, FaultSink, FileSink, MemorySink, StderrSink,
};
pub use probe::HostProbe;
pub use record::{FaultRecord, Origin, Severity};
pub use script::{
    interpreted_depth, CooperativeSuspender, ExecutionSuspender, RunReport, ScriptFrame,
    ScriptScheduler, SuspendOutcome,
};
pub use session::{
    HostSessionTerminator, SessionBoundary, SessionOutcome, SessionTerminated, SessionTerminator,
    ENV_SESSION_ID, ENV_SHELL_PID,
};
