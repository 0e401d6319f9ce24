//! Fault entry point.
//!
//! `Start -> Classified -> {SessionTerminating | HardFaulting} -> Terminated`
//!
//! The safe path is taken only when the fault was requested as session fatal
//! and all three context checks hold. It logs, asks the interpreted scheduler
//! to suspend, then terminates the session. Every other case logs the record,
//! escalated to process fatal, then hard faults. Neither path returns.

use std::fmt;

use once_cell::sync::OnceCell;
use quell_config::Config;

use crate::context::{ContextClassifier, EnvironmentProbe, ExecutionContext, TerminationDecision};
use crate::hard::{HardFaultTrigger, ProcessAbort};
use crate::logger::{FaultLogger, FaultSink, FileSink, StderrSink};
use crate::probe::HostProbe;
use crate::record::{FaultRecord, Origin, Severity};
use crate::script::{CooperativeSuspender, ExecutionSuspender, SuspendOutcome};
use crate::session::{HostSessionTerminator, SessionTerminator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPhase {
    Start,
    Classified,
    SessionTerminating,
    HardFaulting,
    Terminated,
}

impl FaultPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            FaultPhase::Start => "start",
            FaultPhase::Classified => "classified",
            FaultPhase::SessionTerminating => "session_terminating",
            FaultPhase::HardFaulting => "hard_faulting",
            FaultPhase::Terminated => "terminated",
        }
    }

    /// Phase entered after classification for `decision`.
    pub fn after(decision: TerminationDecision) -> Self {
        match decision {
            TerminationDecision::SafeSessionTerminate => FaultPhase::SessionTerminating,
            TerminationDecision::HardFault => FaultPhase::HardFaulting,
        }
    }
}

fn enter(phase: FaultPhase) {
    quell_config::log_fault_debug!("Fault phase", phase = phase.as_str());
}

type Probe = Box<dyn EnvironmentProbe + Send + Sync>;
type Suspender = Box<dyn ExecutionSuspender + Send + Sync>;
type Terminator = Box<dyn SessionTerminator + Send + Sync>;
type HardFault = Box<dyn HardFaultTrigger + Send + Sync>;

/// Orchestrates classification, logging and termination for one process.
pub struct FaultHandler {
    probe: Probe,
    logger: FaultLogger,
    suspender: Suspender,
    terminator: Terminator,
    hard: HardFault,
}

impl fmt::Debug for FaultHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FaultHandler")
            .field("sinks", &self.logger.sink_count())
            .finish_non_exhaustive()
    }
}

impl FaultHandler {
    pub fn builder() -> FaultHandlerBuilder {
        FaultHandlerBuilder::default()
    }

    /// Host handler wired from config: file + optional stderr sinks, real
    /// probe, cooperative suspender, host terminator, process abort.
    pub fn from_config(config: &Config) -> Self {
        let mut builder = Self::builder()
            .sink(FileSink::new(config.fault_log_path()))
            .session_terminator(HostSessionTerminator::new(config.session.exit_code))
            .hard_fault_trigger(ProcessAbort::new(config.debugger.trap_on_hard_fault));
        if config.fault.echo_stderr {
            builder = builder.sink(StderrSink);
        }
        builder.build()
    }

    /// Context a fault raised right now would see.
    pub fn classify(&self) -> ExecutionContext {
        ContextClassifier::new(self.probe.as_ref()).classify()
    }

    /// Report a severe logic fault, terminating the session when that is safe.
    #[track_caller]
    pub fn soft_fault(&self, message: impl Into<String>) -> ! {
        self.raise(message.into(), Severity::SessionFatal, Origin::caller())
    }

    /// Report a fault that must take the whole process down.
    #[track_caller]
    pub fn fatal(&self, message: impl Into<String>) -> ! {
        self.raise(message.into(), Severity::ProcessFatal, Origin::caller())
    }

    fn raise(&self, message: String, severity: Severity, origin: Origin) -> ! {
        enter(FaultPhase::Start);
        let record = FaultRecord::new(message, severity, origin);

        let context = self.classify();
        enter(FaultPhase::Classified);
        let decision = TerminationDecision::for_fault(&context, record.severity());
        enter(FaultPhase::after(decision));

        match decision {
            TerminationDecision::SafeSessionTerminate => {
                self.logger.log(&record);
                // Best effort; termination proceeds either way.
                if self.suspender.request_suspend() == SuspendOutcome::Unsupported {
                    quell_config::log_fault_debug!("Suspend unsupported, terminating anyway");
                }
                enter(FaultPhase::Terminated);
                self.terminator.terminate_session(&record)
            }
            TerminationDecision::HardFault => {
                let record = record.escalate();
                self.logger.log(&record);
                enter(FaultPhase::Terminated);
                self.hard.hard_fault(&record)
            }
        }
    }
}

/// Builder with host defaults for every capability and no sinks.
pub struct FaultHandlerBuilder {
    probe: Probe,
    logger: FaultLogger,
    suspender: Suspender,
    terminator: Terminator,
    hard: HardFault,
}

impl Default for FaultHandlerBuilder {
    fn default() -> Self {
        Self {
            probe: Box::new(HostProbe),
            logger: FaultLogger::new(),
            suspender: Box::new(CooperativeSuspender),
            terminator: Box::new(HostSessionTerminator::default()),
            hard: Box::new(ProcessAbort::default()),
        }
    }
}

impl FaultHandlerBuilder {
    pub fn probe(mut self, probe: impl EnvironmentProbe + Send + Sync + 'static) -> Self {
        self.probe = Box::new(probe);
        self
    }

    pub fn sink(mut self, sink: impl FaultSink + Send + Sync + 'static) -> Self {
        self.logger.push_sink(Box::new(sink));
        self
    }

    pub fn suspender(
        mut self,
        suspender: impl ExecutionSuspender + Send + Sync + 'static,
    ) -> Self {
        self.suspender = Box::new(suspender);
        self
    }

    pub fn session_terminator(
        mut self,
        terminator: impl SessionTerminator + Send + Sync + 'static,
    ) -> Self {
        self.terminator = Box::new(terminator);
        self
    }

    pub fn hard_fault_trigger(
        mut self,
        hard: impl HardFaultTrigger + Send + Sync + 'static,
    ) -> Self {
        self.hard = Box::new(hard);
        self
    }

    pub fn build(self) -> FaultHandler {
        FaultHandler {
            probe: self.probe,
            logger: self.logger,
            suspender: self.suspender,
            terminator: self.terminator,
            hard: self.hard,
        }
    }
}

static HANDLER: OnceCell<FaultHandler> = OnceCell::new();

/// Install the process-wide handler. Fails if one is already in place.
pub fn install(handler: FaultHandler) -> Result<(), FaultHandler> {
    HANDLER.set(handler)
}

/// Process-wide handler, built from the global config on first use.
pub fn handler() -> &'static FaultHandler {
    HANDLER.get_or_init(|| FaultHandler::from_config(&quell_config::config()))
}

/// [`FaultHandler::soft_fault`] on the process-wide handler.
#[track_caller]
pub fn soft_fault(message: impl Into<String>) -> ! {
    handler().soft_fault(message)
}

/// [`FaultHandler::fatal`] on the process-wide handler.
#[track_caller]
pub fn fatal(message: impl Into<String>) -> ! {
    handler().fatal(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_after_decision() {
        assert_eq!(
            FaultPhase::after(TerminationDecision::SafeSessionTerminate),
            FaultPhase::SessionTerminating
        );
        assert_eq!(
            FaultPhase::after(TerminationDecision::HardFault),
            FaultPhase::HardFaulting
        );
    }

    #[test]
    fn test_from_config_sinks() {
        let mut config = Config::default();
        config.fault.echo_stderr = false;
        assert_eq!(FaultHandler::from_config(&config).logger.sink_count(), 1);
        config.fault.echo_stderr = true;
        assert_eq!(FaultHandler::from_config(&config).logger.sink_count(), 2);
    }

    #[test]
    fn test_classify_outside_any_session() {
        // Test runners are not launched by a quell shell.
        if std::env::var(crate::session::ENV_SESSION_ID).is_ok() {
            return;
        }
        let ctx = FaultHandler::builder().build().classify();
        assert!(!ctx.is_sandboxed_session);
        assert!(!ctx.call_originated_from_interpreted_code);
        assert_eq!(ctx.decision(), TerminationDecision::HardFault);
    }
}
