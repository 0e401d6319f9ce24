//! # quell run
//!
//! Hosts a child process as a session. The child learns its session id and
//! the shell's pid from the environment, which is what lets its fault
//! handler choose session-scoped termination. The shell outlives the child
//! and reports how the session ended.

use std::process::{Command, ExitStatus};

use anyhow::{Context, Result};
use console::style;
use quell_config::{log_shell_info, log_shell_warn, Config};
use quell_fault::{FaultLogEntry, ENV_SESSION_ID, ENV_SHELL_PID};

/// How a hosted session ended.
#[derive(Debug)]
pub enum SessionExit {
    Clean {
        session: String,
    },
    /// The session ended itself after a soft fault.
    SoftFaulted {
        session: String,
        fault: Option<FaultLogEntry>,
    },
    Failed {
        session: String,
        code: i32,
    },
    /// Killed by a signal, including a hard fault's abort.
    Crashed {
        session: String,
        signal: i32,
        fault: Option<FaultLogEntry>,
    },
}

impl SessionExit {
    /// Exit code for the shell itself. A soft-faulted session is handled,
    /// so the shell exits cleanly.
    pub fn shell_exit_code(&self) -> i32 {
        match self {
            SessionExit::Clean { .. } | SessionExit::SoftFaulted { .. } => 0,
            SessionExit::Failed { code, .. } => *code,
            SessionExit::Crashed { signal, .. } => 128 + signal,
        }
    }
}

enum RawExit {
    Code(i32),
    Signal(i32),
}

fn raw_exit(status: ExitStatus) -> RawExit {
    if let Some(code) = status.code() {
        return RawExit::Code(code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return RawExit::Signal(signal);
        }
    }
    RawExit::Code(1)
}

pub fn run_session(command: &[String], name: Option<&str>, config: &Config) -> Result<SessionExit> {
    let (program, args) = command.split_first().context("No command given")?;
    let session = name
        .map(str::to_string)
        .unwrap_or_else(|| format!("session-{}", uuid::Uuid::new_v4().simple()));

    log_shell_info!(
        "Starting session",
        session = session.as_str(),
        program = program.as_str()
    );

    let status = Command::new(program)
        .args(args)
        .env(ENV_SESSION_ID, &session)
        .env(ENV_SHELL_PID, std::process::id().to_string())
        .status()
        .with_context(|| format!("Failed to start session command: {}", program))?;

    let exit = classify_exit(
        raw_exit(status),
        session,
        config.session.exit_code,
        |id| last_fault(config, id),
    );

    if matches!(exit, SessionExit::Crashed { .. }) {
        log_shell_warn!("Session crashed", code = exit.shell_exit_code());
    } else {
        log_shell_info!("Session ended", code = exit.shell_exit_code());
    }
    Ok(exit)
}

fn classify_exit(
    raw: RawExit,
    session: String,
    session_exit_code: i32,
    fault_for: impl FnOnce(&str) -> Option<FaultLogEntry>,
) -> SessionExit {
    match raw {
        RawExit::Code(0) => SessionExit::Clean { session },
        RawExit::Code(code) if code == session_exit_code => {
            let fault = fault_for(&session);
            SessionExit::SoftFaulted { session, fault }
        }
        RawExit::Code(code) => SessionExit::Failed { session, code },
        RawExit::Signal(signal) => {
            let fault = fault_for(&session);
            SessionExit::Crashed {
                session,
                signal,
                fault,
            }
        }
    }
}

/// Most recent fault the session wrote to the operator log.
fn last_fault(config: &Config, session: &str) -> Option<FaultLogEntry> {
    let path = config.fault_log_path();
    match quell_fault::read_fault_log(&path) {
        Ok(entries) => entries
            .into_iter()
            .rev()
            .find(|e| e.session.as_deref() == Some(session)),
        Err(e) => {
            log_shell_warn!(
                "Cannot read fault log",
                path = tracing::field::display(path.display()),
                error = tracing::field::display(&e)
            );
            None
        }
    }
}

pub fn report(exit: &SessionExit) {
    match exit {
        SessionExit::Clean { session } => {
            println!("{} session '{}' exited cleanly", style("[shell]").dim(), session);
        }
        SessionExit::SoftFaulted { session, fault } => {
            println!(
                "{} session '{}' {}",
                style("[shell]").dim(),
                session,
                style("terminated after a soft fault").yellow().bold()
            );
            print_fault(fault.as_ref());
            println!("{} shell still running", style("[shell]").dim());
        }
        SessionExit::Failed { session, code } => {
            println!(
                "{} session '{}' exited with code {}",
                style("[shell]").dim(),
                session,
                style(code).red()
            );
        }
        SessionExit::Crashed {
            session,
            signal,
            fault,
        } => {
            println!(
                "{} session '{}' {} ({})",
                style("[shell]").dim(),
                session,
                style("crashed").red().bold(),
                signal_name(*signal)
            );
            print_fault(fault.as_ref());
        }
    }
}

fn print_fault(fault: Option<&FaultLogEntry>) {
    if let Some(fault) = fault {
        println!(
            "        {} at {}: {}",
            fault.severity.as_str(),
            fault.origin,
            fault.message
        );
    }
}

#[cfg(unix)]
fn signal_name(signal: i32) -> String {
    match nix::sys::signal::Signal::try_from(signal) {
        Ok(sig) => sig.as_str().to_string(),
        Err(_) => format!("signal {}", signal),
    }
}

#[cfg(not(unix))]
fn signal_name(signal: i32) -> String {
    format!("signal {}", signal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quell_fault::{FaultRecord, Origin, Severity};

    fn entry(session: &str) -> FaultLogEntry {
        let record = FaultRecord::new("door has no frame", Severity::SessionFatal, Origin::caller());
        FaultLogEntry {
            session: Some(session.to_string()),
            ..FaultLogEntry::from_record(&record)
        }
    }

    #[test]
    fn test_clean_exit_never_reads_the_log() {
        let exit = classify_exit(RawExit::Code(0), "s".into(), 86, |_| {
            panic!("log read for a clean exit")
        });
        assert!(matches!(exit, SessionExit::Clean { .. }));
        assert_eq!(exit.shell_exit_code(), 0);
    }

    #[test]
    fn test_session_exit_code_is_a_soft_fault() {
        let exit = classify_exit(RawExit::Code(86), "s".into(), 86, |id| Some(entry(id)));
        match &exit {
            SessionExit::SoftFaulted { session, fault } => {
                assert_eq!(session, "s");
                let fault = fault.as_ref().expect("fault entry");
                assert_eq!(fault.message, "door has no frame");
                assert_eq!(fault.session.as_deref(), Some("s"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(exit.shell_exit_code(), 0);
    }

    #[test]
    fn test_other_codes_propagate() {
        let exit = classify_exit(RawExit::Code(3), "s".into(), 86, |_| None);
        assert!(matches!(exit, SessionExit::Failed { code: 3, .. }));
        assert_eq!(exit.shell_exit_code(), 3);
    }

    #[test]
    fn test_configured_exit_code_is_honoured() {
        let exit = classify_exit(RawExit::Code(86), "s".into(), 70, |_| None);
        assert!(matches!(exit, SessionExit::Failed { code: 86, .. }));

        let exit = classify_exit(RawExit::Code(70), "s".into(), 70, |_| None);
        assert!(matches!(exit, SessionExit::SoftFaulted { fault: None, .. }));
    }

    #[test]
    fn test_signal_is_a_crash() {
        let exit = classify_exit(RawExit::Signal(6), "s".into(), 86, |_| None);
        assert!(matches!(exit, SessionExit::Crashed { signal: 6, .. }));
        assert_eq!(exit.shell_exit_code(), 134);
    }

    #[cfg(unix)]
    #[test]
    fn test_signal_names() {
        assert_eq!(signal_name(6), "SIGABRT");
        assert_eq!(signal_name(999), "signal 999");
    }
}
