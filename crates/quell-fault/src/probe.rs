//! Host implementation of [`EnvironmentProbe`].

use std::env::VarError;

use crate::context::EnvironmentProbe;
use crate::error::ProbeError;
use crate::script;
use crate::session::{self, ENV_SESSION_ID, ENV_SHELL_PID};

/// Reads the real process state.
///
/// - session: an in-process boundary on this thread, or `QUELL_SESSION_ID`
/// - shell: for in-process sessions, whether this build can unwind to the
///   boundary; for process sessions, whether `QUELL_SHELL_PID` names a live
///   parent process
/// - interpreted origin: an interpreted frame on this thread
#[derive(Debug, Default, Clone, Copy)]
pub struct HostProbe;

impl EnvironmentProbe for HostProbe {
    fn is_sandboxed_session(&self) -> Result<bool, ProbeError> {
        if session::current_boundary().is_some() {
            return Ok(true);
        }
        match std::env::var(ENV_SESSION_ID) {
            Ok(id) => Ok(!id.trim().is_empty()),
            Err(VarError::NotPresent) => Ok(false),
            Err(VarError::NotUnicode(raw)) => Err(ProbeError::InvalidVar {
                name: ENV_SESSION_ID,
                value: raw.to_string_lossy().into_owned(),
            }),
        }
    }

    fn host_shell_present(&self) -> Result<bool, ProbeError> {
        if session::current_boundary().is_some() {
            return Ok(cfg!(panic = "unwind"));
        }
        let raw =
            std::env::var(ENV_SHELL_PID).map_err(|_| ProbeError::MissingVar(ENV_SHELL_PID))?;
        let pid: i32 = raw.trim().parse().map_err(|_| ProbeError::InvalidVar {
            name: ENV_SHELL_PID,
            value: raw.clone(),
        })?;
        if pid <= 0 {
            return Err(ProbeError::InvalidVar {
                name: ENV_SHELL_PID,
                value: raw,
            });
        }
        shell_is_parent_and_alive(pid)
    }

    fn call_from_interpreted_code(&self) -> Result<bool, ProbeError> {
        Ok(script::interpreted_depth() > 0)
    }
}

#[cfg(unix)]
fn shell_is_parent_and_alive(pid: i32) -> Result<bool, ProbeError> {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::{getppid, Pid};

    let shell = Pid::from_raw(pid);
    // A reparented session (shell died, init adopted us) no longer has a shell.
    if getppid() != shell {
        return Ok(false);
    }
    match kill(shell, None) {
        Ok(()) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(not(unix))]
fn shell_is_parent_and_alive(_pid: i32) -> Result<bool, ProbeError> {
    Err(ProbeError::Unavailable(
        "shell liveness check needs a unix host".to_string(),
    ))
}
