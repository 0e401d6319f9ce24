//! Hard fault: unconditional process abort.
//!
//! When a native debugger is attached and trapping is enabled, `SIGTRAP` is
//! raised first so the debugger stops at the fault. Resuming past the trap
//! still aborts.

use std::io::Write;

use crate::record::FaultRecord;

/// Aborts the process. Never returns.
pub trait HardFaultTrigger {
    fn hard_fault(&self, record: &FaultRecord) -> !;
}

#[derive(Debug, Clone, Copy)]
pub struct ProcessAbort {
    trap_under_debugger: bool,
}

impl ProcessAbort {
    pub fn new(trap_under_debugger: bool) -> Self {
        Self {
            trap_under_debugger,
        }
    }

    pub fn traps_under_debugger(&self) -> bool {
        self.trap_under_debugger
    }
}

impl Default for ProcessAbort {
    fn default() -> Self {
        Self::new(true)
    }
}

impl HardFaultTrigger for ProcessAbort {
    fn hard_fault(&self, record: &FaultRecord) -> ! {
        let _ = std::io::stdout().flush();
        let _ = std::io::stderr().flush();

        if self.trap_under_debugger && debugger_attached() {
            quell_config::log_fault_error!(
                "Debugger attached, trapping before abort",
                origin = tracing::field::display(record.origin())
            );
            trap();
        }

        std::process::abort()
    }
}

#[cfg(unix)]
fn trap() {
    use nix::sys::signal::{raise, Signal};
    if let Err(e) = raise(Signal::SIGTRAP) {
        quell_config::log_fault_warn!("SIGTRAP failed", error = tracing::field::display(&e));
    }
}

#[cfg(not(unix))]
fn trap() {}

/// Whether a native debugger is tracing this process.
///
/// Linux reads `TracerPid` from `/proc/self/status`; other platforms report
/// not attached, which falls through to a plain abort.
pub fn debugger_attached() -> bool {
    #[cfg(target_os = "linux")]
    {
        match std::fs::read_to_string("/proc/self/status") {
            Ok(status) => tracer_pid(&status).map(|pid| pid != 0).unwrap_or(false),
            Err(_) => false,
        }
    }

    #[cfg(not(target_os = "linux"))]
    {
        false
    }
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn tracer_pid(status: &str) -> Option<u32> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("TracerPid:"))
        .and_then(|v| v.trim().parse().ok())
}
