//! # quell doctor
//!
//! Reports how a fault raised at this call site would be handled: which of
//! the three isolation conditions hold, where the operator log goes, and
//! whether a hard fault would trap into an attached debugger.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use anyhow::Result;
use console::{style, Emoji};
use quell_config::Config;
use quell_fault::{
    debugger_attached, ContextClassifier, HostProbe, TerminationDecision, ENV_SESSION_ID,
    ENV_SHELL_PID,
};

static CHECK: Emoji<'_, '_> = Emoji("✔ ", "[ok] ");
static CROSS: Emoji<'_, '_> = Emoji("✘ ", "[!!] ");
static WARN_ICON: Emoji<'_, '_> = Emoji("⚠ ", "[??] ");
static DOT: Emoji<'_, '_> = Emoji("● ", "[-] ");

struct DiagResult {
    passed: u32,
    warned: u32,
    failed: u32,
}

impl DiagResult {
    fn new() -> Self {
        Self {
            passed: 0,
            warned: 0,
            failed: 0,
        }
    }

    fn pass(&mut self, msg: &str) {
        self.passed += 1;
        eprintln!("  {} {}", CHECK, style(msg).green());
    }

    fn warn(&mut self, msg: &str) {
        self.warned += 1;
        eprintln!("  {} {}", WARN_ICON, style(msg).yellow());
    }

    fn fail(&mut self, msg: &str) {
        self.failed += 1;
        eprintln!("  {} {}", CROSS, style(msg).red());
    }

    fn info(&self, msg: &str) {
        eprintln!("  {} {}", DOT, style(msg).dim());
    }
}

pub fn cmd_doctor(config: &Config) -> Result<()> {
    eprintln!();
    eprintln!("{}", style("Quell Doctor").bold().cyan());
    eprintln!("{}", style("─".repeat(40)).dim());

    let mut d = DiagResult::new();

    eprintln!();
    eprintln!("{}", style("Config").bold());
    check_config(&mut d);

    eprintln!();
    eprintln!("{}", style("Session context").bold());
    check_context(&mut d);

    eprintln!();
    eprintln!("{}", style("Fault log").bold());
    check_fault_log(&config.fault_log_path(), &mut d);

    eprintln!();
    eprintln!("{}", style("Hard faults").bold());
    check_hard_fault(config, &mut d);

    eprintln!();
    eprintln!("{}", style("─".repeat(40)).dim());
    eprintln!(
        "  {} passed, {} warnings, {} errors",
        style(d.passed).green().bold(),
        style(d.warned).yellow().bold(),
        style(d.failed).red().bold(),
    );
    eprintln!();

    if d.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn check_config(d: &mut DiagResult) {
    match Config::global_config_path() {
        Some(path) if path.exists() => d.pass(&format!("Global config: {}", path.display())),
        Some(path) => d.info(&format!("No global config at {}", path.display())),
        None => d.warn("Cannot determine home directory"),
    }

    let project = Config::project_config_path();
    if project.exists() {
        d.pass(&format!("Project config: {}", project.display()));
    }

    match Config::load() {
        Ok(_) => d.pass("Config loads successfully"),
        Err(e) => d.fail(&format!("Config load failed: {}", e)),
    }
}

fn check_context(d: &mut DiagResult) {
    let probe = HostProbe;
    let context = ContextClassifier::new(&probe).classify();

    if context.is_sandboxed_session {
        d.pass(&format!("Running as a session (${} set)", ENV_SESSION_ID));
    } else {
        d.warn(&format!("Not a session (${} unset)", ENV_SESSION_ID));
    }

    if context.host_shell_present {
        d.pass("Host shell is alive and is our parent");
    } else {
        d.warn(&format!("No live host shell (${})", ENV_SHELL_PID));
    }

    // doctor itself never runs inside a script frame
    d.info("Interpreted origin is decided per fault at the call site");

    let scripted = quell_fault::ExecutionContext {
        call_originated_from_interpreted_code: true,
        ..context
    };
    match scripted.decision() {
        TerminationDecision::SafeSessionTerminate => {
            d.pass("A script fault here would end only the session")
        }
        TerminationDecision::HardFault => {
            d.warn("A script fault here would abort the whole process")
        }
    }
}

/// Read-only: an existing log is opened without `create`, a missing one is
/// only checked for a writable parent.
fn check_fault_log(path: &Path, d: &mut DiagResult) {
    if !path.exists() {
        let dir = nearest_existing_dir(path);
        match dir_writable(&dir) {
            Ok(()) => {
                d.pass(&format!("Created on first fault: {}", path.display()));
                d.info("No faults recorded");
            }
            Err(e) => d.fail(&format!(
                "Cannot create {} ({} not writable: {})",
                path.display(),
                dir.display(),
                e
            )),
        }
        return;
    }

    if let Err(e) = OpenOptions::new().append(true).open(path) {
        d.fail(&format!("Cannot open {}: {}", path.display(), e));
        return;
    }
    d.pass(&format!("Writable: {}", path.display()));

    match quell_fault::read_fault_log(path) {
        Ok(entries) if entries.is_empty() => d.info("No faults recorded"),
        Ok(entries) => d.info(&format!("{} fault(s) recorded", entries.len())),
        Err(e) => d.warn(&format!("Cannot read {}: {}", path.display(), e)),
    }
}

/// Closest ancestor directory that exists; `FileSink` creates the rest.
fn nearest_existing_dir(path: &Path) -> PathBuf {
    path.ancestors()
        .skip(1)
        .map(|p| if p.as_os_str().is_empty() { Path::new(".") } else { p })
        .find(|p| p.is_dir())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf()
}

#[cfg(unix)]
fn dir_writable(dir: &Path) -> Result<(), String> {
    use nix::unistd::{access, AccessFlags};
    access(dir, AccessFlags::W_OK | AccessFlags::X_OK).map_err(|e| e.to_string())
}

#[cfg(not(unix))]
fn dir_writable(dir: &Path) -> Result<(), String> {
    match std::fs::metadata(dir) {
        Ok(meta) if meta.permissions().readonly() => Err("read-only".to_string()),
        Ok(_) => Ok(()),
        Err(e) => Err(e.to_string()),
    }
}

fn check_hard_fault(config: &Config, d: &mut DiagResult) {
    if !cfg!(panic = "unwind") {
        d.info("Built with panic=abort: in-process sessions fall back to hard faults");
    }

    match (config.debugger.trap_on_hard_fault, debugger_attached()) {
        (true, true) => d.warn("Debugger attached: hard faults will trap before aborting"),
        (true, false) => d.pass("No debugger attached; hard faults abort directly"),
        (false, _) => d.info("Debugger trap disabled"),
    }
}
