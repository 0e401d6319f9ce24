//! # quell-config
//!
//! Configuration management for Quell.
//!
//! Loads configuration from:
//! 1. `~/.quell/config.toml` (global)
//! 2. `.quell/config.toml` (project-local, overrides global)
//! 3. Environment variables (highest priority)

pub mod logging;
pub mod testing;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::debug;

/// Environment variable naming the operator fault log
pub const ENV_FAULT_LOG: &str = "QUELL_FAULT_LOG";
/// Environment variable overriding the session exit code
pub const ENV_SESSION_EXIT_CODE: &str = "QUELL_SESSION_EXIT_CODE";
/// Environment variable toggling the debugger trap on hard faults
pub const ENV_DEBUG_TRAP: &str = "QUELL_DEBUG_TRAP";
/// Environment variable toggling the stderr fault banner
pub const ENV_ECHO_STDERR: &str = "QUELL_ECHO_STDERR";

/// Exit code a session process uses to tell its shell it was terminated safely.
pub const DEFAULT_SESSION_EXIT_CODE: i32 = 86;

/// Default operator fault log, relative to the home directory
pub const DEFAULT_FAULT_LOG: &str = "~/.quell/faults.log";

/// Global config instance
static CONFIG: Lazy<RwLock<Config>> = Lazy::new(|| RwLock::new(Config::load().unwrap_or_default()));

/// Get a snapshot of the global config.
///
/// Returns an owned copy so fault paths never hold the lock while diverging.
/// A poisoned lock still yields the last written value.
pub fn config() -> Config {
    match CONFIG.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

/// Reload config from disk
pub fn reload() -> Result<(), ConfigError> {
    let new_config = Config::load()?;
    match CONFIG.write() {
        Ok(mut guard) => *guard = new_config,
        Err(poisoned) => *poisoned.into_inner() = new_config,
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub fault: FaultConfig,
    pub session: SessionConfig,
    pub debugger: DebuggerConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load config from standard locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::global_config_path().as_deref(), Path::new(".quell/config.toml"))
    }

    /// Load config from an explicit global and project path, then apply env overrides.
    ///
    /// Missing files are skipped.
    pub fn load_from(global: Option<&Path>, project: &Path) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(global_path) = global {
            if global_path.exists() {
                debug!("Loading global config from {:?}", global_path);
                let contents = std::fs::read_to_string(global_path)?;
                config = toml::from_str(&contents)?;
            }
        }

        if project.exists() {
            debug!("Loading project config from {:?}", project);
            let contents = std::fs::read_to_string(project)?;
            let project_config: ProjectOverrides = toml::from_str(&contents)?;
            config.merge(project_config);
        }

        config.apply_env_overrides();

        Ok(config)
    }

    /// Global config path: ~/.quell/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".quell/config.toml"))
    }

    /// Project config path relative to the working directory
    pub fn project_config_path() -> PathBuf {
        PathBuf::from(".quell/config.toml")
    }

    /// Merge project overrides; only keys present in the project file win.
    fn merge(&mut self, other: ProjectOverrides) {
        if let Some(fault) = other.fault {
            if let Some(log_path) = fault.log_path {
                self.fault.log_path = log_path;
            }
            if let Some(echo) = fault.echo_stderr {
                self.fault.echo_stderr = echo;
            }
        }
        if let Some(session) = other.session {
            if let Some(code) = session.exit_code {
                self.session.exit_code = code;
            }
        }
        if let Some(debugger) = other.debugger {
            if let Some(trap) = debugger.trap_on_hard_fault {
                self.debugger.trap_on_hard_fault = trap;
            }
        }
        if let Some(logging) = other.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
        }
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var(ENV_FAULT_LOG) {
            if !path.is_empty() {
                self.fault.log_path = PathBuf::from(path);
            }
        }
        if let Ok(code) = std::env::var(ENV_SESSION_EXIT_CODE) {
            if let Ok(n) = code.parse() {
                self.session.exit_code = n;
            }
        }
        if let Ok(trap) = std::env::var(ENV_DEBUG_TRAP) {
            if let Some(flag) = parse_flag(&trap) {
                self.debugger.trap_on_hard_fault = flag;
            }
        }
        if let Ok(echo) = std::env::var(ENV_ECHO_STDERR) {
            if let Some(flag) = parse_flag(&echo) {
                self.fault.echo_stderr = flag;
            }
        }
    }

    /// Operator fault log path with a leading `~/` expanded
    pub fn fault_log_path(&self) -> PathBuf {
        expand_home(&self.fault.log_path)
    }

    /// Generate default config TOML string
    pub fn default_toml() -> Result<String, ConfigError> {
        Config::default().to_toml()
    }

    /// Render this config as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Expand a leading `~/` against the home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

/// Operator fault log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultConfig {
    /// Durable, operator-facing fault log (one JSON record per line)
    pub log_path: PathBuf,
    /// Also print a highlighted banner on stderr
    pub echo_stderr: bool,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from(DEFAULT_FAULT_LOG),
            echo_stderr: true,
        }
    }
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Exit code of a session process terminated by a soft fault
    pub exit_code: i32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            exit_code: DEFAULT_SESSION_EXIT_CODE,
        }
    }
}

/// Debugger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebuggerConfig {
    /// Raise SIGTRAP before aborting when a debugger is attached
    pub trap_on_hard_fault: bool,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            trap_on_hard_fault: true,
        }
    }
}

/// Diagnostic logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level filter when neither QUELL_LOG nor RUST_LOG is set
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ProjectOverrides {
    fault: Option<FaultOverrides>,
    session: Option<SessionOverrides>,
    debugger: Option<DebuggerOverrides>,
    logging: Option<LoggingOverrides>,
}

#[derive(Debug, Default, Deserialize)]
struct FaultOverrides {
    log_path: Option<PathBuf>,
    echo_stderr: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct SessionOverrides {
    exit_code: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
struct DebuggerOverrides {
    trap_on_hard_fault: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingOverrides {
    level: Option<String>,
}
