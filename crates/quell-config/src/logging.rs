//! Structured logging utilities for Quell components.
//!
//! Provides consistent logging with component prefixes and structured fields.
//! This is diagnostic output only; operator-facing fault records go to the
//! fault log owned by `quell-fault`.
//!
//! # Usage
//!
//! ```ignore
//! use quell_config::logging::*;
//!
//! log_fault_error!("Fault raised", origin = "src/lib.rs:10:5");
//! log_shell_info!("Session exited", code = 0);
//! ```

/// Component identifiers for log filtering
pub struct Component;

impl Component {
    pub const FAULT: &'static str = "FAULT";
    pub const SESSION: &'static str = "SESSION";
    pub const SHELL: &'static str = "SHELL";
    pub const SCRIPT: &'static str = "SCRIPT";
}

/// Log levels for runtime configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Parse a level name, falling back to `Warn`
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => LogLevel::Error,
            "info" => LogLevel::Info,
            "debug" => LogLevel::Debug,
            "trace" => LogLevel::Trace,
            _ => LogLevel::Warn,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

// === FAULT logging macros ===

#[macro_export]
macro_rules! log_fault_error {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::error!(component = "FAULT", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_fault_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "FAULT", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_fault_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "FAULT", $($key = $value,)* $msg)
    };
}

// === SESSION logging macros ===

#[macro_export]
macro_rules! log_session_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = "SESSION", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_session_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "SESSION", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_session_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "SESSION", $($key = $value,)* $msg)
    };
}

// === SHELL logging macros ===

#[macro_export]
macro_rules! log_shell_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = "SHELL", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_shell_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "SHELL", $($key = $value,)* $msg)
    };
}

// === SCRIPT logging macros ===

#[macro_export]
macro_rules! log_script_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "SCRIPT", $($key = $value,)* $msg)
    };
}

/// Initialize logging with the given level filter.
/// Call this once at application startup.
///
/// `QUELL_LOG` takes precedence over `RUST_LOG`; both override `level`.
pub fn init_logging(level: LogLevel) {
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_env("QUELL_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    // A second init (tests, embedding hosts) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
