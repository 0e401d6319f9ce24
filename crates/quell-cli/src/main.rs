//! # quell CLI
//!
//! Host shell for Quell sessions, plus diagnostics over the operator fault log.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use quell_config::logging::{init_logging, LogLevel};
use quell_config::Config;

mod demo;
mod doctor;
mod shell;

/// Quell - scoped fault isolation for sandboxed sessions
#[derive(Parser)]
#[command(name = "quell")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a command as a session; this process stays up as its shell
    Run {
        /// Session id handed to the child (default: generated)
        #[arg(long)]
        name: Option<String>,

        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },

    /// Show how a fault raised here would be handled
    Doctor,

    /// Show the most recent operator fault records
    Log {
        #[arg(short = 'n', long, default_value_t = 10)]
        tail: usize,

        /// Read this log instead of the configured one
        #[arg(long)]
        path: Option<PathBuf>,
    },

    /// Configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Run a scripted demo session whose third step faults
    Demo {
        /// Fault from compiled code outside any script frame
        #[arg(long)]
        native: bool,

        /// Host the session in this process
        #[arg(long)]
        in_process: bool,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,
    /// Print config file locations
    Path,
    /// Write a default config file
    Init {
        /// Write ~/.quell/config.toml instead of .quell/config.toml
        #[arg(long)]
        global: bool,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let config = quell_config::config();
    init_logging(LogLevel::parse(&config.logging.level));

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { name, command } => {
            let exit = shell::run_session(&command, name.as_deref(), &config)?;
            shell::report(&exit);
            std::process::exit(exit.shell_exit_code());
        }
        Commands::Doctor => doctor::cmd_doctor(&config),
        Commands::Log { tail, path } => {
            cmd_log(&path.unwrap_or_else(|| config.fault_log_path()), tail)
        }
        Commands::Config { command } => cmd_config(command, &config),
        Commands::Demo { native, in_process } => demo::run_demo(native, in_process),
    }
}

fn cmd_log(path: &std::path::Path, tail: usize) -> Result<()> {
    let entries = quell_fault::read_fault_log(path)
        .with_context(|| format!("Failed to read fault log: {}", path.display()))?;

    if entries.is_empty() {
        println!("No faults recorded in {}", path.display());
        return Ok(());
    }

    let skip = entries.len().saturating_sub(tail);
    for entry in &entries[skip..] {
        let severity = match entry.severity {
            quell_fault::Severity::ProcessFatal => style(entry.severity.as_str()).red().bold(),
            quell_fault::Severity::SessionFatal => style(entry.severity.as_str()).yellow().bold(),
            quell_fault::Severity::Recoverable => style(entry.severity.as_str()).dim(),
        };
        println!(
            "{} {} pid={} session={} {}",
            style(entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3f")).dim(),
            severity,
            entry.pid,
            entry.session.as_deref().unwrap_or("-"),
            style(&entry.origin).dim(),
        );
        println!("    {}", entry.message);
    }
    Ok(())
}

fn cmd_config(command: ConfigCommands, config: &Config) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            print!("{}", config.to_toml()?);
        }
        ConfigCommands::Path => {
            match Config::global_config_path() {
                Some(p) => println!("Global:    {}", p.display()),
                None => println!("Global:    (no home directory)"),
            }
            println!("Project:   {}", Config::project_config_path().display());
            println!("Fault log: {}", config.fault_log_path().display());
        }
        ConfigCommands::Init { global, force } => {
            let path = if global {
                Config::global_config_path().context("Cannot determine home directory")?
            } else {
                Config::project_config_path()
            };
            if path.exists() && !force {
                anyhow::bail!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                );
            }
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            std::fs::write(&path, Config::default_toml()?)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}
