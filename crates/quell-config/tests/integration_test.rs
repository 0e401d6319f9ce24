//! Integration tests for quell-config
//!
//! These tests verify the full config loading pipeline with real file system operations.

use std::path::{Path, PathBuf};
use tempfile::tempdir;

/// Test config loading from real global config file
#[test]
fn test_load_global_config_from_file() {
    let temp = tempdir().unwrap();
    let quell_dir = temp.path().join(".quell");
    std::fs::create_dir_all(&quell_dir).unwrap();

    let config_content = r#"
[fault]
log_path = "/var/log/quell/faults.log"
echo_stderr = false

[session]
exit_code = 42

[debugger]
trap_on_hard_fault = false
"#;
    let global = quell_dir.join("config.toml");
    std::fs::write(&global, config_content).unwrap();

    let config =
        quell_config::Config::load_from(Some(&global), &temp.path().join("missing.toml")).unwrap();

    assert_eq!(
        config.fault.log_path,
        PathBuf::from("/var/log/quell/faults.log")
    );
    assert!(!config.fault.echo_stderr);
    assert_eq!(config.session.exit_code, 42);
    assert!(!config.debugger.trap_on_hard_fault);
    assert_eq!(config.logging.level, "warn");
}

/// Test config hierarchy: project config overrides global
#[test]
fn test_config_hierarchy_project_overrides_global() {
    let temp = tempdir().unwrap();

    let global_dir = temp.path().join("global/.quell");
    std::fs::create_dir_all(&global_dir).unwrap();
    let global = global_dir.join("config.toml");
    std::fs::write(
        &global,
        r#"
[fault]
log_path = "/global/faults.log"

[session]
exit_code = 10
"#,
    )
    .unwrap();

    let project_dir = temp.path().join("project/.quell");
    std::fs::create_dir_all(&project_dir).unwrap();
    let project = project_dir.join("config.toml");
    std::fs::write(
        &project,
        r#"
[session]
exit_code = 77
"#,
    )
    .unwrap();

    let config = quell_config::Config::load_from(Some(&global), &project).unwrap();

    // Project wins where it speaks, global survives elsewhere
    assert_eq!(config.session.exit_code, 77);
    assert_eq!(config.fault.log_path, PathBuf::from("/global/faults.log"));
}

/// Test that missing config files yield defaults
#[test]
fn test_missing_files_yield_defaults() {
    let temp = tempdir().unwrap();
    let config = quell_config::Config::load_from(
        Some(&temp.path().join("nope.toml")),
        &temp.path().join("also-nope.toml"),
    )
    .unwrap();
    assert_eq!(
        config.session.exit_code,
        quell_config::DEFAULT_SESSION_EXIT_CODE
    );
}

/// Test that a malformed file surfaces a parse error
#[test]
fn test_malformed_global_config_is_an_error() {
    let temp = tempdir().unwrap();
    let global = temp.path().join("config.toml");
    std::fs::write(&global, "[session\nexit_code = ").unwrap();

    let result = quell_config::Config::load_from(Some(&global), Path::new("/nonexistent/x.toml"));
    assert!(matches!(result, Err(quell_config::ConfigError::Toml(_))));
}

/// Test the test environment writes a project config the loader accepts
#[test]
fn test_test_environment_project_config_loads() {
    let env = quell_config::testing::TestEnvironment::new().unwrap();
    let project = env
        .write_project_config("[debugger]\ntrap_on_hard_fault = false\n")
        .unwrap();

    let config = quell_config::Config::load_from(None, &project).unwrap();
    assert!(!config.debugger.trap_on_hard_fault);
}
