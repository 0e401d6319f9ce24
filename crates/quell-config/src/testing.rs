//! Test environment abstraction for isolated testing.
//!
//! Provides `TestEnvironment` to manage:
//! - An isolated operator fault log
//! - A project directory with its own `.quell/config.toml`
//! - Environment variables for spawning session processes
//!
//! # Usage
//!
//! ```ignore
//! use quell_config::testing::TestEnvironment;
//!
//! #[test]
//! fn test_something() {
//!     let env = TestEnvironment::new().unwrap();
//!     // env.fault_log and env.project_root are isolated per test
//! }
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::TempDir;

use crate::{ENV_DEBUG_TRAP, ENV_ECHO_STDERR, ENV_FAULT_LOG};

/// Atomic counter for unique test IDs
static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Isolated test environment with unique paths
pub struct TestEnvironment {
    /// Temporary directory (dropped on cleanup)
    _temp_dir: TempDir,
    /// Operator fault log for this test
    pub fault_log: PathBuf,
    /// Project root for the test
    pub project_root: PathBuf,
    /// Unique test ID
    pub test_id: u32,
}

impl TestEnvironment {
    /// Create a new isolated test environment
    pub fn new() -> anyhow::Result<Self> {
        let test_id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();

        let project_root = root.join("project");
        std::fs::create_dir_all(project_root.join(".quell"))?;

        let fault_log = root.join(format!("faults-{}.log", test_id));

        Ok(Self {
            _temp_dir: temp_dir,
            fault_log,
            project_root,
            test_id,
        })
    }

    /// Project-local config file path
    pub fn project_config_path(&self) -> PathBuf {
        self.project_root.join(".quell").join("config.toml")
    }

    /// Write a project-local config file
    pub fn write_project_config(&self, contents: &str) -> anyhow::Result<PathBuf> {
        let path = self.project_config_path();
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    /// Read the fault log, empty if nothing was written yet
    pub fn read_fault_log(&self) -> String {
        std::fs::read_to_string(&self.fault_log).unwrap_or_default()
    }

    /// Environment variables for spawning a quell process against this environment.
    ///
    /// The debugger trap is disabled so a traced test runner never stops on a
    /// deliberate hard fault.
    pub fn process_env(&self) -> Vec<(String, String)> {
        vec![
            (
                ENV_FAULT_LOG.to_string(),
                self.fault_log.to_string_lossy().into_owned(),
            ),
            (ENV_DEBUG_TRAP.to_string(), "0".to_string()),
            (ENV_ECHO_STDERR.to_string(), "1".to_string()),
        ]
    }
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::new().expect("Failed to create test environment")
    }
}
