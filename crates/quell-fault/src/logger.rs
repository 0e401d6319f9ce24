//! Operator-facing fault log.
//!
//! Routine diagnostics go through `tracing`. Faults additionally go to one or
//! more [`FaultSink`]s that an operator actually reads: an append-only JSON
//! lines file that is synced before the process can die, and a banner on
//! stderr. A failing sink never stops the fault from proceeding.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::TerminationDecision;
use crate::error::SinkError;
use crate::record::{FaultRecord, Severity};
use crate::session;

/// One line of the operator fault log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultLogEntry {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub origin: String,
    pub message: String,
    pub decision: Option<TerminationDecision>,
    pub pid: u32,
    pub session: Option<String>,
}

impl FaultLogEntry {
    pub fn from_record(record: &FaultRecord) -> Self {
        Self {
            timestamp: record.timestamp(),
            severity: record.severity(),
            origin: record.origin().to_string(),
            message: record.message().to_string(),
            decision: record.severity().decision(),
            pid: std::process::id(),
            session: session::current_session_id(),
        }
    }
}

/// An append target for fault records.
pub trait FaultSink {
    fn append(&self, entry: &FaultLogEntry) -> Result<(), SinkError>;
}

/// Append-only JSON lines file, synced on every record.
pub struct FileSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FaultSink for FileSink {
    fn append(&self, entry: &FaultLogEntry) -> Result<(), SinkError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let _guard = lock_ignoring_poison(&self.lock);
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        // Reopened per record so a rotated or deleted log is recreated.
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.sync_data()?;
        Ok(())
    }
}

/// Highlighted banner on stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrSink;

impl FaultSink for StderrSink {
    fn append(&self, entry: &FaultLogEntry) -> Result<(), SinkError> {
        let rule = "=".repeat(72);
        let verdict = match entry.decision {
            Some(TerminationDecision::SafeSessionTerminate) => "session terminated",
            Some(TerminationDecision::HardFault) => "process aborting",
            None => "recoverable",
        };
        let mut err = std::io::stderr().lock();
        writeln!(err, "{rule}")?;
        writeln!(err, "FAULT ({verdict}): {}", entry.message)?;
        writeln!(err, "  at {}  [{}]", entry.origin, entry.timestamp.to_rfc3339())?;
        if let Some(session) = &entry.session {
            writeln!(err, "  session {session}")?;
        }
        writeln!(err, "{rule}")?;
        err.flush()?;
        Ok(())
    }
}

/// In-memory sink, shared between clones.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    entries: Arc<Mutex<Vec<FaultLogEntry>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<FaultLogEntry> {
        lock_ignoring_poison(&self.entries).clone()
    }

    pub fn len(&self) -> usize {
        lock_ignoring_poison(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FaultSink for MemorySink {
    fn append(&self, entry: &FaultLogEntry) -> Result<(), SinkError> {
        lock_ignoring_poison(&self.entries).push(entry.clone());
        Ok(())
    }
}

type BoxedSink = Box<dyn FaultSink + Send + Sync>;

/// Writes every fault to each configured sink exactly once.
#[derive(Default)]
pub struct FaultLogger {
    sinks: Vec<BoxedSink>,
}

impl FaultLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: impl FaultSink + Send + Sync + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn push_sink(&mut self, sink: BoxedSink) {
        self.sinks.push(sink);
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Log a fault. Sink errors and panics are reported through tracing and
    /// otherwise ignored.
    pub fn log(&self, record: &FaultRecord) {
        let entry = FaultLogEntry::from_record(record);
        quell_config::log_fault_error!(
            "Fault raised",
            severity = record.severity().as_str(),
            origin = entry.origin.as_str(),
            message = record.message()
        );
        for sink in &self.sinks {
            match catch_unwind(AssertUnwindSafe(|| sink.append(&entry))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    quell_config::log_fault_warn!(
                        "Fault sink unavailable",
                        error = tracing::field::display(&e)
                    );
                }
                // A panicking sink must not replace the fault being reported.
                Err(_) => {
                    quell_config::log_fault_warn!("Fault sink panicked");
                }
            }
        }
    }
}

/// Read an operator fault log back, skipping lines that do not parse.
pub fn read_fault_log(path: &Path) -> Result<Vec<FaultLogEntry>, SinkError> {
    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut entries = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                quell_config::log_fault_debug!(
                    "Skipping corrupt fault log line",
                    error = tracing::field::display(&e)
                );
            }
        }
    }
    Ok(entries)
}

fn lock_ignoring_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Origin;
    use tempfile::tempdir;

    struct Broken;

    impl FaultSink for Broken {
        fn append(&self, _entry: &FaultLogEntry) -> Result<(), SinkError> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk gone").into())
        }
    }

    #[test]
    fn test_file_sink_appends_one_line_per_fault() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/faults.log");
        let logger = FaultLogger::new().with_sink(FileSink::new(&path));

        logger.log(&FaultRecord::new("first", Severity::SessionFatal, Origin::caller()));
        logger.log(&FaultRecord::new("second", Severity::ProcessFatal, Origin::caller()));

        let entries = read_fault_log(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "first");
        assert_eq!(
            entries[0].decision,
            Some(TerminationDecision::SafeSessionTerminate)
        );
        assert_eq!(entries[1].severity, Severity::ProcessFatal);
        assert_eq!(entries[1].pid, std::process::id());
    }

    #[test]
    fn test_broken_sink_does_not_block_others() {
        let memory = MemorySink::new();
        let logger = FaultLogger::new()
            .with_sink(Broken)
            .with_sink(memory.clone());

        logger.log(&FaultRecord::new("still logged", Severity::ProcessFatal, Origin::caller()));
        assert_eq!(memory.len(), 1);
    }

    struct Exploding;

    impl FaultSink for Exploding {
        fn append(&self, _entry: &FaultLogEntry) -> Result<(), SinkError> {
            panic!("sink exploded")
        }
    }

    #[test]
    fn test_panicking_sink_does_not_escape_log() {
        let memory = MemorySink::new();
        let logger = FaultLogger::new()
            .with_sink(Exploding)
            .with_sink(memory.clone());

        logger.log(&FaultRecord::new("still logged", Severity::SessionFatal, Origin::caller()));
        assert_eq!(memory.len(), 1);
        assert_eq!(memory.entries()[0].message, "still logged");
    }

    #[test]
    fn test_read_skips_corrupt_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("faults.log");
        FileSink::new(&path)
            .append(&FaultLogEntry::from_record(&FaultRecord::new(
                "ok",
                Severity::SessionFatal,
                Origin::caller(),
            )))
            .unwrap();
        let mut f = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(f, "{{not json").unwrap();

        let entries = read_fault_log(&path).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "ok");
    }

    #[test]
    fn test_read_missing_log_is_empty() {
        let dir = tempdir().unwrap();
        assert!(read_fault_log(&dir.path().join("absent.log"))
            .unwrap()
            .is_empty());
    }
}
