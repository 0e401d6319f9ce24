//! Process-wide handler and macros.
//!
//! The global handler can be installed once per process, so everything that
//! touches it lives in a single test.

use std::panic::{catch_unwind, panic_any, AssertUnwindSafe};

use quell_fault::{
    soft_check, soft_fault, EnvironmentProbe, FaultHandler, FaultRecord, HardFaultTrigger,
    MemorySink, ProbeError, SessionTerminator, Severity,
};

struct Isolatable;

impl EnvironmentProbe for Isolatable {
    fn is_sandboxed_session(&self) -> Result<bool, ProbeError> {
        Ok(true)
    }
    fn host_shell_present(&self) -> Result<bool, ProbeError> {
        Ok(true)
    }
    fn call_from_interpreted_code(&self) -> Result<bool, ProbeError> {
        Ok(true)
    }
}

#[derive(Debug, PartialEq, Eq)]
struct Ended(Severity);

struct Unwind;

impl SessionTerminator for Unwind {
    fn terminate_session(&self, record: &FaultRecord) -> ! {
        panic_any(Ended(record.severity()))
    }
}

impl HardFaultTrigger for Unwind {
    fn hard_fault(&self, record: &FaultRecord) -> ! {
        panic_any(Ended(record.severity()))
    }
}

fn ended(f: impl FnOnce()) -> Option<Ended> {
    catch_unwind(AssertUnwindSafe(f))
        .err()
        .and_then(|p| p.downcast::<Ended>().ok())
        .map(|b| *b)
}

#[test]
fn global_handler_and_macros() {
    let memory = MemorySink::new();
    quell_fault::install(
        FaultHandler::builder()
            .probe(Isolatable)
            .sink(memory.clone())
            .session_terminator(Unwind)
            .hard_fault_trigger(Unwind)
            .build(),
    )
    .expect("handler already installed");

    // A second install is rejected.
    assert!(quell_fault::install(FaultHandler::builder().build()).is_err());

    // A passing check is a no-op.
    let value = 3;
    soft_check!(value == 3, "value drifted to {value}");
    assert!(memory.is_empty());

    let line = line!() + 1;
    let outcome = ended(|| soft_check!(value > 10, "value {value} below floor"));
    assert_eq!(outcome, Some(Ended(Severity::SessionFatal)));

    let outcome = ended(|| soft_check!(value < 0));
    assert_eq!(outcome, Some(Ended(Severity::SessionFatal)));

    let outcome = ended(|| soft_fault!("unit {} lost its owner", 7));
    assert_eq!(outcome, Some(Ended(Severity::SessionFatal)));

    let outcome = ended(|| quell_fault::fatal!("allocator invariant broken"));
    assert_eq!(outcome, Some(Ended(Severity::ProcessFatal)));

    let entries = memory.entries();
    let messages: Vec<_> = entries.iter().map(|e| e.message.as_str()).collect();
    assert_eq!(
        messages,
        vec![
            "value 3 below floor",
            "check failed: value < 0",
            "unit 7 lost its owner",
            "allocator invariant broken",
        ]
    );
    // The origin is the macro call site, not the library.
    assert!(entries[0].origin.contains("global_handler_test.rs"));
    assert!(entries[0].origin.contains(&format!(":{line}:")));
}
