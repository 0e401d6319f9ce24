//! Sessions and session termination.
//!
//! A session is either a child process launched by a shell (`quell run`), which
//! learns about its shell through [`ENV_SESSION_ID`] and [`ENV_SHELL_PID`], or
//! an in-process [`SessionBoundary`] on the current thread.
//!
//! Terminating an in-process session unwinds to the boundary with a
//! [`SessionTerminated`] payload. Terminating a process session exits with the
//! configured session exit code so the shell can tell it apart from a crash.

use std::any::Any;
use std::cell::RefCell;
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

use crate::record::FaultRecord;

/// Session id a shell hands to its session process
pub const ENV_SESSION_ID: &str = "QUELL_SESSION_ID";
/// Pid of the shell that launched the session process
pub const ENV_SHELL_PID: &str = "QUELL_SHELL_PID";

thread_local! {
    static BOUNDARIES: RefCell<Vec<ActiveBoundary>> = const { RefCell::new(Vec::new()) };
}

struct ActiveBoundary {
    name: String,
    /// Set before the termination unwind starts, so a `catch_unwind` inside
    /// the session cannot turn the termination into a normal return.
    terminated: Option<SessionTerminated>,
}

/// Ends the current session. Never returns.
pub trait SessionTerminator {
    fn terminate_session(&self, record: &FaultRecord) -> !;
}

/// Unwind payload that carries a terminated in-process session to its boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTerminated {
    pub session: String,
    pub message: String,
    pub origin: String,
}

#[derive(Debug)]
pub enum SessionOutcome<T> {
    Completed(T),
    Terminated(SessionTerminated),
}

impl<T> SessionOutcome<T> {
    pub fn is_terminated(&self) -> bool {
        matches!(self, SessionOutcome::Terminated(_))
    }

    pub fn completed(self) -> Option<T> {
        match self {
            SessionOutcome::Completed(v) => Some(v),
            SessionOutcome::Terminated(_) => None,
        }
    }
}

/// Runs a closure as an in-process session owned by the calling thread.
pub struct SessionBoundary;

impl SessionBoundary {
    /// Run `f` as session `name`.
    ///
    /// Only a [`SessionTerminated`] unwind is caught. Any other panic keeps
    /// unwinding past the boundary.
    ///
    /// A session that was terminated reports `Terminated` even when code
    /// inside it caught the unwind and returned normally; its return value
    /// is discarded.
    pub fn run<T>(name: &str, f: impl FnOnce() -> T) -> SessionOutcome<T> {
        install_quiet_hook();
        let entered = Entered::push(name);
        quell_config::log_session_debug!("Session started", session = name);

        let result = panic::catch_unwind(AssertUnwindSafe(f));
        let marked = entered.take_termination();
        match result {
            Ok(value) => match marked {
                Some(terminated) => {
                    quell_config::log_session_warn!(
                        "Session termination was caught inside the session",
                        session = name,
                        message = terminated.message.as_str()
                    );
                    SessionOutcome::Terminated(terminated)
                }
                None => SessionOutcome::Completed(value),
            },
            Err(payload) => match payload.downcast::<SessionTerminated>() {
                Ok(terminated) => {
                    quell_config::log_session_info!(
                        "Session terminated",
                        session = name,
                        message = terminated.message.as_str()
                    );
                    SessionOutcome::Terminated(*terminated)
                }
                Err(other) => panic::resume_unwind(other),
            },
        }
    }
}

struct Entered;

impl Entered {
    fn push(name: &str) -> Self {
        BOUNDARIES.with(|b| {
            b.borrow_mut().push(ActiveBoundary {
                name: name.to_string(),
                terminated: None,
            })
        });
        Self
    }

    fn take_termination(&self) -> Option<SessionTerminated> {
        BOUNDARIES.with(|b| b.borrow_mut().last_mut().and_then(|a| a.terminated.take()))
    }
}

impl Drop for Entered {
    fn drop(&mut self) {
        BOUNDARIES.with(|b| {
            b.borrow_mut().pop();
        });
    }
}

/// Innermost in-process session on this thread.
pub fn current_boundary() -> Option<String> {
    BOUNDARIES.with(|b| b.borrow().last().map(|a| a.name.clone()))
}

/// Mark the innermost boundary terminated and return the unwind payload.
/// The first termination of a session wins.
fn mark_terminated(record: &FaultRecord) -> Option<SessionTerminated> {
    BOUNDARIES.with(|b| {
        let mut boundaries = b.borrow_mut();
        let active = boundaries.last_mut()?;
        let session = active.name.clone();
        let terminated = active
            .terminated
            .get_or_insert_with(|| SessionTerminated {
                session,
                message: record.message().to_string(),
                origin: record.origin().to_string(),
            })
            .clone();
        Some(terminated)
    })
}

/// Current session id: in-process boundary first, then the process session.
pub fn current_session_id() -> Option<String> {
    current_boundary().or_else(|| {
        std::env::var(ENV_SESSION_ID)
            .ok()
            .filter(|id| !id.trim().is_empty())
    })
}

/// Keep the default panic banner out of stderr for session terminations.
fn install_quiet_hook() {
    static HOOK: Once = Once::new();
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if is_session_termination(info.payload()) {
                return;
            }
            previous(info);
        }));
    });
}

fn is_session_termination(payload: &(dyn Any + Send)) -> bool {
    payload.is::<SessionTerminated>()
}

/// Terminator for real hosts.
///
/// Unwinds to the innermost [`SessionBoundary`] when one is active on this
/// thread, otherwise exits the session process with `exit_code`.
#[derive(Debug, Clone, Copy)]
pub struct HostSessionTerminator {
    exit_code: i32,
}

impl HostSessionTerminator {
    pub fn new(exit_code: i32) -> Self {
        Self { exit_code }
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }
}

impl Default for HostSessionTerminator {
    fn default() -> Self {
        Self::new(quell_config::DEFAULT_SESSION_EXIT_CODE)
    }
}

impl SessionTerminator for HostSessionTerminator {
    fn terminate_session(&self, record: &FaultRecord) -> ! {
        if let Some(terminated) = mark_terminated(record) {
            panic::panic_any(terminated);
        }

        quell_config::log_session_info!(
            "Session process exiting",
            exit_code = self.exit_code,
            message = record.message()
        );
        let _ = std::io::stdout().flush();
        let _ = std::io::stderr().flush();
        std::process::exit(self.exit_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Origin, Severity};

    #[test]
    fn test_boundary_completes() {
        let outcome = SessionBoundary::run("ok", || 7);
        assert!(!outcome.is_terminated());
        assert_eq!(outcome.completed(), Some(7));
        assert_eq!(current_boundary(), None);
    }

    #[test]
    fn test_boundary_catches_termination() {
        let outcome: SessionOutcome<()> = SessionBoundary::run("level-1", || {
            assert_eq!(current_boundary().as_deref(), Some("level-1"));
            let record = FaultRecord::new("bad call", Severity::SessionFatal, Origin::caller());
            HostSessionTerminator::default().terminate_session(&record)
        });

        match outcome {
            SessionOutcome::Terminated(t) => {
                assert_eq!(t.session, "level-1");
                assert_eq!(t.message, "bad call");
            }
            SessionOutcome::Completed(_) => panic!("session should have terminated"),
        }
        assert_eq!(current_boundary(), None);
    }

    #[test]
    fn test_boundary_resumes_foreign_panics() {
        let result = panic::catch_unwind(|| {
            SessionBoundary::run::<()>("s", || panic!("not a session fault"))
        });
        assert!(result.is_err());
        assert_eq!(current_boundary(), None);
    }

    #[test]
    fn test_nested_boundary_catches_innermost() {
        let outer = SessionBoundary::run("outer", || {
            let inner: SessionOutcome<()> = SessionBoundary::run("inner", || {
                let record = FaultRecord::new("x", Severity::SessionFatal, Origin::caller());
                HostSessionTerminator::default().terminate_session(&record)
            });
            assert!(inner.is_terminated());
            "outer survived"
        });
        assert_eq!(outer.completed(), Some("outer survived"));
    }

    #[test]
    fn test_caught_termination_still_ends_session() {
        let outcome = SessionBoundary::run("level-1", || {
            let record = FaultRecord::new("bad call", Severity::SessionFatal, Origin::caller());
            let swallowed = panic::catch_unwind(|| {
                HostSessionTerminator::default().terminate_session(&record)
            });
            assert!(swallowed.is_err());
            "returned normally"
        });

        match outcome {
            SessionOutcome::Terminated(t) => {
                assert_eq!(t.session, "level-1");
                assert_eq!(t.message, "bad call");
            }
            SessionOutcome::Completed(v) => panic!("session completed with {v:?}"),
        }
        assert_eq!(current_boundary(), None);
    }

    #[test]
    fn test_first_termination_wins() {
        let outcome: SessionOutcome<()> = SessionBoundary::run("s", || {
            let first = FaultRecord::new("first", Severity::SessionFatal, Origin::caller());
            let _ = panic::catch_unwind(|| {
                HostSessionTerminator::default().terminate_session(&first)
            });
            let second = FaultRecord::new("second", Severity::SessionFatal, Origin::caller());
            HostSessionTerminator::default().terminate_session(&second)
        });

        match outcome {
            SessionOutcome::Terminated(t) => assert_eq!(t.message, "first"),
            SessionOutcome::Completed(_) => panic!("session should have terminated"),
        }
    }
}
