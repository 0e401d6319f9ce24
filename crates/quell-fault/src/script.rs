//! Interpreted execution layer.
//!
//! A [`ScriptScheduler`] dispatches script steps one at a time on the calling
//! thread. Each step runs inside a [`ScriptFrame`], which is how the classifier
//! knows a fault came from interpreted code. Between steps the scheduler checks
//! its suspend flag; [`CooperativeSuspender`] sets that flag.
//!
//! Suspension is cooperative. Native code already running inside the current
//! step is not interrupted: it runs until it returns to the scheduler, and only
//! the steps after it are skipped.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

thread_local! {
    static FRAME_DEPTH: Cell<usize> = const { Cell::new(0) };
    static ACTIVE_SCHEDULERS: RefCell<Vec<Rc<Cell<bool>>>> = const { RefCell::new(Vec::new()) };
}

/// Number of interpreted frames on the current thread's call chain.
pub fn interpreted_depth() -> usize {
    FRAME_DEPTH.with(|d| d.get())
}

/// Marks an interpreted frame for as long as it lives. Not `Send`.
pub struct ScriptFrame {
    _not_send: PhantomData<Rc<()>>,
}

impl ScriptFrame {
    pub fn enter() -> Self {
        FRAME_DEPTH.with(|d| d.set(d.get() + 1));
        Self {
            _not_send: PhantomData,
        }
    }
}

impl Drop for ScriptFrame {
    fn drop(&mut self) {
        FRAME_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuspendOutcome {
    Granted,
    Unsupported,
}

/// Asks the interpreted scheduler to stop dispatching.
pub trait ExecutionSuspender {
    fn request_suspend(&self) -> SuspendOutcome;
}

/// Suspends every scheduler running on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct CooperativeSuspender;

impl ExecutionSuspender for CooperativeSuspender {
    fn request_suspend(&self) -> SuspendOutcome {
        ACTIVE_SCHEDULERS.with(|active| {
            let active = active.borrow();
            if active.is_empty() {
                return SuspendOutcome::Unsupported;
            }
            for flag in active.iter() {
                flag.set(true);
            }
            quell_config::log_script_debug!("Suspend granted", schedulers = active.len());
            SuspendOutcome::Granted
        })
    }
}

/// True if the innermost scheduler on this thread has been suspended.
pub fn is_suspended() -> bool {
    ACTIVE_SCHEDULERS.with(|active| active.borrow().last().map(|f| f.get()).unwrap_or(false))
}

type Step<'a> = Box<dyn FnOnce() + 'a>;

/// What a scheduler run dispatched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub dispatched: Vec<String>,
    pub skipped: Vec<String>,
    pub suspended: bool,
}

/// Cooperative, single-threaded step interpreter.
pub struct ScriptScheduler<'a> {
    name: String,
    steps: VecDeque<(String, Step<'a>)>,
}

impl<'a> ScriptScheduler<'a> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: VecDeque::new(),
        }
    }

    pub fn step(mut self, name: impl Into<String>, f: impl FnOnce() + 'a) -> Self {
        self.steps.push_back((name.into(), Box::new(f)));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Dispatch steps in order until done or suspended.
    pub fn run(mut self) -> RunReport {
        let flag = Rc::new(Cell::new(false));
        let _active = ActiveScheduler::push(flag.clone());
        let mut report = RunReport::default();

        while let Some((step_name, step)) = self.steps.pop_front() {
            if flag.get() {
                report.skipped.push(step_name);
                continue;
            }
            quell_config::log_script_debug!(
                "Dispatch step",
                script = self.name.as_str(),
                step = step_name.as_str()
            );
            {
                let _frame = ScriptFrame::enter();
                step();
            }
            report.dispatched.push(step_name);
        }

        report.suspended = flag.get();
        report
    }
}

/// Registers a scheduler's suspend flag for the duration of a run, unwind included.
struct ActiveScheduler;

impl ActiveScheduler {
    fn push(flag: Rc<Cell<bool>>) -> Self {
        ACTIVE_SCHEDULERS.with(|active| active.borrow_mut().push(flag));
        Self
    }
}

impl Drop for ActiveScheduler {
    fn drop(&mut self) {
        ACTIVE_SCHEDULERS.with(|active| {
            active.borrow_mut().pop();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_depth_tracks_guards() {
        assert_eq!(interpreted_depth(), 0);
        {
            let _a = ScriptFrame::enter();
            let _b = ScriptFrame::enter();
            assert_eq!(interpreted_depth(), 2);
        }
        assert_eq!(interpreted_depth(), 0);
    }

    #[test]
    fn test_steps_run_inside_frames() {
        let seen = Cell::new(0);
        let report = ScriptScheduler::new("t")
            .step("a", || seen.set(interpreted_depth()))
            .run();
        assert_eq!(seen.get(), 1);
        assert_eq!(report.dispatched, vec!["a"]);
        assert!(!report.suspended);
        assert_eq!(interpreted_depth(), 0);
    }

    #[test]
    fn test_suspend_without_scheduler_is_unsupported() {
        assert_eq!(
            CooperativeSuspender.request_suspend(),
            SuspendOutcome::Unsupported
        );
    }

    #[test]
    fn test_suspend_skips_remaining_steps_but_finishes_current() {
        let tail_ran = Cell::new(false);
        let report = ScriptScheduler::new("t")
            .step("first", || {})
            .step("faulting", || {
                assert_eq!(CooperativeSuspender.request_suspend(), SuspendOutcome::Granted);
                assert!(is_suspended());
                // Native code after the request still runs to the end of the frame.
                tail_ran.set(true);
            })
            .step("never", || panic!("dispatched after suspend"))
            .run();

        assert!(tail_ran.get());
        assert!(report.suspended);
        assert_eq!(report.dispatched, vec!["first", "faulting"]);
        assert_eq!(report.skipped, vec!["never"]);
        assert!(!is_suspended());
    }

    #[test]
    fn test_suspend_reaches_outer_scheduler() {
        let outer_tail = Cell::new(false);
        let report = ScriptScheduler::new("outer")
            .step("call-inner", || {
                let inner = ScriptScheduler::new("inner")
                    .step("fault", || {
                        CooperativeSuspender.request_suspend();
                    })
                    .step("inner-tail", || {})
                    .run();
                assert_eq!(inner.skipped, vec!["inner-tail"]);
            })
            .step("outer-tail", || outer_tail.set(true))
            .run();

        assert!(!outer_tail.get());
        assert_eq!(report.skipped, vec!["outer-tail"]);
    }
}
