use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, PoisonError};

use log::error;

/// A single-use unit of work run by a pool worker.
///
/// The pool calls `execute` exactly once and then `done` exactly once, on the
/// same worker thread. Tasks are handed to a pool as `Arc<dyn Task>`; the
/// submitter keeps its own clone to observe whatever state the task records.
/// A task must not be submitted again while it is queued or running.
pub trait Task: Send + Sync + 'static {
    /// Performs the work.
    ///
    /// Failures are the task's own business. A panic here is contained by the
    /// worker, which still calls `done` afterwards.
    fn execute(&self);

    /// Completion hook, called right after `execute` returns.
    ///
    /// Typical uses are releasing a semaphore or decrementing a counter that
    /// some coordinator waits on. It runs on a worker thread and must not
    /// block indefinitely.
    fn done(&self) {}
}

/// Adapts a closure into a [`Task`].
///
/// The closure runs on the first `execute`; later calls do nothing.
pub struct FnTask {
    job: Mutex<Option<Box<dyn FnOnce() + Send + 'static>>>,
}

impl FnTask {
    /// Wraps `job`.
    pub fn new<F>(job: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        FnTask {
            job: Mutex::new(Some(Box::new(job))),
        }
    }
}

impl Task for FnTask {
    fn execute(&self) {
        let job = self
            .job
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(job) = job {
            job();
        }
    }
}

impl fmt::Debug for FnTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTask").finish_non_exhaustive()
    }
}

/// What happened when a worker ran a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Both `execute` and `done` returned normally.
    Completed,
    /// `execute` panicked; `done` still ran.
    ExecutePanicked,
    /// `done` panicked.
    DonePanicked,
    /// Both phases panicked.
    BothPanicked,
}

/// Runs `execute` then `done`, containing panics from either phase.
///
/// `done` is called even when `execute` panics so that anyone waiting on the
/// task's completion signal is released.
pub fn run_task(task: &dyn Task) -> TaskOutcome {
    let executed = panic::catch_unwind(AssertUnwindSafe(|| task.execute()));
    if let Err(payload) = &executed {
        error!("Task panicked in execute: {}", panic_message(payload.as_ref()));
    }

    let finished = panic::catch_unwind(AssertUnwindSafe(|| task.done()));
    if let Err(payload) = &finished {
        error!("Task panicked in done: {}", panic_message(payload.as_ref()));
    }

    match (executed.is_ok(), finished.is_ok()) {
        (true, true) => TaskOutcome::Completed,
        (false, true) => TaskOutcome::ExecutePanicked,
        (true, false) => TaskOutcome::DonePanicked,
        (false, false) => TaskOutcome::BothPanicked,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "<non-string panic payload>"
    }
}
