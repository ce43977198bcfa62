use crate::Task;
use core::{
    fmt,
    sync::atomic::{AtomicU8, Ordering},
};
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};

const PENDING: u8 = 0;
const EXPIRED: u8 = 1;
const CANCELLED: u8 = 2;

/// Shared lifecycle of one scheduled task.
///
/// A task starts `PENDING` and moves exactly once, either to `EXPIRED` when
/// the scheduler claims it or to `CANCELLED` when its owner cancels it.
/// Whichever transition happens first wins; the other one observes the
/// failure and backs off.
///
/// The task itself lives here rather than in the scheduler, so a successful
/// cancel releases it (and everything it captured) immediately, even while
/// the scheduler still tracks the deadline.
pub struct TimeoutState {
    status: AtomicU8,
    task: Mutex<Option<Task>>,
}

impl TimeoutState {
    pub fn new(task: Task) -> Self {
        Self {
            status: AtomicU8::new(PENDING),
            task: Mutex::new(Some(task)),
        }
    }

    /// Claims the task for cancellation and drops it. Returns `false` if it
    /// was already claimed.
    pub fn cancel(&self) -> bool {
        if !self.transition(CANCELLED) {
            return false;
        }
        let task = self.task.lock().take();
        drop(task);
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.status.load(Ordering::Acquire) == CANCELLED
    }

    pub fn is_expired(&self) -> bool {
        self.status.load(Ordering::Acquire) == EXPIRED
    }

    fn transition(&self, to: u8) -> bool {
        self.status
            .compare_exchange(PENDING, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Runs the task if it can still be claimed for execution.
    ///
    /// A panicking task is contained so that the scheduler's execution context
    /// keeps serving other tasks. Returns `true` if the task was claimed.
    pub(crate) fn run(&self) -> bool {
        if !self.transition(EXPIRED) {
            #[cfg(feature = "tracing")]
            tracing::trace!("skipping cancelled timeout");
            return false;
        }

        let Some(task) = self.task.lock().take() else {
            return false;
        };
        if let Err(_panic) = panic::catch_unwind(AssertUnwindSafe(task)) {
            #[cfg(feature = "tracing")]
            tracing::error!(panic = panic_message(&*_panic), "timeout task panicked");
        }
        true
    }
}

impl fmt::Debug for TimeoutState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self.status.load(Ordering::Acquire) {
            PENDING => "pending",
            EXPIRED => "expired",
            _ => "cancelled",
        };
        f.debug_struct("TimeoutState").field("status", &status).finish()
    }
}

#[cfg(feature = "tracing")]
fn panic_message(panic: &(dyn core::any::Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "<non-string panic payload>"
    }
}
