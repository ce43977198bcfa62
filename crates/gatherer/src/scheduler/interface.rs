use core::time::Duration;
use std::sync::Arc;

/// A unit of deferred work handed to a [`Scheduler`].
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// A handle to a scheduled [`Task`].
pub trait Timeout: Send + Sync + 'static {
    /// Attempts to stop the task from running.
    ///
    /// Cancellation is best-effort: it returns `true` only if the task had
    /// neither started nor been cancelled before. A `false` return is not an
    /// error; it means the task already ran, is running, or was cancelled
    /// earlier.
    fn cancel(&self) -> bool;

    /// Returns `true` if a call to [`Timeout::cancel`] succeeded.
    fn is_cancelled(&self) -> bool;

    /// Returns `true` once the task has been claimed for execution.
    fn is_expired(&self) -> bool;
}

/// A source of delayed, cancellable callbacks.
///
/// Delays are approximate. Each implementation documents its own firing
/// precision; the bundled [`TickTimer`] fires within one tick after the
/// requested delay.
///
/// Implementations must run the task on a context of their own and never
/// inline on the thread that called [`Scheduler::schedule`].
///
/// [`TickTimer`]: crate::TickTimer
pub trait Scheduler: Send + Sync + 'static {
    type Timeout: Timeout;

    /// Schedules `task` to run once `delay` has elapsed.
    fn schedule(&self, delay: Duration, task: Task) -> Self::Timeout;
}

impl<S: Scheduler> Scheduler for Arc<S> {
    type Timeout = S::Timeout;

    fn schedule(&self, delay: Duration, task: Task) -> Self::Timeout {
        (**self).schedule(delay, task)
    }
}
