use crate::{Scheduler, Task, Timeout, TimeoutState};
use core::time::Duration;
use std::sync::Arc;
use tokio::{runtime::Handle, task::AbortHandle};

/// A [`Scheduler`] backed by the [`tokio`](https://docs.rs/tokio) timer.
///
/// Each scheduled task becomes a spawned future that sleeps for the delay and
/// then runs the task. Cancelling aborts the future. Precision is that of
/// tokio's timer wheel (about one millisecond).
///
/// The runtime behind the handle must have its time driver enabled.
#[derive(Clone, Debug)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    /// Schedules onto the runtime behind `handle`.
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Schedules onto the runtime the caller is running in.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }
}

impl Scheduler for TokioScheduler {
    type Timeout = TokioTimeout;

    fn schedule(&self, delay: Duration, task: Task) -> TokioTimeout {
        let state = Arc::new(TimeoutState::new(task));
        let claim = Arc::clone(&state);
        let join = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            claim.run();
        });

        TokioTimeout {
            state,
            abort: join.abort_handle(),
        }
    }
}

/// Handle returned by [`TokioScheduler`].
#[derive(Debug)]
pub struct TokioTimeout {
    state: Arc<TimeoutState>,
    abort: AbortHandle,
}

impl Timeout for TokioTimeout {
    fn cancel(&self) -> bool {
        let won = self.state.cancel();
        if won {
            self.abort.abort();
        }
        won
    }

    fn is_cancelled(&self) -> bool {
        self.state.is_cancelled()
    }

    fn is_expired(&self) -> bool {
        self.state.is_expired()
    }
}
