use crate::{Scheduler, Task, Timeout, TimeoutState};
use core::time::Duration;
use std::sync::Arc;

/// A [`Scheduler`] backed by [`smol`](https://docs.rs/smol) timers.
///
/// Each scheduled task becomes a detached future on smol's global executor
/// that waits on a [`smol::Timer`] and then runs the task unless it was
/// cancelled.
#[derive(Clone, Copy, Debug, Default)]
pub struct SmolScheduler;

impl Scheduler for SmolScheduler {
    type Timeout = SmolTimeout;

    fn schedule(&self, delay: Duration, task: Task) -> SmolTimeout {
        let state = Arc::new(TimeoutState::new(task));
        let claim = Arc::clone(&state);
        smol::spawn(async move {
            smol::Timer::after(delay).await;
            claim.run();
        })
        .detach();

        SmolTimeout { state }
    }
}

/// Handle returned by [`SmolScheduler`].
///
/// Cancelling drops the task at once. The underlying future keeps waiting on
/// its timer and then finds nothing to run.
#[derive(Clone, Debug)]
pub struct SmolTimeout {
    state: Arc<TimeoutState>,
}

impl Timeout for SmolTimeout {
    fn cancel(&self) -> bool {
        self.state.cancel()
    }

    fn is_cancelled(&self) -> bool {
        self.state.is_cancelled()
    }

    fn is_expired(&self) -> bool {
        self.state.is_expired()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_after_delay() {
        smol::block_on(async {
            let (tx, rx) = smol::channel::bounded(1);
            let handle = SmolScheduler.schedule(
                Duration::from_millis(5),
                Box::new(move || {
                    let _ = tx.try_send(());
                }),
            );
            rx.recv().await.unwrap();
            assert!(handle.is_expired());
        });
    }

    #[test]
    fn cancel_prevents_firing() {
        smol::block_on(async {
            let (tx, rx) = smol::channel::bounded::<()>(1);
            let handle = SmolScheduler.schedule(
                Duration::from_millis(5),
                Box::new(move || {
                    let _ = tx.try_send(());
                }),
            );
            assert!(handle.cancel());
            // Cancelling drops the task, and the sender with it.
            assert!(rx.recv().await.is_err());
        });
    }
}
