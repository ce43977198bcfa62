use crate::{Result, Scheduler, Task, Timeout, TimeoutState};
use core::{
    cmp::Ordering,
    mem,
    sync::atomic::{self, AtomicUsize},
    time::Duration,
};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::{
    collections::BinaryHeap,
    sync::{Arc, Weak},
    thread,
    time::Instant,
};
#[cfg(feature = "tracing")]
use tracing::instrument;

/// Cancelled entries tolerated in the heap before a purge is considered.
const PURGE_THRESHOLD: usize = 64;

/// A deadline waiting in the heap. The task itself is held by `state`.
struct Entry {
    deadline: Instant,
    seq: u64,
    state: Arc<TimeoutState>,
}

// `BinaryHeap` is a max-heap; invert so the earliest deadline sits on top and
// equal deadlines fire in scheduling order.
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

#[derive(Default)]
struct State {
    heap: BinaryHeap<Entry>,
    seq: u64,
    shutdown: bool,
}

/// Shared between the timer handle and its ticker thread.
struct Shared {
    state: Mutex<State>,
    wakeup: Condvar,
    start: Instant,
    tick: Duration,
    // Approximate count of cancelled entries still in the heap.
    cancelled: AtomicUsize,
}

impl Shared {
    /// Rounds `deadline` up to the next tick boundary (`start + k * tick`).
    fn align(&self, deadline: Instant) -> Instant {
        let since = deadline.saturating_duration_since(self.start).as_nanos();
        let tick = self.tick.as_nanos().max(1);
        let aligned = since.div_ceil(tick).saturating_mul(tick);
        let aligned = Duration::from_nanos(u64::try_from(aligned).unwrap_or(u64::MAX));
        self.start.checked_add(aligned).unwrap_or(deadline)
    }

    fn run(&self) {
        let mut state = self.state.lock();
        loop {
            if state.shutdown {
                #[cfg(feature = "tracing")]
                tracing::debug!(pending = state.heap.len(), "tick timer shutting down");
                break;
            }

            let now = Instant::now();
            match state.heap.peek().map(|entry| entry.deadline) {
                None => self.wakeup.wait(&mut state),
                Some(deadline) if deadline <= now => {
                    let due = Self::drain_due(&mut state, now);
                    // Tasks may re-enter the timer (or drop it), so they run
                    // without the lock held.
                    MutexGuard::unlocked(&mut state, || {
                        for entry in due {
                            if !entry.state.run() {
                                self.forget_cancelled();
                            }
                        }
                    });
                }
                Some(deadline) => {
                    let wake_at = self.align(deadline);
                    let _ = self.wakeup.wait_until(&mut state, wake_at);
                }
            }
        }
    }

    /// Records a cancellation and, once cancelled entries make up at least
    /// half of a heap past [`PURGE_THRESHOLD`], rebuilds the heap without them.
    fn note_cancelled(&self) {
        let cancelled = self.cancelled.fetch_add(1, atomic::Ordering::Relaxed) + 1;
        if cancelled < PURGE_THRESHOLD {
            return;
        }

        let mut state = self.state.lock();
        if cancelled.saturating_mul(2) < state.heap.len() {
            return;
        }
        // Cancelled entries no longer own a task, so dropping them under the
        // lock releases nothing but their state.
        let live: Vec<Entry> = mem::take(&mut state.heap)
            .into_iter()
            .filter(|entry| !entry.state.is_cancelled())
            .collect();
        state.heap = BinaryHeap::from(live);
        self.cancelled.store(0, atomic::Ordering::Relaxed);

        #[cfg(feature = "tracing")]
        tracing::trace!(queued = state.heap.len(), "purged cancelled timeouts");
    }

    /// A cancelled entry reached its deadline and left the heap on its own.
    fn forget_cancelled(&self) {
        let _ = self.cancelled.fetch_update(
            atomic::Ordering::Relaxed,
            atomic::Ordering::Relaxed,
            |n| n.checked_sub(1),
        );
    }

    fn drain_due(state: &mut State, now: Instant) -> Vec<Entry> {
        let mut due = Vec::new();
        while state.heap.peek().is_some_and(|entry| entry.deadline <= now) {
            if let Some(entry) = state.heap.pop() {
                due.push(entry);
            }
        }
        due
    }
}

/// A single-threaded timer that fires tasks on tick boundaries.
///
/// Scheduled tasks sit in a binary heap ordered by deadline. One background
/// thread sleeps until the tick boundary at or after the earliest deadline,
/// then runs every task whose deadline has passed. A task scheduled with delay
/// `d` therefore runs after `d` has elapsed and at most about one `tick` later.
/// Coarser ticks mean fewer wake-ups.
///
/// Cancelling drops the task at once. The bare deadline stays in the heap
/// until it expires or until cancelled deadlines make up half the heap, at
/// which point they are purged together. Tasks run sequentially on the timer
/// thread; a panicking task is contained and does not affect later tasks.
///
/// Dropping the timer stops its thread. Tasks still pending at that point
/// never run.
///
/// # Example
///
/// ```
/// use gatherer::{Scheduler, TickTimer, Timeout};
/// use std::{sync::mpsc, time::Duration};
///
/// let timer = TickTimer::new(Duration::from_millis(1)).unwrap();
/// let (tx, rx) = mpsc::channel();
/// timer.schedule(Duration::from_millis(5), Box::new(move || tx.send(()).unwrap()));
/// rx.recv_timeout(Duration::from_secs(1)).unwrap();
///
/// let cancelled = timer.schedule(Duration::from_secs(60), Box::new(|| unreachable!()));
/// assert!(cancelled.cancel());
/// ```
pub struct TickTimer {
    shared: Arc<Shared>,
}

impl TickTimer {
    /// Starts a timer whose thread wakes at multiples of `tick`.
    ///
    /// A zero `tick` is treated as one nanosecond.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TimerSpawn`] if the background thread cannot be
    /// spawned.
    ///
    /// [`Error::TimerSpawn`]: crate::Error::TimerSpawn
    pub fn new(tick: Duration) -> Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(State::default()),
            wakeup: Condvar::new(),
            start: Instant::now(),
            tick: tick.max(Duration::from_nanos(1)),
            cancelled: AtomicUsize::new(0),
        });

        let ticker = Arc::clone(&shared);
        thread::Builder::new()
            .name("gatherer-timer".into())
            .spawn(move || ticker.run())?;

        #[cfg(feature = "tracing")]
        tracing::debug!(tick_ns = shared.tick.as_nanos() as u64, "tick timer started");

        Ok(Self { shared })
    }

    /// The configured tick.
    pub fn tick(&self) -> Duration {
        self.shared.tick
    }

    /// Number of deadlines in the heap, including cancelled ones not yet
    /// purged.
    pub fn queued(&self) -> usize {
        self.shared.state.lock().heap.len()
    }
}

impl Scheduler for TickTimer {
    type Timeout = TickTimeout;

    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self, task)))]
    fn schedule(&self, delay: Duration, task: Task) -> TickTimeout {
        let state = Arc::new(TimeoutState::new(task));
        let handle = TickTimeout {
            state: Arc::clone(&state),
            timer: Arc::downgrade(&self.shared),
        };

        // A deadline past the end of representable time can never arrive.
        let Some(deadline) = Instant::now().checked_add(delay) else {
            return handle;
        };

        let mut guard = self.shared.state.lock();
        let seq = guard.seq;
        guard.seq = guard.seq.wrapping_add(1);
        let is_next = guard
            .heap
            .peek()
            .is_none_or(|entry| deadline < entry.deadline);
        guard.heap.push(Entry {
            deadline,
            seq,
            state,
        });
        drop(guard);

        if is_next {
            self.shared.wakeup.notify_one();
        }
        handle
    }
}

impl Drop for TickTimer {
    fn drop(&mut self) {
        self.shared.state.lock().shutdown = true;
        self.shared.wakeup.notify_all();
    }
}

/// Handle returned by [`TickTimer::schedule`](Scheduler::schedule).
#[derive(Clone, Debug)]
pub struct TickTimeout {
    state: Arc<TimeoutState>,
    timer: Weak<Shared>,
}

impl Timeout for TickTimeout {
    fn cancel(&self) -> bool {
        if !self.state.cancel() {
            return false;
        }
        if let Some(shared) = self.timer.upgrade() {
            shared.note_cancelled();
        }
        true
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
    use std::sync::mpsc;

    fn timer() -> TickTimer {
        TickTimer::new(Duration::from_millis(1)).unwrap()
    }

    #[test]
    fn fires_after_delay() {
        let timer = timer();
        let (tx, rx) = mpsc::channel();
        let start = Instant::now();
        let handle = timer.schedule(
            Duration::from_millis(10),
            Box::new(move || tx.send(Instant::now()).unwrap()),
        );

        let fired_at = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(fired_at.duration_since(start) >= Duration::from_millis(10));
        assert!(handle.is_expired());
        assert!(!handle.cancel());
    }

    #[test]
    fn fires_in_deadline_order() {
        let timer = timer();
        let (tx, rx) = mpsc::channel();
        for delay in [30u64, 10, 20] {
            let tx = tx.clone();
            timer.schedule(
                Duration::from_millis(delay),
                Box::new(move || tx.send(delay).unwrap()),
            );
        }
        drop(tx);

        let order: Vec<u64> = rx.iter().collect();
        assert_eq!(order, vec![10, 20, 30]);
    }

    #[test]
    fn cancelled_task_never_runs() {
        let timer = timer();
        let (tx, rx) = mpsc::channel::<()>();
        let handle = timer.schedule(Duration::from_millis(5), Box::new(move || tx.send(()).unwrap()));
        assert!(handle.cancel());
        assert!(handle.is_cancelled());
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn panicking_task_does_not_stop_timer() {
        let timer = timer();
        let (tx, rx) = mpsc::channel();
        timer.schedule(Duration::from_millis(1), Box::new(|| panic!("boom")));
        timer.schedule(Duration::from_millis(5), Box::new(move || tx.send(()).unwrap()));
        rx.recv_timeout(Duration::from_secs(2)).unwrap();
    }

    #[test]
    fn unreachable_deadline_is_accepted() {
        let timer = timer();
        let handle = timer.schedule(Duration::MAX, Box::new(|| unreachable!()));
        assert!(!handle.is_expired());
        assert!(handle.cancel());
        assert_eq!(timer.queued(), 0);
    }

    #[test]
    fn align_rounds_up_to_tick_boundary() {
        let shared = Shared {
            state: Mutex::new(State::default()),
            wakeup: Condvar::new(),
            start: Instant::now(),
            tick: Duration::from_millis(4),
            cancelled: AtomicUsize::new(0),
        };
        let at = |ms| shared.start + Duration::from_millis(ms);
        assert_eq!(shared.align(at(0)), at(0));
        assert_eq!(shared.align(at(1)), at(4));
        assert_eq!(shared.align(at(4)), at(4));
        assert_eq!(shared.align(at(9)), at(12));
    }

    #[test]
    fn cancelled_deadlines_are_purged() {
        let timer = timer();
        let captured = Arc::new(());
        let handles: Vec<TickTimeout> = (0..10 * PURGE_THRESHOLD)
            .map(|_| {
                let held = Arc::clone(&captured);
                timer.schedule(Duration::from_secs(60), Box::new(move || drop(held)))
            })
            .collect();
        assert_eq!(timer.queued(), 10 * PURGE_THRESHOLD);

        for handle in &handles {
            assert!(handle.cancel());
        }
        // Every cancelled task is released at once, and the heap is rebuilt
        // whenever cancelled deadlines reach half of it.
        assert_eq!(Arc::strong_count(&captured), 1);
        assert!(timer.queued() < PURGE_THRESHOLD, "queued {}", timer.queued());
    }

    #[test]
    fn purge_keeps_live_deadlines() {
        let timer = timer();
        let (tx, rx) = mpsc::channel();
        timer.schedule(
            Duration::from_millis(20),
            Box::new(move || tx.send(()).unwrap()),
        );
        for _ in 0..2 * PURGE_THRESHOLD {
            let handle = timer.schedule(Duration::from_secs(60), Box::new(|| {}));
            assert!(handle.cancel());
        }
        assert!(timer.queued() < PURGE_THRESHOLD);
        rx.recv_timeout(Duration::from_secs(2)).unwrap();
    }

    #[test]
    fn zero_tick_is_clamped() {
        let timer = TickTimer::new(Duration::ZERO).unwrap();
        assert_eq!(timer.tick(), Duration::from_nanos(1));
    }
}
