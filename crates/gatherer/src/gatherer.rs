use crate::{
    Error, GathererConfig, RequestBuffer, RequestHandler, RequestId, Result, Scheduler, TickTimer,
    Timeout,
};
use core::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use dashmap::{DashMap, mapref::entry::Entry};
use std::sync::Arc;
#[cfg(feature = "tracing")]
use tracing::instrument;

/// Parts gathered so far for one request, plus its pending timeout.
struct Session<T, O> {
    buffer: RequestBuffer<T>,
    timeout: O,
    generation: u64,
}

struct Inner<T, H, S: Scheduler> {
    sessions: DashMap<RequestId, Session<T, S::Timeout>>,
    handler: H,
    scheduler: S,
    config: GathererConfig,
    timeout: Duration,
    generations: AtomicU64,
}

impl<T, H, S> Inner<T, H, S>
where
    T: Send + Sync + 'static,
    H: RequestHandler<T>,
    S: Scheduler,
{
    /// Timeout path: delivers the session if it is still the one that
    /// scheduled this expiry.
    ///
    /// Removal is the linearization point shared with the completion path in
    /// [`Gatherer::receive`]; whichever side removes the session delivers it.
    /// Matching on `generation` keeps a stale expiry from claiming a newer
    /// session that reused the same id.
    fn expire(&self, id: RequestId, generation: u64) {
        let Some((_, session)) = self
            .sessions
            .remove_if(&id, |_, session| session.generation == generation)
        else {
            #[cfg(feature = "tracing")]
            tracing::trace!(%id, "expiry lost to completion");
            return;
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(%id, missing = session.buffer.missing(), "request expired");
        self.handler.handle(session.buffer);
    }
}

/// Collects the parts of each request and hands the request to a handler
/// exactly once.
///
/// Parts arrive through [`Gatherer::receive`] from any number of threads, in
/// any order. The first part for a [`RequestId`] opens a session and schedules
/// its timeout. The session ends when either:
///
/// - the last missing part arrives: the handler runs on the receiving thread
///   with a full buffer, or
/// - the timeout fires first: the handler runs on the scheduler's thread with
///   whatever parts have arrived.
///
/// Both paths race to remove the session from a sharded map, and only the
/// winner calls the handler. Once a session ends its id is forgotten; a later
/// part with the same id opens a new session.
///
/// With `num_parts == 1` nothing is gathered: every `receive` calls the
/// handler immediately, even when an id is repeated.
///
/// Cloning is cheap and every clone feeds the same sessions. Dropping the last
/// clone does not discard open sessions: each is still delivered when it
/// times out.
///
/// # Example
///
/// ```
/// use gatherer::{Gatherer, GathererConfig, RequestBuffer, RequestId, TimeUnit};
/// use std::sync::mpsc;
///
/// let (tx, rx) = mpsc::sync_channel(1);
/// let gatherer = Gatherer::new(
///     move |buffer: RequestBuffer<u64>| tx.send(buffer.into_vec()).unwrap(),
///     GathererConfig::new(2, 50, TimeUnit::Milliseconds),
/// )
/// .unwrap();
///
/// let id = RequestId::new();
/// gatherer.receive(id, 1, 456).unwrap();
/// gatherer.receive(id, 0, 123).unwrap();
/// assert_eq!(rx.recv().unwrap(), vec![Some(123), Some(456)]);
/// ```
pub struct Gatherer<T, H, S = TickTimer>
where
    S: Scheduler,
{
    inner: Arc<Inner<T, H, S>>,
}

impl<T, H, S: Scheduler> Clone for Gatherer<T, H, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, H> Gatherer<T, H, TickTimer>
where
    T: Send + Sync + 'static,
    H: RequestHandler<T>,
{
    /// Creates a gatherer with its own [`TickTimer`], ticking at
    /// [`GathererConfig::tick_duration`].
    ///
    /// # Errors
    ///
    /// Returns a configuration error (see [`GathererConfig::validate`]) or
    /// [`Error::TimerSpawn`].
    pub fn new(handler: H, config: GathererConfig) -> Result<Self> {
        config.validate()?;
        let timer = TickTimer::new(config.tick_duration())?;
        Ok(Self::from_parts(handler, config, timer))
    }
}

impl<T, H, S> Gatherer<T, H, S>
where
    T: Send + Sync + 'static,
    H: RequestHandler<T>,
    S: Scheduler,
{
    /// Creates a gatherer that schedules timeouts on `scheduler`.
    ///
    /// The scheduler is used as is; build it with
    /// [`GathererConfig::tick_duration`] if it takes a granularity.
    ///
    /// # Errors
    ///
    /// Returns a configuration error (see [`GathererConfig::validate`]).
    pub fn with_scheduler(handler: H, config: GathererConfig, scheduler: S) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_parts(handler, config, scheduler))
    }

    fn from_parts(handler: H, config: GathererConfig, scheduler: S) -> Self {
        Self {
            inner: Arc::new(Inner {
                sessions: DashMap::new(),
                handler,
                scheduler,
                timeout: config.timeout(),
                config,
                generations: AtomicU64::new(0),
            }),
        }
    }

    /// Records part `part` of request `id`.
    ///
    /// If this completes the request, the handler runs on the calling thread
    /// before `receive` returns. Delivering an index twice overwrites the
    /// earlier value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PartOutOfRange`] if `part >= num_parts`. No state is
    /// changed in that case.
    ///
    /// # Panics
    ///
    /// A panic raised by the handler propagates out of this call. The session
    /// has already been removed by then.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self, data)))]
    pub fn receive(&self, id: RequestId, part: usize, data: T) -> Result<()> {
        let inner = &self.inner;
        let num_parts = inner.config.num_parts;
        if part >= num_parts {
            return Err(Error::PartOutOfRange {
                part,
                max: num_parts - 1,
            });
        }

        // Nothing to gather; skip the session bookkeeping entirely.
        if num_parts == 1 {
            let mut buffer = RequestBuffer::new(1);
            buffer.set(part, data);
            inner.handler.handle(buffer);
            return Ok(());
        }

        let completed = match inner.sessions.entry(id) {
            Entry::Occupied(mut occupied) => {
                let session = occupied.get_mut();
                session.buffer.set(part, data);
                if session.buffer.is_full() {
                    Some(occupied.remove())
                } else {
                    None
                }
            }
            Entry::Vacant(vacant) => {
                let generation = inner.generations.fetch_add(1, Ordering::Relaxed);
                let expiring = Arc::clone(inner);
                // The timer cannot claim the entry before it is inserted: its
                // removal waits on the shard lock held by `vacant`.
                let timeout = inner.scheduler.schedule(
                    inner.timeout,
                    Box::new(move || expiring.expire(id, generation)),
                );

                let mut buffer = RequestBuffer::new(num_parts);
                buffer.set(part, data);
                vacant.insert(Session {
                    buffer,
                    timeout,
                    generation,
                });

                #[cfg(feature = "tracing")]
                tracing::debug!(%id, part, "request opened");
                None
            }
        };

        // The shard lock is released; the handler may call back into us.
        if let Some(session) = completed {
            let _cancelled = session.timeout.cancel();
            #[cfg(feature = "tracing")]
            tracing::debug!(%id, timeout_cancelled = _cancelled, "request complete");
            inner.handler.handle(session.buffer);
        }
        Ok(())
    }

    /// Number of parts that make up one request.
    pub fn num_parts(&self) -> usize {
        self.inner.config.num_parts
    }

    /// Time a request may stay incomplete before it is delivered as is.
    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    /// The validated configuration this gatherer was built from.
    pub fn config(&self) -> &GathererConfig {
        &self.inner.config
    }

    /// Number of requests still waiting for parts.
    pub fn in_flight(&self) -> usize {
        self.inner.sessions.len()
    }

    /// The scheduler that fires request timeouts.
    pub fn scheduler(&self) -> &S {
        &self.inner.scheduler
    }
}
