use crate::{MonotonicClock, RandSource, ThreadRandom, TimeSource};
use core::fmt;

/// An opaque identifier for one logical request.
///
/// Parts that share a `RequestId` are gathered into the same buffer. The
/// value is an ordinary 64-bit integer, kept as a separate type for clearer
/// semantics; equality and hashing are by value.
///
/// [`RequestId::new`] derives a fresh value from a monotonic clock reading
/// XOR-ed with a thread-local random number. Collisions are unlikely but not
/// impossible. Use [`RequestId::from_raw`] to correlate with identifiers
/// minted elsewhere.
///
/// # Example
///
/// ```
/// use gatherer::RequestId;
///
/// let id = RequestId::from_raw(42);
/// assert_eq!(id.to_raw(), 42);
/// assert_eq!(id.to_string(), "42");
/// assert_ne!(RequestId::new(), RequestId::new());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct RequestId(u64);

impl RequestId {
    /// Creates a new identifier from the process-wide [`MonotonicClock`] and
    /// the calling thread's RNG.
    pub fn new() -> Self {
        Self::from_sources(MonotonicClock::global(), &ThreadRandom)
    }

    /// Creates a new identifier from explicit time and random sources.
    pub fn from_sources<C, R>(clock: &C, rng: &R) -> Self
    where
        C: TimeSource + ?Sized,
        R: RandSource + ?Sized,
    {
        Self(clock.current_nanos() ^ rng.rand())
    }

    /// Wraps a caller-supplied value.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the underlying value.
    pub const fn to_raw(&self) -> u64 {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<u64> for RequestId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl From<RequestId> for u64 {
    fn from(id: RequestId) -> Self {
        id.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RequestId").field(&self.0).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct FixedTime(u64);
    impl TimeSource for FixedTime {
        fn current_nanos(&self) -> u64 {
            self.0
        }
    }

    struct FixedRand(u64);
    impl RandSource for FixedRand {
        fn rand(&self) -> u64 {
            self.0
        }
    }

    #[test]
    fn combines_clock_and_random() {
        let id = RequestId::from_sources(&FixedTime(0b1100), &FixedRand(0b1010));
        assert_eq!(id.to_raw(), 0b0110);
    }

    #[test]
    fn equality_and_hash_are_by_value() {
        let mut seen = HashSet::new();
        assert!(seen.insert(RequestId::from_raw(7)));
        assert!(!seen.insert(RequestId::from(7)));
        assert_eq!(u64::from(RequestId::from_raw(7)), 7);
    }

    #[test]
    fn fresh_ids_are_distinct_across_threads() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 512;

        let ids: Vec<RequestId> = std::thread::scope(|s| {
            let workers: Vec<_> = (0..THREADS)
                .map(|_| s.spawn(|| (0..PER_THREAD).map(|_| RequestId::new()).collect::<Vec<_>>()))
                .collect();
            workers
                .into_iter()
                .flat_map(|w| w.join().unwrap())
                .collect()
        });

        let unique: HashSet<_> = ids.iter().copied().collect();
        assert_eq!(unique.len(), THREADS * PER_THREAD);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serializes_as_plain_integer() {
        let id = RequestId::from_raw(99);
        assert_eq!(serde_json::to_string(&id).unwrap(), "99");
        let back: RequestId = serde_json::from_str("99").unwrap();
        assert_eq!(back, id);
    }
}
