use core::time::Duration;
use std::{
    sync::OnceLock,
    time::{Instant, SystemTime, UNIX_EPOCH},
};

/// Units in which a timeout duration can be expressed.
///
/// Defaults to [`TimeUnit::Milliseconds`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    #[default]
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    /// Converts `amount` of this unit into a [`Duration`], saturating at
    /// [`Duration::MAX`].
    ///
    /// ```
    /// use gatherer::TimeUnit;
    /// use std::time::Duration;
    ///
    /// assert_eq!(TimeUnit::Milliseconds.to_duration(15), Duration::from_millis(15));
    /// assert_eq!(TimeUnit::Minutes.to_duration(2), Duration::from_secs(120));
    /// ```
    pub const fn to_duration(self, amount: u64) -> Duration {
        match self {
            Self::Nanoseconds => Duration::from_nanos(amount),
            Self::Microseconds => Duration::from_micros(amount),
            Self::Milliseconds => Duration::from_millis(amount),
            Self::Seconds => Duration::from_secs(amount),
            Self::Minutes => Self::secs_saturating(amount, 60),
            Self::Hours => Self::secs_saturating(amount, 60 * 60),
            Self::Days => Self::secs_saturating(amount, 24 * 60 * 60),
        }
    }

    const fn secs_saturating(amount: u64, factor: u64) -> Duration {
        match amount.checked_mul(factor) {
            Some(secs) => Duration::from_secs(secs),
            None => Duration::MAX,
        }
    }
}

/// A trait for time sources that return a monotonic timestamp.
///
/// This abstraction allows you to plug in a real monotonic clock or a mocked
/// time source in tests. The unit is **nanoseconds** relative to the source's
/// own origin.
///
/// # Example
///
/// ```
/// use gatherer::TimeSource;
///
/// struct FixedTime;
/// impl TimeSource for FixedTime {
///     fn current_nanos(&self) -> u64 {
///         1234
///     }
/// }
///
/// assert_eq!(FixedTime.current_nanos(), 1234);
/// ```
pub trait TimeSource {
    /// Returns the current time in nanoseconds since the source's origin.
    fn current_nanos(&self) -> u64;
}

/// A monotonic time source anchored to the Unix epoch.
///
/// The wall clock is read once at construction to compute an offset; every
/// later reading adds the elapsed [`Instant`] time to it. Readings therefore
/// never go backward, even if the system clock is adjusted externally.
#[derive(Clone, Copy, Debug)]
pub struct MonotonicClock {
    start: Instant,
    epoch_offset: u64, // in nanoseconds
}

impl Default for MonotonicClock {
    fn default() -> Self {
        let start = Instant::now();
        // A system clock set before 1970 only shifts the origin; readings stay
        // monotonic.
        let epoch_offset = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |since| since.as_nanos() as u64);
        Self {
            start,
            epoch_offset,
        }
    }
}

impl MonotonicClock {
    /// Returns the process-wide clock, created on first use.
    pub fn global() -> &'static Self {
        static CLOCK: OnceLock<MonotonicClock> = OnceLock::new();
        CLOCK.get_or_init(Self::default)
    }
}

impl TimeSource for MonotonicClock {
    fn current_nanos(&self) -> u64 {
        self.epoch_offset
            .wrapping_add(self.start.elapsed().as_nanos() as u64)
    }
}
