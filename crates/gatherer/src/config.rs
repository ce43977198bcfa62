use crate::{Error, Gatherer, RequestHandler, Result, Scheduler, TickTimer, TimeUnit};
use core::{marker::PhantomData, time::Duration};

/// Default bound on how late a timeout may fire, as a fraction of the
/// timeout duration.
pub const DEFAULT_TIMEOUT_MAX_ERROR: f64 = 0.2;

/// Options for a [`Gatherer`].
///
/// | field               | meaning                                         | default        |
/// |---------------------|-------------------------------------------------|----------------|
/// | `num_parts`         | parts per request, at least 1                   | 1              |
/// | `timeout_duration`  | how long to wait for missing parts, in `unit`   | 0 (must be set)|
/// | `unit`              | unit of `timeout_duration`                      | milliseconds   |
/// | `timeout_max_error` | allowed lateness as a fraction, in `(0, 1]`     | 0.2            |
///
/// An expired request is delivered between `timeout` and roughly
/// `timeout * (1 + timeout_max_error)` after its first part arrived. Smaller
/// values give tighter timeouts at the cost of more timer wake-ups.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct GathererConfig {
    pub num_parts: usize,
    pub timeout_duration: u64,
    pub unit: TimeUnit,
    pub timeout_max_error: f64,
}

impl Default for GathererConfig {
    fn default() -> Self {
        Self {
            num_parts: 1,
            timeout_duration: 0,
            unit: TimeUnit::Milliseconds,
            timeout_max_error: DEFAULT_TIMEOUT_MAX_ERROR,
        }
    }
}

impl GathererConfig {
    /// Creates a config with the default `timeout_max_error`.
    pub fn new(num_parts: usize, timeout_duration: u64, unit: TimeUnit) -> Self {
        Self {
            num_parts,
            timeout_duration,
            unit,
            ..Self::default()
        }
    }

    /// Replaces `timeout_max_error`.
    pub fn with_timeout_max_error(mut self, timeout_max_error: f64) -> Self {
        self.timeout_max_error = timeout_max_error;
        self
    }

    /// Checks every option.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidTimeoutMaxError`] if `timeout_max_error` is not in
    ///   `(0, 1]` (this includes NaN)
    /// - [`Error::InvalidNumParts`] if `num_parts` is zero
    /// - [`Error::ZeroTimeout`] if `num_parts > 1` and the timeout is zero
    pub fn validate(&self) -> Result<()> {
        if !(self.timeout_max_error > 0.0 && self.timeout_max_error <= 1.0) {
            return Err(Error::InvalidTimeoutMaxError(self.timeout_max_error));
        }
        if self.num_parts == 0 {
            return Err(Error::InvalidNumParts);
        }
        if self.num_parts > 1 && self.timeout().is_zero() {
            return Err(Error::ZeroTimeout);
        }
        Ok(())
    }

    /// The timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        self.unit.to_duration(self.timeout_duration)
    }

    /// Number of timer ticks per timeout: `round(1 / timeout_max_error)`.
    pub fn num_steps(&self) -> u32 {
        // Float-to-int casts saturate, so tiny errors clamp to u32::MAX.
        ((1.0 / self.timeout_max_error).round() as u32).max(1)
    }

    /// Timer granularity: `timeout / num_steps`, at least one nanosecond.
    pub fn tick_duration(&self) -> Duration {
        (self.timeout() / self.num_steps()).max(Duration::from_nanos(1))
    }
}

/// Fluent construction of a [`Gatherer`].
///
/// ```
/// use gatherer::{GathererBuilder, RequestBuffer, RequestId, TimeUnit};
///
/// let gatherer = GathererBuilder::<u64, _>::new()
///     .handler(|buffer: RequestBuffer<u64>| assert!(buffer.is_full()))
///     .num_parts(2)
///     .timeout_duration(50)
///     .unit(TimeUnit::Milliseconds)
///     .build()
///     .unwrap();
///
/// let id = RequestId::new();
/// gatherer.receive(id, 0, 123).unwrap();
/// gatherer.receive(id, 1, 456).unwrap();
/// ```
pub struct GathererBuilder<T, H> {
    handler: Option<H>,
    config: GathererConfig,
    _marker: PhantomData<fn(T)>,
}

impl<T, H> Default for GathererBuilder<T, H> {
    fn default() -> Self {
        Self {
            handler: None,
            config: GathererConfig::default(),
            _marker: PhantomData,
        }
    }
}

impl<T, H> GathererBuilder<T, H>
where
    T: Send + Sync + 'static,
    H: RequestHandler<T>,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing config.
    pub fn from_config(config: GathererConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn handler(mut self, handler: H) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn num_parts(mut self, num_parts: usize) -> Self {
        self.config.num_parts = num_parts;
        self
    }

    pub fn timeout_duration(mut self, timeout_duration: u64) -> Self {
        self.config.timeout_duration = timeout_duration;
        self
    }

    pub fn unit(mut self, unit: TimeUnit) -> Self {
        self.config.unit = unit;
        self
    }

    pub fn timeout_max_error(mut self, timeout_max_error: f64) -> Self {
        self.config.timeout_max_error = timeout_max_error;
        self
    }

    pub fn config(&self) -> &GathererConfig {
        &self.config
    }

    /// Builds a gatherer driven by its own [`TickTimer`].
    ///
    /// # Errors
    ///
    /// Returns a configuration error (see [`GathererConfig::validate`]),
    /// [`Error::MissingHandler`], or [`Error::TimerSpawn`].
    pub fn build(self) -> Result<Gatherer<T, H, TickTimer>> {
        let (handler, config) = self.into_parts()?;
        Gatherer::new(handler, config)
    }

    /// Builds a gatherer driven by `scheduler`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error (see [`GathererConfig::validate`]) or
    /// [`Error::MissingHandler`].
    pub fn build_with_scheduler<S: Scheduler>(self, scheduler: S) -> Result<Gatherer<T, H, S>> {
        let (handler, config) = self.into_parts()?;
        Gatherer::with_scheduler(handler, config, scheduler)
    }

    fn into_parts(self) -> Result<(H, GathererConfig)> {
        self.config.validate()?;
        let handler = self.handler.ok_or(Error::MissingHandler)?;
        Ok((handler, self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = GathererConfig::default();
        assert_eq!(config.unit, TimeUnit::Milliseconds);
        assert_eq!(config.timeout_max_error, 0.2);
        assert_eq!(config.num_parts, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_timeout_max_error_out_of_range() {
        for bad in [0.0, -0.1, 1.5, f64::NAN, f64::INFINITY] {
            let config = GathererConfig::new(2, 10, TimeUnit::Milliseconds).with_timeout_max_error(bad);
            assert!(matches!(config.validate(), Err(Error::InvalidTimeoutMaxError(_))));
        }
        let edge = GathererConfig::new(2, 10, TimeUnit::Milliseconds).with_timeout_max_error(1.0);
        assert!(edge.validate().is_ok());
    }

    #[test]
    fn rejects_zero_parts_and_zero_timeout() {
        let zero_parts = GathererConfig::new(0, 10, TimeUnit::Milliseconds);
        assert!(matches!(zero_parts.validate(), Err(Error::InvalidNumParts)));

        let zero_timeout = GathererConfig::new(2, 0, TimeUnit::Milliseconds);
        assert!(matches!(zero_timeout.validate(), Err(Error::ZeroTimeout)));

        // Nothing to wait for with a single part.
        assert!(GathererConfig::new(1, 0, TimeUnit::Milliseconds).validate().is_ok());
    }

    #[test]
    fn tick_granularity() {
        let config = GathererConfig::new(2, 10, TimeUnit::Milliseconds);
        assert_eq!(config.num_steps(), 5);
        assert_eq!(config.tick_duration(), Duration::from_millis(2));

        let coarse = config.with_timeout_max_error(1.0);
        assert_eq!(coarse.num_steps(), 1);
        assert_eq!(coarse.tick_duration(), Duration::from_millis(10));

        let fine = GathererConfig::new(2, 3, TimeUnit::Nanoseconds).with_timeout_max_error(0.01);
        assert_eq!(fine.num_steps(), 100);
        assert_eq!(fine.tick_duration(), Duration::from_nanos(1));
    }

    #[test]
    fn builder_requires_handler() {
        let result = GathererBuilder::<u64, fn(crate::RequestBuffer<u64>)>::new()
            .num_parts(2)
            .timeout_duration(10)
            .build();
        assert!(matches!(result, Err(Error::MissingHandler)));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn config_deserializes_with_defaults() {
        let config: GathererConfig =
            serde_json::from_str(r#"{ "num_parts": 3, "timeout_duration": 5, "unit": "seconds" }"#)
                .unwrap();
        assert_eq!(config.num_parts, 3);
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.timeout_max_error, DEFAULT_TIMEOUT_MAX_ERROR);
    }
}
