use thiserror::Error;

/// A result type whose error defaults to the crate [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All errors that `gatherer` can produce.
///
/// Errors fall into two groups. Configuration errors are raised while
/// building a [`Gatherer`] and mean nothing was constructed. Argument errors
/// are raised by [`Gatherer::receive`] and mean the call changed no state.
///
/// Failures raised by a user handler are never wrapped in this type; they
/// unwind through whichever thread invoked the handler.
///
/// [`Gatherer`]: crate::Gatherer
/// [`Gatherer::receive`]: crate::Gatherer::receive
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// `timeout_max_error` was outside `(0, 1]`.
    #[error("timeout_max_error must be in range (0, 1] (got {0})")]
    InvalidTimeoutMaxError(f64),

    /// `num_parts` was zero.
    #[error("num_parts must be at least 1")]
    InvalidNumParts,

    /// A multi-part gatherer was configured with a zero timeout.
    #[error("timeout duration must be greater than zero")]
    ZeroTimeout,

    /// The builder was finalized without a handler.
    #[error("a request handler is required")]
    MissingHandler,

    /// A part index was not in `[0, num_parts)`.
    #[error("received part {part} when max is {max}")]
    PartOutOfRange {
        /// The rejected index.
        part: usize,
        /// The largest accepted index (`num_parts - 1`).
        max: usize,
    },

    /// The default timer could not start its background thread.
    #[error("failed to spawn timer thread: {0}")]
    TimerSpawn(#[from] std::io::Error),
}

impl Error {
    /// Returns `true` for errors raised while validating configuration.
    pub fn is_invalid_config(&self) -> bool {
        matches!(
            self,
            Self::InvalidTimeoutMaxError(_)
                | Self::InvalidNumParts
                | Self::ZeroTimeout
                | Self::MissingHandler
        )
    }

    /// Returns `true` for errors raised by a rejected `receive` call.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::PartOutOfRange { .. })
    }
}
