//! Reassembles requests whose parts arrive independently and out of order.
//!
//! A [`Gatherer`] buffers the parts of each [`RequestId`] and calls a
//! [`RequestHandler`] exactly once per request: as soon as every part has
//! arrived, or when the request's timeout expires, whichever comes first.
//! Timeouts are approximate; see [`GathererConfig`] for the precision
//! trade-off.
//!
//! ```
//! use gatherer::{GathererBuilder, RequestBuffer, RequestId, TimeUnit};
//! use std::{sync::mpsc, time::Duration};
//!
//! let (tx, rx) = mpsc::channel();
//! let gatherer = GathererBuilder::<u64, _>::new()
//!     .handler(move |buffer: RequestBuffer<u64>| tx.send(buffer).unwrap())
//!     .num_parts(2)
//!     .timeout_duration(10)
//!     .unit(TimeUnit::Milliseconds)
//!     .build()
//!     .unwrap();
//!
//! gatherer.receive(RequestId::new(), 0, 123).unwrap();
//!
//! let expired = rx.recv_timeout(Duration::from_secs(1)).unwrap();
//! assert!(!expired.is_full());
//! assert_eq!(expired.get(0), Some(&123));
//! ```
//!
//! ## Features
//!
//! - `tracing`: emit `tracing` events for session lifecycle and timer panics
//! - `serde`: (de)serialize [`RequestId`], [`TimeUnit`], and [`GathererConfig`]
//! - `async-tokio`: [`TokioScheduler`](crate::TokioScheduler)
//! - `async-smol`: [`SmolScheduler`](crate::SmolScheduler)

mod buffer;
mod config;
mod error;
mod gatherer;
mod handler;
mod id;
mod rand;
mod runtime;
mod scheduler;
mod time;

pub use crate::buffer::*;
pub use crate::config::*;
pub use crate::error::*;
pub use crate::gatherer::*;
pub use crate::handler::*;
pub use crate::id::*;
pub use crate::rand::*;
#[cfg(any(feature = "async-tokio", feature = "async-smol"))]
pub use crate::runtime::*;
pub use crate::scheduler::*;
pub use crate::time::*;
