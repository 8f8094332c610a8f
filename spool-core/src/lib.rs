//! # Spool Core
//!
//! Discovery and resolution of named, lazily built streams.
//!
//! Callers name a stream with a typed, immutable [`StreamId`]. The
//! [`DiscoveryService`] resolves the identity into a shared stream on first request
//! and hands the same stream to every later requester. An ordered chain of
//! [`StreamFactory`] implementations decides how identities become streams,
//! including streams derived from other streams by mapping, filtering, merging,
//! zipping, delaying and windowing.
//!
//! ## Quick Start
//!
//! ```rust
//! use futures::{stream, StreamExt};
//! use spool_core::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> spool_core::Result<()> {
//!     let discovery = DiscoveryService::new()?;
//!
//!     let numbers = StreamId::<i32>::named("numbers");
//!     discovery.provide(&numbers, stream::iter(vec![1, 2, 3, 4]))?;
//!
//!     let even = filtered(&numbers, &Predicate::new(|v: &i32| v % 2 == 0));
//!     let values: Vec<i32> = discovery.discover(&even)?.subscribe().collect().await;
//!     assert_eq!(values, vec![2, 4]);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`streamid`]: identities, their equality contract and composite constructors
//! - [`discovery`]: the memoizing registry and factory chain walk
//! - [`factory`]: the factory trait and the built-in factories
//! - [`stream`]: shared streams, typed flows and data/error pairs
//! - [`config`]: layered configuration loading and validation
//! - [`telemetry`]: log subscriber setup and pool metrics
//! - [`error`]: error types and result handling

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod discovery;
pub mod error;
pub mod factory;
pub mod prelude;
pub mod stream;
pub mod streamid;
pub mod telemetry;
pub mod types;

pub use discovery::{DiscoveryService, DiscoveryServiceBuilder};
pub use error::{Error, Result, StreamError};
pub use factory::StreamFactory;
pub use stream::{DataErrorPair, Flow, StreamPair, Subscription};
pub use streamid::{AnyStreamId, IdKind, StreamId};
pub use types::{Payload, Value};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
