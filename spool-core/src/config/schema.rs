//! Configuration schema definitions for Spool
//!
//! All configuration structures use serde for serialization/deserialization and
//! validator for field-level validation. Every section carries `#[serde(default)]`
//! so partial files only override what they mention.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Default capacity of the drop-oldest buffers used by delayed and windowed streams.
pub const DEFAULT_BACKPRESSURE_CAPACITY: usize = 128;

/// Default per-subscriber queue length of a shared stream.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 256;

/// Root configuration object for a discovery service.
///
/// Layered as defaults → file → environment, see
/// [`ConfigLoader`](crate::config::ConfigLoader).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct PoolConfig {
    /// Overflow buffer settings for delayed and windowed streams
    #[validate(nested)]
    pub backpressure: BackpressureConfig,

    /// Fan-out settings for shared streams
    #[validate(nested)]
    pub multicast: MulticastConfig,

    /// Log output settings
    #[validate(nested)]
    pub logging: LoggingConfig,
}

/// Overflow buffer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct BackpressureConfig {
    /// Capacity used when an identity does not name its own
    #[validate(range(min = 1, max = 1_048_576))]
    pub default_capacity: usize,

    /// Emit a warning for every dropped element
    ///
    /// Drops are always counted in the pool metrics; this only controls the log line.
    pub log_drops: bool,
}

impl Default for BackpressureConfig {
    fn default() -> Self {
        Self { default_capacity: DEFAULT_BACKPRESSURE_CAPACITY, log_drops: true }
    }
}

/// Shared stream fan-out configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct MulticastConfig {
    /// Queue length between the shared pump and each subscriber
    ///
    /// The pump waits for the slowest subscriber once its queue is full.
    #[validate(range(min = 1, max = 65_536))]
    pub subscriber_buffer: usize,
}

impl Default for MulticastConfig {
    fn default() -> Self {
        Self { subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set
    #[validate(length(min = 1))]
    pub level: String,

    /// Emit JSON lines instead of human readable text
    pub json: bool,

    /// Include thread ids in log lines
    pub with_thread_ids: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false, with_thread_ids: false }
    }
}
