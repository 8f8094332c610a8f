//! Telemetry for Spool: log subscriber installation and pool metrics.

pub mod metrics;

pub use metrics::{PoolMetrics, PoolMetricsSnapshot};

use crate::config::LoggingConfig;
use tracing::{debug, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Installs a global `tracing` subscriber configured from `config`.
///
/// `RUST_LOG` takes precedence over `config.level`. Returns `false` when a global
/// subscriber was already installed, in which case the existing one stays in place.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let result = if config.json {
        let fmt_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(config.with_thread_ids)
            .json();
        tracing_subscriber::registry().with(fmt_layer.with_filter(env_filter)).try_init()
    } else {
        let fmt_layer = fmt::layer().with_target(true).with_thread_ids(config.with_thread_ids);
        tracing_subscriber::registry().with(fmt_layer.with_filter(env_filter)).try_init()
    };

    match result {
        Ok(()) => {
            info!(level = %config.level, json = config.json, "Logging initialized");
            true
        },
        Err(err) => {
            debug!("Global subscriber already installed: {}", err);
            false
        },
    }
}
