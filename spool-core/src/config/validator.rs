//! # Configuration Validation
//!
//! Field-level rules come from the `validator` derives on the schema; this module adds
//! the checks that need more than one field or an external parser.

use crate::{config::schema::PoolConfig, Error, Result};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;
use validator::Validate;

/// Subscriber queues above this length hide slow consumers for a long time.
const LARGE_SUBSCRIBER_BUFFER: usize = 16_384;

/// Configuration validator
#[derive(Debug, Default)]
pub struct ConfigValidator;

impl ConfigValidator {
    /// Create a new configuration validator
    pub fn new() -> Self {
        Self
    }

    /// Validate a configuration
    pub fn validate(config: &PoolConfig) -> Result<()> {
        Self::new().validate_config(config)
    }

    /// Perform full validation of the configuration
    pub fn validate_config(&self, config: &PoolConfig) -> Result<()> {
        debug!("Starting configuration validation");

        config.validate().map_err(Error::from)?;
        self.validate_logging(config)?;
        self.validate_buffers(config);

        Ok(())
    }

    fn validate_logging(&self, config: &PoolConfig) -> Result<()> {
        EnvFilter::try_new(&config.logging.level).map_err(|e| {
            Error::Configuration(format!(
                "Invalid log filter '{}': {}",
                config.logging.level, e
            ))
        })?;
        Ok(())
    }

    fn validate_buffers(&self, config: &PoolConfig) {
        if config.multicast.subscriber_buffer > LARGE_SUBSCRIBER_BUFFER {
            warn!(
                subscriber_buffer = config.multicast.subscriber_buffer,
                "Large subscriber buffers delay backpressure from slow consumers"
            );
        }

        if !config.backpressure.log_drops {
            warn!("Backpressure drops will only be visible in pool metrics");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ConfigValidator::validate(&PoolConfig::default()).is_ok());
    }

    #[test]
    fn test_invalid_log_filter() {
        let mut config = PoolConfig::default();
        config.logging.level = "spool_core=notalevel".to_string();

        let result = ConfigValidator::validate(&config);
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_empty_log_filter() {
        let mut config = PoolConfig::default();
        config.logging.level = String::new();

        assert!(ConfigValidator::validate(&config).is_err());
    }
}
