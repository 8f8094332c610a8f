//! Configuration management for Spool
//!
//! This module provides configuration for a discovery service with:
//! - Schema-driven configuration with validation
//! - Layered loading (defaults, file, environment)
//! - Cross-field validation and error reporting
//!
//! # Examples
//!
//! ```rust,no_run
//! use spool_core::config::ConfigLoader;
//!
//! let config = ConfigLoader::new()
//!     .with_path("/etc/spool")
//!     .load()
//!     .expect("Failed to load configuration");
//!
//! println!("Delay buffers hold {} elements", config.backpressure.default_capacity);
//! ```

pub mod loader;
pub mod schema;
pub mod validator;

pub use loader::ConfigLoader;
pub use schema::*;
pub use validator::ConfigValidator;

use crate::Result;
use std::path::Path;

/// Load configuration from the default search paths and the process environment
pub fn load_default() -> Result<PoolConfig> {
    ConfigLoader::new().load()
}

/// Load configuration from a specific file
pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<PoolConfig> {
    ConfigLoader::load_from_file(path)
}

/// Validate a configuration object
pub fn validate(config: &PoolConfig) -> Result<()> {
    ConfigValidator::validate(config)
}
