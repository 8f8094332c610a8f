//! # Configuration Loading
//!
//! Loads a [`PoolConfig`] from layered sources: built-in defaults, the first
//! configuration file found on the search paths, then prefixed environment variables.

use crate::{
    config::{schema::PoolConfig, validator::ConfigValidator},
    Error, Result,
};
use std::{
    collections::HashMap,
    env,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

/// File names probed in every search path, in order.
const CONFIG_FILE_NAMES: [&str; 2] = ["spool.toml", "config.toml"];

/// Separator between nested keys in environment variable names.
///
/// `SPOOL_BACKPRESSURE__DEFAULT_CAPACITY` maps to `backpressure.default_capacity`.
const ENV_NESTING_SEPARATOR: &str = "__";

/// Configuration loader with support for multiple sources
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    search_paths: Vec<PathBuf>,
    env_prefix: String,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            search_paths: vec![PathBuf::from("."), PathBuf::from("./config")],
            env_prefix: "SPOOL".to_string(),
        }
    }

    /// Add a search path for configuration files
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Replace the search paths, highest priority first
    pub fn with_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.search_paths = paths.into_iter().map(|p| p.as_ref().to_path_buf()).collect();
        self
    }

    /// Set the environment variable prefix
    pub fn with_env_prefix<S: AsRef<str>>(mut self, prefix: S) -> Self {
        self.env_prefix = prefix.as_ref().to_string();
        self
    }

    /// Load configuration from all available sources
    pub fn load(&self) -> Result<PoolConfig> {
        self.load_with_env(env::vars())
    }

    /// Load configuration, reading overrides from the given variables instead of the process
    /// environment
    pub fn load_with_env<I>(&self, vars: I) -> Result<PoolConfig>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut config_value = toml::Value::try_from(PoolConfig::default()).map_err(|e| {
            Error::Configuration(format!("Failed to serialize default config: {e}"))
        })?;

        if let Some(config_path) = self.find_config_file() {
            let file_config = load_config_file(&config_path)?;
            config_value = merge_config(config_value, file_config);
            info!("Loaded configuration file: {}", config_path.display());
        } else {
            debug!("No configuration file found in search paths");
        }

        for (key, value) in self.collect_env_vars(vars) {
            set_nested_value(&mut config_value, &key.split('.').collect::<Vec<_>>(), &value);
        }

        let config: PoolConfig = config_value
            .try_into()
            .map_err(|e| Error::Configuration(format!("Failed to deserialize config: {e}")))?;

        ConfigValidator::validate(&config)?;
        debug!(?config, "Configuration loaded and validated");
        Ok(config)
    }

    /// Load configuration from a specific file, ignoring search paths and environment
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<PoolConfig> {
        let path = path.as_ref();
        info!("Loading configuration from file: {}", path.display());

        let file_config = load_config_file(path)?;
        let defaults = toml::Value::try_from(PoolConfig::default()).map_err(|e| {
            Error::Configuration(format!("Failed to serialize default config: {e}"))
        })?;
        let config: PoolConfig = merge_config(defaults, file_config)
            .try_into()
            .map_err(|e| Error::Configuration(format!("Failed to parse config file: {e}")))?;

        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Get the effective search paths being used
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Get the environment prefix being used
    pub fn env_prefix(&self) -> &str {
        &self.env_prefix
    }

    /// Find the first available configuration file
    fn find_config_file(&self) -> Option<PathBuf> {
        self.search_paths
            .iter()
            .flat_map(|dir| CONFIG_FILE_NAMES.iter().map(move |name| dir.join(name)))
            .find(|candidate| candidate.is_file())
    }

    /// Collect prefixed variables as dotted configuration keys
    fn collect_env_vars<I>(&self, vars: I) -> HashMap<String, String>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let prefix = format!("{}_", self.env_prefix);
        let env_vars: HashMap<String, String> = vars
            .into_iter()
            .filter_map(|(key, value)| {
                let stripped = key.strip_prefix(&prefix)?;
                let config_key = stripped.to_lowercase().replace(ENV_NESTING_SEPARATOR, ".");
                Some((config_key, value))
            })
            .collect();

        debug!("Collected {} environment overrides", env_vars.len());
        env_vars
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Load configuration from a TOML file
fn load_config_file(path: &Path) -> Result<toml::Value> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Configuration(format!("Failed to read config file {}: {}", path.display(), e))
    })?;

    content.parse::<toml::Value>().map_err(|e| {
        Error::Configuration(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

/// Merge two TOML values, tables recursively, `override_value` winning
fn merge_config(mut base: toml::Value, override_value: toml::Value) -> toml::Value {
    match (&mut base, override_value) {
        (toml::Value::Table(base_table), toml::Value::Table(override_table)) => {
            for (key, value) in override_table {
                match base_table.remove(&key) {
                    Some(existing) if existing.is_table() && value.is_table() => {
                        base_table.insert(key, merge_config(existing, value));
                    },
                    _ => {
                        base_table.insert(key, value);
                    },
                }
            }
            base
        },
        (_, override_value) => override_value,
    }
}

/// Set a nested value in the TOML configuration
fn set_nested_value(config: &mut toml::Value, parts: &[&str], value: &str) {
    let toml::Value::Table(table) = config else {
        return;
    };

    match parts {
        [] => {},
        [last] => {
            table.insert((*last).to_string(), parse_env_value(value));
        },
        [head, rest @ ..] => {
            let entry = table
                .entry((*head).to_string())
                .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
            set_nested_value(entry, rest, value);
        },
    }
}

/// Parse environment variable value to appropriate TOML type
fn parse_env_value(value: &str) -> toml::Value {
    if let Ok(bool_val) = value.parse::<bool>() {
        return toml::Value::Boolean(bool_val);
    }

    if let Ok(int_val) = value.parse::<i64>() {
        return toml::Value::Integer(int_val);
    }

    if let Ok(float_val) = value.parse::<f64>() {
        return toml::Value::Float(float_val);
    }

    toml::Value::String(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn no_env() -> Vec<(String, String)> {
        Vec::new()
    }

    #[test]
    fn test_config_loader_creation() {
        let loader = ConfigLoader::new();
        assert!(!loader.search_paths().is_empty());
        assert_eq!(loader.env_prefix(), "SPOOL");
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let loader = ConfigLoader::new().with_paths([temp_dir.path()]);

        let config = loader.load_with_env(no_env()).unwrap();
        assert_eq!(config, PoolConfig::default());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join("spool.toml"),
            "[backpressure]\ndefault_capacity = 32\n",
        )
        .unwrap();

        let config =
            ConfigLoader::new().with_paths([temp_dir.path()]).load_with_env(no_env()).unwrap();
        assert_eq!(config.backpressure.default_capacity, 32);
        assert!(config.backpressure.log_drops);
    }

    #[test]
    fn test_env_overrides_file() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join("config.toml"),
            "[multicast]\nsubscriber_buffer = 8\n",
        )
        .unwrap();

        let env = vec![
            ("SPOOL_MULTICAST__SUBSCRIBER_BUFFER".to_string(), "64".to_string()),
            ("SPOOL_LOGGING__JSON".to_string(), "true".to_string()),
            ("OTHER_LOGGING__JSON".to_string(), "false".to_string()),
        ];
        let config = ConfigLoader::new().with_paths([temp_dir.path()]).load_with_env(env).unwrap();

        assert_eq!(config.multicast.subscriber_buffer, 64);
        assert!(config.logging.json);
    }

    #[test]
    fn test_invalid_override_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let env = vec![("SPOOL_BACKPRESSURE__DEFAULT_CAPACITY".to_string(), "0".to_string())];

        let result = ConfigLoader::new().with_paths([temp_dir.path()]).load_with_env(env);
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("custom.toml");
        std::fs::write(&path, "[logging]\nlevel = \"debug\"\n").unwrap();

        let config = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.multicast, PoolConfig::default().multicast);
    }

    #[test]
    fn test_merge_config() {
        let base: toml::Value = toml::from_str("[a]\nx = 1\ny = 2\n").unwrap();
        let over: toml::Value = toml::from_str("[a]\ny = 3\n[b]\nz = 4\n").unwrap();

        let merged = merge_config(base, over);
        assert_eq!(merged["a"]["x"].as_integer(), Some(1));
        assert_eq!(merged["a"]["y"].as_integer(), Some(3));
        assert_eq!(merged["b"]["z"].as_integer(), Some(4));
    }

    #[test]
    fn test_parse_env_value() {
        assert_eq!(parse_env_value("true"), toml::Value::Boolean(true));
        assert_eq!(parse_env_value("42"), toml::Value::Integer(42));
        assert_eq!(parse_env_value("debug"), toml::Value::String("debug".to_string()));
    }
}
