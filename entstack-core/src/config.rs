//! Configuration parsing and management.

use entstack_query::QueryConfig;
use entstack_store::StoreConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

/// Main configuration struct matching the entstack.yml schema
///
/// ```yaml
/// store:
///   allow_def_shadowing: false
/// query:
///   loop_limit: 500
///   strict_defs: true
///   snapshot_len: 8
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub query: QueryConfig,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.query.loop_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "query.loop_limit".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.query.max_depth == 0 {
            return Err(ConfigError::InvalidValue {
                field: "query.max_depth".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert!(config.store.allow_def_shadowing);
        assert_eq!(config.query.loop_limit, 10_000);
        assert_eq!(config.query.max_depth, 128);
        assert!(config.query.strict_defs);
        assert_eq!(config.query.snapshot_len, 5);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = Config::from_yaml("query:\n  loop_limit: 42\n").unwrap();
        assert_eq!(config.query.loop_limit, 42);
        assert!(config.query.strict_defs);
        assert!(config.store.allow_def_shadowing);
    }

    #[test]
    fn test_empty_sections() {
        let config = Config::from_yaml("store: {}\nquery: {}\n").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_zero_loop_limit_is_rejected() {
        let err = Config::from_yaml("query:\n  loop_limit: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "query.loop_limit"));
    }

    #[test]
    fn test_zero_max_depth_is_rejected() {
        let err = Config::from_yaml("query:\n  max_depth: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "query.max_depth"));
    }

    #[test]
    fn test_bad_yaml() {
        let err = Config::from_yaml("query: [1, 2").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }
}
