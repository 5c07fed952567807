//! Configuration for the hierarchy service
use crate::engines::{Strategy, UnknownStrategy};
use crate::models::DEFAULT_MAX_NAME_LENGTH;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable that overrides the configured strategy
pub const STRATEGY_ENV_VAR: &str = "HIERARCHY_STRATEGY";

/// Default capacity of the domain event channel
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 128;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid HIERARCHY_STRATEGY: {0}")]
    Strategy(#[from] UnknownStrategy),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Where nodes are persisted
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreConfig {
    /// Process-local, gone on exit
    #[default]
    Memory,

    /// libsql database file
    Turso { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchyConfig {
    /// Which encoding the engine uses
    pub strategy: Strategy,

    /// Maximum node name length, in characters
    pub max_name_length: usize,

    pub store: StoreConfig,

    /// Buffered events per subscriber before lagging receivers drop old ones
    pub event_channel_capacity: usize,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            max_name_length: DEFAULT_MAX_NAME_LENGTH,
            store: StoreConfig::default(),
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl HierarchyConfig {
    /// Parse and validate a JSON document; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Apply `HIERARCHY_STRATEGY` from the process environment
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(raw) = lookup(STRATEGY_ENV_VAR) {
            self.strategy = raw.parse()?;
            tracing::debug!("Strategy overridden from environment: {}", self.strategy);
        }
        Ok(self)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_name_length == 0 {
            return Err(ConfigError::Invalid(
                "max_name_length must be greater than 0".to_string(),
            ));
        }

        if self.event_channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "event_channel_capacity must be greater than 0".to_string(),
            ));
        }

        if let StoreConfig::Turso { path } = &self.store {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::Invalid(
                    "store path cannot be empty".to_string(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HierarchyConfig::default();
        assert_eq!(config.strategy, Strategy::Adjacency);
        assert_eq!(config.max_name_length, 255);
        assert_eq!(config.store, StoreConfig::Memory);
        assert_eq!(config.event_channel_capacity, 128);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = HierarchyConfig::from_json_str(
            r#"{"strategy": "interval", "store": {"kind": "turso", "path": "/tmp/h.db"}}"#,
        )
        .unwrap();
        assert_eq!(config.strategy, Strategy::Interval);
        assert_eq!(
            config.store,
            StoreConfig::Turso {
                path: PathBuf::from("/tmp/h.db")
            }
        );
        assert_eq!(config.max_name_length, 255);
    }

    #[test]
    fn test_config_validation() {
        let mut config = HierarchyConfig::default();

        config.max_name_length = 0;
        assert!(config.validate().is_err());

        config.max_name_length = 10;
        config.event_channel_capacity = 0;
        assert!(config.validate().is_err());

        config.event_channel_capacity = 1;
        config.store = StoreConfig::Turso {
            path: PathBuf::new(),
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        assert!(matches!(
            HierarchyConfig::from_json_str(r#"{"strategy": "graph"}"#),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_strategy_override() {
        let config = HierarchyConfig::default()
            .with_overrides(|key| (key == STRATEGY_ENV_VAR).then(|| "closure".to_string()))
            .unwrap();
        assert_eq!(config.strategy, Strategy::Closure);

        let err = HierarchyConfig::default()
            .with_overrides(|_| Some("tree".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Strategy(_)));

        let untouched = HierarchyConfig::default().with_overrides(|_| None).unwrap();
        assert_eq!(untouched, HierarchyConfig::default());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("hierarchy.json");
        std::fs::write(&path, r#"{"strategy": "path", "max_name_length": 64}"#).unwrap();

        let config = HierarchyConfig::from_file(&path).unwrap();
        assert_eq!(config.strategy, Strategy::Path);
        assert_eq!(config.max_name_length, 64);

        assert!(matches!(
            HierarchyConfig::from_file(dir.path().join("missing.json")),
            Err(ConfigError::Io { .. })
        ));
    }
}
