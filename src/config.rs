use serde::{Deserialize, Serialize};
use std::fs;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config yaml: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("store.backend is postgres but store.postgres_url is not set")]
    MissingPostgresUrl,

    #[error("Failed to install log subscriber: {0}")]
    Logging(String),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// PostgreSQL connection URL, required for the postgres backend
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            postgres_url: None,
            max_connections: default_max_connections(),
        }
    }
}

impl AppConfig {
    /// Load `config/{env}.yaml`
    pub fn load(env: &str) -> Result<Self, ConfigError> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path).map_err(|source| ConfigError::Io {
            path: config_path.clone(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.backend == StoreBackend::Postgres && self.store.postgres_url.is_none() {
            return Err(ConfigError::MissingPostgresUrl);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r#"
log_level: "info"
log_dir: "./logs"
log_file: "tubes.log"
use_json: false
rotation: "daily"
"#;

    #[test]
    fn test_store_defaults_to_memory() {
        let config = AppConfig::from_yaml_str(BASE).unwrap();
        assert_eq!(config.store, StoreConfig::default());
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.store.max_connections, 5);
    }

    #[test]
    fn test_postgres_backend() {
        let yaml = format!(
            "{}store:\n  backend: postgres\n  postgres_url: \"postgresql://tubes@localhost/tubes\"\n",
            BASE
        );
        let config = AppConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(config.store.backend, StoreBackend::Postgres);
        assert_eq!(config.store.max_connections, 5);
        assert!(config.store.postgres_url.is_some());
    }

    #[test]
    fn test_postgres_without_url_rejected() {
        let yaml = format!("{}store:\n  backend: postgres\n", BASE);
        assert!(matches!(
            AppConfig::from_yaml_str(&yaml),
            Err(ConfigError::MissingPostgresUrl)
        ));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            AppConfig::from_yaml_str("log_level: [1"),
            Err(ConfigError::Parse(_))
        ));
        let yaml = format!("{}store:\n  backend: sqlite\n", BASE);
        assert!(matches!(
            AppConfig::from_yaml_str(&yaml),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let err = AppConfig::load("no-such-env").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("config/no-such-env.yaml"));
    }
}
