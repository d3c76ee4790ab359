//! Configuration parsing and validation for llmlens.

use serde::Deserialize;
use std::path::Path;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: Option<DatabaseConfig>,
    /// Optional configuration to install as the active/default one at startup.
    pub default_configuration: Option<DefaultConfiguration>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "127.0.0.1:8080")
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "./llmlens.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Provider configuration to upsert as the default at startup.
///
/// Sampling parameters left unset are filled from the model catalog when a
/// matching template exists, so a minimal block of provider + model is enough
/// to route requests on a fresh install.
#[derive(Debug, Clone, Deserialize)]
pub struct DefaultConfiguration {
    /// Display name; defaults to "<provider>/<model>"
    pub name: Option<String>,
    pub provider: String,
    pub model: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f64>,
    pub frequency_penalty: Option<f64>,
    pub presence_penalty: Option<f64>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;

        Self::parse_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(default) = &self.default_configuration {
            if default.provider.is_empty() {
                return Err(ConfigError::Validation(
                    "default_configuration.provider must not be empty".to_string(),
                ));
            }
            if default.model.is_empty() {
                return Err(ConfigError::Validation(
                    "default_configuration.model must not be empty".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Get database config with defaults.
    pub fn database(&self) -> DatabaseConfig {
        self.database.clone().unwrap_or_default()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
            [server]
            listen = "127.0.0.1:9000"
        "#;

        let config = Config::parse_str(toml).unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:9000");
        assert!(config.default_configuration.is_none());
        assert_eq!(config.database().path, "./llmlens.db");
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [server]
            listen = "0.0.0.0:8080"

            [database]
            path = "./test.db"

            [default_configuration]
            name = "Daily driver"
            provider = "openai"
            model = "gpt-4o-mini"
            temperature = 0.7
            max_tokens = 4096

            [logging]
            level = "debug"
        "#;

        let config = Config::parse_str(toml).unwrap();
        let default = config.default_configuration.unwrap();
        assert_eq!(default.provider, "openai");
        assert_eq!(default.model, "gpt-4o-mini");
        assert_eq!(default.temperature, Some(0.7));
        assert_eq!(default.max_tokens, Some(4096));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_empty_provider_rejected() {
        let toml = r#"
            [server]
            listen = "127.0.0.1:9000"

            [default_configuration]
            provider = ""
            model = "gpt-4o"
        "#;

        let result = Config::parse_str(toml);
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_empty_model_rejected() {
        let toml = r#"
            [server]
            listen = "127.0.0.1:9000"

            [default_configuration]
            provider = "openai"
            model = ""
        "#;

        let result = Config::parse_str(toml);
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }
}
