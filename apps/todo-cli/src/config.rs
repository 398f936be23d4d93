//! CLI configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// CLI configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    /// Base URL of the hosted backend
    #[serde(default)]
    pub backend_url: Option<String>,

    /// Project API key
    #[serde(default)]
    pub api_key: String,

    /// Signed-in user's access token
    #[serde(default)]
    pub access_token: Option<String>,

    /// ID of the signed-in user
    #[serde(default)]
    pub user_id: Option<String>,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            backend_url: None,
            api_key: String::new(),
            access_token: None,
            user_id: None,
            log_level: default_log_level(),
        }
    }
}

impl CliConfig {
    /// Load configuration from `.env`, the environment and an optional
    /// config file. Environment variables take precedence over the file.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let mut config = match Self::find_config_file() {
            Some(config_path) => {
                let contents = std::fs::read_to_string(&config_path)?;
                toml::from_str::<CliConfig>(&contents)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());

        config.validate()?;
        Ok(config)
    }

    /// Override fields with environment variables.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var("TODO_BACKEND_URL") {
            self.backend_url = Some(url);
        }

        if let Some(key) = var("TODO_BACKEND_API_KEY") {
            self.api_key = key;
        }

        if let Some(token) = var("TODO_ACCESS_TOKEN") {
            self.access_token = Some(token);
        }

        if let Some(user_id) = var("TODO_USER_ID") {
            self.user_id = Some(user_id);
        }

        if let Some(level) = var("TODO_LOG_LEVEL") {
            self.log_level = level;
        }
    }

    /// Check that required settings are present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend_url.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::Missing("TODO_BACKEND_URL"));
        }
        if self.user_id.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::Missing("TODO_USER_ID"));
        }
        Ok(())
    }

    /// Backend URL (empty before validation)
    pub fn backend_url(&self) -> &str {
        self.backend_url.as_deref().unwrap_or_default()
    }

    /// Signed-in user ID (empty before validation)
    pub fn user_id(&self) -> &str {
        self.user_id.as_deref().unwrap_or_default()
    }

    /// Find the config file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let locations = [
            PathBuf::from("todo-cli.toml"),
            dirs::config_dir()
                .map(|p| p.join("todo-cli").join("config.toml"))
                .unwrap_or_default(),
        ];

        locations.into_iter().find(|p| p.is_file())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}
