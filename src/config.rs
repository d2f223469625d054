//! Configuration management for pokespider using the prefer crate.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::spider::http_client::USER_AGENT;
use crate::spider::{IdRange, RateLimit, RetryPolicy, UrlTemplate};

/// Default upstream resource template.
pub const DEFAULT_URL_TEMPLATE: &str = "https://pokeapi.co/api/v2/pokemon/{id}/";

/// Errors raised while validating configuration, before any work starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid ID range {start}..={end}: IDs must be positive and start <= end")]
    InvalidRange { start: u32, end: u32 },

    #[error("Invalid URL template: {0}")]
    InvalidTemplate(String),

    #[error("Invalid retry policy: {0}")]
    InvalidRetry(String),

    #[error("Invalid request timeout: {0}")]
    InvalidTimeout(String),

    #[error("Invalid database settings: {0}")]
    InvalidDatabase(String),

    #[error("Database host {0} configured but pokespider was built without the postgres feature")]
    PostgresUnavailable(String),
}

/// Database connection parameters.
///
/// With no `host` the store is a SQLite file named `name` inside the data
/// directory; with a host it is a PostgreSQL database called `name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseSettings {
    pub name: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub host: Option<String>,
    pub port: u16,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            name: "pokespider.db".to_string(),
            user: None,
            password: None,
            host: None,
            port: 5432,
        }
    }
}

impl DatabaseSettings {
    /// Connection URL for a PostgreSQL server, or `None` without a host.
    ///
    /// Credentials are percent-encoded. A configured host that does not yield
    /// a valid URL is an error, never a fallback to SQLite.
    pub fn postgres_url(&self) -> Result<Option<String>, ConfigError> {
        let Some(host) = self.host.as_deref() else {
            return Ok(None);
        };
        let mut url = url::Url::parse(&format!("postgres://{}:{}/{}", host, self.port, self.name))
            .map_err(|e| ConfigError::InvalidDatabase(format!("host {:?}: {}", host, e)))?;
        if let Some(ref user) = self.user {
            url.set_username(user).map_err(|_| {
                ConfigError::InvalidDatabase(format!("cannot set user {:?}", user))
            })?;
            if let Some(ref password) = self.password {
                url.set_password(Some(password)).map_err(|_| {
                    ConfigError::InvalidDatabase("cannot set password".to_string())
                })?;
            }
        }
        Ok(Some(url.to_string()))
    }
}

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory (holds the SQLite database).
    pub data_dir: PathBuf,
    /// Database connection parameters.
    pub database: DatabaseSettings,
    /// User agent for HTTP requests.
    pub user_agent: String,
    /// Request timeout in seconds.
    pub request_timeout: u64,
    /// Pause after every ID in milliseconds.
    pub request_delay_ms: u64,
    /// First ID to fetch (inclusive).
    pub start_id: u32,
    /// Last ID to fetch (inclusive).
    pub end_id: u32,
    /// Resource URL with an `{id}` placeholder.
    pub url_template: String,
    /// Maximum attempts per ID on transport errors.
    pub max_retries: u32,
    /// Linear backoff base in milliseconds.
    pub retry_backoff_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
            .join("pokespider");

        Self {
            data_dir,
            database: DatabaseSettings::default(),
            user_agent: USER_AGENT.to_string(),
            request_timeout: 10,
            request_delay_ms: 300,
            start_id: 1,
            end_id: 100,
            url_template: DEFAULT_URL_TEMPLATE.to_string(),
            max_retries: 3,
            retry_backoff_ms: 1000,
        }
    }
}

impl Settings {
    /// Create settings with a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            ..Default::default()
        }
    }

    /// Get the full path to the SQLite database.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database.name)
    }

    /// Ensure all directories exist.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.data_dir)
    }

    pub fn request_timeout(&self) -> Result<Duration, ConfigError> {
        if self.request_timeout == 0 {
            return Err(ConfigError::InvalidTimeout(
                "request timeout must be at least 1 second".to_string(),
            ));
        }
        Ok(Duration::from_secs(self.request_timeout))
    }

    pub fn id_range(&self) -> Result<IdRange, ConfigError> {
        IdRange::new(self.start_id, self.end_id)
    }

    pub fn url_template(&self) -> Result<UrlTemplate, ConfigError> {
        UrlTemplate::parse(&self.url_template)
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy, ConfigError> {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.retry_backoff_ms),
        )
    }

    pub fn rate_limit(&self) -> RateLimit {
        RateLimit::from_millis(self.request_delay_ms)
    }
}

/// Database section of the configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Target directory for data.
    #[serde(default)]
    pub target: Option<String>,
    /// Database connection parameters.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// User agent string.
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Request timeout in seconds.
    #[serde(default)]
    pub request_timeout: Option<u64>,
    /// Delay between IDs in milliseconds.
    #[serde(default)]
    pub request_delay_ms: Option<u64>,
    #[serde(default)]
    pub start_id: Option<u32>,
    #[serde(default)]
    pub end_id: Option<u32>,
    #[serde(default)]
    pub url_template: Option<String>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub retry_backoff_ms: Option<u64>,
}

impl Config {
    /// Load configuration using prefer crate.
    /// Automatically discovers pokespider config files in standard locations.
    pub async fn load() -> Self {
        match prefer::load("pokespider").await {
            Ok(pref_config) => {
                // Extract values from prefer config using dot notation
                let database = DatabaseConfig {
                    name: pref_config.get("database.name").ok(),
                    user: pref_config.get("database.user").ok(),
                    password: pref_config.get("database.password").ok(),
                    host: pref_config.get("database.host").ok(),
                    port: pref_config.get("database.port").ok(),
                };

                Config {
                    target: pref_config.get("target").ok(),
                    database,
                    user_agent: pref_config.get("user_agent").ok(),
                    request_timeout: pref_config.get("request_timeout").ok(),
                    request_delay_ms: pref_config.get("request_delay_ms").ok(),
                    start_id: pref_config.get("start_id").ok(),
                    end_id: pref_config.get("end_id").ok(),
                    url_template: pref_config.get("url_template").ok(),
                    max_retries: pref_config.get("max_retries").ok(),
                    retry_backoff_ms: pref_config.get("retry_backoff_ms").ok(),
                }
            }
            Err(_) => {
                // No config file found, use defaults
                Self::default()
            }
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings) {
        if let Some(ref target) = self.target {
            let path = shellexpand::tilde(target);
            settings.data_dir = PathBuf::from(path.as_ref());
        }

        let db = &self.database;
        if let Some(ref name) = db.name {
            settings.database.name = name.clone();
        }
        if db.user.is_some() {
            settings.database.user = db.user.clone();
        }
        if db.password.is_some() {
            settings.database.password = db.password.clone();
        }
        if db.host.is_some() {
            settings.database.host = db.host.clone();
        }
        if let Some(port) = db.port {
            settings.database.port = port;
        }

        if let Some(ref user_agent) = self.user_agent {
            settings.user_agent = user_agent.clone();
        }
        if let Some(timeout) = self.request_timeout {
            settings.request_timeout = timeout;
        }
        if let Some(delay) = self.request_delay_ms {
            settings.request_delay_ms = delay;
        }
        if let Some(start) = self.start_id {
            settings.start_id = start;
        }
        if let Some(end) = self.end_id {
            settings.end_id = end;
        }
        if let Some(ref template) = self.url_template {
            settings.url_template = template.clone();
        }
        if let Some(retries) = self.max_retries {
            settings.max_retries = retries;
        }
        if let Some(backoff) = self.retry_backoff_ms {
            settings.retry_backoff_ms = backoff;
        }
    }
}

/// Load settings from configuration (async version).
pub async fn load_settings() -> Settings {
    let config = Config::load().await;
    let mut settings = Settings::default();
    config.apply_to_settings(&mut settings);
    settings
}
