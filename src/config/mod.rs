//! Configuration loading for the measurement connector.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `CONNECTOR_`, producing a typed [`AppConfig`].

use std::{collections::BTreeMap, env, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

const ENV_PREFIX: &str = "CONNECTOR_";

/// Application configuration derived from `CONNECTOR_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_acquire_timeout_ms")]
    pub db_acquire_timeout_ms: u64,
    /// Base URL of the local building platform (trend queries, notifications).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_api_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_api_key: Option<String>,
    #[serde(default = "default_platform_request_timeout_seconds")]
    pub platform_request_timeout_seconds: u64,
    #[serde(default)]
    pub worker: WorkerConfig,
}

/// Worker loop parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct WorkerConfig {
    /// Seconds between two passes over all configurations.
    #[serde(default = "default_worker_tick_seconds")]
    pub tick_seconds: u64,
    /// HTTP timeout used when a configuration stores a non-positive request timeout.
    #[serde(default = "default_worker_request_timeout_seconds")]
    pub default_request_timeout_seconds: u64,
    /// Wait after a login step when the provider has not advertised a poll interval yet.
    #[serde(default = "default_worker_verification_interval_seconds")]
    pub default_verification_interval_seconds: u64,
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            database_url: default_database_url(),
            db_max_connections: default_db_max_connections(),
            db_acquire_timeout_ms: default_db_acquire_timeout_ms(),
            platform_api_url: None,
            platform_api_key: None,
            platform_request_timeout_seconds: default_platform_request_timeout_seconds(),
            worker: WorkerConfig::default(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            tick_seconds: default_worker_tick_seconds(),
            default_request_timeout_seconds: default_worker_request_timeout_seconds(),
            default_verification_interval_seconds: default_worker_verification_interval_seconds(),
            run_migrations: true,
        }
    }
}

impl AppConfig {
    /// Returns a redacted JSON representation (secrets are redacted).
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut config = self.clone();
        if config.platform_api_key.is_some() {
            config.platform_api_key = Some("[REDACTED]".to_string());
        }
        serde_json::to_string_pretty(&config)
    }

    /// Whether the profile is a developer profile where the platform URL may be omitted.
    pub fn is_local_profile(&self) -> bool {
        matches!(self.profile.as_str(), "local" | "test")
    }

    /// Validates the configuration, returning an error if required settings are missing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.log_format.as_str(), "json" | "pretty") {
            return Err(ConfigError::InvalidLogFormat {
                value: self.log_format.clone(),
            });
        }

        if self.db_max_connections == 0 {
            return Err(ConfigError::InvalidDbMaxConnections);
        }

        match &self.platform_api_url {
            Some(raw) => {
                Url::parse(raw).map_err(|source| ConfigError::InvalidPlatformUrl {
                    value: raw.clone(),
                    source,
                })?;
            }
            None if !self.is_local_profile() => return Err(ConfigError::MissingPlatformUrl),
            None => {}
        }

        if self.platform_request_timeout_seconds == 0 {
            return Err(ConfigError::InvalidTimeout {
                field: "PLATFORM_REQUEST_TIMEOUT_SECONDS",
            });
        }

        self.worker.validate()
    }
}

impl WorkerConfig {
    /// Validate worker bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=3600).contains(&self.tick_seconds) {
            return Err(ConfigError::InvalidWorkerTick {
                value: self.tick_seconds,
            });
        }
        if self.default_request_timeout_seconds == 0 {
            return Err(ConfigError::InvalidTimeout {
                field: "WORKER_DEFAULT_REQUEST_TIMEOUT_SECONDS",
            });
        }
        if self.default_verification_interval_seconds == 0 {
            return Err(ConfigError::InvalidTimeout {
                field: "WORKER_DEFAULT_VERIFICATION_INTERVAL_SECONDS",
            });
        }
        Ok(())
    }
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_database_url() -> String {
    "sqlite://connector.db?mode=rwc".to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_acquire_timeout_ms() -> u64 {
    5000
}

fn default_platform_request_timeout_seconds() -> u64 {
    30
}

fn default_worker_tick_seconds() -> u64 {
    10
}

fn default_worker_request_timeout_seconds() -> u64 {
    30
}

fn default_worker_verification_interval_seconds() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("log format must be `json` or `pretty`, got '{value}'")]
    InvalidLogFormat { value: String },
    #[error("database max connections must be at least 1")]
    InvalidDbMaxConnections,
    #[error("platform API URL is missing; set CONNECTOR_PLATFORM_API_URL")]
    MissingPlatformUrl,
    #[error("invalid platform API URL '{value}': {source}")]
    InvalidPlatformUrl {
        value: String,
        source: url::ParseError,
    },
    #[error("{field} must be positive")]
    InvalidTimeout { field: &'static str },
    #[error("worker tick must be between 1 and 3600 seconds, got {value}")]
    InvalidWorkerTick { value: u64 },
}

/// Loads configuration using layered `.env` files and `CONNECTOR_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads `.env`, `.env.local`, `.env.{profile}`, `.env.{profile}.local`, then the
    /// process environment, and validates the result.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        // Overlay process environment last so it wins.
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                layered.insert(stripped.to_string(), value);
            }
        }

        let profile = non_empty(layered.remove("PROFILE")).unwrap_or(profile_hint);
        let log_level = non_empty(layered.remove("LOG_LEVEL")).unwrap_or_else(default_log_level);
        let log_format = non_empty(layered.remove("LOG_FORMAT"))
            .map(|v| v.to_ascii_lowercase())
            .unwrap_or_else(default_log_format);
        let database_url =
            non_empty(layered.remove("DATABASE_URL")).unwrap_or_else(default_database_url);
        let db_max_connections = layered
            .remove("DB_MAX_CONNECTIONS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_db_max_connections);
        let db_acquire_timeout_ms = layered
            .remove("DB_ACQUIRE_TIMEOUT_MS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_db_acquire_timeout_ms);

        let platform_api_url = non_empty(layered.remove("PLATFORM_API_URL"));
        let platform_api_key = non_empty(layered.remove("PLATFORM_API_KEY"));
        let platform_request_timeout_seconds = layered
            .remove("PLATFORM_REQUEST_TIMEOUT_SECONDS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_platform_request_timeout_seconds);

        let worker = WorkerConfig {
            tick_seconds: layered
                .remove("WORKER_TICK_SECONDS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_worker_tick_seconds),
            default_request_timeout_seconds: layered
                .remove("WORKER_DEFAULT_REQUEST_TIMEOUT_SECONDS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_worker_request_timeout_seconds),
            default_verification_interval_seconds: layered
                .remove("WORKER_DEFAULT_VERIFICATION_INTERVAL_SECONDS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_worker_verification_interval_seconds),
            run_migrations: layered
                .remove("WORKER_RUN_MIGRATIONS")
                .and_then(|v| parse_bool(&v))
                .unwrap_or(true),
        };

        let config = AppConfig {
            profile,
            log_level,
            log_format,
            database_url,
            db_max_connections,
            db_acquire_timeout_ms,
            platform_api_url,
            platform_api_key,
            platform_request_timeout_seconds,
            worker,
        };

        config.validate()?;
        Ok(config)
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var(format!("{ENV_PREFIX}PROFILE"))
            .ok()
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(self.base_dir.join(format!(".env.{profile}")), &mut values)?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{profile}.local")),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
