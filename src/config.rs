//! Service configuration.
//!
//! Settings come from a TOML file (path in `EXCEEDANCE_CONFIG`, default
//! `exceedance.toml`) with every key optional; a missing file means all
//! defaults. A few values can be overridden from the environment, which is
//! seeded from `.env` at startup:
//!
//! - `PORT`: listen port
//! - `EARTHDATA_USERNAME` / `EARTHDATA_PASSWORD`: basic credentials for
//!   remote datasets

use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::ingest::opendap::Credentials;
use crate::logging::LogLevel;

pub const CONFIG_PATH_VAR: &str = "EXCEEDANCE_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "exceedance.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io { path: String, source: io::Error },
    #[error("invalid config {path}: {source}")]
    Parse { path: String, source: toml::de::Error },
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub source: SourceConfig,
    /// Filled from the environment only; never read from the file.
    #[serde(skip)]
    pub credentials: Option<Credentials>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// `debug`, `info`, `warn` or `error`.
    pub level: String,
    /// Append log lines to this file as well as the console.
    pub file: Option<String>,
    /// Timestamped console lines instead of the compact form.
    pub timestamps: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceConfig {
    /// Per-request timeout for remote dataset calls.
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            source: SourceConfig::default(),
            credentials: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            timestamps: true,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: concat!("exceedance_service/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Config {
    /// Loads `.env`, then the file named by `EXCEEDANCE_CONFIG`, then the
    /// environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let path = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::load(&path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Reads a TOML file. A file that does not exist yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.display().to_string(),
                    source,
                });
            }
        };

        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.log_level()?;
        Ok(config)
    }

    /// Applies `PORT` and the Earthdata credentials from `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            self.server.port = port.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "PORT",
                message: format!("'{}' is not a port number", port),
            })?;
        }

        // Both or nothing; a lone username is ignored.
        if let (Some(username), Some(password)) = (lookup("EARTHDATA_USERNAME"), lookup("EARTHDATA_PASSWORD")) {
            if !username.is_empty() {
                self.credentials = Some(Credentials { username, password });
            }
        }

        Ok(())
    }

    pub fn log_level(&self) -> Result<LogLevel, ConfigError> {
        self.logging.level.parse().map_err(|message| ConfigError::Invalid {
            key: "logging.level",
            message,
        })
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source.timeout_secs)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
