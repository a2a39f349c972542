//! Configuration for the relay server.
//!
//! Supports command-line arguments, the `PAIRCHAT_LISTEN` environment
//! variable, and a TOML configuration file.
//! Precedence: CLI > environment > file > defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Args;
use serde::Deserialize;
use thiserror::Error;

use pairchat_protocol::DEFAULT_PORT;

use crate::registry::MAX_CLIENTS;

/// Environment variable overriding the listen address.
pub const LISTEN_ENV: &str = "PAIRCHAT_LISTEN";

/// Default maximum accepted input line, in bytes.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024;

/// Command-line arguments for the relay server.
#[derive(Args, Debug, Clone, Default)]
pub struct ServerArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 0.0.0.0:8999)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Maximum number of registered clients
    #[arg(long)]
    pub max_clients: Option<usize>,

    /// Maximum input line length in bytes
    #[arg(long)]
    pub max_line_length: Option<usize>,

    /// Disconnect clients idle for this many seconds (0 = never)
    #[arg(long)]
    pub idle_timeout: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// `[server]` section
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Maximum number of registered clients
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
    /// Maximum input line length in bytes
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,
    /// Idle timeout in seconds (0 = never)
    #[serde(default)]
    pub idle_timeout_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            max_clients: default_max_clients(),
            max_line_length: default_max_line_length(),
            idle_timeout_secs: 0,
        }
    }
}

/// `[logging]` section
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingSection {
    /// Base log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listen() -> String {
    format!("0.0.0.0:{DEFAULT_PORT}")
}

fn default_max_clients() -> usize {
    MAX_CLIENTS
}

fn default_max_line_length() -> usize {
    DEFAULT_MAX_LINE_LENGTH
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub listen: String,
    pub max_clients: usize,
    pub max_line_length: usize,
    pub idle_timeout: Option<Duration>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::merge(ServerArgs::default(), None, TomlConfig::default())
    }
}

impl Config {
    /// Resolves configuration from parsed CLI arguments and the process
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the config file cannot be read or parsed,
    /// or if a limit is zero.
    pub fn load(args: ServerArgs) -> Result<Self, ConfigError> {
        let env_listen = std::env::var(LISTEN_ENV).ok().filter(|v| !v.is_empty());
        Self::resolve(args, env_listen)
    }

    /// Like [`Config::load`] but with the environment passed in.
    ///
    /// # Errors
    ///
    /// See [`Config::load`].
    pub fn resolve(args: ServerArgs, env_listen: Option<String>) -> Result<Self, ConfigError> {
        let file = match args.config {
            Some(ref path) => Self::read_file(path)?,
            None => TomlConfig::default(),
        };

        let config = Self::merge(args, env_listen, file);
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<TomlConfig, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::TomlParse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    fn merge(args: ServerArgs, env_listen: Option<String>, file: TomlConfig) -> Self {
        let idle_secs = args.idle_timeout.unwrap_or(file.server.idle_timeout_secs);

        Self {
            listen: args
                .listen
                .or(env_listen)
                .unwrap_or(file.server.listen),
            max_clients: args.max_clients.unwrap_or(file.server.max_clients),
            max_line_length: args
                .max_line_length
                .unwrap_or(file.server.max_line_length),
            idle_timeout: (idle_secs > 0).then(|| Duration::from_secs(idle_secs)),
            log_level: args.log_level.unwrap_or(file.logging.level),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_clients == 0 {
            return Err(ConfigError::Invalid {
                field: "max_clients",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_line_length == 0 {
            return Err(ConfigError::Invalid {
                field: "max_line_length",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {error}", path.display())]
    FileRead { path: PathBuf, error: String },

    #[error("Failed to parse config file '{}': {error}", path.display())]
    TomlParse { path: PathBuf, error: String },

    #[error("Invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
