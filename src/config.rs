//! Configuration module for the SockJS fixture server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::sockjs::SockJsOptions;

/// Command-line arguments for the fixture server
#[derive(Parser, Debug)]
#[command(name = "sockjs-fixture")]
#[command(author = "sockjs-fixture authors")]
#[command(version = "0.1.0")]
#[command(about = "SockJS echo, ping and close-on-request test server", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 127.0.0.1:8026)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Seconds of idle time before a heartbeat frame is sent
    #[arg(long)]
    pub heartbeat_delay: Option<u64>,

    /// Seconds a session survives without a receiver
    #[arg(long)]
    pub disconnect_delay: Option<u64>,

    /// Disable the websocket transports
    #[arg(long)]
    pub no_websocket: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sockjs: SockJsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

/// SockJS transport configuration
#[derive(Debug, Deserialize)]
pub struct SockJsConfig {
    /// Heartbeat delay in seconds
    #[serde(default = "default_heartbeat_delay")]
    pub heartbeat_delay: u64,
    /// Disconnect delay in seconds
    #[serde(default = "default_disconnect_delay")]
    pub disconnect_delay: u64,
    /// Offer websocket transports
    #[serde(default = "default_websocket")]
    pub websocket: bool,
}

impl Default for SockJsConfig {
    fn default() -> Self {
        Self {
            heartbeat_delay: default_heartbeat_delay(),
            disconnect_delay: default_disconnect_delay(),
            websocket: default_websocket(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1:8026".to_string()
}

fn default_heartbeat_delay() -> u64 {
    25
}

fn default_disconnect_delay() -> u64 {
    5
}

fn default_websocket() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: String,
    pub heartbeat_delay: u64,
    pub disconnect_delay: u64,
    pub websocket: bool,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Ok(Self::merge(cli, toml_config))
    }

    /// Merge CLI args with TOML config (CLI takes precedence)
    pub fn merge(cli: CliArgs, toml_config: TomlConfig) -> Self {
        Config {
            listen: cli.listen.unwrap_or(toml_config.server.listen),
            heartbeat_delay: cli
                .heartbeat_delay
                .unwrap_or(toml_config.sockjs.heartbeat_delay),
            disconnect_delay: cli
                .disconnect_delay
                .unwrap_or(toml_config.sockjs.disconnect_delay),
            websocket: !cli.no_websocket && toml_config.sockjs.websocket,
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        }
    }

    /// Transport options handed to every endpoint.
    pub fn sockjs_options(&self) -> SockJsOptions {
        SockJsOptions {
            heartbeat_delay: Duration::from_secs(self.heartbeat_delay.max(1)),
            disconnect_delay: Duration::from_secs(self.disconnect_delay),
            websocket: self.websocket,
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {err}", path = .0.display(), err = .1)]
    FileRead(PathBuf, #[source] std::io::Error),
    #[error("Failed to parse config file '{path}': {err}", path = .0.display(), err = .1)]
    TomlParse(PathBuf, #[source] toml::de::Error),
}
