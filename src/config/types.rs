//! Core configuration types and loading.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::defaults::{
    default_command_prefix, default_command_rate, default_log_level, default_ping_interval,
};
use super::network::{NetworkConfig, NetworkSettings};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Bot configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Default nickname for networks that don't set one.
    pub nick: Option<String>,
    /// Default username.
    pub username: Option<String>,
    /// Default realname.
    pub realname: Option<String>,
    /// Prefix that marks a channel or private message as a bot command.
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
    /// Hostmasks (`nick!user@host` wildcards) allowed to run admin commands.
    #[serde(default)]
    pub admins: Vec<String>,
    /// Directory for persistent data; required for hot restart.
    pub datadir: Option<String>,
    /// Default keepalive interval in seconds.
    #[serde(default = "default_ping_interval")]
    pub ping: u64,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    /// Networks by name.
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkConfig>,
    /// Per-module settings, keyed by module name (`[modules.keepnick]`).
    #[serde(default)]
    pub modules: BTreeMap<String, toml::Table>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Resolve a network block against the global defaults.
    ///
    /// Returns `None` if no such network is configured. The result is not
    /// validated; see [`NetworkSettings::validate`].
    pub fn network(&self, name: &str) -> Option<NetworkSettings> {
        self.networks
            .get(name)
            .map(|net| NetworkSettings::resolve(name, net, self))
    }

    /// The data directory with `~` expanded.
    pub fn datadir(&self) -> Option<PathBuf> {
        self.datadir
            .as_deref()
            .map(|dir| PathBuf::from(shellexpand::tilde(dir).into_owned()))
    }

    /// Settings table for a module; empty if not configured.
    pub fn module(&self, name: &str) -> toml::Table {
        self.modules.get(name).cloned().unwrap_or_default()
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// One of `debug`, `info`, `warning`, `error`.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human readable text.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl LoggingConfig {
    /// The `tracing` filter directive for the configured level.
    ///
    /// Unknown levels fall back to `info`.
    pub fn filter_directive(&self) -> &'static str {
        match self.level.to_ascii_lowercase().as_str() {
            "debug" => "debug",
            "warning" | "warn" => "warn",
            "error" => "error",
            _ => "info",
        }
    }
}

/// Security configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// Commands a single hostmask may issue per minute; 0 disables the limit.
    #[serde(default = "default_command_rate")]
    pub command_rate_per_minute: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            command_rate_per_minute: default_command_rate(),
        }
    }
}
