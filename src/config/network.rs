//! Per-network configuration blocks.

use serde::Deserialize;
use std::time::Duration;

use super::defaults::{default_port, login_name};
use super::types::Config;
use super::validation::ValidationError;

/// A `[networks.<name>]` block as written in the config file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NetworkConfig {
    /// Server hostname.
    pub server: Option<String>,
    /// Server port (default 6667, or 6697 with `ssl`).
    pub port: Option<u16>,
    /// Connect with TLS.
    #[serde(default)]
    pub ssl: bool,
    pub nick: Option<String>,
    /// Server password sent with PASS.
    pub password: Option<String>,
    pub username: Option<String>,
    pub realname: Option<String>,
    /// Channels joined after every successful registration.
    #[serde(default)]
    pub channels: Vec<String>,
    /// Keepalive interval in seconds; falls back to the global `ping`.
    pub ping: Option<u64>,
}

/// Connection settings for one network, with global defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSettings {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub tls: bool,
    pub nick: String,
    pub password: Option<String>,
    pub username: String,
    pub realname: String,
    pub channels: Vec<String>,
    pub ping: Duration,
}

impl NetworkSettings {
    /// Apply global defaults to a network block.
    ///
    /// Nick, username and realname fall back to the global values. A
    /// missing username then falls back to the login name, and finally to
    /// the nick; a missing realname falls back to the nick.
    pub fn resolve(name: &str, net: &NetworkConfig, global: &Config) -> Self {
        let nick = net
            .nick
            .clone()
            .or_else(|| global.nick.clone())
            .unwrap_or_default();
        let username = net
            .username
            .clone()
            .or_else(|| global.username.clone())
            .or_else(login_name)
            .unwrap_or_else(|| nick.clone());
        let realname = net
            .realname
            .clone()
            .or_else(|| global.realname.clone())
            .unwrap_or_else(|| nick.clone());

        Self {
            name: name.to_owned(),
            host: net.server.clone().unwrap_or_default(),
            port: net.port.unwrap_or_else(|| default_port(net.ssl)),
            tls: net.ssl,
            nick,
            password: net.password.clone(),
            username,
            realname,
            channels: net.channels.clone(),
            ping: Duration::from_secs(net.ping.unwrap_or(global.ping)),
        }
    }

    /// Check that the settings can be used to connect.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.host.is_empty() {
            return Err(ValidationError::MissingHost(self.name.clone()));
        }
        if self.nick.is_empty() {
            return Err(ValidationError::MissingNick(self.name.clone()));
        }
        if self.ping.is_zero() {
            return Err(ValidationError::ZeroPing(self.name.clone()));
        }
        Ok(())
    }

    /// `host:port` for logging and connecting.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
