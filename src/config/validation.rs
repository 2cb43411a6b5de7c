//! Configuration validation.
//!
//! Validates configuration at startup and reload to catch common errors
//! early. Network errors only keep that network offline.

use super::Config;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("network {0}: host not specified")]
    MissingHost(String),
    #[error("network {0}: nick not specified")]
    MissingNick(String),
    #[error("network {0}: ping interval must be positive")]
    ZeroPing(String),
    #[error("command_prefix must not be empty")]
    EmptyCommandPrefix,
    #[error("datadir must be a directory: {0}")]
    DatadirNotDirectory(String),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.command_prefix.is_empty() {
        errors.push(ValidationError::EmptyCommandPrefix);
    }

    if let Some(dir) = config.datadir()
        && dir.exists()
        && !dir.is_dir()
    {
        errors.push(ValidationError::DatadirNotDirectory(
            dir.display().to_string(),
        ));
    }

    for name in config.networks.keys() {
        if let Some(settings) = config.network(name)
            && let Err(e) = settings.validate()
        {
            errors.push(e);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
