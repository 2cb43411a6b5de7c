//! Unified error handling for slirc-bot.
//!
//! Protocol framing errors live in `slirc_proto`; everything the bot itself
//! can fail at is collected here with `#[from]` conversions so `?` works
//! across layers.

use slirc_proto::ProtocolError;
use thiserror::Error;

use crate::config::{ConfigError, ValidationError};

// ============================================================================
// Session Errors (one network connection)
// ============================================================================

/// Errors from a single network session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The transport went away (during the handshake or while waiting).
    #[error("connection lost")]
    Disconnected,

    #[error("not connected")]
    NotConnected,

    #[error("a connection attempt is already in progress")]
    AlreadyConnecting,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("tls error: {0}")]
    Tls(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl SessionError {
    /// Get a static error code string for log fields.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::NotConnected => "not_connected",
            Self::AlreadyConnecting => "already_connecting",
            Self::Io(_) => "io_error",
            Self::Tls(_) => "tls_error",
            Self::Protocol(_) => "protocol_error",
            Self::Validation(_) => "validation_error",
        }
    }
}

// ============================================================================
// Restart Errors (hot restart state transfer)
// ============================================================================

/// Errors while saving or loading hot-restart state.
#[derive(Debug, Error)]
pub enum RestartError {
    #[error("state file io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state file is malformed: {0}")]
    Format(#[from] serde_json::Error),

    #[error("failed to execute {path}: {source}")]
    Exec {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// ============================================================================
// Bot Errors (orchestrator and module helpers)
// ============================================================================

/// Errors surfaced by the bot orchestrator.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("restart is not possible without datadir")]
    RestartUnavailable,

    #[error("no such network: {0}")]
    UnknownNetwork(String),

    #[error("bot is shutting down")]
    ShuttingDown,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Restart(#[from] RestartError),
}

impl From<ValidationError> for BotError {
    fn from(e: ValidationError) -> Self {
        Self::Session(SessionError::Validation(e))
    }
}

/// Result type for bot operations.
pub type BotResult<T> = Result<T, BotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(SessionError::Disconnected.error_code(), "disconnected");
        assert_eq!(
            SessionError::from(ValidationError::MissingHost("x".into())).error_code(),
            "validation_error"
        );
    }

    #[test]
    fn test_display_passthrough() {
        let err: BotError = ValidationError::MissingNick("libera".into()).into();
        assert_eq!(err.to_string(), "network libera: nick not specified");
        assert_eq!(
            BotError::RestartUnavailable.to_string(),
            "restart is not possible without datadir"
        );
    }
}
