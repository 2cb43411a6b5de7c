//! Error types for the IRC protocol library.
//!
//! This module defines error types for protocol-level (framing) errors
//! and for message parsing failures.

use thiserror::Error;

/// Convenience type alias for Results using [`ProtocolError`].
pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;

/// Top-level protocol errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// I/O error during reading or writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Line bytes were not valid UTF-8.
    #[error("invalid UTF-8 in line at byte {byte_pos}")]
    InvalidUtf8 {
        /// Byte position where UTF-8 validation failed.
        byte_pos: usize,
    },

    /// Line exceeded maximum allowed length.
    #[error("line too long: {actual} bytes (limit: {limit})")]
    LineTooLong {
        /// Actual line length.
        actual: usize,
        /// Maximum allowed length.
        limit: usize,
    },

    /// Failed to parse an IRC message.
    #[error("invalid message: {string}")]
    InvalidMessage {
        /// The invalid message string.
        string: String,
        /// The underlying parse error.
        #[source]
        cause: MessageParseError,
    },
}

/// Errors encountered when parsing or constructing IRC messages.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum MessageParseError {
    /// Message was empty.
    #[error("empty message")]
    EmptyMessage,

    /// Command was missing.
    #[error("missing command")]
    MissingCommand,

    /// A prefix was present but nothing followed it.
    #[error("prefix without command")]
    UnterminatedPrefix,

    /// An absent argument appeared before a present one.
    #[error("argument {index} is absent but later arguments are present")]
    InteriorAbsentArgument {
        /// Position of the first absent argument.
        index: usize,
    },

    /// A user identity could not be parsed.
    #[error("invalid user identity: {0}")]
    InvalidUser(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProtocolError::LineTooLong {
            actual: 9000,
            limit: 8191,
        };
        assert_eq!(err.to_string(), "line too long: 9000 bytes (limit: 8191)");

        let err = MessageParseError::InteriorAbsentArgument { index: 1 };
        assert_eq!(
            err.to_string(),
            "argument 1 is absent but later arguments are present"
        );
    }

    #[test]
    fn test_protocol_error_chaining() {
        let protocol_err = ProtocolError::InvalidMessage {
            string: ":prefix".to_string(),
            cause: MessageParseError::UnterminatedPrefix,
        };

        let source = std::error::Error::source(&protocol_err);
        assert_eq!(
            source.map(|s| s.to_string()),
            Some("prefix without command".to_string())
        );
    }

    #[test]
    fn test_io_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let protocol_err: ProtocolError = io_err.into();
        assert!(matches!(protocol_err, ProtocolError::Io(_)));
    }
}
