//! Message parsing implementation.

use std::str::FromStr;

use crate::error::{MessageParseError, ProtocolError};

use super::types::Message;

fn invalid(s: &str, cause: MessageParseError) -> ProtocolError {
    ProtocolError::InvalidMessage {
        string: s.to_owned(),
        cause,
    }
}

impl FromStr for Message {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Message, Self::Err> {
        let line = s.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Err(invalid(s, MessageParseError::EmptyMessage));
        }

        let (prefix, rest) = match line.strip_prefix(':') {
            Some(stripped) => match stripped.split_once(' ') {
                Some((prefix, rest)) => (Some(prefix.to_owned()), rest),
                None => return Err(invalid(s, MessageParseError::UnterminatedPrefix)),
            },
            None => (None, line),
        };

        let (command, params) = match rest.split_once(' ') {
            Some((command, params)) => (command, Some(params)),
            None => (rest, None),
        };

        if command.is_empty() {
            return Err(invalid(s, MessageParseError::MissingCommand));
        }

        let args = match params {
            None => Vec::new(),
            Some(params) => split_params(params),
        };

        Ok(Message {
            prefix,
            command: command.to_owned(),
            args,
        })
    }
}

/// Split the parameter part of a line into arguments.
///
/// Everything after the first ` :` (or a leading `:`) is one trailing
/// argument and is kept even when empty. Leading arguments are separated by
/// single or repeated spaces.
fn split_params(params: &str) -> Vec<String> {
    if let Some(trailing) = params.strip_prefix(':') {
        return vec![trailing.to_owned()];
    }

    let (middle, trailing) = match params.split_once(" :") {
        Some((middle, trailing)) => (middle, Some(trailing)),
        None => (params, None),
    };

    middle
        .split(' ')
        .filter(|arg| !arg.is_empty())
        .chain(trailing)
        .map(str::to_owned)
        .collect()
}
