//! IRC message codec for tokio.
//!
//! Wraps [`LineCodec`] and parses each line into a [`Message`]. Lines that
//! do not parse are logged and skipped so a single bad line from the server
//! never ends the stream.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::error;
use crate::line::LineCodec;
use crate::message::Message;

/// Tokio codec for encoding/decoding IRC messages.
#[derive(Debug, Default)]
pub struct IrcCodec {
    inner: LineCodec,
}

impl IrcCodec {
    /// Create a codec with the default line limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new codec with custom max line length.
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            inner: LineCodec::with_max_len(max_len),
        }
    }

    /// Sanitize an outgoing line.
    ///
    /// Everything from the first line break on is dropped and a single CRLF
    /// is appended, so an argument can never smuggle in a second command.
    pub fn sanitize(data: &str) -> String {
        let end = data.find(['\r', '\n']).unwrap_or(data.len());
        let mut line = String::with_capacity(end + 2);
        line.push_str(&data[..end]);
        line.push_str("\r\n");
        line
    }
}

impl Decoder for IrcCodec {
    type Item = Message;
    type Error = error::ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> error::Result<Option<Message>> {
        while let Some(line) = self.inner.decode(src)? {
            match line.parse::<Message>() {
                Ok(msg) => return Ok(Some(msg)),
                Err(e) => warn!(error = %e, line = %line, "invalid message from server"),
            }
        }
        Ok(None)
    }
}

impl Encoder<Message> for IrcCodec {
    type Error = error::ProtocolError;

    fn encode(&mut self, msg: Message, dst: &mut BytesMut) -> error::Result<()> {
        let sanitized = Self::sanitize(&msg.to_string());
        self.inner.encode(sanitized, dst)
    }
}
