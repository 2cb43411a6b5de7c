//! Line-based codec for tokio.
//!
//! Reads `\n`-terminated lines (an optional preceding `\r` is stripped) and
//! writes lines verbatim. Lines that are too long or not valid UTF-8 are
//! logged and skipped; they never end the stream.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::error;

/// Maximum IRC line length, including the line ending.
pub const MAX_IRC_LINE_LEN: usize = 8191;

/// Line-based codec that handles newline-terminated messages.
#[derive(Debug)]
pub struct LineCodec {
    /// Index of next byte to check for newline
    next_index: usize,
    /// Maximum line length
    max_len: usize,
    /// Skipping the rest of an overlong line
    discarding: bool,
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::with_max_len(MAX_IRC_LINE_LEN)
    }
}

impl LineCodec {
    /// Create a new codec with the default maximum line length.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new codec with custom max line length.
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            next_index: 0,
            max_len,
            discarding: false,
        }
    }

    /// Maximum accepted line length in bytes.
    pub fn max_len(&self) -> usize {
        self.max_len
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = error::ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> error::Result<Option<String>> {
        loop {
            let newline = src[self.next_index..]
                .iter()
                .position(|b| *b == b'\n')
                .map(|offset| self.next_index + offset);

            match (self.discarding, newline) {
                (true, Some(pos)) => {
                    src.advance(pos + 1);
                    self.next_index = 0;
                    self.discarding = false;
                }
                (true, None) => {
                    src.clear();
                    self.next_index = 0;
                    return Ok(None);
                }
                (false, Some(pos)) => {
                    let line = src.split_to(pos + 1);
                    self.next_index = 0;

                    if line.len() > self.max_len {
                        warn!(
                            actual = line.len(),
                            limit = self.max_len,
                            "discarding overlong line"
                        );
                        continue;
                    }

                    let trimmed = line
                        .strip_suffix(b"\n")
                        .map(|l| l.strip_suffix(b"\r").unwrap_or(l))
                        .unwrap_or(&line[..]);

                    match std::str::from_utf8(trimmed) {
                        Ok(text) => return Ok(Some(text.to_owned())),
                        Err(e) => {
                            warn!(
                                error = %error::ProtocolError::InvalidUtf8 {
                                    byte_pos: e.valid_up_to(),
                                },
                                "discarding line"
                            );
                            continue;
                        }
                    }
                }
                (false, None) => {
                    if src.len() > self.max_len {
                        warn!(
                            actual = src.len(),
                            limit = self.max_len,
                            "discarding overlong partial line"
                        );
                        src.clear();
                        self.next_index = 0;
                        self.discarding = true;
                    } else {
                        self.next_index = src.len();
                    }
                    return Ok(None);
                }
            }
        }
    }
}

impl Encoder<String> for LineCodec {
    type Error = error::ProtocolError;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> error::Result<()> {
        dst.extend_from_slice(line.as_bytes());
        Ok(())
    }
}
