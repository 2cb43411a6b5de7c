//! # slirc-proto
//!
//! Client side of the line-oriented IRC protocol: a message model with its
//! wire format, user identities from message prefixes, channel name rules
//! (including RFC 2811 "safe" channels), and a tokio codec that frames a
//! byte stream into messages.
//!
//! ```rust
//! use slirc_proto::{Message, User};
//!
//! let msg: Message = ":nick!user@host PRIVMSG #channel :Hello!".parse().unwrap();
//! let sender: User = msg.prefix.as_deref().unwrap().parse().unwrap();
//! assert!(sender.matches("*!*@host"));
//! assert_eq!(Message::privmsg("#channel", "hi there").to_string(),
//!            "PRIVMSG #channel :hi there\r\n");
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod chan;
pub mod error;
#[cfg(feature = "tokio")]
pub mod irc;
#[cfg(feature = "tokio")]
pub mod line;
pub mod message;
pub mod user;
pub mod util;

pub use self::chan::{ChannelNamer, CHANNEL_SIGILS};
pub use self::error::{MessageParseError, ProtocolError};
#[cfg(feature = "tokio")]
pub use self::irc::IrcCodec;
#[cfg(feature = "tokio")]
pub use self::line::{LineCodec, MAX_IRC_LINE_LEN};
pub use self::message::Message;
pub use self::user::User;
pub use self::util::{irc_eq, irc_to_lower, wildcard_match};
