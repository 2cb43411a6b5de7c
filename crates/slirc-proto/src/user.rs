//! User identities seen in message prefixes.
//!
//! A prefix such as `nick!user@host` identifies who sent a message. Servers
//! may also send a bare nickname (or a server name, which parses the same
//! way). Only identities with all three parts are "full".

use std::fmt;
use std::str::FromStr;

use crate::error::MessageParseError;
use crate::util::wildcard_match;

/// A user identity: `nick`, optionally with `user` and `host`.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct User {
    /// Nickname.
    pub nick: String,
    /// Username (ident), present only for full identities.
    pub user: Option<String>,
    /// Hostname, present only for full identities.
    pub host: Option<String>,
}

impl User {
    /// Create an identity with just a nickname.
    pub fn from_nick(nick: impl Into<String>) -> Self {
        Self {
            nick: nick.into(),
            user: None,
            host: None,
        }
    }

    /// True if nick, user and host are all present and non-empty.
    pub fn is_full(&self) -> bool {
        !self.nick.is_empty()
            && self.user.as_deref().is_some_and(|u| !u.is_empty())
            && self.host.as_deref().is_some_and(|h| !h.is_empty())
    }

    /// Match this identity against a wildcard mask such as `*!*@host`.
    ///
    /// The mask is compared against the canonical rendering (see
    /// [`fmt::Display`]), so a mask for `nick!user@host` never matches an
    /// identity that only carries a nickname.
    pub fn matches(&self, mask: &str) -> bool {
        wildcard_match(mask, &self.to_string())
    }
}

impl FromStr for User {
    type Err = MessageParseError;

    /// Parse `nick` or `nick!user@host`.
    ///
    /// The nick runs up to the first `!`; the user runs up to the next `@`
    /// and must not be empty; the host is everything that remains.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || MessageParseError::InvalidUser(s.to_owned());

        match s.split_once('!') {
            None if s.is_empty() => Err(invalid()),
            None => Ok(Self::from_nick(s)),
            Some((nick, rest)) => {
                let (user, host) = rest.split_once('@').ok_or_else(invalid)?;
                if nick.is_empty() || user.is_empty() {
                    return Err(invalid());
                }
                Ok(Self {
                    nick: nick.to_owned(),
                    user: Some(user.to_owned()),
                    host: Some(host.to_owned()),
                })
            }
        }
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.user, &self.host) {
            (Some(user), Some(host)) if self.is_full() => {
                write!(f, "{}!{}@{}", self.nick, user, host)
            }
            _ => f.write_str(&self.nick),
        }
    }
}
