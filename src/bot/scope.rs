//! Reply addressing.

use std::sync::Arc;

use slirc_proto::User;

use crate::error::SessionError;
use crate::network::NetworkSession;

/// Where a reply goes: the network, who spoke (if anyone) and the target.
#[derive(Clone)]
pub struct Scope {
    session: Arc<NetworkSession>,
    user: Option<User>,
    target: String,
}

impl Scope {
    /// Scope for a message from `user` sent to `to`.
    ///
    /// Channel messages are answered in the channel, private messages to
    /// the sender.
    pub fn new(session: Arc<NetworkSession>, user: User, to: &str) -> Self {
        let target = if session.namer().is_channel(to) {
            to.to_owned()
        } else {
            user.nick.clone()
        };
        Self {
            session,
            user: Some(user),
            target,
        }
    }

    /// Scope that replies to `target` exactly, with no originating user.
    pub fn raw(session: Arc<NetworkSession>, target: &str) -> Self {
        Self {
            session,
            user: None,
            target: target.to_owned(),
        }
    }

    /// Same scope, other target.
    #[must_use]
    pub fn to(&self, target: &str) -> Self {
        Self {
            target: target.to_owned(),
            ..self.clone()
        }
    }

    pub fn session(&self) -> &Arc<NetworkSession> {
        &self.session
    }

    pub fn network(&self) -> &str {
        self.session.name()
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// True if the target is a channel with the name `channel` (short or
    /// long form).
    pub fn channel_matches(&self, channel: &str) -> bool {
        let namer = self.session.namer();
        namer.is_channel(&self.target) && namer.channel_matches(&self.target, channel)
    }

    /// Send `text` to the target.
    pub fn reply(&self, text: &str) -> Result<(), SessionError> {
        self.session.privmsg(&self.target, text)
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("network", &self.session.name())
            .field("user", &self.user)
            .field("target", &self.target)
            .finish()
    }
}
