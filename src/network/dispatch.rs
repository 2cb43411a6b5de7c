//! Inbound event fan-out.
//!
//! Every parsed message goes through the same pipeline:
//!
//! 1. pending one-shot listeners (see [`NetworkSession::wait_for_message`])
//! 2. generic message handlers
//! 3. command or numeric-reply class handlers
//! 4. handlers registered for the specific command name
//!
//! Each stage runs the session's own handlers first and then the delegate
//! (bot-level) handlers. Specific handlers declare how many parameters they
//! take, counting the prefix, and are skipped with a warning when the server
//! sent a different number of arguments.
//!
//! [`NetworkSession::wait_for_message`]: super::NetworkSession::wait_for_message

use std::collections::HashMap;
use std::sync::Arc;

use slirc_proto::Message;
use tracing::warn;

use super::session::NetworkSession;

/// Parameter count a specific handler accepts, including the prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamCount {
    /// Exactly this many parameters.
    Exact(usize),
    /// At least this many; the rest arrive as a slice.
    AtLeast(usize),
}

impl ParamCount {
    /// Whether a message with `args` arguments can be delivered.
    pub fn accepts(&self, args: usize) -> bool {
        let params = args + 1;
        match *self {
            Self::Exact(n) => params == n,
            Self::AtLeast(n) => params >= n,
        }
    }
}

/// Handler receiving the whole message.
pub type MessageHandler = Arc<dyn Fn(&Arc<NetworkSession>, &Message) + Send + Sync>;

/// Handler receiving the prefix and the arguments of one command.
pub type CommandHandler = Arc<dyn Fn(&Arc<NetworkSession>, Option<&str>, &[String]) + Send + Sync>;

#[derive(Clone)]
struct SpecificHandler {
    name: &'static str,
    params: ParamCount,
    run: CommandHandler,
}

/// Handlers registered by one party (the session or its delegate).
#[derive(Clone, Default)]
pub struct HandlerSet {
    on_message: Vec<MessageHandler>,
    on_command: Vec<MessageHandler>,
    on_reply: Vec<MessageHandler>,
    specific: HashMap<String, Vec<SpecificHandler>>,
}

impl HandlerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called for every message.
    pub fn on_message<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&Arc<NetworkSession>, &Message) + Send + Sync + 'static,
    {
        self.on_message.push(Arc::new(f));
        self
    }

    /// Called for every non-numeric message.
    pub fn on_command<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&Arc<NetworkSession>, &Message) + Send + Sync + 'static,
    {
        self.on_command.push(Arc::new(f));
        self
    }

    /// Called for every numeric reply.
    pub fn on_reply<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&Arc<NetworkSession>, &Message) + Send + Sync + 'static,
    {
        self.on_reply.push(Arc::new(f));
        self
    }

    /// Register a handler for one command, e.g. `on("PRIVMSG", Exact(3), ..)`
    /// for `sender, target, text`.
    pub fn on<F>(&mut self, command: &'static str, params: ParamCount, f: F) -> &mut Self
    where
        F: Fn(&Arc<NetworkSession>, Option<&str>, &[String]) + Send + Sync + 'static,
    {
        self.specific
            .entry(command.to_ascii_uppercase())
            .or_default()
            .push(SpecificHandler {
                name: command,
                params,
                run: Arc::new(f),
            });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.on_message.is_empty()
            && self.on_command.is_empty()
            && self.on_reply.is_empty()
            && self.specific.is_empty()
    }
}

/// A session's handlers plus an optional delegate.
#[derive(Clone, Default)]
pub struct EventDispatcher {
    local: Arc<HandlerSet>,
    delegate: Option<Arc<HandlerSet>>,
}

impl EventDispatcher {
    pub fn new(local: HandlerSet, delegate: Option<Arc<HandlerSet>>) -> Self {
        Self {
            local: Arc::new(local),
            delegate,
        }
    }

    fn sets(&self) -> impl Iterator<Item = &HandlerSet> {
        std::iter::once(self.local.as_ref()).chain(self.delegate.as_deref())
    }

    /// Run stages 2 to 4 for one message.
    pub fn dispatch(&self, session: &Arc<NetworkSession>, msg: &Message) {
        for set in self.sets() {
            for handler in &set.on_message {
                handler(session, msg);
            }
        }

        for set in self.sets() {
            let class = if msg.is_reply() {
                &set.on_reply
            } else {
                &set.on_command
            };
            for handler in class {
                handler(session, msg);
            }
        }

        let key = msg.command.to_ascii_uppercase();
        for set in self.sets() {
            let Some(handlers) = set.specific.get(&key) else {
                continue;
            };
            for handler in handlers {
                if handler.params.accepts(msg.args.len()) {
                    (handler.run)(session, msg.prefix.as_deref(), &msg.args);
                } else {
                    warn!(
                        handler = handler.name,
                        expected = ?handler.params,
                        got = msg.args.len() + 1,
                        message = %msg.to_string().trim_end(),
                        "command handler parameters do not match the message from the server"
                    );
                }
            }
        }
    }
}
