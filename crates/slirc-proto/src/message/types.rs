use crate::error::MessageParseError;
use crate::user::User;

/// An owned IRC message.
///
/// A message is an optional prefix (the origin), a command which is either
/// a word such as `PRIVMSG` or a three digit numeric reply, and an ordered
/// list of arguments. Only the last argument may contain spaces.
///
/// # Example
///
/// ```
/// use slirc_proto::Message;
///
/// let msg: Message = ":nick!user@host PRIVMSG #channel :Hello there".parse().unwrap();
/// assert_eq!(msg.prefix.as_deref(), Some("nick!user@host"));
/// assert_eq!(msg.args, vec!["#channel", "Hello there"]);
///
/// let reply = Message::privmsg("#channel", "Hi!");
/// assert_eq!(reply.to_string(), "PRIVMSG #channel Hi!\r\n");
/// ```
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Message {
    /// Message origin (`nick!user@host` or a server name).
    pub prefix: Option<String>,
    /// Command word or numeric reply code.
    pub command: String,
    /// Command arguments; the last one is the "trailing" argument.
    pub args: Vec<String>,
}

impl Message {
    /// Create a message with no prefix.
    pub fn new<C, I, A>(command: C, args: I) -> Self
    where
        C: Into<String>,
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        Self {
            prefix: None,
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Create a message from optional arguments.
    ///
    /// Absent arguments at the end are dropped, which makes optional
    /// command parameters (a PART message, a JOIN key) easy to pass along.
    /// An absent argument followed by a present one is an error.
    pub fn with_optional_args(
        command: &str,
        args: &[Option<&str>],
    ) -> Result<Self, MessageParseError> {
        let present = args
            .iter()
            .rposition(Option::is_some)
            .map_or(0, |last| last + 1);

        let mut collected = Vec::with_capacity(present);
        for (index, arg) in args[..present].iter().enumerate() {
            match arg {
                Some(value) => collected.push((*value).to_owned()),
                None => return Err(MessageParseError::InteriorAbsentArgument { index }),
            }
        }

        Ok(Self::new(command, collected))
    }

    /// Attach a prefix to this message.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// True if the command is a three digit numeric reply.
    pub fn is_reply(&self) -> bool {
        self.command.len() == 3 && self.command.bytes().all(|b| b.is_ascii_digit())
    }

    /// True for anything that is not a numeric reply.
    pub fn is_command(&self) -> bool {
        !self.is_reply()
    }

    /// Parse the prefix as a user identity, if there is one.
    pub fn source_user(&self) -> Option<User> {
        self.prefix.as_deref().and_then(|p| p.parse().ok())
    }

    /// Get the nickname from the message prefix, if present.
    pub fn source_nickname(&self) -> Option<String> {
        self.source_user().map(|u| u.nick)
    }

    /// The trailing argument, if any.
    pub fn trailing(&self) -> Option<&str> {
        self.args.last().map(String::as_str)
    }

    /// `PASS <password>`
    pub fn pass(password: impl Into<String>) -> Self {
        Self::new("PASS", [password.into()])
    }

    /// `NICK <nick>`
    pub fn nick(nick: impl Into<String>) -> Self {
        Self::new("NICK", [nick.into()])
    }

    /// `USER <username> <mode> * :<realname>`
    pub fn user(username: impl Into<String>, mode: &str, realname: impl Into<String>) -> Self {
        Self::new(
            "USER",
            [username.into(), mode.to_owned(), "*".to_owned(), realname.into()],
        )
    }

    /// `JOIN <channel> [<key>]`
    pub fn join(channel: &str, key: Option<&str>) -> Self {
        let args: Vec<&str> = std::iter::once(channel).chain(key).collect();
        Self::new("JOIN", args)
    }

    /// `PART <channel> [<message>]`
    pub fn part(channel: &str, message: Option<&str>) -> Self {
        let args: Vec<&str> = std::iter::once(channel).chain(message).collect();
        Self::new("PART", args)
    }

    /// `PRIVMSG <target> :<text>`
    pub fn privmsg(target: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new("PRIVMSG", [target.into(), text.into()])
    }

    /// `QUIT [<message>]`
    pub fn quit(message: Option<&str>) -> Self {
        Self::new("QUIT", message)
    }

    /// `PING <token>`
    pub fn ping(token: impl Into<String>) -> Self {
        Self::new("PING", [token.into()])
    }

    /// `PONG <args...>`, echoing the arguments of a received PING.
    pub fn pong<I, A>(args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        Self::new("PONG", args)
    }
}
