//! Channel name classification and "safe" channel handling.
//!
//! Safe channels (RFC 2811) start with `!` followed by a server-assigned ID
//! of fixed length and then the name users typed, e.g. `!ABCDEbots` is the
//! long form of the short name `!bots`. Either form refers to the same
//! channel.

/// Characters a channel name may start with.
pub const CHANNEL_SIGILS: [char; 4] = ['&', '#', '+', '!'];

/// Prefix of safe channel names.
pub const SAFE_CHANNEL_PREFIX: char = '!';

/// Length of the ID embedded in the long form of a safe channel name.
pub const SAFE_CHANNEL_ID_LEN: usize = 5;

/// Resolves channel names, including safe channel short/long forms.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelNamer {
    safe_prefix: char,
    id_len: usize,
}

impl Default for ChannelNamer {
    fn default() -> Self {
        Self::new(SAFE_CHANNEL_PREFIX, SAFE_CHANNEL_ID_LEN)
    }
}

impl ChannelNamer {
    /// Create a namer for a given safe prefix and ID length.
    pub const fn new(safe_prefix: char, id_len: usize) -> Self {
        Self {
            safe_prefix,
            id_len,
        }
    }

    /// True if `name` starts with a channel sigil.
    pub fn is_channel(&self, name: &str) -> bool {
        name.starts_with(CHANNEL_SIGILS)
    }

    /// True if `name` starts with the safe channel prefix.
    pub fn is_safe_channel(&self, name: &str) -> bool {
        name.starts_with(self.safe_prefix)
    }

    /// Return the `(short, long)` forms of a channel name.
    ///
    /// Only safe channel names at least `id_len + 2` characters long have a
    /// distinct short form: the prefix followed by whatever comes after the
    /// ID. Every other name is its own short and long form.
    pub fn parse_channel_name(&self, name: &str) -> (String, String) {
        if self.is_safe_channel(name) {
            if let Some((offset, _)) = name.char_indices().nth(self.id_len + 1) {
                let mut short = String::with_capacity(name.len() - offset + 1);
                short.push(self.safe_prefix);
                short.push_str(&name[offset..]);
                return (short, name.to_owned());
            }
        }

        (name.to_owned(), name.to_owned())
    }

    /// Return the short form used as the key of a membership map.
    pub fn short_name(&self, name: &str) -> String {
        self.parse_channel_name(name).0
    }

    /// True if the two names denote the same channel.
    ///
    /// The longer of the two is parsed; the other must equal its short or
    /// long form.
    pub fn channel_matches(&self, a: &str, b: &str) -> bool {
        let (longer, other) = if b.chars().count() > a.chars().count() {
            (b, a)
        } else {
            (a, b)
        };

        let (short, long) = self.parse_channel_name(longer);
        other == short || other == long
    }
}
