//! Case mapping and wildcard matching.
//!
//! IRC compares nicknames and masks case-insensitively using the
//! `rfc1459` mapping, where `[]\~` are the uppercase forms of `{}|^`.

/// Convert a single character to IRC lowercase (RFC 1459 mapping).
#[inline]
pub const fn irc_lower_char(c: char) -> char {
    match c {
        '[' => '{',
        ']' => '}',
        '\\' => '|',
        '~' => '^',
        'A'..='Z' => (c as u8 + 32) as char,
        _ => c,
    }
}

/// Convert a string to IRC lowercase.
pub fn irc_to_lower(s: &str) -> String {
    s.chars().map(irc_lower_char).collect()
}

/// Compare two strings using IRC case-insensitive comparison.
pub fn irc_eq(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a.chars()
            .zip(b.chars())
            .all(|(ca, cb)| irc_lower_char(ca) == irc_lower_char(cb))
}

/// Match `text` against a glob `pattern` where `*` matches any run of
/// characters and `?` matches exactly one.
///
/// Matching is IRC case-insensitive.
///
/// # Examples
///
/// ```
/// use slirc_proto::util::wildcard_match;
///
/// assert!(wildcard_match("*!*@*.example.com", "nick!user@host.example.com"));
/// assert!(wildcard_match("NICK", "nick"));
/// assert!(!wildcard_match("n?ck", "nck"));
/// ```
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().map(irc_lower_char).collect();
    let text: Vec<char> = text.chars().map(irc_lower_char).collect();

    let (mut p, mut t) = (0, 0);
    // Pattern index just past the last `*`, and the text index it was tried at.
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                p += 1;
                backtrack = Some((p, t));
            }
            Some(&c) if c == '?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star_p, star_t)) => {
                    p = star_p;
                    t = star_t + 1;
                    backtrack = Some((star_p, t));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_irc_lower() {
        assert_eq!(irc_lower_char('A'), 'a');
        assert_eq!(irc_lower_char('['), '{');
        assert_eq!(irc_lower_char('~'), '^');
        assert_eq!(irc_to_lower("Nick[Away]"), "nick{away}");
    }

    #[test]
    fn test_irc_eq() {
        assert!(irc_eq("Bot\\Name", "bot|name"));
        assert!(!irc_eq("bot", "bot_"));
    }

    #[test]
    fn test_wildcard_basic() {
        assert!(wildcard_match("*", ""));
        assert!(wildcard_match("*", "anything"));
        assert!(wildcard_match("a*c", "abbbc"));
        assert!(wildcard_match("a?c", "abc"));
        assert!(!wildcard_match("a?c", "ac"));
        assert!(!wildcard_match("abc", "abcd"));
        assert!(wildcard_match("", ""));
        assert!(!wildcard_match("", "x"));
    }

    #[test]
    fn test_wildcard_backtracking() {
        assert!(wildcard_match("*a*b", "xaxxab"));
        assert!(wildcard_match("*!*@*.example.com", "n!u@a.b.example.com"));
        assert!(!wildcard_match("*!*@*.example.com", "n!u@example.com"));
    }

    #[test]
    fn test_wildcard_case_insensitive() {
        assert!(wildcard_match("OWNER!*@*", "owner!x@y"));
        assert!(wildcard_match("nick[1]", "NICK{1}"));
    }
}
