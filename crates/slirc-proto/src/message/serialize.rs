use std::fmt::{self, Display, Formatter};

use super::types::Message;

/// Whether the last argument needs a `:` so that it parses back intact.
fn needs_colon(arg: &str) -> bool {
    arg.is_empty() || arg.contains(' ') || arg.starts_with(':')
}

impl Display for Message {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(ref prefix) = self.prefix {
            write!(f, ":{} ", prefix)?;
        }

        f.write_str(&self.command)?;

        if let Some((last, leading)) = self.args.split_last() {
            for arg in leading {
                write!(f, " {}", arg)?;
            }

            if needs_colon(last) {
                write!(f, " :{}", last)?;
            } else {
                write!(f, " {}", last)?;
            }
        }

        f.write_str("\r\n")
    }
}
