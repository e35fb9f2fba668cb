//! SMTP reply parser.

use crate::error::{Error, Result};
use crate::types::{Reply, ReplyCode};

/// One parsed line of a server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyLine {
    /// The 3-digit status code.
    pub code: u16,
    /// True when this is the terminal line (`code` followed by a space).
    pub last: bool,
    /// The text after the separator.
    pub text: String,
}

/// Parses one reply line.
///
/// The line must start with exactly three ASCII digits followed by a
/// space (terminal line) or `-` (continuation). Anything else is a
/// protocol error.
///
/// # Errors
///
/// Returns [`Error::Protocol`] for malformed lines.
pub fn parse_reply_line(line: &str) -> Result<ReplyLine> {
    let bytes = line.as_bytes();
    if bytes.len() < 4 {
        return Err(Error::Protocol(format!("reply line too short: {line:?}")));
    }
    if !bytes[..3].iter().all(u8::is_ascii_digit) {
        return Err(Error::Protocol(format!("invalid reply code: {line:?}")));
    }
    let code = line[..3]
        .parse::<u16>()
        .map_err(|_| Error::Protocol(format!("invalid reply code: {line:?}")))?;

    let last = match bytes[3] {
        b' ' => true,
        b'-' => false,
        _ => {
            return Err(Error::Protocol(format!(
                "invalid reply separator: {line:?}"
            )));
        }
    };

    Ok(ReplyLine {
        code,
        last,
        text: line[4..].to_string(),
    })
}

/// Accumulates reply lines until the terminal line completes the reply.
#[derive(Debug, Default)]
pub struct ReplyAccumulator {
    lines: Vec<String>,
    code: u16,
}

impl ReplyAccumulator {
    /// Creates an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one raw line. Returns the complete reply once the terminal
    /// line has been observed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] for malformed lines; the accumulator
    /// must be discarded afterwards.
    pub fn push(&mut self, line: &str) -> Result<Option<Reply>> {
        let parsed = parse_reply_line(line)?;
        self.code = parsed.code;
        self.lines.push(parsed.text);

        if parsed.last {
            let reply = Reply::new(ReplyCode::new(self.code), std::mem::take(&mut self.lines));
            self.code = 0;
            Ok(Some(reply))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn single_line_reply() {
        let mut acc = ReplyAccumulator::new();
        let reply = acc.push("250 OK").unwrap().unwrap();
        assert_eq!(reply.code(), 250);
        assert_eq!(reply.lines, vec!["OK"]);
    }

    #[test]
    fn multi_line_reply() {
        let mut acc = ReplyAccumulator::new();
        assert!(acc.push("250-smtp.example.com").unwrap().is_none());
        assert!(acc.push("250-STARTTLS").unwrap().is_none());
        let reply = acc.push("250 HELP").unwrap().unwrap();
        assert_eq!(reply.code(), 250);
        assert_eq!(reply.lines, vec!["smtp.example.com", "STARTTLS", "HELP"]);
    }

    #[test]
    fn accumulator_resets_after_completion() {
        let mut acc = ReplyAccumulator::new();
        acc.push("220 ready").unwrap().unwrap();
        let reply = acc.push("250 OK").unwrap().unwrap();
        assert_eq!(reply.lines, vec!["OK"]);
    }

    #[test]
    fn rejects_short_line() {
        assert!(parse_reply_line("250").is_err());
        assert!(parse_reply_line("25").is_err());
    }

    #[test]
    fn rejects_non_digit_code() {
        assert!(parse_reply_line("2x0 hello").is_err());
        assert!(parse_reply_line("ABC hello").is_err());
    }

    #[test]
    fn rejects_bad_separator() {
        assert!(parse_reply_line("250*nope").is_err());
    }

    #[test]
    fn empty_text_is_allowed() {
        let parsed = parse_reply_line("354 ").unwrap();
        assert_eq!(parsed.code, 354);
        assert!(parsed.last);
        assert!(parsed.text.is_empty());
    }
}
