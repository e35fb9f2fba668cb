//! SMTP command serialization.

use crate::types::AuthMechanism;

/// An outbound SMTP command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// EHLO - extended greeting
    Ehlo {
        /// Client system identifier
        hostname: String,
    },
    /// HELO - legacy greeting fallback
    Helo {
        /// Client system identifier
        hostname: String,
    },
    /// STARTTLS - request TLS upgrade
    StartTls,
    /// AUTH - begin authentication (no initial response; the challenge
    /// loop supplies responses via [`Command::AuthResponse`])
    Auth {
        /// Selected mechanism
        mechanism: AuthMechanism,
    },
    /// A base64 response line inside an AUTH challenge exchange
    AuthResponse(String),
    /// MAIL FROM - open a mail transaction
    MailFrom {
        /// Envelope sender addr-spec
        addr_spec: String,
    },
    /// RCPT TO - add an envelope recipient
    RcptTo {
        /// Envelope recipient addr-spec
        addr_spec: String,
    },
    /// DATA - begin message content
    Data,
    /// RSET - reset the current mail transaction
    Rset,
    /// QUIT - close the session
    Quit,
}

impl Command {
    /// Serializes the command, terminated with CRLF.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();

        match self {
            Self::Ehlo { hostname } => {
                buf.extend_from_slice(b"EHLO ");
                buf.extend_from_slice(hostname.as_bytes());
            }
            Self::Helo { hostname } => {
                buf.extend_from_slice(b"HELO ");
                buf.extend_from_slice(hostname.as_bytes());
            }
            Self::StartTls => {
                buf.extend_from_slice(b"STARTTLS");
            }
            Self::Auth { mechanism } => {
                buf.extend_from_slice(b"AUTH ");
                buf.extend_from_slice(mechanism.as_str().as_bytes());
            }
            Self::AuthResponse(response) => {
                buf.extend_from_slice(response.as_bytes());
            }
            Self::MailFrom { addr_spec } => {
                buf.extend_from_slice(b"MAIL FROM:<");
                buf.extend_from_slice(addr_spec.as_bytes());
                buf.push(b'>');
            }
            Self::RcptTo { addr_spec } => {
                buf.extend_from_slice(b"RCPT TO:<");
                buf.extend_from_slice(addr_spec.as_bytes());
                buf.push(b'>');
            }
            Self::Data => {
                buf.extend_from_slice(b"DATA");
            }
            Self::Rset => {
                buf.extend_from_slice(b"RSET");
            }
            Self::Quit => {
                buf.extend_from_slice(b"QUIT");
            }
        }

        buf.extend_from_slice(b"\r\n");
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ehlo() {
        let cmd = Command::Ehlo {
            hostname: "localhost".to_string(),
        };
        assert_eq!(cmd.serialize(), b"EHLO localhost\r\n");
    }

    #[test]
    fn helo_fallback() {
        let cmd = Command::Helo {
            hostname: "localhost".to_string(),
        };
        assert_eq!(cmd.serialize(), b"HELO localhost\r\n");
    }

    #[test]
    fn starttls() {
        assert_eq!(Command::StartTls.serialize(), b"STARTTLS\r\n");
    }

    #[test]
    fn auth_has_no_initial_response() {
        let cmd = Command::Auth {
            mechanism: AuthMechanism::CramMd5,
        };
        assert_eq!(cmd.serialize(), b"AUTH CRAM-MD5\r\n");
    }

    #[test]
    fn auth_response_is_bare_line() {
        let cmd = Command::AuthResponse("AHVzZXIAcGFzcw==".to_string());
        assert_eq!(cmd.serialize(), b"AHVzZXIAcGFzcw==\r\n");
    }

    #[test]
    fn mail_from() {
        let cmd = Command::MailFrom {
            addr_spec: "sender@example.com".to_string(),
        };
        assert_eq!(cmd.serialize(), b"MAIL FROM:<sender@example.com>\r\n");
    }

    #[test]
    fn rcpt_to() {
        let cmd = Command::RcptTo {
            addr_spec: "recipient@example.com".to_string(),
        };
        assert_eq!(cmd.serialize(), b"RCPT TO:<recipient@example.com>\r\n");
    }

    #[test]
    fn bare_commands() {
        assert_eq!(Command::Data.serialize(), b"DATA\r\n");
        assert_eq!(Command::Rset.serialize(), b"RSET\r\n");
        assert_eq!(Command::Quit.serialize(), b"QUIT\r\n");
    }
}
