//! Connection management: the TCP/TLS stream and server capabilities.

mod stream;

pub use stream::{SmtpStream, TlsParameters, TlsVersion, TrustPolicy};

use crate::types::{AuthMechanism, Extension};

/// Server capabilities enumerated from an EHLO response.
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    /// Extensions advertised by the server.
    pub extensions: Vec<Extension>,
}

impl ServerInfo {
    /// Parses the EHLO reply lines. The first line is the server greeting
    /// and carries no extension.
    #[must_use]
    pub fn from_ehlo_lines(lines: &[String]) -> Self {
        Self {
            extensions: lines.iter().skip(1).map(|l| Extension::parse(l)).collect(),
        }
    }

    /// Returns true if the server advertises STARTTLS.
    #[must_use]
    pub fn supports_starttls(&self) -> bool {
        self.extensions.contains(&Extension::StartTls)
    }

    /// Returns the advertised authentication mechanisms.
    #[must_use]
    pub fn auth_mechanisms(&self) -> Vec<AuthMechanism> {
        for ext in &self.extensions {
            if let Extension::Auth(mechanisms) = ext {
                return mechanisms.clone();
            }
        }
        Vec::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn greeting_line_is_not_an_extension() {
        let lines = vec!["smtp.example.com at your service".to_string()];
        let info = ServerInfo::from_ehlo_lines(&lines);
        assert!(info.extensions.is_empty());
        assert!(!info.supports_starttls());
    }

    #[test]
    fn starttls_and_auth_are_detected() {
        let lines = vec![
            "smtp.example.com".to_string(),
            "STARTTLS".to_string(),
            "AUTH CRAM-MD5 PLAIN".to_string(),
            "8BITMIME".to_string(),
        ];
        let info = ServerInfo::from_ehlo_lines(&lines);
        assert!(info.supports_starttls());
        assert_eq!(
            info.auth_mechanisms(),
            vec![AuthMechanism::CramMd5, AuthMechanism::Plain]
        );
    }
}
