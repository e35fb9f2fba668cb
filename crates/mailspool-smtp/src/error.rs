//! Error types for SMTP operations.

use std::io;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SMTP error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// TLS error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Protocol error (malformed or unexpected response).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Hostname resolution failure.
    #[error("Resolver error: {0}")]
    Resolver(String),
}

/// Terminal outcome classification of one delivery transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionErrorKind {
    /// The message was transferred successfully.
    #[default]
    NoError,
    /// The message has no usable envelope sender.
    NoSender,
    /// The message has no usable envelope recipients.
    NoRecipients,
    /// The server replied with an error to one of this transaction's
    /// commands.
    Response,
    /// The connection failed outside a message transaction.
    Connection,
    /// TLS was required but the server does not offer it.
    TlsRequired,
    /// The server hostname could not be resolved.
    Resolver,
    /// The server did not respond within the configured timeout.
    Timeout,
    /// The delivery was aborted by the caller.
    Aborted,
    /// The message body could not be rendered.
    Data,
}

impl TransactionErrorKind {
    /// Returns the default human-readable text for this kind.
    #[must_use]
    pub const fn default_text(self) -> &'static str {
        match self {
            Self::NoError => "No error occurred",
            Self::NoSender => "No sender/from has been specified",
            Self::NoRecipients => "No recipients have been specified",
            Self::Response => "Unexpected server response",
            Self::Connection => {
                "The connection timed out or the remote server unexpectedly closed the connection"
            }
            Self::TlsRequired => "TLS required but not available",
            Self::Resolver => "Unable to resolve hostname",
            Self::Timeout => "Connection dropped by timeout",
            Self::Aborted => "Message aborted",
            Self::Data => "Message cannot be rendered",
        }
    }

    /// Returns true for the success classification.
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::NoError)
    }
}
