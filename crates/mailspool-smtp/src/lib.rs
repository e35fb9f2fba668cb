//! # mailspool-smtp
//!
//! Asynchronous SMTP submission client implementing RFC 5321 with
//! STARTTLS (RFC 3207) and SASL PLAIN, LOGIN, and CRAM-MD5.
//!
//! ## Features
//!
//! - **Queued delivery**: enqueue any number of composed messages and
//!   deliver them sequentially over one server connection
//! - **Streaming DATA**: message bodies render through
//!   [`mailspool_mime::MessageRenderer`] with backpressure, never fully
//!   buffered
//! - **TLS**: opportunistic or mandatory STARTTLS with configurable
//!   trust, SNI, and protocol floor
//! - **Recovery**: per-message errors finalize that transaction and the
//!   session continues via RSET; unexpected disconnects resume once the
//!   session was known to work
//! - **Observability**: per-transaction progress and completion plus an
//!   aggregate transport event stream
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailspool_mime::{Address, Message};
//! use mailspool_smtp::{IpProtocol, SmtpTransport, TransportConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = TransportConfig::builder()
//!         .user("john.doe@foo.example")
//!         .password("some-secret")
//!         .build();
//!     let mut transport = SmtpTransport::new(config);
//!
//!     let mut message = Message::new();
//!     message.set_from(Address::new("john.doe@foo.example"));
//!     message.set_to(Address::new("jane.doe@foo.example"));
//!     message.set_subject("Hello world!");
//!
//!     let txn = transport.enqueue(message);
//!     transport.run("mail.foo.example", 587, IpProtocol::Any).await;
//!
//!     txn.finished().await;
//!     println!("{:?}: {}", txn.error(), txn.status_text());
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;
mod resolver;
pub mod sasl;
mod transport;
pub mod types;

pub use connection::{ServerInfo, SmtpStream, TlsParameters, TlsVersion, TrustPolicy};
pub use error::{Error, Result, TransactionErrorKind};
pub use resolver::IpProtocol;
pub use transport::{
    AbortHandle, AuthMech, SmtpTransport, TlsLevel, Transaction, TransportConfig,
    TransportConfigBuilder, TransportEvent,
};
pub use types::{AuthMechanism, Extension, Reply, ReplyCode};
