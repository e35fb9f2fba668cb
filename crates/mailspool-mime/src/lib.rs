//! # mailspool-mime
//!
//! Message composition and streaming wire rendering for the mailspool
//! SMTP client.
//!
//! ## Features
//!
//! - **Message model**: addresses with RFC 2047 display names, ordered
//!   headers, MIME part trees (raw bodies, leaves, nested multiparts)
//! - **Streaming renderer**: converts a message into a wire-ready byte
//!   stream through a bounded ring buffer with backpressure
//! - **Transfer encoders**: lazy Base64 and Quoted-Printable `Read`
//!   wrappers with RFC 2045 line wrapping
//! - **RFC helpers**: RFC 2822 dates and address validation, RFC 5987
//!   filenames
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailspool_mime::{Address, Message, MimeMultipart, MimePart, MultipartKind};
//!
//! let mut message = Message::new();
//! message.set_from(Address::with_name("a@example.org", "Alice"));
//! message.set_to(Address::new("b@example.org"));
//! message.set_subject("Quarterly report");
//!
//! let mut body = MimeMultipart::new(MultipartKind::Mixed);
//! let mut text = MimePart::new("Report attached.\r\n");
//! text.set_content_type("text/plain; charset=utf-8");
//! body.push(text);
//! message.set_body(body);
//!
//! let mut renderer = mailspool_mime::MessageRenderer::new(message);
//! renderer.pump()?;
//! let wire_bytes = renderer.view();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod address;
mod error;
mod header;
mod message;
mod part;
mod render;
mod ring;

pub mod encoder;
pub mod rfc;

pub use address::Address;
pub use error::{Error, Result};
pub use header::Headers;
pub use message::Message;
pub use part::{
    BodyContent, BodyPart, Disposition, EncoderChoice, MimeMultipart, MimePart, MultipartKind,
    Part,
};
pub use render::MessageRenderer;
pub use ring::RingBuffer;
