//! Streaming transfer encoders.
//!
//! Both encoders wrap an underlying [`std::io::Read`] and produce the
//! encoded form lazily, so arbitrarily large bodies stream through a small
//! buffer. Output that does not fit the caller's buffer is carried over to
//! the next read instead of being dropped.

mod base64;
mod qp;

pub use base64::Base64Encoder;
pub use qp::QuotedPrintableEncoder;

/// Default output line width excluding the CRLF, per RFC 2045.
pub const DEFAULT_LINE_WIDTH: usize = 76;
