//! Message body parts.
//!
//! A message body is a tree of parts: a raw [`BodyPart`], a single MIME
//! leaf [`MimePart`], or a [`MimeMultipart`] container whose children are
//! MIME leaves or further containers. The tree is finite and acyclic by
//! construction (children are owned values).

use std::io::{Cursor, Read};

use chrono::{DateTime, FixedOffset};
use uuid::Uuid;

use crate::header::Headers;
use crate::rfc;

/// Body payload: in-memory octets or an external byte source.
pub enum BodyContent {
    /// Raw octets held in memory.
    Bytes(Vec<u8>),
    /// A streaming byte source. The part owns the source and the renderer
    /// drops it once the stream is exhausted.
    Source(Box<dyn Read + Send>),
}

impl BodyContent {
    /// Returns the in-memory octets, if this is not a streaming source.
    #[must_use]
    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            Self::Source(_) => None,
        }
    }

    /// Converts the content into a reader for the renderer.
    #[must_use]
    pub fn into_reader(self) -> Box<dyn Read + Send> {
        match self {
            Self::Bytes(b) => Box::new(Cursor::new(b)),
            Self::Source(r) => r,
        }
    }
}

impl std::fmt::Debug for BodyContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            Self::Source(_) => f.debug_tuple("Source").finish(),
        }
    }
}

impl Default for BodyContent {
    fn default() -> Self {
        Self::Bytes(Vec::new())
    }
}

impl From<Vec<u8>> for BodyContent {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<&str> for BodyContent {
    fn from(text: &str) -> Self {
        Self::Bytes(text.as_bytes().to_vec())
    }
}

/// Transfer encoder selection for a MIME part body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncoderChoice {
    /// Quoted-Printable for `text/*` content, Base64 otherwise.
    #[default]
    Auto,
    /// Emit the body verbatim.
    Passthrough,
    /// Force Quoted-Printable.
    QuotedPrintable,
    /// Force Base64.
    Base64,
}

/// Content-Disposition type per RFC 2183.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Disposition {
    /// Presented inline in the message.
    #[default]
    Inline,
    /// Presented as a downloadable attachment.
    Attachment,
}

impl Disposition {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Inline => "inline",
            Self::Attachment => "attachment",
        }
    }
}

/// Multipart container subtype per RFC 2046.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MultipartKind {
    /// Independent parts in order.
    #[default]
    Mixed,
    /// Alternative renditions of the same content.
    Alternative,
    /// A digest of messages.
    Digest,
    /// Parts intended for simultaneous presentation.
    Parallel,
}

impl MultipartKind {
    /// Returns the `multipart/<subtype>` content type string.
    #[must_use]
    pub const fn content_type(self) -> &'static str {
        match self {
            Self::Mixed => "multipart/mixed",
            Self::Alternative => "multipart/alternative",
            Self::Digest => "multipart/digest",
            Self::Parallel => "multipart/parallel",
        }
    }
}

/// A raw message body without structural headers.
#[derive(Debug, Default)]
pub struct BodyPart {
    /// Body payload.
    pub content: BodyContent,
}

impl BodyPart {
    /// Creates a raw body part from octets or a source.
    #[must_use]
    pub fn new(content: impl Into<BodyContent>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// A single MIME leaf with structural headers and a body.
#[derive(Debug, Default)]
pub struct MimePart {
    headers: Headers,
    content_type: Option<String>,
    content_id: Option<String>,
    content_encoding: Option<String>,
    description: Option<String>,
    disposition: Disposition,
    filename: Option<String>,
    creation_date: Option<DateTime<FixedOffset>>,
    modification_date: Option<DateTime<FixedOffset>>,
    read_date: Option<DateTime<FixedOffset>>,
    size: Option<u64>,
    encoder: EncoderChoice,
    /// Body payload.
    pub content: BodyContent,
}

impl MimePart {
    /// Creates a MIME part from octets or a source.
    #[must_use]
    pub fn new(content: impl Into<BodyContent>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    /// Sets the Content-Type. When unset, the renderer sniffs one.
    pub fn set_content_type(&mut self, value: impl Into<String>) {
        self.content_type = Some(value.into());
    }

    /// Returns the declared Content-Type, if any.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Sets the Content-ID.
    pub fn set_content_id(&mut self, value: impl Into<String>) {
        self.content_id = Some(value.into());
    }

    /// Sets an explicit Content-Transfer-Encoding header value.
    ///
    /// Only meaningful together with [`EncoderChoice::Passthrough`]; the
    /// streaming encoders override this header.
    pub fn set_content_encoding(&mut self, value: impl Into<String>) {
        self.content_encoding = Some(value.into());
    }

    /// Sets the Content-Description.
    pub fn set_description(&mut self, value: impl Into<String>) {
        self.description = Some(value.into());
    }

    /// Sets the Content-Disposition type.
    pub fn set_disposition(&mut self, disposition: Disposition) {
        self.disposition = disposition;
    }

    /// Sets the attachment filename (UTF-8, emitted as `filename*`).
    pub fn set_filename(&mut self, name: impl Into<String>) {
        self.filename = Some(name.into());
    }

    /// Sets the disposition creation date.
    pub fn set_creation_date(&mut self, date: DateTime<FixedOffset>) {
        self.creation_date = Some(date);
    }

    /// Sets the disposition modification date.
    pub fn set_modification_date(&mut self, date: DateTime<FixedOffset>) {
        self.modification_date = Some(date);
    }

    /// Sets the disposition read date.
    pub fn set_read_date(&mut self, date: DateTime<FixedOffset>) {
        self.read_date = Some(date);
    }

    /// Sets the disposition size parameter.
    pub fn set_size(&mut self, bytes: u64) {
        self.size = Some(bytes);
    }

    /// Selects the transfer encoder for the body.
    pub fn set_encoder(&mut self, encoder: EncoderChoice) {
        self.encoder = encoder;
    }

    /// Returns the selected transfer encoder.
    #[must_use]
    pub fn encoder(&self) -> EncoderChoice {
        self.encoder
    }

    /// Sets a raw header, replacing existing ones of the same name.
    pub fn set_raw_header(&mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.headers.set(name, value);
    }

    /// Appends a raw header.
    pub fn append_raw_header(&mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.headers.append(name, value);
    }

    /// Builds the structural headers for the wire.
    ///
    /// Starts from the raw injection list, then applies the typed fields.
    /// The Content-Disposition value folds its RFC 2183 parameters onto
    /// continuation lines.
    #[must_use]
    pub fn cook_headers(&self) -> Headers {
        let mut result = self.headers.clone();

        if let Some(ctype) = &self.content_type {
            result.set("Content-Type", ctype.as_bytes());
        }
        if let Some(id) = &self.content_id {
            result.set("Content-ID", id.as_bytes());
        }
        if let Some(encoding) = &self.content_encoding {
            result.set("Content-Transfer-Encoding", encoding.as_bytes());
        }
        if let Some(description) = &self.description {
            result.set("Content-Description", rfc::to_encoded_words(description));
        }

        let mut disposition = self.disposition.as_str().as_bytes().to_vec();
        let mut param = |name: &str, value: &str, quoted: bool| {
            disposition.extend_from_slice(b";\r\n\t");
            disposition.extend_from_slice(name.as_bytes());
            disposition.push(b'=');
            if quoted {
                disposition.push(b'"');
            }
            disposition.extend_from_slice(value.as_bytes());
            if quoted {
                disposition.push(b'"');
            }
        };
        if let Some(date) = &self.creation_date {
            param("creation-date", &rfc::rfc2822_date(date), true);
        }
        if let Some(date) = &self.modification_date {
            param("modification-date", &rfc::rfc2822_date(date), true);
        }
        if let Some(date) = &self.read_date {
            param("read-date", &rfc::rfc2822_date(date), true);
        }
        if let Some(size) = self.size {
            param("size", &size.to_string(), false);
        }
        if let Some(name) = &self.filename {
            let encoded = format!("utf-8''{}", rfc::rfc5987_filename(name));
            param("filename*", &encoded, true);
        }
        result.set("Content-Disposition", disposition);

        result
    }
}

/// A multipart container with an ordered child sequence.
#[derive(Debug)]
pub struct MimeMultipart {
    kind: MultipartKind,
    boundary: String,
    headers: Headers,
    parts: Vec<Part>,
}

impl MimeMultipart {
    /// Creates an empty container with a generated hex-UUID boundary.
    #[must_use]
    pub fn new(kind: MultipartKind) -> Self {
        Self {
            kind,
            boundary: Uuid::new_v4().simple().to_string(),
            headers: Headers::new(),
            parts: Vec::new(),
        }
    }

    /// Returns the boundary string.
    #[must_use]
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Overrides the generated boundary.
    ///
    /// The boundary must stay unique within the message.
    pub fn set_boundary(&mut self, boundary: impl Into<String>) {
        self.boundary = boundary.into();
    }

    /// Appends a MIME leaf child.
    pub fn push(&mut self, part: MimePart) {
        self.parts.push(Part::Mime(part));
    }

    /// Appends a nested multipart child.
    pub fn push_multipart(&mut self, part: MimeMultipart) {
        self.parts.push(Part::Multipart(part));
    }

    /// Returns the child sequence.
    #[must_use]
    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// Returns the number of children.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Returns true if the container has no children.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Sets a raw header, replacing existing ones of the same name.
    pub fn set_raw_header(&mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.headers.set(name, value);
    }

    /// Builds the container headers: injected raw headers plus the
    /// `multipart/<sub>; boundary="..."` content type.
    #[must_use]
    pub fn cook_headers(&self) -> Headers {
        let mut result = self.headers.clone();
        let ctype = format!("{}; boundary=\"{}\"", self.kind.content_type(), self.boundary);
        result.set("Content-Type", ctype.into_bytes());
        result
    }

    pub(crate) fn parts_mut(&mut self) -> &mut Vec<Part> {
        &mut self.parts
    }
}

impl Default for MimeMultipart {
    fn default() -> Self {
        Self::new(MultipartKind::Mixed)
    }
}

/// A message body: exactly one of the three part kinds.
#[derive(Debug)]
pub enum Part {
    /// Raw octets without structural headers.
    Body(BodyPart),
    /// A single MIME leaf.
    Mime(MimePart),
    /// A multipart container.
    Multipart(MimeMultipart),
}

impl From<BodyPart> for Part {
    fn from(part: BodyPart) -> Self {
        Self::Body(part)
    }
}

impl From<MimePart> for Part {
    fn from(part: MimePart) -> Self {
        Self::Mime(part)
    }
}

impl From<MimeMultipart> for Part {
    fn from(part: MimeMultipart) -> Self {
        Self::Multipart(part)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    #[test]
    fn multipart_boundary_is_hex_uuid() {
        let mp = MimeMultipart::new(MultipartKind::Mixed);
        assert_eq!(mp.boundary().len(), 32);
        assert!(mp.boundary().bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn multipart_boundaries_are_unique() {
        let a = MimeMultipart::new(MultipartKind::Mixed);
        let b = MimeMultipart::new(MultipartKind::Mixed);
        assert_ne!(a.boundary(), b.boundary());
    }

    #[test]
    fn multipart_content_type_header() {
        let mut mp = MimeMultipart::new(MultipartKind::Alternative);
        mp.set_boundary("deadbeef");
        let headers = mp.cook_headers();
        assert_eq!(
            headers.value("Content-Type"),
            Some(b"multipart/alternative; boundary=\"deadbeef\"".as_ref())
        );
    }

    #[test]
    fn mime_part_disposition_parameters() {
        let mut part = MimePart::new("hello");
        part.set_disposition(Disposition::Attachment);
        part.set_filename("naïve plan.txt");
        part.set_size(5);
        let date = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
            .unwrap();
        part.set_modification_date(date);

        let headers = part.cook_headers();
        let value = String::from_utf8(headers.value("Content-Disposition").unwrap().to_vec())
            .unwrap();
        assert!(value.starts_with("attachment"));
        assert!(value.contains("modification-date=\"Sun, 01 Mar 2026 12:00:00 +0000\""));
        assert!(value.contains("size=5"));
        assert!(value.contains("filename*=\"utf-8''na%C3%AFve%20plan.txt\""));
    }

    #[test]
    fn mime_part_description_is_encoded() {
        let mut part = MimePart::new("x");
        part.set_description("résumé");
        let headers = part.cook_headers();
        let value = headers.value("Content-Description").unwrap();
        assert!(value.starts_with(b"=?UTF-8?Q?"));
    }

    #[test]
    fn raw_headers_survive_cooking() {
        let mut part = MimePart::new("x");
        part.append_raw_header("X-Custom", "yes");
        part.set_content_type("text/plain");
        let headers = part.cook_headers();
        assert_eq!(headers.value("X-Custom"), Some(b"yes".as_ref()));
        assert_eq!(headers.value("Content-Type"), Some(b"text/plain".as_ref()));
    }
}
