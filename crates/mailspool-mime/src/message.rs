//! Composed mail message.

use chrono::{DateTime, FixedOffset, Local};
use uuid::Uuid;

use crate::address::Address;
use crate::header::Headers;
use crate::part::{BodyPart, Part};
use crate::rfc;

/// A composed outbound message.
///
/// Carries the addressed fields, subject, date, a single root body part,
/// and a raw-header list for injecting headers the typed fields do not
/// cover. Typed fields take precedence over raw headers: single-value
/// headers (Subject, Date, Message-ID) replace raw ones of the same name,
/// address lists are appended after them.
#[derive(Debug)]
pub struct Message {
    message_id: String,
    sender: Option<Address>,
    from: Vec<Address>,
    to: Vec<Address>,
    reply_to: Vec<Address>,
    cc: Vec<Address>,
    bcc: Vec<Address>,
    date: Option<DateTime<FixedOffset>>,
    subject: Option<String>,
    headers: Headers,
    body: Part,
}

impl Message {
    /// Creates an empty message with a generated Message-ID of the form
    /// `<hex-uuid@hostname>`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            message_id: format!("<{}@{}>", Uuid::new_v4().simple(), local_host_label()),
            sender: None,
            from: Vec::new(),
            to: Vec::new(),
            reply_to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            date: None,
            subject: None,
            headers: Headers::new(),
            body: Part::Body(BodyPart::default()),
        }
    }

    /// Returns the message id.
    #[must_use]
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Overrides the generated message id. The value must already be in
    /// RFC form (`<id@host>`).
    pub fn set_message_id(&mut self, id: impl Into<String>) {
        self.message_id = id.into();
    }

    /// Sets the envelope sender override used for MAIL FROM.
    ///
    /// Usually unnecessary: without it the first From address is used.
    pub fn set_sender(&mut self, address: Address) {
        self.sender = Some(address);
    }

    /// Returns the envelope sender override, if set.
    #[must_use]
    pub fn sender(&self) -> Option<&Address> {
        self.sender.as_ref()
    }

    /// Replaces the From list with a single address.
    pub fn set_from(&mut self, address: Address) {
        self.from = vec![address];
    }

    /// Appends a From address.
    pub fn append_from(&mut self, address: Address) {
        self.from.push(address);
    }

    /// Returns the From addresses.
    #[must_use]
    pub fn from(&self) -> &[Address] {
        &self.from
    }

    /// Replaces the To list with a single address.
    pub fn set_to(&mut self, address: Address) {
        self.to = vec![address];
    }

    /// Appends a To address.
    pub fn append_to(&mut self, address: Address) {
        self.to.push(address);
    }

    /// Returns the To addresses.
    #[must_use]
    pub fn to(&self) -> &[Address] {
        &self.to
    }

    /// Replaces the Reply-To list with a single address.
    pub fn set_reply_to(&mut self, address: Address) {
        self.reply_to = vec![address];
    }

    /// Appends a Reply-To address.
    pub fn append_reply_to(&mut self, address: Address) {
        self.reply_to.push(address);
    }

    /// Replaces the Cc list with a single address.
    pub fn set_cc(&mut self, address: Address) {
        self.cc = vec![address];
    }

    /// Appends a Cc address.
    pub fn append_cc(&mut self, address: Address) {
        self.cc.push(address);
    }

    /// Returns the Cc addresses.
    #[must_use]
    pub fn cc(&self) -> &[Address] {
        &self.cc
    }

    /// Replaces the Bcc list with a single address.
    pub fn set_bcc(&mut self, address: Address) {
        self.bcc = vec![address];
    }

    /// Appends a Bcc address.
    pub fn append_bcc(&mut self, address: Address) {
        self.bcc.push(address);
    }

    /// Returns the Bcc addresses.
    #[must_use]
    pub fn bcc(&self) -> &[Address] {
        &self.bcc
    }

    /// Sets the Date header value. Without one, the time of rendering is
    /// used.
    pub fn set_date(&mut self, date: DateTime<FixedOffset>) {
        self.date = Some(date);
    }

    /// Sets the subject (UTF-8, encoded on the wire when needed).
    pub fn set_subject(&mut self, subject: impl Into<String>) {
        self.subject = Some(subject.into());
    }

    /// Sets a raw header, replacing existing ones of the same name.
    pub fn set_raw_header(&mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.headers.set(name, value);
    }

    /// Appends a raw header.
    pub fn append_raw_header(&mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.headers.append(name, value);
    }

    /// Sets the message body.
    pub fn set_body(&mut self, body: impl Into<Part>) {
        self.body = body.into();
    }

    /// Returns the message body.
    #[must_use]
    pub fn body(&self) -> &Part {
        &self.body
    }

    pub(crate) fn take_body(&mut self) -> Part {
        std::mem::replace(&mut self.body, Part::Body(BodyPart::default()))
    }

    /// Builds the top-level headers for the wire.
    ///
    /// Raw headers come first, then the address lists in octet form
    /// (invalid addresses are skipped), then Date (defaulted to now when
    /// neither the field nor a raw header supplies one), Subject,
    /// Message-ID, and a default User-Agent when none was injected.
    #[must_use]
    pub fn cook_headers(&self) -> Headers {
        let mut result = self.headers.clone();

        for (name, list) in [
            ("From", &self.from),
            ("To", &self.to),
            ("Reply-To", &self.reply_to),
            ("Cc", &self.cc),
            ("Bcc", &self.bcc),
        ] {
            for address in list {
                let octets = address.to_octets();
                if !octets.is_empty() {
                    result.append(name, octets);
                }
            }
        }

        if let Some(date) = &self.date {
            result.set("Date", rfc::rfc2822_date(date).into_bytes());
        } else if !result.contains("Date") {
            let now: DateTime<FixedOffset> = Local::now().fixed_offset();
            result.set("Date", rfc::rfc2822_date(&now).into_bytes());
        }

        if let Some(subject) = &self.subject {
            result.set("Subject", rfc::to_encoded_words(subject));
        }

        result.set("Message-ID", self.message_id.as_bytes());

        if !result.contains("User-Agent") {
            let agent = concat!("mailspool ", env!("CARGO_PKG_VERSION"));
            result.set("User-Agent", agent.as_bytes());
        }

        result
    }
}

impl Default for Message {
    fn default() -> Self {
        Self::new()
    }
}

/// First label of the local host name, or `unknown`.
fn local_host_label() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .and_then(|h| h.split('.').next().map(str::to_string))
        .filter(|label| !label.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}
