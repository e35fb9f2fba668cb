//! Email address type.

use crate::rfc;

/// An RFC 2822 addr-spec with an optional UTF-8 display name.
///
/// Construction never fails; validity is a pure function of the addr-spec
/// and is queried through [`Address::is_valid`]. Equality and hashing
/// consider only the addr-spec, which is what envelope deduplication needs.
#[derive(Debug, Clone)]
pub struct Address {
    addr_spec: String,
    display_name: Option<String>,
}

impl Address {
    /// Creates an address from an addr-spec (`local-part@domain`).
    #[must_use]
    pub fn new(addr_spec: impl Into<String>) -> Self {
        Self {
            addr_spec: addr_spec.into(),
            display_name: None,
        }
    }

    /// Creates an address with a display name.
    #[must_use]
    pub fn with_name(addr_spec: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            addr_spec: addr_spec.into(),
            display_name: Some(display_name.into()),
        }
    }

    /// Returns the addr-spec.
    #[must_use]
    pub fn addr_spec(&self) -> &str {
        &self.addr_spec
    }

    /// Returns the display name, if any.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Replaces the display name.
    pub fn set_display_name(&mut self, name: impl Into<String>) {
        self.display_name = Some(name.into());
    }

    /// Returns true if the addr-spec is a valid RFC 2822 address.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        rfc::validate_addr_spec(self.addr_spec.as_bytes())
    }

    /// Renders the address for use in a message header.
    ///
    /// The bare addr-spec when there is no display name; otherwise
    /// `display <addr>`, with the display name emitted literally when it is
    /// a valid atom or quoted-string and as an RFC 2047 encoded word
    /// otherwise. Invalid addresses render to nothing.
    #[must_use]
    pub fn to_octets(&self) -> Vec<u8> {
        if !self.is_valid() {
            return Vec::new();
        }

        let Some(name) = self.display_name.as_deref().filter(|n| !n.is_empty()) else {
            return self.addr_spec.as_bytes().to_vec();
        };

        let mut out = if rfc::validate_display_name(name.as_bytes()) {
            name.as_bytes().to_vec()
        } else {
            rfc::to_encoded_words(name)
        };
        out.extend_from_slice(b" <");
        out.extend_from_slice(self.addr_spec.as_bytes());
        out.push(b'>');
        out
    }
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.addr_spec == other.addr_spec
    }
}

impl Eq for Address {}

impl std::hash::Hash for Address {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.addr_spec.hash(state);
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.display_name.as_deref() {
            Some(name) if !name.is_empty() => write!(f, "{} <{}>", name, self.addr_spec),
            _ => write!(f, "{}", self.addr_spec),
        }
    }
}
