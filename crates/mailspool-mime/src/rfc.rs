//! RFC helpers for message composition.
//!
//! Address grammar checks per RFC 2822, `Date` formatting per RFC 2822
//! section 3.3, encoded words per RFC 2047 section 5, and extended
//! parameter values per RFC 5987.

use chrono::{DateTime, FixedOffset};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

/// Everything that is not an RFC 5987 attr-char gets percent-encoded.
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

/// atext per RFC 2822 section 3.2.4.
const fn is_atext(c: u8) -> bool {
    matches!(c,
        b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9'
        | b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-'
        | b'/' | b'=' | b'?' | b'^' | b'_' | b'`' | b'{' | b'|' | b'}' | b'~')
}

/// dtext per RFC 2822 section 3.4.1 (printable US-ASCII minus `[`, `]`, `\`).
const fn is_dtext(c: u8) -> bool {
    !c.is_ascii_control() && c.is_ascii() && !matches!(c, b'[' | b']' | b'\\' | b' ')
}

const fn is_fws(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\r' | b'\n')
}

/// Characters emitted literally inside an RFC 2047 Q encoded word.
const fn is_encoded_text(c: u8) -> bool {
    matches!(c, b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'!' | b'*' | b'+' | b'-' | b'/')
}

/// Skips folding whitespace and (possibly nested) comments.
///
/// Returns the index of the first byte after the skipped run, or `None` on
/// unbalanced comment nesting or non-ASCII bytes inside a comment.
fn skip_cfws(data: &[u8], mut i: usize) -> Option<usize> {
    loop {
        while i < data.len() && is_fws(data[i]) {
            i += 1;
        }
        if i >= data.len() || data[i] != b'(' {
            return Some(i);
        }

        let mut level = 0usize;
        while i < data.len() {
            match data[i] {
                c if !c.is_ascii() => return None,
                b'(' => level += 1,
                b')' => {
                    level -= 1;
                    if level == 0 {
                        i += 1;
                        break;
                    }
                }
                b'\\' if i + 1 < data.len() => i += 1,
                _ => {}
            }
            i += 1;
        }
        if level != 0 {
            return None;
        }
    }
}

/// Consumes a quoted-string or dot-atom starting at `i`.
///
/// Returns the index after the consumed token. Quoted strings must be
/// terminated and contain only ASCII.
fn skip_word(data: &[u8], mut i: usize) -> Option<usize> {
    if i < data.len() && data[i] == b'"' {
        i += 1;
        while i < data.len() && data[i] != b'"' {
            match data[i] {
                c if !c.is_ascii() => return None,
                b'\\' if i + 1 < data.len() => i += 1,
                _ => {}
            }
            i += 1;
        }
        if i >= data.len() {
            return None;
        }
        Some(i + 1)
    } else {
        while i < data.len() && (data[i] == b'.' || is_atext(data[i])) {
            i += 1;
        }
        Some(i)
    }
}

/// Validates an addr-spec (`local-part@domain`) per RFC 2822.
///
/// Strict by design: the whole input must be consumed. Quoted local parts
/// and `[...]` domain literals are accepted.
#[must_use]
pub fn validate_addr_spec(data: &[u8]) -> bool {
    let Some(local_start) = skip_cfws(data, 0) else {
        return false;
    };
    if local_start >= data.len() {
        return false;
    }

    let Some(i) = skip_word(data, local_start) else {
        return false;
    };
    if i == local_start {
        return false;
    }

    let Some(i) = skip_cfws(data, i) else {
        return false;
    };
    if i >= data.len() || data[i] != b'@' {
        return false;
    }

    let Some(mut i) = skip_cfws(data, i + 1) else {
        return false;
    };
    if i >= data.len() {
        return false;
    }
    let domain_start = i;

    if data[i] == b'[' {
        i += 1;
        while i < data.len() && data[i] != b']' {
            match data[i] {
                b'\\' if i + 1 < data.len() => i += 1,
                c if is_dtext(c) || is_fws(c) => {}
                _ => return false,
            }
            i += 1;
        }
        if i >= data.len() {
            return false;
        }
        i += 1;
    } else {
        while i < data.len() && (data[i] == b'.' || is_atext(data[i])) {
            i += 1;
        }
    }
    if i == domain_start {
        return false;
    }

    matches!(skip_cfws(data, i), Some(end) if end == data.len())
}

/// Validates a display name (atom or quoted-string) per RFC 2822.
///
/// A display name that passes can be emitted literally in a header;
/// anything else needs an encoded word.
#[must_use]
pub fn validate_display_name(data: &[u8]) -> bool {
    let Some(i) = skip_cfws(data, 0) else {
        return false;
    };
    if i >= data.len() {
        return false;
    }
    let Some(i) = skip_word(data, i) else {
        return false;
    };
    matches!(skip_cfws(data, i), Some(end) if end == data.len())
}

/// Encodes `text` as an RFC 2047 Q encoded word when it needs one.
///
/// Text consisting entirely of encoded-text characters is returned as-is;
/// otherwise spaces become `_`, other bytes become `=HH`, and the result is
/// wrapped in `=?UTF-8?Q?...?=`.
#[must_use]
pub fn to_encoded_words(text: &str) -> Vec<u8> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() * 3);
    let mut needs_encoding = false;

    for &c in bytes {
        if is_encoded_text(c) {
            out.push(c);
        } else if c == b' ' {
            out.push(b'_');
            needs_encoding = true;
        } else {
            out.push(b'=');
            out.push(to_hex(c >> 4));
            out.push(to_hex(c & 0x0f));
            needs_encoding = true;
        }
    }

    if !needs_encoding {
        return bytes.to_vec();
    }

    let mut wrapped = Vec::with_capacity(out.len() + 12);
    wrapped.extend_from_slice(b"=?UTF-8?Q?");
    wrapped.extend_from_slice(&out);
    wrapped.extend_from_slice(b"?=");
    wrapped
}

const fn to_hex(n: u8) -> u8 {
    match n {
        0..=9 => b'0' + n,
        _ => b'A' + n - 10,
    }
}

/// Formats a timestamp per RFC 2822: `Wdy, DD Mon YYYY HH:MM:SS +HHMM`.
///
/// chrono's `%a`/`%b` specifiers are locale-independent English
/// abbreviations, which is exactly what the header grammar requires.
#[must_use]
pub fn rfc2822_date(when: &DateTime<FixedOffset>) -> String {
    when.format("%a, %d %b %Y %H:%M:%S %z").to_string()
}

/// Percent-encodes a UTF-8 filename for an RFC 5987 `filename*` parameter.
#[must_use]
pub fn rfc5987_filename(name: &str) -> String {
    utf8_percent_encode(name, ATTR_CHAR).to_string()
}
