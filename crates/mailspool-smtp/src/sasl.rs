//! SASL client responses for PLAIN, LOGIN, and CRAM-MD5.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use md5::Md5;

type HmacMd5 = Hmac<Md5>;

/// Builds the PLAIN response (RFC 4616): `base64("\0user\0pass")`.
///
/// The server challenge is ignored. Username and password are truncated
/// to 255 octets each.
#[must_use]
pub fn plain_response(user: &str, password: &str) -> String {
    let mut raw = Vec::with_capacity(user.len() + password.len() + 2);
    raw.push(0);
    raw.extend_from_slice(truncate(user.as_bytes(), 255));
    raw.push(0);
    raw.extend_from_slice(truncate(password.as_bytes(), 255));
    STANDARD.encode(raw)
}

/// Builds a LOGIN response for a base64 challenge.
///
/// `Username:` is answered with the base64 username, `Password:` with the
/// base64 password; any other challenge text yields an empty reply.
#[must_use]
pub fn login_response(challenge_b64: &str, user: &str, password: &str) -> String {
    let Ok(challenge) = STANDARD.decode(challenge_b64.trim()) else {
        return String::new();
    };

    match challenge.as_slice() {
        b"Username:" => STANDARD.encode(user.as_bytes()),
        b"Password:" => STANDARD.encode(password.as_bytes()),
        _ => String::new(),
    }
}

/// Builds the CRAM-MD5 response (RFC 2195): HMAC-MD5 over the decoded
/// challenge keyed with the password, answered as
/// `base64(user + " " + lowercase_hex(digest))`.
///
/// The HMAC layer applies RFC 2104 keying: keys longer than the 64-byte
/// block are pre-hashed with MD5 and all keys are zero-padded to the
/// block size, including the empty key.
#[must_use]
pub fn cram_md5_response(challenge_b64: &str, user: &str, password: &str) -> String {
    let challenge = STANDARD.decode(challenge_b64.trim()).unwrap_or_default();

    let mut mac =
        HmacMd5::new_from_slice(password.as_bytes()).expect("HMAC accepts any key length");
    mac.update(&challenge);
    let digest = mac.finalize().into_bytes();

    let mut response = String::with_capacity(user.len() + 1 + digest.len() * 2);
    response.push_str(user);
    response.push(' ');
    for byte in digest {
        response.push_str(&format!("{byte:02x}"));
    }
    STANDARD.encode(response.as_bytes())
}

fn truncate(bytes: &[u8], max: usize) -> &[u8] {
    &bytes[..bytes.len().min(max)]
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn decode(b64: &str) -> Vec<u8> {
        STANDARD.decode(b64).unwrap()
    }

    #[test]
    fn plain_is_nul_separated() {
        assert_eq!(decode(&plain_response("u", "p")), b"\0u\0p".to_vec());
    }

    #[test]
    fn plain_truncates_long_credentials() {
        let long = "x".repeat(300);
        let raw = decode(&plain_response(&long, &long));
        // NUL + 255 + NUL + 255
        assert_eq!(raw.len(), 512);
    }

    #[test]
    fn login_answers_username_and_password() {
        // base64("Username:") / base64("Password:")
        assert_eq!(
            decode(&login_response("VXNlcm5hbWU6", "tim", "secret")),
            b"tim".to_vec()
        );
        assert_eq!(
            decode(&login_response("UGFzc3dvcmQ6", "tim", "secret")),
            b"secret".to_vec()
        );
    }

    #[test]
    fn login_unknown_challenge_yields_empty() {
        let unknown = STANDARD.encode("Who goes there?");
        assert!(login_response(&unknown, "tim", "secret").is_empty());
    }

    #[test]
    fn cram_md5_rfc2195_vector() {
        // The worked example from RFC 2195 section 2.
        let challenge = STANDARD.encode("<1896.697170952@postoffice.reston.mci.net>");
        let response = cram_md5_response(&challenge, "tim", "tanstaaftanstaaf");
        assert_eq!(
            decode(&response),
            b"tim b913a602c7eda7a495b4e6e7334d3890".to_vec()
        );
    }

    #[test]
    fn cram_md5_empty_password_uses_padded_empty_key() {
        let challenge = STANDARD.encode("<x@y>");
        let response = cram_md5_response(&challenge, "user", "");
        let raw = decode(&response);
        let text = String::from_utf8(raw).unwrap();
        let (name, hex) = text.split_once(' ').unwrap();
        assert_eq!(name, "user");
        assert_eq!(hex.len(), 32);
        assert!(hex.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()));
    }
}
