//! SASL response builders for the AUTH continuation phases.
//!
//! Covers the mechanisms the session's fallback ladder knows:
//! - PLAIN (RFC 4616) - Identity and password in one NUL-joined line
//! - LOGIN (legacy) - Username and password sent in separate steps
//! - CRAM-MD5 (RFC 2195) - Keyed-digest challenge/response

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use md5::Md5;

use crate::error::{Error, Result};

type HmacMd5 = Hmac<Md5>;

/// Builds the PLAIN response (RFC 4616).
///
/// The payload is `\0<username>\0<password>`, base64 encoded. The
/// leading NUL leaves the authorization identity empty, meaning "same
/// as the authentication identity".
///
/// # Example
///
/// ```
/// use ferromail_smtp::auth::sasl::plain_response;
///
/// let response = plain_response("user", "pass");
/// assert_eq!(response, "AHVzZXIAcGFzcw==");
/// ```
#[must_use]
pub fn plain_response(username: &str, password: &str) -> String {
    STANDARD.encode(format!("\0{username}\0{password}"))
}

/// Generates the username line of a LOGIN exchange.
#[must_use]
pub fn login_username(username: &str) -> String {
    STANDARD.encode(username.as_bytes())
}

/// Generates the password line of a LOGIN exchange.
#[must_use]
pub fn login_password(password: &str) -> String {
    STANDARD.encode(password.as_bytes())
}

/// Builds the CRAM-MD5 response (RFC 2195).
///
/// The payload is `<username> <hex-digest>`, base64 encoded, where the
/// digest is HMAC-MD5 over the decoded challenge keyed with the
/// password and written as lowercase hex.
///
/// # Arguments
///
/// * `username` - Identity asserted to the server
/// * `password` - Shared secret used as the HMAC key
/// * `challenge` - Base64 challenge text from the server's 334 reply
///
/// # Errors
///
/// Returns a protocol error if the challenge is not valid base64.
pub fn cram_md5_response(username: &str, password: &str, challenge: &str) -> Result<String> {
    let decoded = STANDARD
        .decode(challenge.trim())
        .map_err(|_| Error::protocol(challenge.trim()))?;

    let mut mac =
        HmacMd5::new_from_slice(password.as_bytes()).map_err(|_| Error::protocol(challenge))?;
    mac.update(&decoded);
    let digest = mac.finalize().into_bytes();

    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    Ok(STANDARD.encode(format!("{username} {hex}").as_bytes()))
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_nul_joined() {
        for (user, pass) in [("test", "pass"), ("user", "pass@word!")] {
            let decoded = STANDARD.decode(plain_response(user, pass)).unwrap();
            let expected = format!("\0{user}\0{pass}");
            assert_eq!(String::from_utf8(decoded).unwrap(), expected);
        }
    }

    #[test]
    fn test_login_lines() {
        assert_eq!(login_username("user"), "dXNlcg==");
        assert_eq!(login_password("pass"), "cGFzcw==");
    }

    #[test]
    fn test_cram_md5_rfc_2195_vector() {
        // The worked example from RFC 2195 section 2.
        let challenge = STANDARD.encode("<1896.697170952@postoffice.reston.mci.net>");
        let response = cram_md5_response("tim", "tanstaaftanstaaf", &challenge).unwrap();

        let decoded = String::from_utf8(STANDARD.decode(&response).unwrap()).unwrap();
        assert_eq!(decoded, "tim b913a602c7eda7a495b4e6e7334d3890");
    }

    #[test]
    fn test_cram_md5_trims_challenge_whitespace() {
        // Challenges arrive with the reply line's CRLF still attached.
        let challenge = format!("{}\r\n", STANDARD.encode("<hello@example.com>"));
        let with_crlf = cram_md5_response("u", "p", &challenge).unwrap();
        let bare = cram_md5_response("u", "p", challenge.trim()).unwrap();
        assert_eq!(with_crlf, bare);
    }

    #[test]
    fn test_cram_md5_rejects_bad_challenge() {
        assert!(cram_md5_response("u", "p", "not!base64!!").is_err());
    }

    #[test]
    fn test_no_plaintext_on_the_wire() {
        let response = plain_response("user@example.com", "hunter2");
        assert!(!response.contains("user@example.com"));
        assert!(!response.contains("hunter2"));
        assert!(STANDARD.decode(&response).is_ok());
    }
}
