//! Extraction of mechanism tokens from `WWW-Authenticate` challenges.

use base64::Engine as _;
use http::HeaderMap;

use super::Mechanism;
use crate::error;
use crate::Result;

/// Extracts the token from a `<scheme> <token>` challenge.
///
/// The scheme label is everything up to the first space; the token ends at
/// the next comma so that a challenge list such as
/// `Negotiate YIIF..., Basic realm="x"` yields only the token. A challenge
/// that carries nothing but the bare scheme name asks the client to start a
/// negotiation, so it decodes to an empty token.
///
/// Returns `None` when there is no challenge at all.
///
/// ```
/// use negotiate_auth::challenge::decode;
///
/// assert_eq!(decode(Some("Negotiate YIIF, Basic"), "Negotiate").as_deref(), Some("YIIF"));
/// assert_eq!(decode(Some("negotiate"), "Negotiate").as_deref(), Some(""));
/// assert_eq!(decode(Some("  "), "Negotiate"), None);
/// ```
pub fn decode(value: Option<&str>, scheme: &str) -> Option<String> {
    let value = value.filter(|v| !v.trim().is_empty())?;

    let start = value.find(' ').map_or(0, |space| space + 1);
    let end = value[start..]
        .find(',')
        .map_or(value.len(), |comma| start + comma);

    let token = value[start..end].trim();

    if token.eq_ignore_ascii_case(scheme) {
        return Some(String::new());
    }

    Some(token.to_owned())
}

/// Decodes a base64 token into the bytes handed to the exchange primitive.
/// An empty token is the first round and decodes to no bytes.
pub fn token_bytes(token: &str) -> Result<Vec<u8>> {
    let token = token.trim();
    if token.is_empty() {
        return Ok(Vec::new());
    }

    base64::engine::general_purpose::STANDARD
        .decode(token)
        .map_err(error::exchange)
}

/// Returns the scheme label of a challenge, if it names a known mechanism.
pub fn mechanism_of(challenge: &str) -> Option<Mechanism> {
    let label = challenge
        .trim()
        .split(|c: char| c == ' ' || c == ',')
        .next()?;
    Mechanism::from_scheme(label)
}

/// Finds the challenge for `mechanism` among the `WWW-Authenticate` values
/// of a response.
///
/// A server may send one header per scheme or a single comma separated list;
/// both are searched. The returned string is suitable for [`decode`].
pub fn find_challenge(headers: &HeaderMap, mechanism: Mechanism) -> Option<String> {
    for value in headers.get_all(http::header::WWW_AUTHENTICATE) {
        let Ok(value_str) = value.to_str() else {
            continue;
        };

        for part in value_str.split(',') {
            let trimmed = part.trim();
            if mechanism_of(trimmed) == Some(mechanism) {
                return Some(trimmed.to_owned());
            }
        }
    }

    None
}
