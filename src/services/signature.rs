//! Gateway parameter-string signing.
//!
//! The gateway signs a form as the MD5 of its parameter string: every field except
//! `signature`, in the order it appears, as `key=urlencode(trim(value))` joined by `&`,
//! followed by `&passphrase=urlencode(passphrase)`. Checkout forms and payment
//! notifications use the same scheme.

use md5::{Digest, Md5};

pub const SIGNATURE_FIELD: &str = "signature";

/// Form encoding used by the gateway: spaces become `+`, reserved bytes `%XX` in upper case.
///
/// The gateway encodes like PHP `urlencode`, which also escapes `*`; the WHATWG form
/// serializer leaves it bare.
pub fn encode_value(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.trim().as_bytes())
        .collect::<String>()
        .replace('*', "%2A")
}

/// Builds the parameter string, skipping the signature field itself.
pub fn param_string<'a, I>(fields: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    fields
        .into_iter()
        .filter(|(key, _)| *key != SIGNATURE_FIELD)
        .map(|(key, value)| format!("{}={}", key, encode_value(value)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Lower-case hex MD5 over the parameter string salted with the passphrase.
pub fn sign<'a, I>(fields: I, passphrase: &str) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut payload = param_string(fields);
    if !passphrase.is_empty() {
        payload.push_str("&passphrase=");
        payload.push_str(&encode_value(passphrase));
    }
    hex::encode(Md5::digest(payload.as_bytes()))
}

/// Compares two hex signatures without short-circuiting on the first differing byte.
pub fn signatures_match(expected: &str, supplied: &str) -> bool {
    let supplied = supplied.trim().to_ascii_lowercase();
    if expected.len() != supplied.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in expected.as_bytes().iter().zip(supplied.as_bytes()) {
        diff |= x ^ y;
    }
    diff == 0
}
