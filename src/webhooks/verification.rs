use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

use crate::errors::ServiceError;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";
const SIGNATURE_PREFIX: &str = "sha256=";
pub const SUBSCRIBE_MODE: &str = "subscribe";

/// Answers the channel's subscription handshake.
///
/// Returns the challenge unchanged when the supplied token equals the configured one.
pub fn verify_challenge(
    token: &str,
    query_token: Option<&str>,
    challenge: Option<&str>,
) -> Result<String, ServiceError> {
    let supplied = query_token.unwrap_or_default();
    if token.is_empty() || !constant_time_eq(token.as_bytes(), supplied.as_bytes()) {
        warn!("Webhook handshake rejected: verify token mismatch");
        return Err(ServiceError::Unauthorized("verify token mismatch".to_string()));
    }

    Ok(challenge.unwrap_or_default().to_string())
}

/// Checks the `sha256=<hex>` HMAC the channel computes over the raw request body.
pub fn authenticate_event(
    shared_secret: &str,
    signature_header: Option<&str>,
    raw_body: &[u8],
) -> Result<(), ServiceError> {
    let header = signature_header
        .ok_or_else(|| ServiceError::Unauthorized("missing event signature".to_string()))?;

    let hex_sig = header
        .trim()
        .strip_prefix(SIGNATURE_PREFIX)
        .ok_or_else(|| ServiceError::Unauthorized("unsupported signature format".to_string()))?;

    let expected = hex::decode(hex_sig)
        .map_err(|_| ServiceError::Unauthorized("garbled event signature".to_string()))?;

    let mut mac = HmacSha256::new_from_slice(shared_secret.as_bytes())
        .map_err(|e| ServiceError::ConfigError(format!("invalid channel app secret: {}", e)))?;
    mac.update(raw_body);

    mac.verify_slice(&expected)
        .map_err(|_| ServiceError::Unauthorized("event signature mismatch".to_string()))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
