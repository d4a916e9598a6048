//! Small helpers: random tokens, timestamps, signing key IDs.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;

use crate::error::AuthError;

/// Generate `length` random bytes and return them as base64.
pub fn random_base64(length: usize) -> String {
    let mut bytes = vec![0u8; length];
    rand::thread_rng().fill_bytes(&mut bytes);
    BASE64.encode(&bytes)
}

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Signing key ID for one message: the two nonces joined by a single space.
pub fn key_id(first: &str, second: &str) -> String {
    format!("{} {}", first, second)
}

/// Decode two base64 nonces and concatenate the bytes, `first` then `second`.
pub fn concat_nonces(first: &str, second: &str) -> Result<Vec<u8>, AuthError> {
    let mut data = BASE64.decode(first)?;
    data.extend_from_slice(&BASE64.decode(second)?);
    Ok(data)
}
