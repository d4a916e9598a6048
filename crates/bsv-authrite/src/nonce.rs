//! Self-issued nonces bound to the signer.
//!
//! A nonce is `base64(random_16_bytes || HMAC(random_16_bytes))`, where the
//! HMAC key is derived by the signer for counterparty self. Only the signer
//! that issued a nonce can verify it, which lets a peer recognise its own
//! session nonces when they are echoed back as `yourNonce`.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bsv_signer::types::*;
use bsv_signer::Signer;
use rand::RngCore;

use crate::error::AuthError;

/// Protocol name for nonce HMACs.
const NONCE_PROTOCOL: &str = "server hmac";

const NONCE_DATA_LEN: usize = 16;
const NONCE_HMAC_LEN: usize = 32;

fn nonce_encryption_args(data: &[u8], counterparty: Counterparty) -> EncryptionArgs {
    EncryptionArgs {
        protocol_id: Protocol::new(SECURITY_LEVEL_EVERY_APP, NONCE_PROTOCOL),
        key_id: String::from_utf8_lossy(data).to_string(),
        counterparty,
    }
}

/// Create a nonce that `signer` can later verify.
pub fn create_nonce(signer: &dyn Signer, counterparty: Counterparty) -> Result<String, AuthError> {
    let mut random_bytes = [0u8; NONCE_DATA_LEN];
    rand::thread_rng().fill_bytes(&mut random_bytes);

    let hmac = signer.create_hmac(CreateHmacArgs {
        encryption_args: nonce_encryption_args(&random_bytes, counterparty),
        data: random_bytes.to_vec(),
    })?;

    let mut combined = Vec::with_capacity(NONCE_DATA_LEN + NONCE_HMAC_LEN);
    combined.extend_from_slice(&random_bytes);
    combined.extend_from_slice(&hmac);
    Ok(BASE64.encode(&combined))
}

/// Verify that `nonce` was created by `signer` for `counterparty`.
///
/// Returns `InvalidNonce` when the nonce is not even shaped like one.
pub fn verify_nonce(
    nonce: &str,
    signer: &dyn Signer,
    counterparty: Counterparty,
) -> Result<bool, AuthError> {
    let nonce_bytes = BASE64.decode(nonce).map_err(|_| AuthError::InvalidNonce)?;
    if nonce_bytes.len() != NONCE_DATA_LEN + NONCE_HMAC_LEN {
        return Err(AuthError::InvalidNonce);
    }

    let (data, hmac) = nonce_bytes.split_at(NONCE_DATA_LEN);
    let mut hmac_array = [0u8; NONCE_HMAC_LEN];
    hmac_array.copy_from_slice(hmac);

    let valid = signer.verify_hmac(VerifyHmacArgs {
        encryption_args: nonce_encryption_args(data, counterparty),
        data: data.to_vec(),
        hmac: hmac_array,
    })?;
    Ok(valid)
}
