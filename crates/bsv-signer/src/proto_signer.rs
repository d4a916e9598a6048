//! ProtoSigner: an in-process [`Signer`] backed by a root private key.

use hmac::{Hmac, Mac};
use k256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use k256::ecdsa::{SigningKey, VerifyingKey};
use sha2::Sha256;

use crate::hash::{sha256, sha256_hmac};
use crate::key_deriver::KeyDeriver;
use crate::keys::{PrivateKey, PublicKey};
use crate::signer::Signer;
use crate::types::*;
use crate::{Signature, SignerError};

/// Signer that derives every key from one root private key (BRC-42).
#[derive(Clone, Debug)]
pub struct ProtoSigner {
    key_deriver: KeyDeriver,
}

impl ProtoSigner {
    /// Create a signer rooted at `private_key`.
    pub fn new(private_key: PrivateKey) -> Self {
        Self {
            key_deriver: KeyDeriver::new(Some(private_key)),
        }
    }

    /// Create a signer rooted at the publicly known "anyone" key. Useful for
    /// verifying signatures made for counterparty "anyone".
    pub fn anyone() -> Self {
        Self {
            key_deriver: KeyDeriver::new(None),
        }
    }

    /// Create a signer with a freshly generated root key.
    pub fn random() -> Self {
        Self::new(PrivateKey::new())
    }
}

impl Signer for ProtoSigner {
    fn get_public_key(&self, args: GetPublicKeyArgs) -> Result<PublicKey, SignerError> {
        if args.identity_key {
            return Ok(self.key_deriver.identity_key());
        }

        let enc = args.encryption_args.ok_or_else(|| {
            SignerError::InvalidArgument(
                "encryption args are required unless identity_key is set".into(),
            )
        })?;
        self.key_deriver.derive_public_key(
            &enc.protocol_id,
            &enc.key_id,
            &enc.counterparty,
            args.for_self,
        )
    }

    fn create_signature(&self, args: CreateSignatureArgs) -> Result<Signature, SignerError> {
        let enc = &args.encryption_args;
        let priv_key =
            self.key_deriver
                .derive_private_key(&enc.protocol_id, &enc.key_id, &enc.counterparty)?;

        let signing_key = SigningKey::from_bytes(&priv_key.secret_key().to_bytes())
            .map_err(|e| SignerError::Signing(e.to_string()))?;
        let signature: Signature = signing_key
            .sign_prehash(&sha256(&args.data))
            .map_err(|e| SignerError::Signing(e.to_string()))?;

        Ok(signature.normalize_s().unwrap_or(signature))
    }

    fn verify_signature(&self, args: VerifySignatureArgs) -> Result<bool, SignerError> {
        if args.data.is_empty() {
            return Err(SignerError::InvalidArgument(
                "data to verify must not be empty".into(),
            ));
        }

        let enc = &args.encryption_args;
        let pub_key = self.key_deriver.derive_public_key(
            &enc.protocol_id,
            &enc.key_id,
            &enc.counterparty,
            args.for_self,
        )?;

        let verifying_key = VerifyingKey::from_sec1_bytes(&pub_key.to_compressed())
            .map_err(|e| SignerError::InvalidPublicKey(e.to_string()))?;
        Ok(verifying_key
            .verify_prehash(&sha256(&args.data), &args.signature)
            .is_ok())
    }

    fn create_hmac(&self, args: CreateHmacArgs) -> Result<[u8; 32], SignerError> {
        let enc = &args.encryption_args;
        let key =
            self.key_deriver
                .derive_symmetric_key(&enc.protocol_id, &enc.key_id, &enc.counterparty)?;
        Ok(sha256_hmac(&key, &args.data))
    }

    fn verify_hmac(&self, args: VerifyHmacArgs) -> Result<bool, SignerError> {
        let enc = &args.encryption_args;
        let key =
            self.key_deriver
                .derive_symmetric_key(&enc.protocol_id, &enc.key_id, &enc.counterparty)?;
        let mut mac = Hmac::<Sha256>::new_from_slice(&key).expect("HMAC accepts any key length");
        mac.update(&args.data);
        Ok(mac.verify_slice(&args.hmac).is_ok())
    }
}
