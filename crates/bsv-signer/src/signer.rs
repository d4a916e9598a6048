//! The signing capability consumed by the auth engine.

use crate::keys::PublicKey;
use crate::types::*;
use crate::{Signature, SignerError};

/// Wallet-like capability that derives keys, signs, verifies, and computes HMACs.
///
/// Every operation is scoped by a protocol, a key ID, and a counterparty; a
/// signature created by one party under those parameters verifies on the other
/// party's side when both name each other as counterparty.
pub trait Signer: Send + Sync {
    /// Return the identity key or a derived public key.
    fn get_public_key(&self, args: GetPublicKeyArgs) -> Result<PublicKey, SignerError>;

    /// Sign `args.data` with the derived private key.
    fn create_signature(&self, args: CreateSignatureArgs) -> Result<Signature, SignerError>;

    /// Check a signature against the derived public key.
    fn verify_signature(&self, args: VerifySignatureArgs) -> Result<bool, SignerError>;

    /// HMAC `args.data` with the derived symmetric key.
    fn create_hmac(&self, args: CreateHmacArgs) -> Result<[u8; 32], SignerError>;

    /// Check an HMAC against the derived symmetric key.
    fn verify_hmac(&self, args: VerifyHmacArgs) -> Result<bool, SignerError>;

    /// Convenience for `get_public_key(GetPublicKeyArgs::identity())`.
    fn identity_key(&self) -> Result<PublicKey, SignerError> {
        self.get_public_key(GetPublicKeyArgs::identity())
    }
}
