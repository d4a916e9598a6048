//! Signing capability for BRC-31 peers.
//!
//! Provides secp256k1 keys, BRC-42/43 key derivation, the [`Signer`] trait the
//! auth engine consumes, and [`ProtoSigner`], an in-process implementation
//! backed by a single root private key.

mod error;
pub use error::SignerError;

pub mod hash;
pub mod key_deriver;
pub mod keys;
pub mod proto_signer;
pub mod signer;
pub mod types;

pub use k256::ecdsa::Signature;
pub use key_deriver::KeyDeriver;
pub use keys::{PrivateKey, PublicKey};
pub use proto_signer::ProtoSigner;
pub use signer::Signer;
