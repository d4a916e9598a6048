//! Argument and result types for signer operations.

use crate::keys::PublicKey;
use crate::Signature;

/// Security level for a protocol.
pub type SecurityLevel = i32;

/// No user prompts required.
pub const SECURITY_LEVEL_SILENT: SecurityLevel = 0;
/// Keys are scoped per application.
pub const SECURITY_LEVEL_EVERY_APP: SecurityLevel = 1;
/// Keys are scoped per application and per counterparty.
pub const SECURITY_LEVEL_EVERY_APP_AND_COUNTERPARTY: SecurityLevel = 2;

/// Protocol identifier: security level plus protocol name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Protocol {
    pub security_level: SecurityLevel,
    pub protocol: String,
}

impl Protocol {
    pub fn new(security_level: SecurityLevel, protocol: impl Into<String>) -> Self {
        Self {
            security_level,
            protocol: protocol.into(),
        }
    }
}

/// The other party in a key derivation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Counterparty {
    /// The signer itself.
    Self_,
    /// The publicly known "anyone" key.
    Anyone,
    /// A specific party identified by public key.
    Other(PublicKey),
}

/// Key derivation parameters shared by every signer operation.
#[derive(Debug, Clone)]
pub struct EncryptionArgs {
    pub protocol_id: Protocol,
    pub key_id: String,
    pub counterparty: Counterparty,
}

/// Arguments for [`Signer::get_public_key`](crate::Signer::get_public_key).
#[derive(Debug, Clone)]
pub struct GetPublicKeyArgs {
    /// Return the root identity key, ignoring `encryption_args`.
    pub identity_key: bool,
    pub encryption_args: Option<EncryptionArgs>,
    /// Derive our own child key rather than the counterparty's.
    pub for_self: bool,
}

impl GetPublicKeyArgs {
    /// Arguments requesting the signer's identity key.
    pub fn identity() -> Self {
        Self {
            identity_key: true,
            encryption_args: None,
            for_self: false,
        }
    }
}

/// Arguments for [`Signer::create_signature`](crate::Signer::create_signature).
#[derive(Debug, Clone)]
pub struct CreateSignatureArgs {
    pub encryption_args: EncryptionArgs,
    pub data: Vec<u8>,
}

/// Arguments for [`Signer::verify_signature`](crate::Signer::verify_signature).
#[derive(Debug, Clone)]
pub struct VerifySignatureArgs {
    pub encryption_args: EncryptionArgs,
    pub data: Vec<u8>,
    pub signature: Signature,
    /// Verify against our own derived key instead of the counterparty's.
    pub for_self: bool,
}

/// Arguments for [`Signer::create_hmac`](crate::Signer::create_hmac).
#[derive(Debug, Clone)]
pub struct CreateHmacArgs {
    pub encryption_args: EncryptionArgs,
    pub data: Vec<u8>,
}

/// Arguments for [`Signer::verify_hmac`](crate::Signer::verify_hmac).
#[derive(Debug, Clone)]
pub struct VerifyHmacArgs {
    pub encryption_args: EncryptionArgs,
    pub data: Vec<u8>,
    pub hmac: [u8; 32],
}
