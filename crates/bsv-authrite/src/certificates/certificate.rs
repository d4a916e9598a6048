//! Base Certificate type with signing and verification.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bsv_signer::types::*;
use bsv_signer::{ProtoSigner, PublicKey, Signature, Signer};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Protocol name under which certifiers sign certificates.
pub const CERTIFICATE_SIGNATURE_PROTOCOL: &str = "certificate signature";

const OUTPOINT_LEN: usize = 36;

/// A BRC-52 identity certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    /// Type identifier (base64 encoded, 32 bytes decoded).
    #[serde(rename = "type")]
    pub cert_type: String,
    /// Unique serial number (base64 encoded, 32 bytes decoded).
    pub serial_number: String,
    /// Subject's public key.
    pub subject: PublicKey,
    /// Certifier's public key.
    pub certifier: PublicKey,
    /// Revocation outpoint (txid_hex.index).
    pub revocation_outpoint: String,
    /// Encrypted fields: field_name -> base64_encrypted_value.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    /// DER-encoded signature bytes.
    #[serde(default, with = "hex_bytes", skip_serializing_if = "Vec::is_empty")]
    pub signature: Vec<u8>,
}

impl Certificate {
    /// Create a new unsigned certificate.
    pub fn new(
        cert_type: String,
        serial_number: String,
        subject: PublicKey,
        certifier: PublicKey,
        revocation_outpoint: String,
        fields: BTreeMap<String, String>,
    ) -> Self {
        Self {
            cert_type,
            serial_number,
            subject,
            certifier,
            revocation_outpoint,
            fields,
            signature: Vec::new(),
        }
    }

    /// Serialize the certificate to binary format.
    pub fn to_binary(&self, include_signature: bool) -> Result<Vec<u8>, AuthError> {
        let mut out = Vec::new();

        out.extend_from_slice(&decode_id("certificate type", &self.cert_type)?);
        out.extend_from_slice(&decode_id("serial number", &self.serial_number)?);
        out.extend_from_slice(&self.subject.to_compressed());
        out.extend_from_slice(&self.certifier.to_compressed());
        out.extend_from_slice(&encode_outpoint(&self.revocation_outpoint)?);

        // BTreeMap iteration is already sorted by field name.
        write_varint(&mut out, self.fields.len() as u64);
        for (name, value) in &self.fields {
            write_varint(&mut out, name.len() as u64);
            out.extend_from_slice(name.as_bytes());
            write_varint(&mut out, value.len() as u64);
            out.extend_from_slice(value.as_bytes());
        }

        if include_signature && !self.signature.is_empty() {
            write_varint(&mut out, self.signature.len() as u64);
            out.extend_from_slice(&self.signature);
        }

        Ok(out)
    }

    fn signing_args(&self, counterparty: Counterparty) -> EncryptionArgs {
        EncryptionArgs {
            protocol_id: Protocol::new(
                SECURITY_LEVEL_EVERY_APP_AND_COUNTERPARTY,
                CERTIFICATE_SIGNATURE_PROTOCOL,
            ),
            key_id: format!("{} {}", self.cert_type, self.serial_number),
            counterparty,
        }
    }

    /// Sign the certificate as certifier. The certifier field is replaced by
    /// the signer's identity key.
    pub fn sign(&mut self, certifier: &dyn Signer) -> Result<(), AuthError> {
        if !self.signature.is_empty() {
            return Err(AuthError::AlreadySigned);
        }

        self.certifier = certifier.identity_key()?;

        let signature = certifier.create_signature(CreateSignatureArgs {
            encryption_args: self.signing_args(Counterparty::Anyone),
            data: self.to_binary(false)?,
        })?;
        self.signature = signature.to_der().as_bytes().to_vec();
        Ok(())
    }

    /// Verify the certifier's signature.
    pub fn verify(&self) -> Result<(), AuthError> {
        if self.signature.is_empty() {
            return Err(AuthError::NotSigned);
        }

        let signature =
            Signature::from_der(&self.signature).map_err(|_| AuthError::InvalidSignature)?;

        let valid = ProtoSigner::anyone().verify_signature(VerifySignatureArgs {
            encryption_args: self.signing_args(Counterparty::Other(self.certifier)),
            data: self.to_binary(false)?,
            signature,
            for_self: false,
        })?;

        if !valid {
            return Err(AuthError::InvalidSignature);
        }
        Ok(())
    }
}

fn decode_id(what: &str, value: &str) -> Result<Vec<u8>, AuthError> {
    let bytes = BASE64
        .decode(value)
        .map_err(|e| AuthError::General(format!("invalid {} base64: {}", what, e)))?;
    if bytes.len() != 32 {
        return Err(AuthError::General(format!("{} must be 32 bytes", what)));
    }
    Ok(bytes)
}

fn encode_outpoint(outpoint: &str) -> Result<[u8; OUTPOINT_LEN], AuthError> {
    let mut result = [0u8; OUTPOINT_LEN];
    if outpoint.is_empty() {
        return Ok(result);
    }
    let (txid_hex, index) = outpoint
        .split_once('.')
        .ok_or_else(|| AuthError::General(format!("invalid outpoint format: {}", outpoint)))?;
    let index: u32 = index
        .parse()
        .map_err(|e| AuthError::General(format!("invalid outpoint index: {}", e)))?;
    let txid_bytes = hex::decode(txid_hex)
        .map_err(|e| AuthError::General(format!("invalid outpoint txid: {}", e)))?;
    if txid_bytes.len() != 32 {
        return Err(AuthError::General("txid must be 32 bytes".into()));
    }
    result[..32].copy_from_slice(&txid_bytes);
    result[32..].copy_from_slice(&index.to_le_bytes());
    Ok(result)
}

/// Bitcoin-style variable length integer.
fn write_varint(out: &mut Vec<u8>, n: u64) {
    match n {
        0..=0xfc => out.push(n as u8),
        0xfd..=0xffff => {
            out.push(0xfd);
            out.extend_from_slice(&(n as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            out.push(0xfe);
            out.extend_from_slice(&(n as u32).to_le_bytes());
        }
        _ => {
            out.push(0xff);
            out.extend_from_slice(&n.to_le_bytes());
        }
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
