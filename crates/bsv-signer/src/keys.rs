//! secp256k1 key pair with BRC-42 child derivation.
//!
//! Wraps `k256` secret and public keys. Public keys always serialize in
//! compressed SEC1 form; their hex encoding is the identity key format used
//! on the wire and as the session store's identity index.

use std::fmt;
use std::hash::{Hash, Hasher};

use k256::elliptic_curve::ops::Reduce;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{ProjectivePoint, Scalar, SecretKey, U256};
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::hash::sha256_hmac;
use crate::SignerError;

/// Length of a compressed public key in bytes.
const COMPRESSED_LEN: usize = 33;

/// Length of a private key scalar in bytes.
const PRIVATE_KEY_LEN: usize = 32;

/// A secp256k1 private key.
#[derive(Clone)]
pub struct PrivateKey {
    inner: SecretKey,
}

impl PrivateKey {
    /// Generate a new random private key.
    pub fn new() -> Self {
        PrivateKey {
            inner: SecretKey::random(&mut OsRng),
        }
    }

    /// Create a private key from a 32-byte big-endian scalar.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SignerError> {
        if bytes.len() != PRIVATE_KEY_LEN {
            return Err(SignerError::InvalidPrivateKey(format!(
                "expected {} bytes, got {}",
                PRIVATE_KEY_LEN,
                bytes.len()
            )));
        }
        let inner = SecretKey::from_slice(bytes)
            .map_err(|e| SignerError::InvalidPrivateKey(e.to_string()))?;
        Ok(PrivateKey { inner })
    }

    /// Create a private key from a 64-character hex string.
    pub fn from_hex(hex_str: &str) -> Result<Self, SignerError> {
        if hex_str.is_empty() {
            return Err(SignerError::InvalidPrivateKey(
                "private key hex is empty".to_string(),
            ));
        }
        Self::from_bytes(&hex::decode(hex_str)?)
    }

    /// Serialize as a 32-byte big-endian scalar.
    pub fn to_bytes(&self) -> [u8; PRIVATE_KEY_LEN] {
        self.inner.to_bytes().into()
    }

    /// Serialize as lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// The public key for this private key.
    pub fn pub_key(&self) -> PublicKey {
        PublicKey {
            inner: self.inner.public_key(),
        }
    }

    /// Compute the ECDH shared point between this key and `pub_key`.
    pub fn derive_shared_secret(&self, pub_key: &PublicKey) -> Result<PublicKey, SignerError> {
        let point = pub_key.inner.to_projective() * self.scalar();
        PublicKey::from_projective(point)
    }

    /// Derive a child private key (BRC-42).
    ///
    /// The offset is `HMAC-SHA256(key = compressed shared secret, data = invoice)`
    /// interpreted as a scalar and added to this key.
    pub fn derive_child(
        &self,
        pub_key: &PublicKey,
        invoice_number: &str,
    ) -> Result<PrivateKey, SignerError> {
        let shared = self.derive_shared_secret(pub_key)?;
        let offset = hmac_scalar(&shared, invoice_number);
        let child = self.scalar() + offset;
        let inner = SecretKey::from_bytes(&child.to_bytes())
            .map_err(|_| SignerError::InvalidPrivateKey("derived scalar is zero".into()))?;
        Ok(PrivateKey { inner })
    }

    pub(crate) fn secret_key(&self) -> &SecretKey {
        &self.inner
    }

    fn scalar(&self) -> Scalar {
        *self.inner.to_nonzero_scalar()
    }
}

impl Default for PrivateKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("pub_key", &self.pub_key().to_hex())
            .finish_non_exhaustive()
    }
}

/// A secp256k1 public key.
#[derive(Clone, Copy)]
pub struct PublicKey {
    inner: k256::PublicKey,
}

impl PublicKey {
    /// Parse a SEC1-encoded public key (compressed or uncompressed).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SignerError> {
        if bytes.is_empty() {
            return Err(SignerError::InvalidPublicKey(
                "pubkey bytes are empty".to_string(),
            ));
        }
        let inner = k256::PublicKey::from_sec1_bytes(bytes)
            .map_err(|e| SignerError::InvalidPublicKey(e.to_string()))?;
        Ok(PublicKey { inner })
    }

    /// Parse a hex-encoded SEC1 public key.
    pub fn from_hex(hex_str: &str) -> Result<Self, SignerError> {
        Self::from_bytes(&hex::decode(hex_str)?)
    }

    /// Serialize in compressed SEC1 form.
    pub fn to_compressed(&self) -> [u8; COMPRESSED_LEN] {
        let point = self.inner.to_encoded_point(true);
        let mut out = [0u8; COMPRESSED_LEN];
        out.copy_from_slice(point.as_bytes());
        out
    }

    /// Compressed form as lowercase hex (66 characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_compressed())
    }

    /// Derive a child public key (BRC-42), the counterpart of
    /// [`PrivateKey::derive_child`] computed by the other party.
    pub fn derive_child(
        &self,
        private_key: &PrivateKey,
        invoice_number: &str,
    ) -> Result<PublicKey, SignerError> {
        let shared = private_key.derive_shared_secret(self)?;
        let offset = hmac_scalar(&shared, invoice_number);
        let point = self.inner.to_projective() + ProjectivePoint::GENERATOR * offset;
        PublicKey::from_projective(point)
    }

    pub(crate) fn inner(&self) -> &k256::PublicKey {
        &self.inner
    }

    fn from_projective(point: ProjectivePoint) -> Result<Self, SignerError> {
        let inner = k256::PublicKey::from_affine(point.to_affine())
            .map_err(|_| SignerError::PointAtInfinity)?;
        Ok(PublicKey { inner })
    }
}

fn hmac_scalar(shared: &PublicKey, invoice_number: &str) -> Scalar {
    let mac = sha256_hmac(&shared.to_compressed(), invoice_number.as_bytes());
    <Scalar as Reduce<U256>>::reduce(U256::from_be_slice(&mac))
}

/// Returns the "anyone" key pair (private scalar = 1).
pub fn anyone_key() -> (PrivateKey, PublicKey) {
    let mut bytes = [0u8; PRIVATE_KEY_LEN];
    bytes[PRIVATE_KEY_LEN - 1] = 1;
    let priv_key = PrivateKey::from_bytes(&bytes).expect("anyone key should always be valid");
    let pub_key = priv_key.pub_key();
    (priv_key, pub_key)
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.to_compressed() == other.to_compressed()
    }
}

impl Eq for PublicKey {}

impl Hash for PublicKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_compressed().hash(state);
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PublicKey").field(&self.to_hex()).finish()
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        PublicKey::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
