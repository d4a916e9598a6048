//! Core auth types: AuthMessage, MessageType, PeerSession, RequestedCertificateSet.

use std::collections::BTreeMap;

use bsv_signer::PublicKey;
use serde::{Deserialize, Serialize};

use crate::certificates::VerifiableCertificate;
use crate::error::AuthError;

/// Auth protocol version.
pub const AUTH_VERSION: &str = "0.1";

/// Protocol ID for authentication message signatures (BRC-31 Authrite).
pub const AUTH_PROTOCOL_ID: &str = "auth message signature";

/// Message types exchanged in the auth protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageType {
    /// Initial authentication request from the initiating peer.
    InitialRequest,
    /// Response to an initial authentication request.
    InitialResponse,
    /// Request for certificates from a peer.
    CertificateRequest,
    /// Response containing certificates.
    CertificateResponse,
    /// A general authenticated message.
    General,
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageType::InitialRequest => write!(f, "initialRequest"),
            MessageType::InitialResponse => write!(f, "initialResponse"),
            MessageType::CertificateRequest => write!(f, "certificateRequest"),
            MessageType::CertificateResponse => write!(f, "certificateResponse"),
            MessageType::General => write!(f, "general"),
        }
    }
}

/// A message exchanged during the auth protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthMessage {
    /// Version of the auth protocol.
    pub version: String,
    /// Type of message.
    pub message_type: MessageType,
    /// Sender's identity key.
    pub identity_key: PublicKey,
    /// Sender's nonce scoping this message (base64).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub nonce: String,
    /// The sender's session nonce (initial request and initial response only).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub initial_nonce: String,
    /// Echo of the nonce the recipient generated; keys the recipient's session.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub your_nonce: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub certificates: Vec<VerifiableCertificate>,
    #[serde(default, skip_serializing_if = "RequestedCertificateSet::is_empty")]
    pub requested_certificates: RequestedCertificateSet,
    /// Application data (general messages only).
    #[serde(default, with = "base64_bytes", skip_serializing_if = "Vec::is_empty")]
    pub payload: Vec<u8>,
    /// DER-encoded signature.
    #[serde(default, with = "base64_bytes", skip_serializing_if = "Vec::is_empty")]
    pub signature: Vec<u8>,
}

impl AuthMessage {
    /// Create a new AuthMessage with the given type and sender identity key.
    pub fn new(message_type: MessageType, identity_key: PublicKey) -> Self {
        Self {
            version: AUTH_VERSION.to_string(),
            message_type,
            identity_key,
            nonce: String::new(),
            initial_nonce: String::new(),
            your_nonce: String::new(),
            certificates: Vec::new(),
            requested_certificates: RequestedCertificateSet::default(),
            payload: Vec::new(),
            signature: Vec::new(),
        }
    }

    /// Encode as JSON for transports that carry the envelope as text.
    pub fn to_json(&self) -> Result<String, AuthError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from JSON. Unknown message types are rejected.
    pub fn from_json(json: &str) -> Result<Self, AuthError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Certifiers and certificate types (with required fields) one side asks for.
///
/// Certificate types are base64 encodings of 32-byte type identifiers. The map
/// is ordered so the JSON encoding, which is what gets signed, is canonical.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestedCertificateSet {
    /// Public keys of acceptable certifiers.
    #[serde(default)]
    pub certifiers: Vec<PublicKey>,
    /// Certificate type -> required field names.
    #[serde(default)]
    pub certificate_types: BTreeMap<String, Vec<String>>,
}

impl RequestedCertificateSet {
    /// Returns true if both certifiers and certificate types are empty.
    pub fn is_empty(&self) -> bool {
        self.certifiers.is_empty() && self.certificate_types.is_empty()
    }

    /// Returns true if any certificate types have been specified.
    pub fn has_certificate_types(&self) -> bool {
        !self.certificate_types.is_empty()
    }

    /// Returns true if any certifier public keys have been specified.
    pub fn has_certifiers(&self) -> bool {
        !self.certifiers.is_empty()
    }

    /// Canonical byte encoding covered by certificate request signatures.
    pub fn to_canonical_bytes(&self) -> Result<Vec<u8>, AuthError> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// A session with a peer.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerSession {
    /// Whether the session is authenticated.
    pub is_authenticated: bool,
    /// The session nonce (our nonce); primary key in the session store.
    pub session_nonce: String,
    /// The nonce most recently received from the peer.
    pub peer_nonce: String,
    /// The peer's identity key, once known.
    pub peer_identity_key: Option<PublicKey>,
    /// The last time the session was touched (ms since epoch).
    pub last_update: i64,
}

impl PeerSession {
    /// A fresh unauthenticated session.
    pub fn new(session_nonce: String, peer_identity_key: Option<PublicKey>) -> Self {
        Self {
            is_authenticated: false,
            session_nonce,
            peer_nonce: String::new(),
            peer_identity_key,
            last_update: crate::utils::now_ms(),
        }
    }
}

/// Serde adapter for byte fields carried as standard base64 strings.
pub(crate) mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        BASE64.decode(s).map_err(serde::de::Error::custom)
    }
}
