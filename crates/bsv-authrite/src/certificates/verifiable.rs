//! VerifiableCertificate: a Certificate plus the keyring revealed to one verifier.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::Certificate;
use crate::error::AuthError;

/// A certificate with a verifier-specific keyring for selective field disclosure.
///
/// The keyring maps each revealed field name to its revelation key, encrypted
/// for the verifier. Fields absent from the keyring are not disclosed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiableCertificate {
    #[serde(flatten)]
    pub certificate: Certificate,
    #[serde(default)]
    pub keyring: BTreeMap<String, String>,
}

impl VerifiableCertificate {
    pub fn new(certificate: Certificate, keyring: BTreeMap<String, String>) -> Self {
        Self {
            certificate,
            keyring,
        }
    }

    /// Verify the certificate signature (delegates to Certificate::verify).
    pub fn verify(&self) -> Result<(), AuthError> {
        self.certificate.verify()
    }

    /// Whether the keyring reveals `field`.
    pub fn reveals(&self, field: &str) -> bool {
        self.keyring.contains_key(field)
    }
}

/// Canonical byte encoding covered by certificate response signatures.
pub fn certificates_canonical_bytes(
    certificates: &[VerifiableCertificate],
) -> Result<Vec<u8>, AuthError> {
    Ok(serde_json::to_vec(certificates)?)
}
