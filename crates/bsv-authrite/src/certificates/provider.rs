//! Source of certificates a peer presents, and the policy used to accept a
//! peer's certificates.

use bsv_signer::PublicKey;

use super::{certifier_in_slice, validate_certificates, VerifiableCertificate};
use crate::error::AuthError;
use crate::types::RequestedCertificateSet;

/// Supplies and validates verifiable certificates for a [`Peer`](crate::Peer).
pub trait CertificateProvider: Send + Sync {
    /// Certificates matching `requested`, with keyrings revealing the
    /// requested fields to `verifier`.
    fn get_verifiable_certificates(
        &self,
        requested: &RequestedCertificateSet,
        verifier: &PublicKey,
    ) -> Result<Vec<VerifiableCertificate>, AuthError>;

    /// Validate certificates received from `sender`.
    fn validate_certificates(
        &self,
        certificates: &[VerifiableCertificate],
        requested: &RequestedCertificateSet,
        sender: &PublicKey,
    ) -> Result<(), AuthError> {
        validate_certificates(certificates, requested, sender)
    }
}

/// A fixed set of certificates held in memory.
///
/// Keyrings are stored in full and trimmed to the requested fields on the way
/// out. The verifier argument is ignored since the keyrings are not
/// re-encrypted per verifier.
#[derive(Debug, Clone, Default)]
pub struct StaticCertificateProvider {
    certificates: Vec<VerifiableCertificate>,
}

impl StaticCertificateProvider {
    pub fn new(certificates: Vec<VerifiableCertificate>) -> Self {
        Self { certificates }
    }
}

impl CertificateProvider for StaticCertificateProvider {
    fn get_verifiable_certificates(
        &self,
        requested: &RequestedCertificateSet,
        _verifier: &PublicKey,
    ) -> Result<Vec<VerifiableCertificate>, AuthError> {
        let matching = self
            .certificates
            .iter()
            .filter(|vc| {
                !requested.has_certifiers()
                    || certifier_in_slice(&requested.certifiers, &vc.certificate.certifier)
            })
            .filter_map(|vc| {
                if !requested.has_certificate_types() {
                    return Some(vc.clone());
                }
                let fields = requested.certificate_types.get(&vc.certificate.cert_type)?;
                let mut revealed = vc.clone();
                revealed.keyring.retain(|name, _| fields.contains(name));
                Some(revealed)
            })
            .collect();
        Ok(matching)
    }
}
