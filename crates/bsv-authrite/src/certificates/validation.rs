//! Checks applied to certificate requests and to certificates received from a peer.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bsv_signer::PublicKey;

use super::VerifiableCertificate;
use crate::error::AuthError;
use crate::types::RequestedCertificateSet;

/// Returns true if `key` is one of `certifiers`.
pub fn certifier_in_slice(certifiers: &[PublicKey], key: &PublicKey) -> bool {
    certifiers.iter().any(|c| c == key)
}

/// Validate certificates presented by `sender` against what we asked for.
///
/// Every certificate must be about the sender, carry a valid certifier
/// signature, come from a requested certifier, be of a requested type, and
/// reveal every field required for that type.
pub fn validate_certificates(
    certificates: &[VerifiableCertificate],
    requested: &RequestedCertificateSet,
    sender: &PublicKey,
) -> Result<(), AuthError> {
    if certificates.is_empty() {
        return Err(AuthError::MissingCertificate);
    }

    for vc in certificates {
        let cert = &vc.certificate;

        if cert.subject != *sender {
            return Err(AuthError::CertificateValidationFailed(format!(
                "certificate subject {} does not match sender {}",
                cert.subject, sender
            )));
        }

        cert.verify().map_err(|e| {
            AuthError::CertificateValidationFailed(format!(
                "signature of certificate {} is invalid: {}",
                cert.serial_number, e
            ))
        })?;

        if requested.has_certifiers() && !certifier_in_slice(&requested.certifiers, &cert.certifier)
        {
            return Err(AuthError::CertificateValidationFailed(format!(
                "certificate {} has unrequested certifier {}",
                cert.serial_number, cert.certifier
            )));
        }

        if requested.has_certificate_types() {
            let required_fields = requested.certificate_types.get(&cert.cert_type).ok_or_else(|| {
                AuthError::CertificateValidationFailed(format!(
                    "certificate type {} was not requested",
                    cert.cert_type
                ))
            })?;

            if let Some(missing) = required_fields.iter().find(|f| !vc.reveals(f)) {
                return Err(AuthError::CertificateValidationFailed(format!(
                    "certificate {} does not reveal required field {}",
                    cert.serial_number, missing
                )));
            }
        }
    }

    Ok(())
}

/// Reject requests a peer could never satisfy.
pub fn validate_requested_certificate_set(
    requested: &RequestedCertificateSet,
) -> Result<(), AuthError> {
    if !requested.has_certifiers() {
        return Err(AuthError::General("certifiers list is empty".into()));
    }
    if !requested.has_certificate_types() {
        return Err(AuthError::General("certificate types map is empty".into()));
    }

    for (cert_type, fields) in &requested.certificate_types {
        let type_bytes = BASE64.decode(cert_type).map_err(|e| {
            AuthError::General(format!("invalid certificate type {}: {}", cert_type, e))
        })?;
        if type_bytes.iter().all(|b| *b == 0) {
            return Err(AuthError::General("empty certificate type specified".into()));
        }
        if fields.is_empty() {
            return Err(AuthError::General(format!(
                "no fields specified for certificate type {}",
                cert_type
            )));
        }
    }

    Ok(())
}
