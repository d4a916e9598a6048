//! Certificate requests and responses on top of an established session.

use std::time::Duration;

use bsv_signer::types::Counterparty;
use bsv_signer::PublicKey;
use tracing::debug;

use super::Peer;
use crate::certificates::{
    certificates_canonical_bytes, validate_certificates, validate_requested_certificate_set,
    VerifiableCertificate,
};
use crate::error::AuthError;
use crate::nonce::create_nonce;
use crate::types::*;
use crate::utils;

impl Peer {
    /// Ask a peer for certificates matching `requested`.
    ///
    /// The peer answers with a certificate response, which is validated on
    /// arrival and reported to certificate-received listeners.
    pub async fn request_certificates(
        &self,
        identity_key: &PublicKey,
        requested: RequestedCertificateSet,
        max_wait: Option<Duration>,
    ) -> Result<(), AuthError> {
        validate_requested_certificate_set(&requested)?;
        self.evict_idle_sessions();

        let session = self
            .get_authenticated_session(Some(identity_key), max_wait)
            .await?;

        let request_nonce = create_nonce(self.signer.as_ref(), Counterparty::Self_)?;
        let mut message = AuthMessage::new(MessageType::CertificateRequest, self.identity_key()?);
        message.nonce = request_nonce.clone();
        message.your_nonce = session.peer_nonce.clone();
        message.signature = self.sign(
            requested.to_canonical_bytes()?,
            utils::key_id(&request_nonce, &session.peer_nonce),
            *identity_key,
        )?;
        message.requested_certificates = requested;

        self.touch_session(&session.session_nonce)?;
        self.transport.send(&message).await
    }

    /// Send certificates to a peer, typically from a certificate-requested
    /// listener.
    pub async fn send_certificate_response(
        &self,
        identity_key: &PublicKey,
        certificates: Vec<VerifiableCertificate>,
    ) -> Result<(), AuthError> {
        self.evict_idle_sessions();
        let session = self.get_authenticated_session(Some(identity_key), None).await?;
        self.send_certificates_on_session(session, certificates).await
    }

    async fn send_certificates_on_session(
        &self,
        session: PeerSession,
        certificates: Vec<VerifiableCertificate>,
    ) -> Result<(), AuthError> {
        let peer_key = session
            .peer_identity_key
            .ok_or_else(|| AuthError::InvalidSession("peer identity key is unknown".into()))?;

        let response_nonce = create_nonce(self.signer.as_ref(), Counterparty::Self_)?;
        let mut message =
            AuthMessage::new(MessageType::CertificateResponse, self.identity_key()?);
        message.nonce = response_nonce.clone();
        message.your_nonce = session.peer_nonce.clone();
        message.signature = self.sign(
            certificates_canonical_bytes(&certificates)?,
            utils::key_id(&response_nonce, &session.peer_nonce),
            peer_key,
        )?;
        message.certificates = certificates;

        debug!(
            peer = %peer_key,
            count = message.certificates.len(),
            "sending certificate response"
        );
        self.touch_session(&session.session_nonce)?;
        self.transport.send(&message).await
    }

    /// Answer the certificate requirements carried by `message`.
    pub(super) async fn supply_certificates(
        &self,
        message: &AuthMessage,
        session: PeerSession,
    ) -> Result<(), AuthError> {
        match self.collect_requested_certificates(message)? {
            Some(certificates) => self.send_certificates_on_session(session, certificates).await,
            None => Ok(()),
        }
    }

    /// Certificates to hand over for `message.requested_certificates`.
    ///
    /// Returns `None` when certificate-requested listeners took over the
    /// request. Without a certificate provider the list is empty.
    pub(super) fn collect_requested_certificates(
        &self,
        message: &AuthMessage,
    ) -> Result<Option<Vec<VerifiableCertificate>>, AuthError> {
        let handlers = self.callbacks.certificate_requested_handlers();
        if !handlers.is_empty() {
            for handler in handlers {
                handler(&message.identity_key, &message.requested_certificates)?;
            }
            return Ok(None);
        }

        let certificates = match &self.certificate_provider {
            Some(provider) => provider.get_verifiable_certificates(
                &message.requested_certificates,
                &message.identity_key,
            )?,
            None => Vec::new(),
        };
        Ok(Some(certificates))
    }

    pub(super) fn validate_received_certificates(
        &self,
        message: &AuthMessage,
        requested: &RequestedCertificateSet,
    ) -> Result<(), AuthError> {
        let result = match &self.certificate_provider {
            Some(provider) => provider.validate_certificates(
                &message.certificates,
                requested,
                &message.identity_key,
            ),
            None => validate_certificates(&message.certificates, requested, &message.identity_key),
        };
        result.map_err(|e| match e {
            AuthError::CertificateValidationFailed(_) | AuthError::MissingCertificate => e,
            other => AuthError::CertificateValidationFailed(other.to_string()),
        })
    }

    pub(super) fn notify_certificates_received(&self, message: &AuthMessage) -> Result<(), AuthError> {
        for handler in self.callbacks.certificate_received_handlers() {
            handler(&message.identity_key, &message.certificates)?;
        }
        Ok(())
    }
}
