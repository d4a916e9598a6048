//! Inbound message dispatch and the per-type handlers.

use bsv_signer::types::Counterparty;
use tracing::{debug, warn};

use super::Peer;
use crate::certificates::certificates_canonical_bytes;
use crate::error::AuthError;
use crate::nonce::{create_nonce, verify_nonce};
use crate::types::*;
use crate::utils;

impl Peer {
    /// Process one message received from the transport.
    ///
    /// Transports normally reach this through the handler registered in
    /// [`Peer::new`]; it is public for transports that dispatch by hand.
    pub async fn handle_incoming_message(&self, message: AuthMessage) -> Result<(), AuthError> {
        if message.version != AUTH_VERSION {
            return Err(AuthError::VersionMismatch {
                got: message.version,
                expected: AUTH_VERSION.to_string(),
            });
        }

        debug!(
            message_type = %message.message_type,
            sender = %message.identity_key,
            "handling auth message"
        );

        match message.message_type {
            MessageType::InitialRequest => self.handle_initial_request(&message).await,
            MessageType::InitialResponse => self.handle_initial_response(&message).await,
            MessageType::CertificateRequest => self.handle_certificate_request(&message).await,
            MessageType::CertificateResponse => self.handle_certificate_response(&message),
            MessageType::General => self.handle_general_message(&message),
        }
    }

    /// Our own session for a message, after checking that `your_nonce` is a
    /// nonce we issued.
    fn session_for(&self, message: &AuthMessage) -> Result<PeerSession, AuthError> {
        if !verify_nonce(&message.your_nonce, self.signer.as_ref(), Counterparty::Self_)? {
            return Err(AuthError::InvalidNonce);
        }
        self.session_manager.get_session(&message.your_nonce)
    }

    async fn handle_initial_request(&self, message: &AuthMessage) -> Result<(), AuthError> {
        if message.initial_nonce.is_empty() {
            return Err(AuthError::InvalidNonce);
        }

        let session_nonce = create_nonce(self.signer.as_ref(), Counterparty::Self_)?;
        let requested = self.certificates_to_request();

        let mut session = PeerSession::new(session_nonce.clone(), Some(message.identity_key));
        session.peer_nonce = message.initial_nonce.clone();
        session.is_authenticated = requested.is_empty();
        self.session_manager.add_session(session)?;

        let mut response = AuthMessage::new(MessageType::InitialResponse, self.identity_key()?);
        response.nonce = session_nonce.clone();
        response.your_nonce = message.initial_nonce.clone();
        response.initial_nonce = session_nonce.clone();
        response.requested_certificates = requested;

        if !message.requested_certificates.is_empty() {
            if let Some(certificates) = self.collect_requested_certificates(message)? {
                response.certificates = certificates;
            }
        }

        response.signature = self.sign(
            utils::concat_nonces(&message.initial_nonce, &session_nonce)?,
            utils::key_id(&message.initial_nonce, &session_nonce),
            message.identity_key,
        )?;

        debug!(sender = %message.identity_key, "sending initial response");
        self.transport.send(&response).await
    }

    async fn handle_initial_response(&self, message: &AuthMessage) -> Result<(), AuthError> {
        let session = self.session_for(message)?;
        if message.initial_nonce.is_empty() {
            return Err(AuthError::InvalidNonce);
        }

        self.verify(
            message,
            utils::concat_nonces(&session.session_nonce, &message.initial_nonce)?,
            utils::key_id(&session.session_nonce, &message.initial_nonce),
        )?;

        let requested = self.certificates_to_request();
        let certificates_accepted = !requested.is_empty() && !message.certificates.is_empty();
        if certificates_accepted {
            self.validate_received_certificates(message, &requested)?;
        }
        let authenticated = requested.is_empty() || certificates_accepted;

        let now = utils::now_ms();
        let updated = self
            .session_manager
            .modify_session(&session.session_nonce, &mut |s| {
                s.peer_nonce = message.initial_nonce.clone();
                s.peer_identity_key = Some(message.identity_key);
                s.last_update = now;
                s.is_authenticated |= authenticated;
            })?;
        self.remember_peer(message.identity_key);

        if certificates_accepted {
            self.notify_certificates_received(message)?;
        }

        // Our certificates go out before the waiting caller resumes, so they
        // reach the peer ahead of any general message.
        if !message.requested_certificates.is_empty() {
            self.supply_certificates(message, updated.clone()).await?;
        }

        let fired = self
            .callbacks
            .fire_initial_response(&updated.session_nonce, &message.initial_nonce)?;
        debug!(
            authenticated = updated.is_authenticated,
            waiters = fired,
            "initial response processed"
        );
        Ok(())
    }

    async fn handle_certificate_request(&self, message: &AuthMessage) -> Result<(), AuthError> {
        let session = self.session_for(message)?;

        self.verify(
            message,
            message.requested_certificates.to_canonical_bytes()?,
            utils::key_id(&message.nonce, &session.session_nonce),
        )?;

        let session = self.touch_session(&session.session_nonce)?;

        if !message.requested_certificates.is_empty() {
            self.supply_certificates(message, session).await?;
        }
        Ok(())
    }

    fn handle_certificate_response(&self, message: &AuthMessage) -> Result<(), AuthError> {
        let session = self.session_for(message)?;

        self.verify(
            message,
            certificates_canonical_bytes(&message.certificates)?,
            utils::key_id(&message.nonce, &session.session_nonce),
        )?;

        if message.certificates.is_empty() {
            self.touch_session(&session.session_nonce)?;
            return Ok(());
        }

        self.validate_received_certificates(message, &self.certificates_to_request())?;
        let now = utils::now_ms();
        self.session_manager
            .modify_session(&session.session_nonce, &mut |s| {
                s.last_update = now;
                s.is_authenticated = true;
            })?;

        debug!(
            sender = %message.identity_key,
            count = message.certificates.len(),
            "certificates accepted"
        );
        self.notify_certificates_received(message)
    }

    fn handle_general_message(&self, message: &AuthMessage) -> Result<(), AuthError> {
        let session = self.session_for(message)?;
        if !session.is_authenticated {
            return Err(AuthError::NotAuthenticated);
        }

        self.verify(
            message,
            message.payload.clone(),
            utils::key_id(&message.nonce, &session.session_nonce),
        )?;

        self.touch_session(&session.session_nonce)?;

        for handler in self.callbacks.general_message_handlers() {
            if let Err(e) = handler(&message.identity_key, &message.payload) {
                warn!(sender = %message.identity_key, error = %e, "general message listener failed");
            }
        }
        Ok(())
    }
}
