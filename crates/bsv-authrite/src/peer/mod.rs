//! Peer: mutual authentication, session management, certificate exchange.
//!
//! Outbound calls resolve an authenticated session first, running the
//! initial request/response handshake when there is none. Inbound messages
//! arrive through the transport's data handler and are dispatched by type in
//! [`handlers`].

mod exchange;
mod handlers;

use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::Duration;

use bsv_signer::types::*;
use bsv_signer::{PublicKey, Signature, Signer};
use futures_util::FutureExt;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::callbacks::{CallbackKind, CallbackRegistry};
use crate::certificates::{CertificateProvider, VerifiableCertificate};
use crate::config::PeerConfig;
use crate::error::{AuthError, ResultExt};
use crate::nonce::create_nonce;
use crate::session_manager::{DefaultSessionManager, SessionManager};
use crate::transport::Transport;
use crate::types::*;
use crate::utils;

/// Configuration for creating a new Peer.
pub struct PeerOptions {
    /// Signing capability holding this peer's identity key.
    pub signer: Arc<dyn Signer>,
    /// Transport layer for sending and receiving messages.
    pub transport: Arc<dyn Transport>,
    /// Custom session manager (defaults to in-memory manager).
    pub session_manager: Option<Arc<dyn SessionManager>>,
    /// Source of our certificates when a peer requests them.
    pub certificate_provider: Option<Arc<dyn CertificateProvider>>,
    pub config: PeerConfig,
}

/// Peer capable of mutual authentication.
pub struct Peer {
    signer: Arc<dyn Signer>,
    transport: Arc<dyn Transport>,
    session_manager: Arc<dyn SessionManager>,
    certificate_provider: Option<Arc<dyn CertificateProvider>>,
    callbacks: CallbackRegistry,
    certificates_to_request: RwLock<RequestedCertificateSet>,
    config: PeerConfig,
    last_interacted_peer: RwLock<Option<PublicKey>>,
}

/// Removes the initial-response registration however the handshake wait ends,
/// and the half-open session unless the handshake completed.
struct PendingHandshake<'a> {
    callbacks: &'a CallbackRegistry,
    id: i32,
    session_manager: &'a dyn SessionManager,
    session: Option<PeerSession>,
}

impl PendingHandshake<'_> {
    fn complete(&mut self) {
        self.session = None;
    }
}

impl Drop for PendingHandshake<'_> {
    fn drop(&mut self) {
        self.callbacks.unregister(CallbackKind::InitialResponse, self.id);
        if let Some(session) = self.session.take() {
            self.session_manager.remove_session(&session);
        }
    }
}

fn auth_args(key_id: String, counterparty: PublicKey) -> EncryptionArgs {
    EncryptionArgs {
        protocol_id: Protocol::new(SECURITY_LEVEL_EVERY_APP_AND_COUNTERPARTY, AUTH_PROTOCOL_ID),
        key_id,
        counterparty: Counterparty::Other(counterparty),
    }
}

impl Peer {
    /// Create a new Peer and register it as the transport's data handler.
    pub fn new(options: PeerOptions) -> Result<Arc<Self>, AuthError> {
        let session_manager = options
            .session_manager
            .unwrap_or_else(|| Arc::new(DefaultSessionManager::new()));

        let peer = Arc::new(Peer {
            signer: options.signer,
            transport: options.transport,
            session_manager,
            certificate_provider: options.certificate_provider,
            callbacks: CallbackRegistry::new(),
            certificates_to_request: RwLock::new(options.config.certificates_to_request.clone()),
            config: options.config,
            last_interacted_peer: RwLock::new(None),
        });

        // The transport holds the peer weakly so dropping the peer ends dispatch.
        let weak: Weak<Peer> = Arc::downgrade(&peer);
        peer.transport.on_data(Arc::new(move |message| {
            let weak = Weak::clone(&weak);
            async move {
                let peer = weak
                    .upgrade()
                    .ok_or_else(|| AuthError::General("peer has been dropped".into()))?;
                let message_type = message.message_type;
                let sender = message.identity_key;
                let result = peer.handle_incoming_message(message).await;
                if let Err(e) = &result {
                    warn!(%message_type, %sender, error = %e, "rejected auth message");
                }
                result
            }
            .boxed()
        }))?;

        Ok(peer)
    }

    fn identity_key(&self) -> Result<PublicKey, AuthError> {
        Ok(self.signer.identity_key()?)
    }

    /// The certificates currently required from every peer.
    pub fn certificates_to_request(&self) -> RequestedCertificateSet {
        self.certificates_to_request
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Change the certificates required from peers in future handshakes.
    pub fn set_certificates_to_request(&self, requested: RequestedCertificateSet) {
        *self
            .certificates_to_request
            .write()
            .unwrap_or_else(PoisonError::into_inner) = requested;
    }

    /// The peer we most recently exchanged a message with, if remembered.
    pub fn last_interacted_peer(&self) -> Option<PublicKey> {
        *self
            .last_interacted_peer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn session_manager(&self) -> &Arc<dyn SessionManager> {
        &self.session_manager
    }

    /// Handshakes currently waiting for an initial response.
    pub fn pending_handshakes(&self) -> usize {
        self.callbacks.len(CallbackKind::InitialResponse)
    }

    fn remember_peer(&self, key: PublicKey) {
        if self.config.auto_persist_last_session {
            *self
                .last_interacted_peer
                .write()
                .unwrap_or_else(PoisonError::into_inner) = Some(key);
        }
    }

    fn persisted_peer(&self) -> Option<PublicKey> {
        if self.config.auto_persist_last_session {
            self.last_interacted_peer()
        } else {
            None
        }
    }

    /// Bump the stored session's `last_update` and remember its peer.
    fn touch_session(&self, session_nonce: &str) -> Result<PeerSession, AuthError> {
        let now = utils::now_ms();
        let session = self
            .session_manager
            .modify_session(session_nonce, &mut |s| s.last_update = now)?;
        if let Some(key) = session.peer_identity_key {
            self.remember_peer(key);
        }
        Ok(session)
    }

    fn evict_idle_sessions(&self) {
        if let Some(idle) = self.config.session_idle_timeout() {
            let idle_ms = i64::try_from(idle.as_millis()).unwrap_or(i64::MAX);
            self.session_manager
                .evict_idle(utils::now_ms().saturating_sub(idle_ms));
        }
    }

    fn sign(
        &self,
        data: Vec<u8>,
        key_id: String,
        counterparty: PublicKey,
    ) -> Result<Vec<u8>, AuthError> {
        let signature = self.signer.create_signature(CreateSignatureArgs {
            encryption_args: auth_args(key_id, counterparty),
            data,
        })?;
        Ok(signature.to_der().as_bytes().to_vec())
    }

    /// Verify `message.signature` over `data` as signed by the message sender.
    fn verify(&self, message: &AuthMessage, data: Vec<u8>, key_id: String) -> Result<(), AuthError> {
        if message.signature.is_empty() {
            return Err(AuthError::InvalidMessage);
        }
        let signature =
            Signature::from_der(&message.signature).map_err(|_| AuthError::InvalidSignature)?;

        let valid = self.signer.verify_signature(VerifySignatureArgs {
            encryption_args: auth_args(key_id, message.identity_key),
            data,
            signature,
            for_self: false,
        })?;
        if !valid {
            return Err(AuthError::InvalidSignature);
        }
        Ok(())
    }

    // === Callback registration ===

    /// Register a callback for authenticated general messages. Returns a listener ID.
    pub fn listen_for_general_messages<F>(&self, callback: F) -> i32
    where
        F: Fn(&PublicKey, &[u8]) -> Result<(), AuthError> + Send + Sync + 'static,
    {
        self.callbacks.register_general_message(Arc::new(callback))
    }

    pub fn stop_listening_for_general_messages(&self, id: i32) {
        self.callbacks.unregister(CallbackKind::GeneralMessage, id);
    }

    /// Register a callback for validated certificates received from peers.
    pub fn listen_for_certificates_received<F>(&self, callback: F) -> i32
    where
        F: Fn(&PublicKey, &[VerifiableCertificate]) -> Result<(), AuthError>
            + Send
            + Sync
            + 'static,
    {
        self.callbacks.register_certificate_received(Arc::new(callback))
    }

    pub fn stop_listening_for_certificates_received(&self, id: i32) {
        self.callbacks.unregister(CallbackKind::CertificateReceived, id);
    }

    /// Register a callback for certificate requests from peers.
    ///
    /// While any such callback is registered, the peer no longer answers
    /// requests itself; the application is expected to reply with
    /// [`Peer::send_certificate_response`].
    pub fn listen_for_certificates_requested<F>(&self, callback: F) -> i32
    where
        F: Fn(&PublicKey, &RequestedCertificateSet) -> Result<(), AuthError>
            + Send
            + Sync
            + 'static,
    {
        self.callbacks.register_certificate_requested(Arc::new(callback))
    }

    pub fn stop_listening_for_certificates_requested(&self, id: i32) {
        self.callbacks.unregister(CallbackKind::CertificateRequested, id);
    }

    // === Core protocol ===

    /// Send a general message to a peer, authenticating first if needed.
    ///
    /// With no `identity_key`, the last peer we interacted with is used when
    /// `auto_persist_last_session` is on; otherwise a handshake is started
    /// with whoever is on the other end of the transport. `max_wait` bounds
    /// the handshake and defaults to the configured handshake timeout.
    pub async fn to_peer(
        &self,
        payload: &[u8],
        identity_key: Option<&PublicKey>,
        max_wait: Option<Duration>,
    ) -> Result<(), AuthError> {
        self.evict_idle_sessions();

        let identity_key = identity_key.copied().or_else(|| self.persisted_peer());
        let session = self
            .get_authenticated_session(identity_key.as_ref(), max_wait)
            .await
            .wrap_err("failed to get authenticated session")?;
        let peer_key = session
            .peer_identity_key
            .ok_or_else(|| AuthError::InvalidSession("peer identity key is unknown".into()))?;

        let request_nonce = utils::random_base64(32);
        let mut message = AuthMessage::new(MessageType::General, self.identity_key()?);
        message.nonce = request_nonce.clone();
        message.your_nonce = session.peer_nonce.clone();
        message.payload = payload.to_vec();
        message.signature = self
            .sign(
                payload.to_vec(),
                utils::key_id(&request_nonce, &session.peer_nonce),
                peer_key,
            )
            .wrap_err("failed to sign general message")?;

        self.touch_session(&session.session_nonce)?;
        self.transport.send(&message).await
    }

    /// Get an authenticated session with a peer, running the handshake when
    /// none exists.
    ///
    /// The returned session may still be unauthenticated if we require
    /// certificates the peer has not yet sent.
    pub async fn get_authenticated_session(
        &self,
        identity_key: Option<&PublicKey>,
        max_wait: Option<Duration>,
    ) -> Result<PeerSession, AuthError> {
        if let Some(key) = identity_key {
            if let Ok(session) = self.session_manager.get_session(&key.to_hex()) {
                if session.is_authenticated {
                    self.remember_peer(*key);
                    return Ok(session);
                }
            }
        }

        let max_wait = max_wait.unwrap_or_else(|| self.config.handshake_timeout());
        self.initiate_handshake(identity_key, max_wait).await
    }

    async fn initiate_handshake(
        &self,
        peer_identity_key: Option<&PublicKey>,
        max_wait: Duration,
    ) -> Result<PeerSession, AuthError> {
        let session_nonce = create_nonce(self.signer.as_ref(), Counterparty::Self_)?;
        let mut request = AuthMessage::new(MessageType::InitialRequest, self.identity_key()?);
        request.initial_nonce = session_nonce.clone();
        request.requested_certificates = self.certificates_to_request();

        let session = PeerSession::new(session_nonce.clone(), peer_identity_key.copied());
        self.session_manager.add_session(session.clone())?;

        // Registered before sending so an inline transport cannot deliver the
        // response ahead of the waiter.
        let (tx, rx) = oneshot::channel::<String>();
        let id = self.callbacks.register_initial_response(
            &session_nonce,
            Box::new(move |peer_nonce| {
                if tx.send(peer_nonce.to_string()).is_err() {
                    debug!("handshake waiter already gone");
                }
                Ok(())
            }),
        );
        let mut pending = PendingHandshake {
            callbacks: &self.callbacks,
            id,
            session_manager: self.session_manager.as_ref(),
            session: Some(session),
        };

        debug!(
            peer = ?peer_identity_key.map(|k| k.to_hex()),
            "sending initial request"
        );
        self.transport
            .send(&request)
            .await
            .wrap_err("failed to send initial request")?;

        match tokio::time::timeout(max_wait, rx).await {
            Ok(Ok(_)) => {
                let session = self.session_manager.get_session(&session_nonce)?;
                pending.complete();
                debug!(
                    authenticated = session.is_authenticated,
                    "handshake completed"
                );
                Ok(session)
            }
            Ok(Err(_)) => Err(AuthError::AuthFailed),
            Err(_) => {
                debug!(?max_wait, "handshake timed out");
                Err(AuthError::Timeout)
            }
        }
    }
}
