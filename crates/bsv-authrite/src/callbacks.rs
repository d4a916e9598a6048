//! Subscriber registry for peer events.
//!
//! Three public event classes (general message received, certificates
//! received, certificates requested) plus the internal one-shot
//! initial-response correlation used while a handshake is in flight. IDs come
//! from one per-registry counter and are never reused.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use bsv_signer::PublicKey;

use crate::certificates::VerifiableCertificate;
use crate::error::AuthError;
use crate::types::RequestedCertificateSet;

/// Callback invoked for each authenticated general message.
pub type OnGeneralMessageCallback =
    Arc<dyn Fn(&PublicKey, &[u8]) -> Result<(), AuthError> + Send + Sync>;
/// Callback invoked when a peer's certificates have been validated.
pub type OnCertificateReceivedCallback =
    Arc<dyn Fn(&PublicKey, &[VerifiableCertificate]) -> Result<(), AuthError> + Send + Sync>;
/// Callback invoked when a peer requests certificates from us.
pub type OnCertificateRequestCallback =
    Arc<dyn Fn(&PublicKey, &RequestedCertificateSet) -> Result<(), AuthError> + Send + Sync>;
/// One-shot callback fired with the peer's nonce when an initial response
/// for the registered session nonce has been processed.
pub type InitialResponseCallback = Box<dyn FnOnce(&str) -> Result<(), AuthError> + Send>;

/// The event classes held by a [`CallbackRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackKind {
    GeneralMessage,
    CertificateReceived,
    CertificateRequested,
    InitialResponse,
}

struct PendingInitialResponse {
    session_nonce: String,
    callback: InitialResponseCallback,
}

/// Thread-safe registry of event subscribers.
#[derive(Default)]
pub struct CallbackRegistry {
    counter: AtomicI32,
    general_message: RwLock<HashMap<i32, OnGeneralMessageCallback>>,
    certificate_received: RwLock<HashMap<i32, OnCertificateReceivedCallback>>,
    certificate_requested: RwLock<HashMap<i32, OnCertificateRequestCallback>>,
    initial_response: Mutex<HashMap<i32, PendingInitialResponse>>,
}

fn insert<T>(map: &RwLock<HashMap<i32, T>>, id: i32, value: T) {
    map.write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(id, value);
}

fn snapshot<T: Clone>(map: &RwLock<HashMap<i32, T>>) -> Vec<T> {
    map.read()
        .unwrap_or_else(PoisonError::into_inner)
        .values()
        .cloned()
        .collect()
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> i32 {
        self.counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn register_general_message(&self, callback: OnGeneralMessageCallback) -> i32 {
        let id = self.next_id();
        insert(&self.general_message, id, callback);
        id
    }

    pub fn register_certificate_received(&self, callback: OnCertificateReceivedCallback) -> i32 {
        let id = self.next_id();
        insert(&self.certificate_received, id, callback);
        id
    }

    pub fn register_certificate_requested(&self, callback: OnCertificateRequestCallback) -> i32 {
        let id = self.next_id();
        insert(&self.certificate_requested, id, callback);
        id
    }

    /// Register a one-shot callback for the initial response to `session_nonce`.
    pub fn register_initial_response(
        &self,
        session_nonce: &str,
        callback: InitialResponseCallback,
    ) -> i32 {
        let id = self.next_id();
        self.initial_response
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id,
                PendingInitialResponse {
                    session_nonce: session_nonce.to_string(),
                    callback,
                },
            );
        id
    }

    /// Remove a registration. Unknown IDs are ignored.
    pub fn unregister(&self, kind: CallbackKind, id: i32) {
        match kind {
            CallbackKind::GeneralMessage => self.remove_from(&self.general_message, id),
            CallbackKind::CertificateReceived => self.remove_from(&self.certificate_received, id),
            CallbackKind::CertificateRequested => {
                self.remove_from(&self.certificate_requested, id)
            }
            CallbackKind::InitialResponse => {
                self.initial_response
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&id);
            }
        }
    }

    fn remove_from<T>(&self, map: &RwLock<HashMap<i32, T>>, id: i32) {
        map.write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    /// Number of registrations of one kind.
    pub fn len(&self, kind: CallbackKind) -> usize {
        match kind {
            CallbackKind::GeneralMessage => self.general_message.read().map_or(0, |m| m.len()),
            CallbackKind::CertificateReceived => {
                self.certificate_received.read().map_or(0, |m| m.len())
            }
            CallbackKind::CertificateRequested => {
                self.certificate_requested.read().map_or(0, |m| m.len())
            }
            CallbackKind::InitialResponse => self
                .initial_response
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
        }
    }

    /// Copies of the current general-message handlers.
    pub fn general_message_handlers(&self) -> Vec<OnGeneralMessageCallback> {
        snapshot(&self.general_message)
    }

    /// Copies of the current certificate-received handlers.
    pub fn certificate_received_handlers(&self) -> Vec<OnCertificateReceivedCallback> {
        snapshot(&self.certificate_received)
    }

    /// Copies of the current certificate-requested handlers.
    pub fn certificate_requested_handlers(&self) -> Vec<OnCertificateRequestCallback> {
        snapshot(&self.certificate_requested)
    }

    /// Fire and remove every initial-response registration for `session_nonce`.
    ///
    /// Callbacks run after the lock is released. Every matching callback is
    /// invoked; the first error is returned.
    pub fn fire_initial_response(
        &self,
        session_nonce: &str,
        peer_nonce: &str,
    ) -> Result<usize, AuthError> {
        let matched: Vec<InitialResponseCallback> = {
            let mut pending = self
                .initial_response
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let ids: Vec<i32> = pending
                .iter()
                .filter(|(_, p)| p.session_nonce == session_nonce)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| pending.remove(&id))
                .map(|p| p.callback)
                .collect()
        };

        let fired = matched.len();
        let mut first_error = None;
        for callback in matched {
            if let Err(e) = callback(peer_nonce) {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(fired),
        }
    }
}
