//! Session manager: tracks peer sessions, allowing multiple concurrent
//! sessions per identity key (one per device).
//!
//! Sessions are keyed by session nonce in a concurrent map. A second,
//! mutex-guarded index maps identity keys (hex) to the set of session nonces
//! they own. Records are replaced whole or changed in place under the map's
//! entry lock, so readers never observe a partially updated session.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use tracing::debug;

use crate::error::AuthError;
use crate::types::PeerSession;

/// Storage for peer sessions.
pub trait SessionManager: Send + Sync {
    /// Insert or overwrite a session by its nonce.
    fn add_session(&self, session: PeerSession) -> Result<(), AuthError>;
    /// Replace a session, re-indexing it under its current identity key.
    fn update_session(&self, session: PeerSession) -> Result<(), AuthError>;
    /// Change the stored session for `nonce` in place and return the result.
    ///
    /// `apply` runs against the current record, so fields written by a
    /// concurrent update are kept. The session nonce cannot be changed.
    fn modify_session(
        &self,
        nonce: &str,
        apply: &mut dyn FnMut(&mut PeerSession),
    ) -> Result<PeerSession, AuthError>;
    /// Look up by session nonce, or else by identity key (best session).
    fn get_session(&self, identifier: &str) -> Result<PeerSession, AuthError>;
    /// Remove a session and prune the identity index.
    fn remove_session(&self, session: &PeerSession);
    /// Whether `get_session(identifier)` would find anything.
    fn has_session(&self, identifier: &str) -> bool;
    /// Remove sessions not touched since `older_than_ms`; returns how many.
    fn evict_idle(&self, older_than_ms: i64) -> usize;
}

/// Default in-memory session manager.
#[derive(Default)]
pub struct DefaultSessionManager {
    /// session_nonce -> PeerSession
    sessions: DashMap<String, PeerSession>,
    /// identity_key_hex -> session nonces
    identity_index: Mutex<HashMap<String, HashSet<String>>>,
}

impl DefaultSessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn index(&self) -> MutexGuard<'_, HashMap<String, HashSet<String>>> {
        self.identity_index
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn index_insert(&self, identity_hex: String, nonce: &str) {
        self.index()
            .entry(identity_hex)
            .or_default()
            .insert(nonce.to_string());
    }

    fn reindex(&self, nonce: &str, old_identity: Option<String>, new_identity: Option<String>) {
        if old_identity == new_identity {
            return;
        }
        if let Some(old) = old_identity {
            self.index_remove(&old, nonce);
        }
        if let Some(new) = new_identity {
            self.index_insert(new, nonce);
        }
    }

    fn index_remove(&self, identity_hex: &str, nonce: &str) {
        let mut index = self.index();
        if let Some(nonces) = index.get_mut(identity_hex) {
            nonces.remove(nonce);
            if nonces.is_empty() {
                index.remove(identity_hex);
            }
        }
    }

    fn best_for_identity(&self, identity_hex: &str) -> Option<PeerSession> {
        let nonces: Vec<String> = self.index().get(identity_hex)?.iter().cloned().collect();

        let mut best: Option<PeerSession> = None;
        for nonce in &nonces {
            let Some(candidate) = self.sessions.get(nonce).map(|s| s.clone()) else {
                continue;
            };
            best = match best {
                None => Some(candidate),
                Some(current) if is_better(&candidate, &current) => Some(candidate),
                keep => keep,
            };
        }
        best
    }
}

/// Whether `candidate` should replace `current` as the best session for an
/// identity. Newer wins unless it would trade an authenticated session for an
/// unauthenticated one; an authenticated session always beats an
/// unauthenticated one.
fn is_better(candidate: &PeerSession, current: &PeerSession) -> bool {
    if candidate.last_update > current.last_update {
        candidate.is_authenticated || !current.is_authenticated
    } else {
        candidate.is_authenticated && !current.is_authenticated
    }
}

impl SessionManager for DefaultSessionManager {
    fn add_session(&self, session: PeerSession) -> Result<(), AuthError> {
        if session.session_nonce.is_empty() {
            return Err(AuthError::InvalidSession("session_nonce is required".into()));
        }

        let nonce = session.session_nonce.clone();
        let identity = session.peer_identity_key.map(|k| k.to_hex());
        self.sessions.insert(nonce.clone(), session);

        if let Some(identity) = identity {
            self.index_insert(identity, &nonce);
        }
        Ok(())
    }

    fn update_session(&self, session: PeerSession) -> Result<(), AuthError> {
        if session.session_nonce.is_empty() {
            return Err(AuthError::InvalidSession("session_nonce is required".into()));
        }

        let nonce = session.session_nonce.clone();
        let new_identity = session.peer_identity_key.map(|k| k.to_hex());
        let previous = self.sessions.insert(nonce.clone(), session);

        let old_identity = previous.and_then(|s| s.peer_identity_key).map(|k| k.to_hex());
        self.reindex(&nonce, old_identity, new_identity);
        Ok(())
    }

    fn modify_session(
        &self,
        nonce: &str,
        apply: &mut dyn FnMut(&mut PeerSession),
    ) -> Result<PeerSession, AuthError> {
        let mut entry = self.sessions.get_mut(nonce).ok_or(AuthError::SessionNotFound)?;
        let old_identity = entry.peer_identity_key.map(|k| k.to_hex());
        apply(entry.value_mut());
        entry.session_nonce = nonce.to_string();

        let updated = entry.value().clone();
        // Lock order is shard, then index; nothing holds the index while reading shards.
        self.reindex(nonce, old_identity, updated.peer_identity_key.map(|k| k.to_hex()));
        Ok(updated)
    }

    fn get_session(&self, identifier: &str) -> Result<PeerSession, AuthError> {
        if let Some(session) = self.sessions.get(identifier) {
            return Ok(session.clone());
        }

        self.best_for_identity(identifier)
            .ok_or(AuthError::SessionNotFound)
    }

    fn remove_session(&self, session: &PeerSession) {
        if session.session_nonce.is_empty() {
            return;
        }
        let nonce = &session.session_nonce;

        // The stored record may carry an identity the caller's copy lacks.
        let stored = self.sessions.remove(nonce).map(|(_, stored)| stored);
        let identities = stored
            .and_then(|s| s.peer_identity_key)
            .into_iter()
            .chain(session.peer_identity_key);
        for identity in identities {
            self.index_remove(&identity.to_hex(), nonce);
        }
    }

    fn has_session(&self, identifier: &str) -> bool {
        if self.sessions.contains_key(identifier) {
            return true;
        }
        self.index()
            .get(identifier)
            .is_some_and(|nonces| !nonces.is_empty())
    }

    fn evict_idle(&self, older_than_ms: i64) -> usize {
        let stale: Vec<PeerSession> = self
            .sessions
            .iter()
            .filter(|entry| entry.last_update < older_than_ms)
            .map(|entry| entry.value().clone())
            .collect();

        for session in &stale {
            self.remove_session(session);
        }
        if !stale.is_empty() {
            debug!(evicted = stale.len(), "evicted idle sessions");
        }
        stale.len()
    }
}
