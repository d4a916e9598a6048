//! Peer configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::RequestedCertificateSet;

/// Default wait for a handshake response.
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 10_000;

/// Tunables for a [`Peer`](crate::Peer).
///
/// Deserializable from any serde source; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PeerConfig {
    /// Reuse the last peer we talked to when a call names no identity key.
    pub auto_persist_last_session: bool,
    /// Handshake wait used when a call passes no explicit timeout.
    pub handshake_timeout_ms: u64,
    /// Evict sessions idle for longer than this. `None` keeps sessions for
    /// the life of the process.
    pub session_idle_timeout_ms: Option<u64>,
    /// Certificates every peer must present before its session is authenticated.
    pub certificates_to_request: RequestedCertificateSet,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            auto_persist_last_session: true,
            handshake_timeout_ms: DEFAULT_HANDSHAKE_TIMEOUT_MS,
            session_idle_timeout_ms: None,
            certificates_to_request: RequestedCertificateSet::default(),
        }
    }
}

impl PeerConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn session_idle_timeout(&self) -> Option<Duration> {
        self.session_idle_timeout_ms.map(Duration::from_millis)
    }
}
