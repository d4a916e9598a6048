//! BRC-31 (Authrite) mutual authentication.
//!
//! A [`Peer`] establishes authenticated sessions with other peers over any
//! [`Transport`], exchanges identity certificates on demand, and signs every
//! message it sends under keys derived from the two session nonces.

pub mod callbacks;
pub mod certificates;
pub mod config;
pub mod error;
pub mod nonce;
pub mod peer;
pub mod session_manager;
pub mod transport;
pub mod types;
pub mod utils;

pub use certificates::{CertificateProvider, StaticCertificateProvider, VerifiableCertificate};
pub use config::PeerConfig;
pub use error::AuthError;
pub use peer::{Peer, PeerOptions};
pub use session_manager::{DefaultSessionManager, SessionManager};
pub use transport::{OnDataCallback, Transport};
pub use types::*;
