//! Shared test fixtures: in-process transports and peer construction.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bsv_authrite::{
    AuthError, AuthMessage, CertificateProvider, OnDataCallback, Peer, PeerConfig, PeerOptions,
    Transport,
};
use bsv_signer::{PrivateKey, ProtoSigner};

type Tamper = Box<dyn Fn(&mut AuthMessage) + Send + Sync>;

/// A mock transport that pairs two peers together. Delivery is inline: the
/// sender's `send` resolves once the receiver has processed the message and
/// returns the receiver's error, if any.
pub struct MockTransport {
    name: String,
    handler: Mutex<Option<OnDataCallback>>,
    paired: Mutex<Option<Arc<MockTransport>>>,
    sent: Mutex<Vec<AuthMessage>>,
    tamper: Mutex<Option<Tamper>>,
}

impl MockTransport {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            handler: Mutex::new(None),
            paired: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
            tamper: Mutex::new(None),
        })
    }

    pub fn pair(a: &Arc<MockTransport>, b: &Arc<MockTransport>) {
        *a.paired.lock().unwrap() = Some(Arc::clone(b));
        *b.paired.lock().unwrap() = Some(Arc::clone(a));
    }

    /// Rewrite every outgoing message before delivery.
    pub fn set_tamper(&self, tamper: impl Fn(&mut AuthMessage) + Send + Sync + 'static) {
        *self.tamper.lock().unwrap() = Some(Box::new(tamper));
    }

    pub fn clear_tamper(&self) {
        *self.tamper.lock().unwrap() = None;
    }

    /// Messages sent so far, after tampering.
    pub fn sent(&self) -> Vec<AuthMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, message: &AuthMessage) -> Result<(), AuthError> {
        let mut message = message.clone();
        if let Some(tamper) = self.tamper.lock().unwrap().as_ref() {
            tamper(&mut message);
        }
        self.sent.lock().unwrap().push(message.clone());

        let paired = self
            .paired
            .lock()
            .unwrap()
            .clone()
            .ok_or(AuthError::TransportNotConnected)?;
        let handler = paired
            .handler
            .lock()
            .unwrap()
            .clone()
            .ok_or(AuthError::TransportNotConnected)?;

        handler(message).await
    }

    fn on_data(&self, callback: OnDataCallback) -> Result<(), AuthError> {
        *self.handler.lock().unwrap() = Some(callback);
        Ok(())
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport").field("name", &self.name).finish()
    }
}

/// A transport whose peer never answers.
#[derive(Default)]
pub struct SilentTransport {
    sent: Mutex<Vec<AuthMessage>>,
}

#[async_trait]
impl Transport for SilentTransport {
    async fn send(&self, message: &AuthMessage) -> Result<(), AuthError> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }

    fn on_data(&self, _callback: OnDataCallback) -> Result<(), AuthError> {
        Ok(())
    }
}

/// Route engine logs to the test output; `RUST_LOG=debug` shows the handshake.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn alice_key() -> PrivateKey {
    PrivateKey::from_hex("143ab18a84d3b25e1a13cefa90038411e5d2014590a2a4a57263d1593c8dee1c")
        .unwrap()
}

pub fn bob_key() -> PrivateKey {
    PrivateKey::from_hex("0881208859876fc227d71bfb8b91814462c5164b6fee27e614798f6e85d2547d")
        .unwrap()
}

pub fn make_peer(
    key: &PrivateKey,
    transport: Arc<dyn Transport>,
    config: PeerConfig,
    certificate_provider: Option<Arc<dyn CertificateProvider>>,
) -> Arc<Peer> {
    Peer::new(PeerOptions {
        signer: Arc::new(ProtoSigner::new(key.clone())),
        transport,
        session_manager: None,
        certificate_provider,
        config,
    })
    .unwrap()
}

/// Alice and Bob on paired mock transports with default configuration.
pub fn paired_peers() -> (Arc<Peer>, Arc<MockTransport>, Arc<Peer>, Arc<MockTransport>) {
    paired_peers_with(PeerConfig::default(), None, PeerConfig::default(), None)
}

pub fn paired_peers_with(
    alice_config: PeerConfig,
    alice_provider: Option<Arc<dyn CertificateProvider>>,
    bob_config: PeerConfig,
    bob_provider: Option<Arc<dyn CertificateProvider>>,
) -> (Arc<Peer>, Arc<MockTransport>, Arc<Peer>, Arc<MockTransport>) {
    init_tracing();
    let alice_transport = MockTransport::new("Alice");
    let bob_transport = MockTransport::new("Bob");
    MockTransport::pair(&alice_transport, &bob_transport);

    let alice = make_peer(
        &alice_key(),
        alice_transport.clone(),
        alice_config,
        alice_provider,
    );
    let bob = make_peer(&bob_key(), bob_transport.clone(), bob_config, bob_provider);
    (alice, alice_transport, bob, bob_transport)
}
