//! Tests for Peer authentication and message exchange.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bsv_authrite::session_manager::SessionManager;
use bsv_authrite::utils::{concat_nonces, key_id};
use bsv_authrite::{AuthError, AuthMessage, MessageType, PeerConfig, AUTH_PROTOCOL_ID};
use bsv_signer::types::*;
use bsv_signer::{ProtoSigner, Signature, Signer};
use common::*;

#[tokio::test]
async fn test_peer_authentication_and_message_exchange() {
    let (alice, _, bob, _) = paired_peers();

    let received = Arc::new(Mutex::new(Vec::new()));
    let received_clone = Arc::clone(&received);
    bob.listen_for_general_messages(move |sender, payload| {
        received_clone
            .lock()
            .unwrap()
            .push((*sender, payload.to_vec()));
        Ok(())
    });

    let bob_identity = bob_key().pub_key();
    alice
        .to_peer(b"Hello Bob!", Some(&bob_identity), None)
        .await
        .unwrap();

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].0, alice_key().pub_key());
    assert_eq!(received[0].1, b"Hello Bob!");
}

#[tokio::test]
async fn test_handshake_authenticates_both_sides() {
    let (alice, _, bob, _) = paired_peers();
    let alice_identity = alice_key().pub_key();
    let bob_identity = bob_key().pub_key();

    let session = alice
        .get_authenticated_session(Some(&bob_identity), None)
        .await
        .unwrap();
    assert!(session.is_authenticated);
    assert_eq!(session.peer_identity_key, Some(bob_identity));

    let alice_view = alice
        .session_manager()
        .get_session(&bob_identity.to_hex())
        .unwrap();
    let bob_view = bob
        .session_manager()
        .get_session(&alice_identity.to_hex())
        .unwrap();
    assert!(alice_view.is_authenticated);
    assert!(bob_view.is_authenticated);
    assert_eq!(bob_view.peer_identity_key, Some(alice_identity));

    // Each side's peer nonce is the other side's session nonce.
    assert_eq!(alice_view.peer_nonce, bob_view.session_nonce);
    assert_eq!(bob_view.peer_nonce, alice_view.session_nonce);
    assert_eq!(alice.pending_handshakes(), 0);
}

#[tokio::test]
async fn test_peer_bidirectional_communication() {
    let (alice, _, bob, _) = paired_peers();

    let bob_received = Arc::new(Mutex::new(Vec::new()));
    let bob_clone = Arc::clone(&bob_received);
    bob.listen_for_general_messages(move |_, payload| {
        bob_clone.lock().unwrap().push(payload.to_vec());
        Ok(())
    });

    let alice_received = Arc::new(Mutex::new(Vec::new()));
    let alice_clone = Arc::clone(&alice_received);
    alice.listen_for_general_messages(move |_, payload| {
        alice_clone.lock().unwrap().push(payload.to_vec());
        Ok(())
    });

    let bob_identity = bob_key().pub_key();
    alice
        .to_peer(b"ping", Some(&bob_identity), None)
        .await
        .unwrap();

    // Bob answers without naming Alice: the last interacted peer is used and
    // the session from Alice's handshake is reused.
    bob.to_peer(b"pong", None, None).await.unwrap();
    alice.to_peer(b"again", None, None).await.unwrap();

    assert_eq!(*bob_received.lock().unwrap(), vec![b"ping".to_vec(), b"again".to_vec()]);
    assert_eq!(*alice_received.lock().unwrap(), vec![b"pong".to_vec()]);
    assert_eq!(bob.last_interacted_peer(), Some(alice_key().pub_key()));
}

#[tokio::test]
async fn test_stop_listening_for_general_messages() {
    let (alice, _, bob, _) = paired_peers();
    let count = Arc::new(Mutex::new(0));
    let count_clone = Arc::clone(&count);
    let id = bob.listen_for_general_messages(move |_, _| {
        *count_clone.lock().unwrap() += 1;
        Ok(())
    });

    let bob_identity = bob_key().pub_key();
    alice.to_peer(b"one", Some(&bob_identity), None).await.unwrap();
    bob.stop_listening_for_general_messages(id);
    bob.stop_listening_for_general_messages(id);
    alice.to_peer(b"two", Some(&bob_identity), None).await.unwrap();

    assert_eq!(*count.lock().unwrap(), 1);
}

#[tokio::test]
async fn test_general_listener_error_does_not_fail_delivery() {
    let (alice, _, bob, _) = paired_peers();
    let delivered = Arc::new(Mutex::new(false));
    let delivered_clone = Arc::clone(&delivered);

    bob.listen_for_general_messages(|_, _| Err(AuthError::General("listener broke".into())));
    bob.listen_for_general_messages(move |_, _| {
        *delivered_clone.lock().unwrap() = true;
        Ok(())
    });

    let bob_identity = bob_key().pub_key();
    alice
        .to_peer(b"hello", Some(&bob_identity), None)
        .await
        .unwrap();
    assert!(*delivered.lock().unwrap());
}

#[tokio::test]
async fn test_general_message_before_authentication_is_rejected() {
    // Bob requires a certificate Alice cannot provide, so his session with
    // Alice never becomes authenticated.
    let certifier = ProtoSigner::random();
    let mut bob_config = PeerConfig::default();
    bob_config.certificates_to_request.certifiers = vec![certifier.identity_key().unwrap()];
    bob_config
        .certificates_to_request
        .certificate_types
        .insert(base64_type(1), vec!["name".into()]);

    let (alice, _, bob, _) = paired_peers_with(PeerConfig::default(), None, bob_config, None);

    let received = Arc::new(Mutex::new(0));
    let received_clone = Arc::clone(&received);
    bob.listen_for_general_messages(move |_, _| {
        *received_clone.lock().unwrap() += 1;
        Ok(())
    });

    let bob_identity = bob_key().pub_key();
    let err = alice
        .to_peer(b"too early", Some(&bob_identity), None)
        .await
        .unwrap_err();
    assert!(matches!(err.root_cause(), AuthError::NotAuthenticated), "got {err}");
    assert_eq!(*received.lock().unwrap(), 0);

    let bob_view = bob
        .session_manager()
        .get_session(&alice_key().pub_key().to_hex())
        .unwrap();
    assert!(!bob_view.is_authenticated);
}

#[tokio::test]
async fn test_tampered_payload_is_rejected() {
    let (alice, alice_transport, bob, _) = paired_peers();
    let received = Arc::new(Mutex::new(0));
    let received_clone = Arc::clone(&received);
    bob.listen_for_general_messages(move |_, _| {
        *received_clone.lock().unwrap() += 1;
        Ok(())
    });

    let bob_identity = bob_key().pub_key();
    alice.to_peer(b"first", Some(&bob_identity), None).await.unwrap();

    alice_transport.set_tamper(|message| {
        if message.message_type == MessageType::General {
            message.payload[0] ^= 0x01;
        }
    });
    let err = alice
        .to_peer(b"second", Some(&bob_identity), None)
        .await
        .unwrap_err();
    assert!(matches!(err.root_cause(), AuthError::InvalidSignature), "got {err}");
    assert_eq!(*received.lock().unwrap(), 1);
}

#[tokio::test]
async fn test_version_mismatch_is_rejected() {
    let (alice, alice_transport, _bob, _) = paired_peers();
    alice_transport.set_tamper(|message| message.version = "0.2".into());

    let bob_identity = bob_key().pub_key();
    let err = alice
        .to_peer(b"hi", Some(&bob_identity), None)
        .await
        .unwrap_err();
    match err.root_cause() {
        AuthError::VersionMismatch { got, expected } => {
            assert_eq!(got, "0.2");
            assert_eq!(expected, "0.1");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_forged_your_nonce_is_rejected() {
    let (alice, alice_transport, _bob, _) = paired_peers();
    let bob_identity = bob_key().pub_key();
    alice.to_peer(b"first", Some(&bob_identity), None).await.unwrap();

    // A nonce Bob never issued.
    let forged = bsv_authrite::nonce::create_nonce(
        &ProtoSigner::new(alice_key()),
        Counterparty::Self_,
    )
    .unwrap();
    alice_transport.set_tamper(move |message| message.your_nonce = forged.clone());

    let err = alice
        .to_peer(b"second", Some(&bob_identity), None)
        .await
        .unwrap_err();
    assert!(matches!(err.root_cause(), AuthError::InvalidNonce), "got {err}");
}

#[tokio::test(start_paused = true)]
async fn test_handshake_times_out_and_cleans_up() {
    let transport = Arc::new(SilentTransport::default());
    let alice = make_peer(&alice_key(), transport, PeerConfig::default(), None);
    let bob_identity = bob_key().pub_key();

    let before = alice.pending_handshakes();
    let start = tokio::time::Instant::now();
    let err = alice
        .to_peer(b"hi", Some(&bob_identity), Some(Duration::from_millis(50)))
        .await
        .unwrap_err();
    let elapsed = start.elapsed();

    assert!(matches!(err.root_cause(), AuthError::Timeout), "got {err}");
    assert!(elapsed >= Duration::from_millis(50));
    assert!(elapsed <= Duration::from_millis(100), "took {elapsed:?}");
    assert_eq!(alice.pending_handshakes(), before);
    assert!(!alice.session_manager().has_session(&bob_identity.to_hex()));
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_handshake_cleans_up() {
    let transport = Arc::new(SilentTransport::default());
    let alice = make_peer(&alice_key(), transport, PeerConfig::default(), None);
    let bob_identity = bob_key().pub_key();

    let outcome = tokio::time::timeout(
        Duration::from_millis(10),
        alice.to_peer(b"hi", Some(&bob_identity), Some(Duration::from_secs(30))),
    )
    .await;
    assert!(outcome.is_err());
    assert_eq!(alice.pending_handshakes(), 0);
    assert!(!alice.session_manager().has_session(&bob_identity.to_hex()));
}

#[tokio::test]
async fn test_handshake_uses_configured_timeout() {
    let transport = Arc::new(SilentTransport::default());
    let config = PeerConfig {
        handshake_timeout_ms: 20,
        ..Default::default()
    };
    let alice = make_peer(&alice_key(), transport, config, None);

    let err = alice
        .get_authenticated_session(Some(&bob_key().pub_key()), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Timeout));
}

#[tokio::test]
async fn test_unpaired_transport_fails_handshake() {
    let transport = MockTransport::new("Alice");
    let alice = make_peer(&alice_key(), transport, PeerConfig::default(), None);
    let bob_identity = bob_key().pub_key();

    let err = alice
        .to_peer(b"hi", Some(&bob_identity), None)
        .await
        .unwrap_err();
    assert!(
        matches!(err.root_cause(), AuthError::TransportNotConnected),
        "got {err}"
    );
    assert_eq!(alice.pending_handshakes(), 0);
    assert!(!alice.session_manager().has_session(&bob_identity.to_hex()));
}

#[tokio::test]
async fn test_idle_sessions_are_evicted_before_sending() {
    let config = PeerConfig {
        session_idle_timeout_ms: Some(0),
        ..Default::default()
    };
    let (alice, alice_transport, _bob, _) =
        paired_peers_with(config, None, PeerConfig::default(), None);
    let bob_identity = bob_key().pub_key();

    alice.to_peer(b"one", Some(&bob_identity), None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    alice.to_peer(b"two", Some(&bob_identity), None).await.unwrap();

    // The first session was evicted, so a second handshake ran.
    let handshakes = alice_transport
        .sent()
        .iter()
        .filter(|m| m.message_type == MessageType::InitialRequest)
        .count();
    assert_eq!(handshakes, 2);
}

fn base64_type(byte: u8) -> String {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    BASE64.encode([byte; 32])
}

fn resign_initial_response(bob: &ProtoSigner, message: &mut AuthMessage, swapped: bool) {
    let (first, second) = if swapped {
        (message.initial_nonce.clone(), message.your_nonce.clone())
    } else {
        (message.your_nonce.clone(), message.initial_nonce.clone())
    };
    let signature = bob
        .create_signature(CreateSignatureArgs {
            encryption_args: EncryptionArgs {
                protocol_id: Protocol::new(
                    SECURITY_LEVEL_EVERY_APP_AND_COUNTERPARTY,
                    AUTH_PROTOCOL_ID,
                ),
                key_id: key_id(&message.your_nonce, &message.initial_nonce),
                counterparty: Counterparty::Other(alice_key().pub_key()),
            },
            data: concat_nonces(&first, &second).unwrap(),
        })
        .unwrap();
    message.signature = signature.to_der().as_bytes().to_vec();
}

#[tokio::test]
async fn test_responder_nonce_order_is_enforced() {
    let bob_identity = bob_key().pub_key();

    // Re-signing in the expected order still authenticates.
    let (alice, _, _bob, bob_transport) = paired_peers();
    let bob_signer = ProtoSigner::new(bob_key());
    bob_transport.set_tamper(move |message| {
        if message.message_type == MessageType::InitialResponse {
            resign_initial_response(&bob_signer, message, false);
        }
    });
    alice
        .get_authenticated_session(Some(&bob_identity), None)
        .await
        .unwrap();

    // Swapping the signed byte order on the responder alone breaks it.
    let (alice, _, _bob, bob_transport) = paired_peers();
    let bob_signer = ProtoSigner::new(bob_key());
    bob_transport.set_tamper(move |message| {
        if message.message_type == MessageType::InitialResponse {
            resign_initial_response(&bob_signer, message, true);
        }
    });
    let err = alice
        .get_authenticated_session(Some(&bob_identity), None)
        .await
        .unwrap_err();
    assert!(matches!(err.root_cause(), AuthError::InvalidSignature), "got {err}");
}

#[tokio::test]
async fn test_initiator_nonce_order_is_enforced() {
    let (alice, alice_transport, _bob, bob_transport) = paired_peers();
    let bob_identity = bob_key().pub_key();
    alice
        .get_authenticated_session(Some(&bob_identity), None)
        .await
        .unwrap();

    let request = alice_transport.sent()[0].clone();
    let response = bob_transport.sent()[0].clone();
    assert_eq!(request.message_type, MessageType::InitialRequest);
    assert_eq!(response.message_type, MessageType::InitialResponse);
    assert_eq!(response.your_nonce, request.initial_nonce);

    let alice_signer = ProtoSigner::new(alice_key());
    let signature = Signature::from_der(&response.signature).unwrap();
    let verify = |data: Vec<u8>| {
        alice_signer
            .verify_signature(VerifySignatureArgs {
                encryption_args: EncryptionArgs {
                    protocol_id: Protocol::new(
                        SECURITY_LEVEL_EVERY_APP_AND_COUNTERPARTY,
                        AUTH_PROTOCOL_ID,
                    ),
                    key_id: key_id(&request.initial_nonce, &response.initial_nonce),
                    counterparty: Counterparty::Other(bob_identity),
                },
                data,
                signature: signature.clone(),
                for_self: false,
            })
            .unwrap()
    };

    // Initiator nonce first, from both sides' point of view.
    assert!(verify(concat_nonces(&request.initial_nonce, &response.initial_nonce).unwrap()));
    assert!(!verify(concat_nonces(&response.initial_nonce, &request.initial_nonce).unwrap()));
}

/// Initial-response signature computed outside this crate: BRC-42 child
/// derivation in plain Python and RFC 6979 ECDSA through OpenSSL, low-S.
/// Bob (responder) signs Alice's initial nonce followed by his session nonce.
#[test]
fn test_initial_response_signature_matches_known_vector() {
    const ALICE_IDENTITY: &str =
        "0320bbfb879bbd6761ecd2962badbb41ba9d60ca88327d78b07ae7141af6b6c810";
    const BOB_IDENTITY: &str =
        "0291354a19e9e81abe813b78a2055ce3d6d88c4dba4db22f365b743c2651ed3893";
    const ALICE_NONCE: &str = "AQIDBAUGBwgJCgsMDQ4PEBESExQVFhcYGRobHB0eHyA=";
    const BOB_NONCE: &str = "ZWZnaGlqa2xtbm9wcXJzdHV2d3h5ent8fX5/gIGCg4Q=";
    const BOB_SIGNING_KEY: &str =
        "023e72ab3243903819e50446da487bdcec4d845c8af4b550cda1bb60b1bd24bf38";
    const SIGNATURE_DER: &str = "30450221009625d2cb7d4165379ad6a8fb5e290414f66845ade0a6501f\
        242b9a566e43c79202207e5b1335b16f2fc34353d5e493437a6ca72a6ce879c2a4a70bcdfbb813e4aa91";

    assert_eq!(alice_key().pub_key().to_hex(), ALICE_IDENTITY);
    assert_eq!(bob_key().pub_key().to_hex(), BOB_IDENTITY);

    let args = |counterparty| EncryptionArgs {
        protocol_id: Protocol::new(SECURITY_LEVEL_EVERY_APP_AND_COUNTERPARTY, AUTH_PROTOCOL_ID),
        key_id: key_id(ALICE_NONCE, BOB_NONCE),
        counterparty: Counterparty::Other(counterparty),
    };

    let bob_signer = ProtoSigner::new(bob_key());
    let signature = bob_signer
        .create_signature(CreateSignatureArgs {
            encryption_args: args(alice_key().pub_key()),
            data: concat_nonces(ALICE_NONCE, BOB_NONCE).unwrap(),
        })
        .unwrap();
    assert_eq!(hex::encode(signature.to_der().as_bytes()), SIGNATURE_DER);

    let alice_signer = ProtoSigner::new(alice_key());
    let derived = alice_signer
        .get_public_key(GetPublicKeyArgs {
            identity_key: false,
            encryption_args: Some(args(bob_key().pub_key())),
            for_self: false,
        })
        .unwrap();
    assert_eq!(derived.to_hex(), BOB_SIGNING_KEY);
}

#[tokio::test]
async fn test_initial_request_without_nonce_is_rejected() {
    let transport = Arc::new(SilentTransport::default());
    let bob = make_peer(&bob_key(), transport, PeerConfig::default(), None);

    let message = AuthMessage::new(MessageType::InitialRequest, alice_key().pub_key());
    let err = bob.handle_incoming_message(message).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidNonce));
}

#[tokio::test]
async fn test_initial_response_for_unknown_session_is_rejected() {
    let transport = Arc::new(SilentTransport::default());
    let alice_signer = ProtoSigner::new(alice_key());
    let alice = make_peer(&alice_key(), transport, PeerConfig::default(), None);

    // Issued by Alice's signer, but no session was ever stored under it.
    let mut message = AuthMessage::new(MessageType::InitialResponse, bob_key().pub_key());
    message.your_nonce =
        bsv_authrite::nonce::create_nonce(&alice_signer, Counterparty::Self_).unwrap();
    message.initial_nonce = bsv_authrite::utils::random_base64(32);
    let err = alice.handle_incoming_message(message).await.unwrap_err();
    assert!(matches!(err, AuthError::SessionNotFound));
}
