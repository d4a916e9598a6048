//! BRC-42/43 key derivation.
//!
//! KeyDeriver derives private, public, and symmetric keys from a root private
//! key using the BRC-43 invoice number `"{security_level}-{protocol}-{key_id}"`.

use regex::Regex;
use std::sync::LazyLock;

use crate::keys::{anyone_key, PrivateKey, PublicKey};
use crate::types::{Counterparty, Protocol};
use crate::SignerError;

static RE_ONLY_LETTERS_NUMBERS_SPACES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9 ]+$").expect("static regex is valid"));

const MAX_KEY_ID_LEN: usize = 800;
const MIN_PROTOCOL_LEN: usize = 5;
const MAX_PROTOCOL_LEN: usize = 400;

/// Derives key material from a root private key.
#[derive(Clone, Debug)]
pub struct KeyDeriver {
    root_key: PrivateKey,
}

impl KeyDeriver {
    /// Create a new KeyDeriver. `None` uses the "anyone" key.
    pub fn new(private_key: Option<PrivateKey>) -> Self {
        let root_key = private_key.unwrap_or_else(|| anyone_key().0);
        KeyDeriver { root_key }
    }

    /// The identity public key.
    pub fn identity_key(&self) -> PublicKey {
        self.root_key.pub_key()
    }

    /// Derive the 32-byte symmetric key shared with `counterparty`.
    ///
    /// This is the x-coordinate of the ECDH point between our derived private
    /// key and the counterparty's derived public key.
    pub fn derive_symmetric_key(
        &self,
        protocol: &Protocol,
        key_id: &str,
        counterparty: &Counterparty,
    ) -> Result<[u8; 32], SignerError> {
        let effective = match counterparty {
            Counterparty::Anyone => Counterparty::Other(anyone_key().1),
            other => other.clone(),
        };

        let derived_pub = self.derive_public_key(protocol, key_id, &effective, false)?;
        let derived_priv = self.derive_private_key(protocol, key_id, &effective)?;
        let shared = derived_priv.derive_shared_secret(&derived_pub)?;

        let mut key = [0u8; 32];
        key.copy_from_slice(&shared.to_compressed()[1..]);
        Ok(key)
    }

    /// Derive a public key.
    ///
    /// With `for_self` the result is the public half of our own derived private
    /// key; otherwise it is the key the counterparty derives for this invoice.
    pub fn derive_public_key(
        &self,
        protocol: &Protocol,
        key_id: &str,
        counterparty: &Counterparty,
        for_self: bool,
    ) -> Result<PublicKey, SignerError> {
        let counterparty_key = self.normalize_counterparty(counterparty)?;
        let invoice_number = compute_invoice_number(protocol, key_id)?;

        if for_self {
            Ok(self
                .root_key
                .derive_child(&counterparty_key, &invoice_number)?
                .pub_key())
        } else {
            counterparty_key.derive_child(&self.root_key, &invoice_number)
        }
    }

    /// Derive a private key.
    pub fn derive_private_key(
        &self,
        protocol: &Protocol,
        key_id: &str,
        counterparty: &Counterparty,
    ) -> Result<PrivateKey, SignerError> {
        let counterparty_key = self.normalize_counterparty(counterparty)?;
        let invoice_number = compute_invoice_number(protocol, key_id)?;
        self.root_key.derive_child(&counterparty_key, &invoice_number)
    }

    fn normalize_counterparty(&self, counterparty: &Counterparty) -> Result<PublicKey, SignerError> {
        Ok(match counterparty {
            Counterparty::Self_ => self.root_key.pub_key(),
            Counterparty::Anyone => anyone_key().1,
            Counterparty::Other(key) => *key,
        })
    }
}

/// Build and validate the BRC-43 invoice number.
pub fn compute_invoice_number(protocol: &Protocol, key_id: &str) -> Result<String, SignerError> {
    if !(0..=2).contains(&protocol.security_level) {
        return Err(SignerError::InvalidProtocol(
            "protocol security level must be 0, 1, or 2".into(),
        ));
    }

    if key_id.is_empty() {
        return Err(SignerError::InvalidKeyId(
            "key IDs must be 1 character or more".into(),
        ));
    }
    if key_id.len() > MAX_KEY_ID_LEN {
        return Err(SignerError::InvalidKeyId(format!(
            "key IDs must be {} characters or less",
            MAX_KEY_ID_LEN
        )));
    }

    let protocol_name = protocol.protocol.trim().to_lowercase();
    if protocol_name.len() < MIN_PROTOCOL_LEN {
        return Err(SignerError::InvalidProtocol(format!(
            "protocol names must be {} characters or more",
            MIN_PROTOCOL_LEN
        )));
    }
    if protocol_name.len() > MAX_PROTOCOL_LEN {
        return Err(SignerError::InvalidProtocol(format!(
            "protocol names must be {} characters or less",
            MAX_PROTOCOL_LEN
        )));
    }
    if protocol_name.contains("  ") {
        return Err(SignerError::InvalidProtocol(
            "protocol names cannot contain multiple consecutive spaces".into(),
        ));
    }
    if !RE_ONLY_LETTERS_NUMBERS_SPACES.is_match(&protocol_name) {
        return Err(SignerError::InvalidProtocol(
            "protocol names can only contain letters, numbers and spaces".into(),
        ));
    }
    if protocol_name.ends_with(" protocol") {
        return Err(SignerError::InvalidProtocol(
            "no need to end your protocol name with \" protocol\"".into(),
        ));
    }

    Ok(format!(
        "{}-{}-{}",
        protocol.security_level, protocol_name, key_id
    ))
}
