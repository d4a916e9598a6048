/// Error types for key handling and signing operations.
#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
    #[error("point at infinity")]
    PointAtInfinity,
    #[error("invalid protocol: {0}")]
    InvalidProtocol(String),
    #[error("invalid key ID: {0}")]
    InvalidKeyId(String),
    #[error("invalid counterparty: {0}")]
    InvalidCounterparty(String),
    #[error("signing failed: {0}")]
    Signing(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
