/// Error types for authentication operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// A general authentication error with a descriptive message.
    #[error("auth error: {0}")]
    General(String),

    /// The requested session was not found.
    #[error("session not found")]
    SessionNotFound,

    /// The session record is malformed (e.g. has no session nonce).
    #[error("invalid session: {0}")]
    InvalidSession(String),

    /// The peer has not been authenticated yet.
    #[error("not authenticated")]
    NotAuthenticated,

    /// Authentication handshake failed.
    #[error("authentication failed")]
    AuthFailed,

    /// The received message is malformed or invalid.
    #[error("invalid message")]
    InvalidMessage,

    /// The message carries a protocol version other than ours.
    #[error("invalid auth version: {got}, expected: {expected}")]
    VersionMismatch { got: String, expected: String },

    /// The signature on a message or certificate failed verification.
    #[error("invalid signature")]
    InvalidSignature,

    /// No correlated response arrived before the deadline.
    #[error("timeout")]
    Timeout,

    /// The transport layer is not connected.
    #[error("transport not connected")]
    TransportNotConnected,

    /// The nonce is invalid or failed verification.
    #[error("invalid nonce")]
    InvalidNonce,

    /// A required certificate was not provided.
    #[error("missing certificate")]
    MissingCertificate,

    /// Certificate validation failed with a descriptive reason.
    #[error("certificate validation failed: {0}")]
    CertificateValidationFailed(String),

    /// The certificate has already been signed.
    #[error("certificate already signed")]
    AlreadySigned,

    /// The certificate has not been signed yet.
    #[error("certificate not signed")]
    NotSigned,

    /// An error from the signing capability.
    #[error("signer error: {0}")]
    Signer(#[from] bsv_signer::SignerError),

    /// Base64 decoding error.
    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// JSON serialization or deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// An operation failed because of an underlying cause.
    #[error("{context}: {source}")]
    Wrapped {
        context: String,
        #[source]
        source: Box<AuthError>,
    },
}

impl AuthError {
    /// Wrap this error with a description of the operation that failed.
    pub fn wrap(self, context: impl Into<String>) -> Self {
        AuthError::Wrapped {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping any [`AuthError::Wrapped`] layers.
    pub fn root_cause(&self) -> &AuthError {
        match self {
            AuthError::Wrapped { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Adds [`AuthError::wrap`] to results.
pub trait ResultExt<T> {
    /// Wrap the error, if any, with `context`.
    fn wrap_err(self, context: &str) -> Result<T, AuthError>;
}

impl<T, E: Into<AuthError>> ResultExt<T> for Result<T, E> {
    fn wrap_err(self, context: &str) -> Result<T, AuthError> {
        self.map_err(|e| e.into().wrap(context))
    }
}
