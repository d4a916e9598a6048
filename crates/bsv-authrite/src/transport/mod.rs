//! Transport layer for auth message exchange.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;

use crate::error::AuthError;
use crate::types::AuthMessage;

/// Handler for messages arriving from the transport. The returned future
/// completes once the message has been fully processed.
pub type OnDataCallback =
    Arc<dyn Fn(AuthMessage) -> BoxFuture<'static, Result<(), AuthError>> + Send + Sync>;

/// Transport interface for sending and receiving AuthMessages.
///
/// Framing and connection management belong to the implementation. Send
/// failures are returned as-is; the engine does not retry.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send an AuthMessage through the transport.
    async fn send(&self, message: &AuthMessage) -> Result<(), AuthError>;

    /// Register the handler for incoming messages, replacing any previous one.
    fn on_data(&self, callback: OnDataCallback) -> Result<(), AuthError>;
}
