//! The seam between the [`Connector`](crate::Connector) and a live channel.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use myduka_auth::SessionCredential;
use myduka_events::LiveEvent;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The server refused the credential (handshake 401/403 or an auth frame).
    #[error("credential rejected: {0}")]
    Unauthorized(String),

    #[error("connection attempt timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    /// The server closed the channel.
    #[error("connection closed by server")]
    Closed,

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl TransportError {
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}

/// Opens live connections presenting a session credential.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, credential: &SessionCredential) -> Result<Box<dyn Connection>, TransportError>;
}

/// One open live channel.
#[async_trait]
pub trait Connection: Send {
    /// Next inbound event. `None` means the server ended the stream.
    async fn next_event(&mut self) -> Option<Result<LiveEvent, TransportError>>;

    async fn send(&mut self, event: &str, payload: Value) -> Result<(), TransportError>;

    /// Release the channel. Calling it on a closed connection is a no-op.
    async fn close(&mut self);
}
