//! Session error types.

use gatelink_wire::WireError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    /// Subscribe attempted while the session is not connected. Raised
    /// synchronously, before any wire I/O.
    #[error("Subscription failed: session is not connected")]
    SubscriptionFailed,

    /// Token fetch failed. Raised to the caller of connect; background
    /// refresh failures are logged only and never surface here.
    #[error("Token request failed: {0}")]
    TokenRequest(String),

    /// Socket closed without a prior application-level disconnect.
    #[error("Unexpected disconnect: {0}")]
    UnexpectedDisconnect(String),

    #[error("Connection establishment timed out")]
    ConnectTimeout,

    #[error("Connect already in progress")]
    ConnectInProgress,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Session is not connected")]
    NotConnected,

    #[error("Wire error: {0}")]
    Wire(#[from] WireError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
}

pub type SessionResult<T> = Result<T, SessionError>;
