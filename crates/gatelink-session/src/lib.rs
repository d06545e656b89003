//! Gateway session layer.
//!
//! Maintains a persistent, authenticated session with the venue gateway:
//! - handshake sequencing (transport open, CONNECT, CONNECTED)
//! - token lifecycle with background refresh ahead of expiry
//! - outbound heartbeat keepalive
//! - subscription multiplexing with bounded, backpressured delivery queues
//! - strict FIFO queued sends through a single-writer drain

pub mod config;
pub mod connector;
pub mod error;
pub mod subscription;
pub mod token;
pub mod transport;

pub use config::SessionConfig;
pub use connector::Connector;
pub use error::{SessionError, SessionResult};
pub use subscription::{Delivered, PublishingMode, Subscription};
pub use token::{AuthToken, StaticTokenProvider, TokenProvider};
pub use transport::{InboundHandler, SessionState, TransportSession};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any secure gateway connections are made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
