//! Authentication token and the token provider seam.
//!
//! The REST exchange of credentials for a token lives outside this crate;
//! sessions consume it through [`TokenProvider`], injected at construction
//! so tests can substitute doubles.

use crate::error::SessionResult;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

/// An opaque access token with its observed expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl AuthToken {
    pub fn new(value: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    /// Token expiring a fixed number of seconds from now.
    pub fn expires_in(value: impl Into<String>, seconds: i64) -> Self {
        Self::new(value, Utc::now() + Duration::seconds(seconds))
    }

    /// Milliseconds until expiry; negative when already expired.
    pub fn ttl_ms(&self) -> i64 {
        (self.expires_at - Utc::now()).num_milliseconds()
    }
}

/// External token-fetch collaborator.
///
/// Consulted synchronously before each handshake and before each scheduled
/// background refresh.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn fetch_token(&self) -> SessionResult<AuthToken>;
}

/// Provider that hands out one fixed token. Useful for development
/// environments where the gateway accepts a pre-issued token, and for tests.
pub struct StaticTokenProvider {
    token: AuthToken,
}

impl StaticTokenProvider {
    pub fn new(token: AuthToken) -> Self {
        Self { token }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn fetch_token(&self) -> SessionResult<AuthToken> {
        Ok(self.token.clone())
    }
}
