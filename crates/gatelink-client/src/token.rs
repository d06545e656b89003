//! REST token endpoint integration.

use async_trait::async_trait;
use gatelink_session::{AuthToken, SessionError, SessionResult, TokenProvider};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
    /// Token lifetime in seconds.
    expires_in: i64,
}

/// Exchanges credentials for a session token over HTTPS.
pub struct RestTokenProvider {
    client: reqwest::Client,
    token_url: String,
    username: String,
    password: String,
}

impl RestTokenProvider {
    pub fn new(token_url: String, username: String, password: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            token_url,
            username,
            password,
        }
    }
}

#[async_trait]
impl TokenProvider for RestTokenProvider {
    async fn fetch_token(&self) -> SessionResult<AuthToken> {
        let request = TokenRequest {
            username: &self.username,
            password: &self.password,
        };

        let response = self
            .client
            .post(&self.token_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| SessionError::TokenRequest(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SessionError::TokenRequest(format!(
                "token endpoint returned {status}"
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| SessionError::TokenRequest(e.to_string()))?;

        debug!(expires_in = body.expires_in, "Fetched session token");
        Ok(AuthToken::expires_in(body.token, body.expires_in))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_response_parses() {
        let body: TokenResponse =
            serde_json::from_str(r#"{"token":"abc123","expires_in":1800}"#).unwrap();
        assert_eq!(body.token, "abc123");
        assert_eq!(body.expires_in, 1800);
    }

    #[test]
    fn test_token_request_serializes_credentials() {
        let request = TokenRequest {
            username: "trader",
            password: "secret",
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["username"], "trader");
        assert_eq!(json["password"], "secret");
    }
}
