//! Application configuration.

use crate::error::AppResult;
use gatelink_session::SessionConfig;
use serde::Deserialize;
use std::path::Path;

/// Top-level client configuration, loaded from a TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    pub gateway: GatewayConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub session: SessionTuning,
    /// Destinations the demo binary subscribes to on startup.
    #[serde(default)]
    pub destinations: Vec<String>,
}

/// Gateway endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default = "default_secure")]
    pub secure: bool,
}

/// Credentials and the REST endpoint that exchanges them for a token.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub token_url: String,
    pub username: String,
    pub password: String,
}

/// Session tuning knobs, all optional.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionTuning {
    /// Outbound heartbeat interval (ms). Default: 10,000.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Connection establishment timeout (ms). Default: 60,000.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Refresh lead before token expiry (ms). Default: 300,000 (5 minutes).
    #[serde(default = "default_token_refresh_lead_ms")]
    pub token_refresh_lead_ms: u64,
    /// Per-subscription delivery queue capacity. Default: 30,000.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_port() -> u16 {
    443
}

fn default_path() -> String {
    "/gateway".to_string()
}

fn default_secure() -> bool {
    true
}

fn default_heartbeat_interval_ms() -> u64 {
    10_000
}

fn default_connect_timeout_ms() -> u64 {
    60_000
}

fn default_token_refresh_lead_ms() -> u64 {
    300_000
}

fn default_queue_capacity() -> usize {
    30_000
}

impl Default for SessionTuning {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            token_refresh_lead_ms: default_token_refresh_lead_ms(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl ClientConfig {
    pub fn load(path: &Path) -> AppResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    /// Session configuration for one connector.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            host: self.gateway.host.clone(),
            port: self.gateway.port,
            path: self.gateway.path.clone(),
            secure: self.gateway.secure,
            heartbeat_interval_ms: self.session.heartbeat_interval_ms,
            connect_timeout_ms: self.session.connect_timeout_ms,
            token_refresh_lead_ms: self.session.token_refresh_lead_ms,
            queue_capacity: self.session.queue_capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_applies_defaults() {
        let config: ClientConfig = toml::from_str(
            r#"
            [gateway]
            host = "gw.example.com"

            [auth]
            token_url = "https://auth.example.com/token"
            username = "trader"
            password = "secret"
            "#,
        )
        .unwrap();

        assert_eq!(config.gateway.port, 443);
        assert_eq!(config.gateway.path, "/gateway");
        assert!(config.gateway.secure);
        assert_eq!(config.session.heartbeat_interval_ms, 10_000);
        assert_eq!(config.session.queue_capacity, 30_000);
        assert!(config.destinations.is_empty());
    }

    #[test]
    fn test_full_config_overrides() {
        let config: ClientConfig = toml::from_str(
            r#"
            destinations = ["/topic/quotes/streaming/EURUSD"]

            [gateway]
            host = "127.0.0.1"
            port = 8080
            path = "/gw"
            secure = false

            [auth]
            token_url = "http://127.0.0.1:9000/token"
            username = "u"
            password = "p"

            [session]
            heartbeat_interval_ms = 5000
            connect_timeout_ms = 15000
            "#,
        )
        .unwrap();

        let session = config.session_config();
        assert_eq!(session.host, "127.0.0.1");
        assert_eq!(session.port, 8080);
        assert!(!session.secure);
        assert_eq!(session.heartbeat_interval_ms, 5000);
        assert_eq!(session.connect_timeout_ms, 15_000);
        // untouched knobs keep their defaults
        assert_eq!(session.token_refresh_lead_ms, 300_000);
        assert_eq!(config.destinations.len(), 1);
    }
}
