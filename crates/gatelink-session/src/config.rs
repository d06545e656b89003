//! Session configuration.

/// Configuration for one gateway session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Gateway host.
    pub host: String,
    /// Gateway port.
    pub port: u16,
    /// Base path of the gateway endpoint (e.g. "/gateway").
    pub path: String,
    /// Use wss instead of ws.
    pub secure: bool,
    /// Outbound heartbeat interval.
    pub heartbeat_interval_ms: u64,
    /// Default timeout for connection establishment.
    pub connect_timeout_ms: u64,
    /// How long before token expiry the background refresh fires.
    pub token_refresh_lead_ms: u64,
    /// Capacity of each subscription's delivery queue. The producer blocks
    /// when full; messages are never dropped.
    pub queue_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 443,
            path: "/gateway".to_string(),
            secure: true,
            heartbeat_interval_ms: 10_000,
            connect_timeout_ms: 60_000,
            token_refresh_lead_ms: 300_000,
            queue_capacity: 30_000,
        }
    }
}

impl SessionConfig {
    /// Compose the socket URL for one physical connection. Each connection
    /// gets its own correlation and session id.
    pub fn url(&self, correlation_id: &str, session_id: &str) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!(
            "{scheme}://{host}:{port}{path}/{correlation_id}/{session_id}/websocket",
            host = self.host,
            port = self.port,
            path = self.path,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.heartbeat_interval_ms, 10_000);
        assert_eq!(config.connect_timeout_ms, 60_000);
        assert_eq!(config.token_refresh_lead_ms, 300_000);
        assert_eq!(config.queue_capacity, 30_000);
    }

    #[test]
    fn test_url_composition() {
        let config = SessionConfig {
            host: "gw.example.com".to_string(),
            port: 443,
            path: "/gateway".to_string(),
            secure: true,
            ..Default::default()
        };
        assert_eq!(
            config.url("123", "abc"),
            "wss://gw.example.com:443/gateway/123/abc/websocket"
        );
    }

    #[test]
    fn test_url_insecure_scheme() {
        let config = SessionConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            path: "/gw".to_string(),
            secure: false,
            ..Default::default()
        };
        assert!(config.url("1", "2").starts_with("ws://127.0.0.1:8080/gw/"));
    }
}
