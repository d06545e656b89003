//! Pool of protocol sessions.

use gatelink_session::{Connector, SessionError, SessionResult, Subscription};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// A set of connectors with exactly one main once the set is non-empty.
#[derive(Default)]
pub struct ClientPool {
    inner: RwLock<PoolInner>,
}

#[derive(Default)]
struct PoolInner {
    connectors: Vec<Arc<Connector>>,
    main: Option<usize>,
}

impl PoolInner {
    fn index_of(&self, name: &str) -> Option<usize> {
        self.connectors.iter().position(|c| c.name() == name)
    }
}

impl ClientPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connector. The first connector added becomes main.
    pub fn add(&self, connector: Arc<Connector>) {
        let mut inner = self.inner.write();
        if inner.index_of(connector.name()).is_none() {
            inner.connectors.push(connector);
            if inner.main.is_none() {
                inner.main = Some(inner.connectors.len() - 1);
            }
        }
    }

    /// Promote the given connector to main, demoting any previous main and
    /// adding the connector to the set if absent.
    pub fn set_main(&self, connector: Arc<Connector>) {
        let mut inner = self.inner.write();
        let idx = match inner.index_of(connector.name()) {
            Some(idx) => idx,
            None => {
                inner.connectors.push(connector);
                inner.connectors.len() - 1
            }
        };
        inner.main = Some(idx);
    }

    pub fn main(&self) -> Option<Arc<Connector>> {
        let inner = self.inner.read();
        inner.main.map(|idx| inner.connectors[idx].clone())
    }

    pub fn len(&self) -> usize {
        self.inner.read().connectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().connectors.is_empty()
    }

    fn all(&self) -> Vec<Arc<Connector>> {
        self.inner.read().connectors.clone()
    }

    fn require_main(&self) -> SessionResult<Arc<Connector>> {
        self.main().ok_or(SessionError::NotConnected)
    }

    /// Connect the main connector only.
    pub async fn open(&self, timeout: Duration) -> SessionResult<()> {
        self.require_main()?.connect_with_timeout(timeout).await
    }

    /// Connect every connector, short-circuiting on the first failure.
    pub async fn open_all(&self, timeout: Duration) -> SessionResult<()> {
        for connector in self.all() {
            connector.connect_with_timeout(timeout).await?;
        }
        Ok(())
    }

    /// Direct send through the main connector.
    pub async fn send<R: Serialize>(&self, request: &R, destination: &str) -> SessionResult<()> {
        self.require_main()?.send(request, destination).await
    }

    /// Subscribe through the main connector.
    pub async fn subscribe<T: DeserializeOwned>(
        &self,
        destination: &str,
        id: Option<String>,
    ) -> SessionResult<Subscription<T>> {
        self.require_main()?.subscribe(destination, id).await
    }

    /// Unsubscribe through the main connector.
    pub async fn unsubscribe(&self, id: &str) -> SessionResult<()> {
        self.require_main()?.unsubscribe(id).await
    }

    /// Broadcast a direct send, collecting each connector's outcome.
    pub async fn send_all<R: Serialize>(
        &self,
        request: &R,
        destination: &str,
    ) -> HashMap<String, SessionResult<()>> {
        let mut results = HashMap::new();
        for connector in self.all() {
            let outcome = connector.send(request, destination).await;
            results.insert(connector.name().to_string(), outcome);
        }
        results
    }

    /// Broadcast a subscribe, collecting each connector's outcome. Payloads
    /// are left untyped; callers re-type per subscription as needed.
    pub async fn subscribe_all(
        &self,
        destination: &str,
    ) -> HashMap<String, SessionResult<Subscription<Value>>> {
        let mut results = HashMap::new();
        for connector in self.all() {
            let outcome = connector.subscribe::<Value>(destination, None).await;
            results.insert(connector.name().to_string(), outcome);
        }
        results
    }

    /// Broadcast an unsubscribe, collecting each connector's outcome.
    pub async fn unsubscribe_all(&self, id: &str) -> HashMap<String, SessionResult<()>> {
        let mut results = HashMap::new();
        for connector in self.all() {
            let outcome = connector.unsubscribe(id).await;
            results.insert(connector.name().to_string(), outcome);
        }
        results
    }

    /// Enqueue on the connector with the smallest pending-outbound depth.
    /// Ties break by list order; a simple heuristic, not fair scheduling.
    pub fn push_to_send<R: Serialize>(&self, request: &R, destination: &str) -> SessionResult<()> {
        let connectors = self.all();
        let depths: Vec<usize> = connectors.iter().map(|c| c.requests_count()).collect();
        let Some(idx) = pick_least_loaded(&depths) else {
            return Err(SessionError::NotConnected);
        };
        debug!(
            connector = connectors[idx].name(),
            depth = depths[idx],
            "routing queued send"
        );
        connectors[idx].push_to_send(request, destination)
    }

    /// Disconnect every connector. One connector's failure never prevents
    /// attempting the rest.
    pub async fn disconnect_all(&self) {
        for connector in self.all() {
            debug!(connector = connector.name(), "disconnecting");
            connector.disconnect().await;
        }
        info!("all connectors disconnected");
    }
}

/// Index of the smallest depth; first wins on ties.
fn pick_least_loaded(depths: &[usize]) -> Option<usize> {
    depths
        .iter()
        .enumerate()
        .min_by_key(|(_, depth)| **depth)
        .map(|(idx, _)| idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatelink_session::{AuthToken, SessionConfig, StaticTokenProvider};

    fn connector(name: &str) -> Arc<Connector> {
        let provider = Arc::new(StaticTokenProvider::new(AuthToken::expires_in("tok", 600)));
        Connector::new(name, SessionConfig::default(), provider)
    }

    #[test]
    fn test_pick_least_loaded() {
        assert_eq!(pick_least_loaded(&[]), None);
        assert_eq!(pick_least_loaded(&[3]), Some(0));
        assert_eq!(pick_least_loaded(&[5, 2, 4]), Some(1));
        // ties break by list order
        assert_eq!(pick_least_loaded(&[2, 2, 1, 1]), Some(2));
        assert_eq!(pick_least_loaded(&[0, 0, 0]), Some(0));
    }

    #[tokio::test]
    async fn test_first_added_connector_becomes_main() {
        let pool = ClientPool::new();
        assert!(pool.main().is_none());

        pool.add(connector("a"));
        pool.add(connector("b"));
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.main().unwrap().name(), "a");
    }

    #[tokio::test]
    async fn test_set_main_demotes_previous() {
        let pool = ClientPool::new();
        pool.add(connector("a"));
        let b = connector("b");
        pool.set_main(b.clone());
        assert_eq!(pool.main().unwrap().name(), "b");
        assert_eq!(pool.len(), 2);

        // promoting an absent connector also adds it
        pool.set_main(connector("c"));
        assert_eq!(pool.main().unwrap().name(), "c");
        assert_eq!(pool.len(), 3);
    }

    #[tokio::test]
    async fn test_add_is_deduplicated_by_name() {
        let pool = ClientPool::new();
        pool.add(connector("a"));
        pool.add(connector("a"));
        assert_eq!(pool.len(), 1);
    }

    #[tokio::test]
    async fn test_subscribe_on_empty_pool_fails() {
        let pool = ClientPool::new();
        let result = pool.subscribe::<Value>("/topic/quotes", None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_subscribe_all_collects_per_connector_failures() {
        let pool = ClientPool::new();
        pool.add(connector("a"));
        pool.add(connector("b"));

        // neither connector is connected, so both entries report failure
        let results = pool.subscribe_all("/topic/quotes").await;
        assert_eq!(results.len(), 2);
        assert!(matches!(
            results.get("a"),
            Some(Err(SessionError::SubscriptionFailed))
        ));
        assert!(matches!(
            results.get("b"),
            Some(Err(SessionError::SubscriptionFailed))
        ));
    }

    #[tokio::test]
    async fn test_push_to_send_on_empty_pool_fails() {
        let pool = ClientPool::new();
        let result = pool.push_to_send(&serde_json::json!({"x": 1}), "/app/orders");
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_disconnect_all_tolerates_disconnected_members() {
        let pool = ClientPool::new();
        pool.add(connector("a"));
        pool.add(connector("b"));
        // both idle; disconnect must not panic or stop midway
        pool.disconnect_all().await;
        assert_eq!(pool.len(), 2);
    }
}
