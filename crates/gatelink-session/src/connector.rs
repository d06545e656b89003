//! Protocol session layered on one transport session.
//!
//! The connector issues SUBSCRIBE/UNSUBSCRIBE, routes inbound MESSAGE frames
//! to the matching subscription queue, and offers two outbound paths: a
//! direct send and a queued send drained strictly one-at-a-time in FIFO
//! order by a dedicated task.

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::subscription::{self, Delivered, PublishingMode, Subscription, SubscriptionSender};
use crate::token::TokenProvider;
use crate::transport::{InboundHandler, TransportSession};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use gatelink_wire::constants::{headers, CONTENT_TYPE_JSON};
use gatelink_wire::{Command, Frame};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

type ErrorCallback = Box<dyn Fn(Frame) + Send + Sync>;

/// Routes decoded inbound frames to subscription queues.
///
/// The registry is mutated by the owning connector's subscribe/unsubscribe
/// path and read by the transport's receive loop, which run concurrently,
/// hence the mutex.
struct Router {
    subscriptions: Mutex<HashMap<String, SubscriptionSender>>,
    error_cb: RwLock<Option<ErrorCallback>>,
}

impl Router {
    fn new() -> Self {
        Self {
            subscriptions: Mutex::new(HashMap::new()),
            error_cb: RwLock::new(None),
        }
    }

    fn register(&self, id: String, sender: SubscriptionSender) {
        self.subscriptions.lock().insert(id, sender);
    }

    fn deregister(&self, id: &str) -> bool {
        self.subscriptions.lock().remove(id).is_some()
    }

    fn subscription_ids(&self) -> Vec<String> {
        self.subscriptions.lock().keys().cloned().collect()
    }

    fn len(&self) -> usize {
        self.subscriptions.lock().len()
    }
}

#[async_trait]
impl InboundHandler for Router {
    async fn on_message(&self, frame: Frame) {
        let Some(id) = frame.header(headers::SUBSCRIPTION).map(str::to_owned) else {
            warn!("MESSAGE frame without subscription header dropped");
            return;
        };
        let entry = self.subscriptions.lock().get(&id).cloned();
        let Some(entry) = entry else {
            warn!(id = %id, "MESSAGE for unknown subscription dropped");
            return;
        };

        let data: Value = match serde_json::from_slice(frame.body()) {
            Ok(value) => value,
            Err(e) => {
                warn!(id = %id, error = %e, "undecodable MESSAGE body dropped");
                return;
            }
        };
        let sent_at = frame
            .header(headers::SENT_AT)
            .and_then(|v| v.parse::<i64>().ok())
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single());
        let is_snapshot = frame
            .header(headers::SNAPSHOT)
            .map(|v| v == "true")
            .unwrap_or(false);
        let mode = PublishingMode::from_destination(&entry.destination);

        // May suspend on a full queue: the consumer's pace throttles this
        // connector's receive loop, never another connector's.
        if !entry
            .deliver(Delivered::new(data, sent_at, is_snapshot, mode))
            .await
        {
            debug!(id = %id, "consumer dropped its handle, deregistering");
            self.deregister(&id);
        }
    }

    async fn on_error(&self, frame: Frame) {
        let cb = self.error_cb.read();
        if let Some(cb) = cb.as_ref() {
            cb(frame);
        }
    }

    fn on_closed(&self) {
        let mut subscriptions = self.subscriptions.lock();
        if !subscriptions.is_empty() {
            info!(
                count = subscriptions.len(),
                "session closed, force-closing subscriptions"
            );
        }
        // Dropping the senders is what unblocks waiting consumers: their
        // streams terminate, no error is delivered through that channel.
        subscriptions.clear();
    }
}

/// One protocol-aware gateway session.
pub struct Connector {
    name: String,
    transport: Arc<TransportSession>,
    router: Arc<Router>,
    pending_tx: mpsc::UnboundedSender<Vec<u8>>,
    pending_depth: Arc<AtomicUsize>,
    queue_capacity: usize,
    connect_timeout: Duration,
}

impl Connector {
    pub fn new(
        name: impl Into<String>,
        config: SessionConfig,
        token_provider: Arc<dyn TokenProvider>,
    ) -> Arc<Self> {
        let queue_capacity = config.queue_capacity;
        let connect_timeout = Duration::from_millis(config.connect_timeout_ms);
        let transport = TransportSession::new(config, token_provider);
        let router = Arc::new(Router::new());
        transport.set_handler(router.clone());

        let (pending_tx, pending_rx) = mpsc::unbounded_channel();
        let pending_depth = Arc::new(AtomicUsize::new(0));
        tokio::spawn(drain_outbound(
            transport.clone(),
            pending_rx,
            pending_depth.clone(),
        ));

        Arc::new(Self {
            name: name.into(),
            transport,
            router,
            pending_tx,
            pending_depth,
            queue_capacity,
            connect_timeout,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Connect using the configured establishment timeout.
    pub async fn connect(&self) -> SessionResult<()> {
        self.connect_with_timeout(self.connect_timeout).await
    }

    pub async fn connect_with_timeout(&self, timeout: Duration) -> SessionResult<()> {
        self.transport.connect(timeout).await
    }

    /// Register a callback for ERROR frames surfaced by the gateway.
    pub fn set_error_handler(&self, cb: impl Fn(Frame) + Send + Sync + 'static) {
        *self.router.error_cb.write() = Some(Box::new(cb));
    }

    /// Open a subscription on `destination`. Fails before any wire I/O when
    /// the session is not connected.
    pub async fn subscribe<T: DeserializeOwned>(
        &self,
        destination: &str,
        id: Option<String>,
    ) -> SessionResult<Subscription<T>> {
        if !self.transport.is_connected() {
            return Err(SessionError::SubscriptionFailed);
        }
        let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let unit = Frame::new(Command::Subscribe)
            .with_header(headers::ID, id.as_str())
            .with_header(headers::DESTINATION, destination)
            .encode()?;

        let (sender, sub) = subscription::channel(id.clone(), destination, self.queue_capacity);
        self.router.register(id.clone(), sender);
        self.transport.send(unit).await?;
        debug!(id = %id, destination, "subscribed");
        Ok(sub)
    }

    /// Always sends the UNSUBSCRIBE frame; closing the local queue happens
    /// only if the id is known, so a repeat call is a safe local no-op.
    pub async fn unsubscribe(&self, id: &str) -> SessionResult<()> {
        let unit = Frame::new(Command::Unsubscribe)
            .with_header(headers::ID, id)
            .encode()?;
        self.transport.send(unit).await?;
        if self.router.deregister(id) {
            debug!(id, "subscription closed");
        }
        Ok(())
    }

    /// Serialize and transmit immediately, bypassing the pending queue.
    pub async fn send<R: Serialize>(&self, request: &R, destination: &str) -> SessionResult<()> {
        let unit = encode_send_frame(request, destination)?;
        self.transport.send(unit).await
    }

    /// Enqueue into this connector's pending FIFO. A dedicated drain task
    /// transmits strictly one frame at a time, in order.
    pub fn push_to_send<R: Serialize>(&self, request: &R, destination: &str) -> SessionResult<()> {
        let unit = encode_send_frame(request, destination)?;
        self.pending_depth.fetch_add(1, Ordering::SeqCst);
        if self.pending_tx.send(unit).is_err() {
            self.pending_depth.fetch_sub(1, Ordering::SeqCst);
            return Err(SessionError::NotConnected);
        }
        Ok(())
    }

    /// Depth of the pending-outbound FIFO. A load-balancing signal, not a
    /// backpressure guarantee.
    pub fn requests_count(&self) -> usize {
        self.pending_depth.load(Ordering::SeqCst)
    }

    /// Number of live local subscriptions.
    pub fn subscriptions_count(&self) -> usize {
        self.router.len()
    }

    /// Unsubscribe everything, then close the underlying transport.
    pub async fn disconnect(&self) {
        for id in self.router.subscription_ids() {
            if let Err(e) = self.unsubscribe(&id).await {
                warn!(id = %id, error = %e, "unsubscribe during disconnect failed");
            }
        }
        self.transport.close();
    }
}

/// Single-writer drain of the pending FIFO: one in-flight frame, strict
/// order, no recursion.
async fn drain_outbound(
    transport: Arc<TransportSession>,
    mut pending_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    depth: Arc<AtomicUsize>,
) {
    while let Some(unit) = pending_rx.recv().await {
        if let Err(e) = transport.send(unit).await {
            warn!(error = %e, "queued send failed");
        }
        depth.fetch_sub(1, Ordering::SeqCst);
    }
    debug!("outbound drain task stopped");
}

fn encode_send_frame<R: Serialize>(request: &R, destination: &str) -> SessionResult<Vec<u8>> {
    let body = serde_json::to_vec(request)?;
    let unit = Frame::new(Command::Send)
        .with_header(headers::DESTINATION, destination)
        .with_header(headers::CONTENT_TYPE, CONTENT_TYPE_JSON)
        .with_body(body)
        .encode()?;
    Ok(unit)
}
