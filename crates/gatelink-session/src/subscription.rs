//! Subscriptions and their bounded delivery queues.
//!
//! Each subscription owns a bounded FIFO of delivered messages. A full queue
//! blocks the producer (the session's receive loop) until the consumer
//! drains; nothing is ever dropped. Queue closure is the consumer's only
//! end-of-stream signal: `next()` returning `None` means the subscription
//! was dropped locally or the session went down.

use gatelink_wire::constants::STREAMING_SEGMENT;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;
use tokio::sync::mpsc;
use tracing::warn;

/// How the venue publishes on a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishingMode {
    /// Every update is delivered.
    Streaming,
    /// Only the latest state per interval is delivered.
    Conflated,
}

impl PublishingMode {
    /// Derived from the destination path: a `streaming` segment marks a
    /// streaming feed, everything else is conflated.
    pub fn from_destination(destination: &str) -> Self {
        if destination.split('/').any(|seg| seg == STREAMING_SEGMENT) {
            Self::Streaming
        } else {
            Self::Conflated
        }
    }
}

/// One delivered message with its parsed wire metadata.
#[derive(Debug, Clone)]
pub struct Delivered<T> {
    data: T,
    sent_at: Option<DateTime<Utc>>,
    is_snapshot: bool,
    publishing_mode: PublishingMode,
}

impl<T> Delivered<T> {
    pub(crate) fn new(
        data: T,
        sent_at: Option<DateTime<Utc>>,
        is_snapshot: bool,
        publishing_mode: PublishingMode,
    ) -> Self {
        Self {
            data,
            sent_at,
            is_snapshot,
            publishing_mode,
        }
    }

    pub fn data(&self) -> &T {
        &self.data
    }

    pub fn into_data(self) -> T {
        self.data
    }

    /// Server-side publish time, when the gateway stamped one.
    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        self.sent_at
    }

    /// True when this message is a full-state dump rather than a delta.
    pub fn is_snapshot(&self) -> bool {
        self.is_snapshot
    }

    pub fn publishing_mode(&self) -> PublishingMode {
        self.publishing_mode
    }
}

impl Delivered<Value> {
    /// Re-type the payload, keeping metadata.
    pub fn deserialize<T: DeserializeOwned>(self) -> serde_json::Result<Delivered<T>> {
        Ok(Delivered {
            data: serde_json::from_value(self.data)?,
            sent_at: self.sent_at,
            is_snapshot: self.is_snapshot,
            publishing_mode: self.publishing_mode,
        })
    }
}

/// Producer half of a subscription, held in the owning session's registry.
#[derive(Debug, Clone)]
pub(crate) struct SubscriptionSender {
    pub(crate) destination: String,
    pub(crate) tx: mpsc::Sender<Delivered<Value>>,
}

impl SubscriptionSender {
    /// Push one delivered message. Suspends when the queue is full; this is
    /// the session's backpressure point. Returns false once the consumer is
    /// gone.
    pub(crate) async fn deliver(&self, message: Delivered<Value>) -> bool {
        self.tx.send(message).await.is_ok()
    }
}

/// Consumer handle for one live subscription.
///
/// Generic over the expected payload type; payloads that fail to deserialize
/// into `T` are logged and skipped, they do not terminate the stream.
pub struct Subscription<T> {
    id: String,
    destination: String,
    rx: mpsc::Receiver<Delivered<Value>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Subscription<T> {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }
}

impl<T: DeserializeOwned> Subscription<T> {
    /// Next delivered message, or `None` once the subscription is closed.
    /// Closure is the only termination signal; no error travels this channel.
    pub async fn next(&mut self) -> Option<Delivered<T>> {
        loop {
            let raw = self.rx.recv().await?;
            match raw.deserialize::<T>() {
                Ok(message) => return Some(message),
                Err(e) => {
                    warn!(id = %self.id, error = %e, "dropping payload that does not match subscriber type");
                }
            }
        }
    }
}

/// Create a linked producer/consumer pair for one subscription.
pub(crate) fn channel<T>(
    id: impl Into<String>,
    destination: impl Into<String>,
    capacity: usize,
) -> (SubscriptionSender, Subscription<T>) {
    let id = id.into();
    let destination = destination.into();
    let (tx, rx) = mpsc::channel(capacity);
    (
        SubscriptionSender {
            destination: destination.clone(),
            tx,
        },
        Subscription {
            id,
            destination,
            rx,
            _marker: PhantomData,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn plain(data: Value) -> Delivered<Value> {
        Delivered::new(data, None, false, PublishingMode::Conflated)
    }

    #[test]
    fn test_publishing_mode_from_destination() {
        assert_eq!(
            PublishingMode::from_destination("/topic/quotes/streaming/EURUSD"),
            PublishingMode::Streaming
        );
        assert_eq!(
            PublishingMode::from_destination("/topic/quotes/EURUSD"),
            PublishingMode::Conflated
        );
        // segment match, not substring match
        assert_eq!(
            PublishingMode::from_destination("/topic/streamingquotes/EURUSD"),
            PublishingMode::Conflated
        );
    }

    #[tokio::test]
    async fn test_delivery_preserves_metadata() {
        let (sender, mut sub) = channel::<Value>("s1", "/topic/t/streaming/x", 4);
        let sent_at = Utc::now();
        sender
            .deliver(Delivered::new(
                json!({"px": 1.0}),
                Some(sent_at),
                true,
                PublishingMode::Streaming,
            ))
            .await;

        let got = sub.next().await.unwrap();
        assert!(got.is_snapshot());
        assert_eq!(got.sent_at(), Some(sent_at));
        assert_eq!(got.publishing_mode(), PublishingMode::Streaming);
        assert_eq!(got.data()["px"], 1.0);
    }

    #[tokio::test]
    async fn test_full_queue_blocks_producer_until_drained() {
        let (sender, mut sub) = channel::<Value>("s1", "/t", 2);
        let delivered = Arc::new(AtomicUsize::new(0));

        let counter = delivered.clone();
        let producer = tokio::spawn(async move {
            for i in 0..3 {
                sender.deliver(plain(json!(i))).await;
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        // Two fit, the third push must park the producer.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(delivered.load(Ordering::SeqCst), 2);

        // Draining one unblocks it; nothing was dropped.
        assert_eq!(sub.next().await.unwrap().into_data(), json!(0));
        producer.await.unwrap();
        assert_eq!(delivered.load(Ordering::SeqCst), 3);
        assert_eq!(sub.next().await.unwrap().into_data(), json!(1));
        assert_eq!(sub.next().await.unwrap().into_data(), json!(2));
    }

    #[tokio::test]
    async fn test_dropping_sender_ends_stream() {
        let (sender, mut sub) = channel::<Value>("s1", "/t", 2);
        sender.deliver(plain(json!("last"))).await;
        drop(sender);

        assert!(sub.next().await.is_some());
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn test_mistyped_payload_is_skipped_not_fatal() {
        #[derive(serde::Deserialize)]
        struct Quote {
            px: f64,
        }

        let (sender, mut sub) = channel::<Quote>("s1", "/t", 4);
        sender.deliver(plain(json!("not a quote"))).await;
        sender.deliver(plain(json!({"px": 2.5}))).await;

        let got = sub.next().await.unwrap();
        assert_eq!(got.data().px, 2.5);
    }

    #[tokio::test]
    async fn test_batched_collection_payload() {
        let (sender, mut sub) = channel::<Vec<i64>>("s1", "/t", 4);
        sender.deliver(plain(json!([1, 2, 3]))).await;
        assert_eq!(sub.next().await.unwrap().into_data(), vec![1, 2, 3]);
    }
}
