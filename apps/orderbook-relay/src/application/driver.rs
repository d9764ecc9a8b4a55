//! Broadcast Driver
//!
//! One driver runs per actively-subscribed topic. Each tick it fetches a
//! snapshot from the upstream source and pushes it to every client currently
//! registered for the topic, then sleeps the tick interval and re-checks the
//! registry. The driver is purely self-terminating: it exits when the live
//! registry state shows no subscribers remain, and notifies the coordinator
//! so a racing re-subscribe can trigger a restart.
//!
//! # Error policy
//!
//! - A failed fetch is logged and retried on the next tick; it never tears
//!   down delivery for later, healthy ticks.
//! - A failed send skips that one client for the tick; the transport layer's
//!   disconnect handling eventually unsubscribes dead clients.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::application::ports::SnapshotSource;
use crate::domain::client::Topic;
use crate::domain::registry::SubscriptionRegistry;
use crate::infrastructure::metrics;

/// Default interval between broadcast ticks.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(5);

// =============================================================================
// Wire Frame
// =============================================================================

/// Outbound update frame: the snapshot passed through unmodified.
#[derive(Debug, Serialize)]
struct SnapshotFrame<'a> {
    symbol: &'a str,
    #[serde(rename = "orderBook")]
    order_book: &'a serde_json::Value,
}

// =============================================================================
// Broadcast Driver
// =============================================================================

/// Per-topic fetch-and-broadcast loop.
///
/// The coordinator guarantees at most one driver instance is running per
/// topic; the driver itself only decides when to stop.
pub struct BroadcastDriver {
    topic: Topic,
    registry: Arc<SubscriptionRegistry>,
    source: Arc<dyn SnapshotSource>,
    tick_interval: Duration,
    stopped_tx: mpsc::UnboundedSender<Topic>,
    shutdown: CancellationToken,
}

impl BroadcastDriver {
    /// Create a driver for one topic.
    #[must_use]
    pub fn new(
        topic: Topic,
        registry: Arc<SubscriptionRegistry>,
        source: Arc<dyn SnapshotSource>,
        tick_interval: Duration,
        stopped_tx: mpsc::UnboundedSender<Topic>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            topic,
            registry,
            source,
            tick_interval,
            stopped_tx,
            shutdown,
        }
    }

    /// Run the broadcast loop until the topic has no subscribers.
    ///
    /// Delivery across ticks is strictly sequential: tick *n+1* never starts
    /// before tick *n* has finished delivering. On self-termination the
    /// topic is sent on the stopped channel; on process shutdown the loop
    /// exits silently.
    pub async fn run(self) {
        tracing::debug!(topic = %self.topic, "Broadcast driver started");

        loop {
            self.tick().await;

            tokio::select! {
                () = self.shutdown.cancelled() => {
                    tracing::debug!(topic = %self.topic, "Broadcast driver cancelled");
                    return;
                }
                () = tokio::time::sleep(self.tick_interval) => {}
            }

            // Emptiness is re-checked against live registry state so a
            // subscriber that arrived during the sleep keeps the loop alive.
            if !self.registry.has_subscribers(&self.topic) {
                break;
            }
        }

        tracing::debug!(topic = %self.topic, "Broadcast driver stopped");
        let _ = self.stopped_tx.send(self.topic.clone());
    }

    /// One fetch-and-deliver pass.
    async fn tick(&self) {
        match self.source.fetch(&self.topic).await {
            Ok(snapshot) => {
                metrics::record_snapshot_fetched();
                self.deliver(&snapshot);
            }
            Err(e) => {
                metrics::record_fetch_error();
                tracing::warn!(topic = %self.topic, error = %e, "Snapshot fetch failed; retrying next tick");
            }
        }
    }

    /// Push one snapshot to every currently-registered subscriber.
    fn deliver(&self, snapshot: &serde_json::Value) {
        let frame = SnapshotFrame {
            symbol: &self.topic,
            order_book: snapshot,
        };
        let serialized = match serde_json::to_string(&frame) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(topic = %self.topic, error = %e, "Failed to serialize snapshot frame");
                return;
            }
        };

        let mut sent: u64 = 0;
        for handle in self.registry.snapshot_subscribers(&self.topic) {
            if !handle.is_open() {
                tracing::debug!(topic = %self.topic, client_id = handle.id(), "Skipping closed client");
                metrics::record_send_skipped();
                continue;
            }
            match handle.try_send(serialized.clone()) {
                Ok(()) => sent += 1,
                Err(e) => {
                    tracing::debug!(
                        topic = %self.topic,
                        client_id = handle.id(),
                        reason = %e,
                        "Skipping client for this tick"
                    );
                    metrics::record_send_skipped();
                }
            }
        }
        metrics::record_messages_sent(sent);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;
    use crate::application::ports::{MockSnapshotSource, SnapshotError};
    use crate::domain::client::ClientHandle;

    fn subscribed_client(
        registry: &SubscriptionRegistry,
        topic: &str,
        id: u64,
    ) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(16);
        registry.subscribe(topic, ClientHandle::new(id, tx));
        rx
    }

    fn driver_for(
        topic: &str,
        registry: &Arc<SubscriptionRegistry>,
        source: MockSnapshotSource,
        tick_interval: Duration,
    ) -> (BroadcastDriver, mpsc::UnboundedReceiver<Topic>) {
        let (stopped_tx, stopped_rx) = mpsc::unbounded_channel();
        let driver = BroadcastDriver::new(
            topic.to_string(),
            Arc::clone(registry),
            Arc::new(source),
            tick_interval,
            stopped_tx,
            CancellationToken::new(),
        );
        (driver, stopped_rx)
    }

    #[tokio::test(start_paused = true)]
    async fn delivers_snapshot_to_subscriber() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let mut rx = subscribed_client(&registry, "BTC-PERPETUAL", 1);

        let mut source = MockSnapshotSource::new();
        source
            .expect_fetch()
            .returning(|_| Ok(json!({"bids": [[100, 1]], "asks": []})));

        let (driver, _stopped) =
            driver_for("BTC-PERPETUAL", &registry, source, Duration::from_secs(5));
        let handle = tokio::spawn(driver.run());

        let frame = rx.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["symbol"], "BTC-PERPETUAL");
        assert_eq!(value["orderBook"]["bids"][0][0], 100);

        registry.unsubscribe("BTC-PERPETUAL", 1);
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_failure_does_not_stop_the_loop() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let mut rx = subscribed_client(&registry, "BTC-PERPETUAL", 1);

        let mut source = MockSnapshotSource::new();
        let mut calls = 0u32;
        source.expect_fetch().returning(move |topic| {
            calls += 1;
            if calls == 1 {
                Err(SnapshotError::new(topic, "upstream unavailable"))
            } else {
                Ok(json!({"seq": calls}))
            }
        });

        let (driver, _stopped) =
            driver_for("BTC-PERPETUAL", &registry, source, Duration::from_secs(5));
        let handle = tokio::spawn(driver.run());

        // The failed first tick is skipped; the second tick still delivers.
        let frame = rx.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["orderBook"]["seq"], 2);

        registry.unsubscribe("BTC-PERPETUAL", 1);
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stops_within_one_tick_of_emptiness() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let _rx = subscribed_client(&registry, "BTC-PERPETUAL", 1);

        let mut source = MockSnapshotSource::new();
        source.expect_fetch().returning(|_| Ok(json!({})));

        let (driver, mut stopped) =
            driver_for("BTC-PERPETUAL", &registry, source, Duration::from_secs(5));
        let handle = tokio::spawn(driver.run());

        registry.unsubscribe("BTC-PERPETUAL", 1);

        assert_eq!(stopped.recv().await.unwrap(), "BTC-PERPETUAL");
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn keeps_running_when_subscriber_arrives_during_sleep() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let _rx1 = subscribed_client(&registry, "BTC-PERPETUAL", 1);

        let mut source = MockSnapshotSource::new();
        source.expect_fetch().returning(|_| Ok(json!({})));

        let (driver, mut stopped) =
            driver_for("BTC-PERPETUAL", &registry, source, Duration::from_secs(5));
        let handle = tokio::spawn(driver.run());
        tokio::task::yield_now().await;

        // The last subscriber leaves and a new one arrives before the
        // driver's next emptiness check: the loop must survive.
        registry.unsubscribe("BTC-PERPETUAL", 1);
        let mut rx2 = subscribed_client(&registry, "BTC-PERPETUAL", 2);

        assert!(rx2.recv().await.is_some());
        assert!(stopped.try_recv().is_err());

        registry.unsubscribe("BTC-PERPETUAL", 2);
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn slow_client_does_not_block_others() {
        let registry = Arc::new(SubscriptionRegistry::new());

        // Client 1 has a queue of one and never drains it.
        let (full_tx, _full_rx) = mpsc::channel(1);
        full_tx.try_send("occupied".to_string()).unwrap();
        registry.subscribe("BTC-PERPETUAL", ClientHandle::new(1, full_tx));
        let mut rx2 = subscribed_client(&registry, "BTC-PERPETUAL", 2);

        let mut source = MockSnapshotSource::new();
        source.expect_fetch().returning(|_| Ok(json!({"ok": true})));

        let (driver, _stopped) =
            driver_for("BTC-PERPETUAL", &registry, source, Duration::from_secs(5));
        let handle = tokio::spawn(driver.run());

        assert!(rx2.recv().await.is_some());

        registry.unsubscribe("BTC-PERPETUAL", 1);
        registry.unsubscribe("BTC-PERPETUAL", 2);
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_token_exits_without_stop_signal() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let _rx = subscribed_client(&registry, "BTC-PERPETUAL", 1);

        let mut source = MockSnapshotSource::new();
        source.expect_fetch().returning(|_| Ok(json!({})));

        let (stopped_tx, mut stopped_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let driver = BroadcastDriver::new(
            "BTC-PERPETUAL".to_string(),
            Arc::clone(&registry),
            Arc::new(source),
            Duration::from_secs(5),
            stopped_tx,
            shutdown.clone(),
        );
        let handle = tokio::spawn(driver.run());
        tokio::task::yield_now().await;

        shutdown.cancel();
        handle.await.unwrap();

        assert!(stopped_rx.try_recv().is_err());
    }
}
