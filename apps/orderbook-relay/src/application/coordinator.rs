//! Relay Coordinator
//!
//! Owns the subscription registry and the table of running broadcast
//! drivers. Connection tasks feed it subscribe/unsubscribe/disconnect
//! events; it starts a driver exactly once when a topic gains its first
//! subscriber and reaps driver stop notifications.
//!
//! # Lifecycle per topic
//!
//! `NoDriver -> DriverRunning -> NoDriver`, re-enterable any number of
//! times. The coordinator never force-kills a driver (that could abort a
//! delivery mid-tick); drivers self-terminate on observed emptiness. A stop
//! notification that races a new subscribe is resolved by restarting a
//! fresh driver immediately, so a resurrected topic is never left with
//! subscribers but no driver.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::application::driver::BroadcastDriver;
use crate::application::ports::SnapshotSource;
use crate::domain::client::{ClientHandle, ClientId, Topic};
use crate::domain::registry::SubscriptionRegistry;
use crate::infrastructure::metrics;

// =============================================================================
// Relay Coordinator
// =============================================================================

/// Starts and reaps per-topic broadcast drivers as topics transition
/// between "has subscribers" and "has none".
///
/// Shared via `Arc` between every connection task and the stop-listener
/// task; the driver table lock is never held across an await point.
pub struct RelayCoordinator {
    registry: Arc<SubscriptionRegistry>,
    source: Arc<dyn SnapshotSource>,
    tick_interval: Duration,
    drivers: Mutex<HashMap<Topic, tokio::task::JoinHandle<()>>>,
    stopped_tx: mpsc::UnboundedSender<Topic>,
    stopped_rx: Mutex<Option<mpsc::UnboundedReceiver<Topic>>>,
    shutdown: CancellationToken,
}

impl RelayCoordinator {
    /// Create a coordinator over a registry and snapshot source.
    #[must_use]
    pub fn new(
        registry: Arc<SubscriptionRegistry>,
        source: Arc<dyn SnapshotSource>,
        tick_interval: Duration,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        let (stopped_tx, stopped_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            registry,
            source,
            tick_interval,
            drivers: Mutex::new(HashMap::new()),
            stopped_tx,
            stopped_rx: Mutex::new(Some(stopped_rx)),
            shutdown,
        })
    }

    /// The registry this coordinator owns.
    #[must_use]
    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Number of drivers currently in the running table.
    #[must_use]
    pub fn driver_count(&self) -> usize {
        self.drivers.lock().len()
    }

    /// Whether a driver is currently tracked for a topic.
    #[must_use]
    pub fn is_driver_running(&self, topic: &str) -> bool {
        self.drivers.lock().contains_key(topic)
    }

    /// Handle a subscribe event from a connection task.
    ///
    /// Starts a broadcast driver iff this was the topic's first subscriber
    /// and no driver is already tracked for it. A driver that is winding
    /// down but not yet reaped is left alone; the stop-notification path
    /// restarts it once the stop lands.
    pub fn handle_subscribe(&self, topic: &str, handle: ClientHandle) {
        let client_id = handle.id();
        let first = self.registry.subscribe(topic, handle);
        tracing::info!(client_id, topic, "Client subscribed");

        if !first {
            return;
        }
        metrics::set_topics_active(self.registry.stats().topic_count);

        let mut drivers = self.drivers.lock();
        if drivers.contains_key(topic) {
            // The previous driver saw an empty set and is about to stop;
            // its stop notification will find the new subscriber and
            // restart. Starting here would break the one-driver invariant.
            tracing::debug!(topic, "Driver stop in flight; restart deferred to reap");
            return;
        }
        self.spawn_driver(&mut drivers, topic);
    }

    /// Handle an unsubscribe event from a connection task.
    ///
    /// The driver is not stopped here; it observes the empty set on its own
    /// next tick.
    pub fn handle_unsubscribe(&self, topic: &str, client_id: ClientId) {
        let now_empty = self.registry.unsubscribe(topic, client_id);
        tracing::info!(client_id, topic, "Client unsubscribed");
        if now_empty {
            tracing::debug!(topic, "Last subscriber left; driver will stop on its next tick");
            metrics::set_topics_active(self.registry.stats().topic_count);
        }
    }

    /// Handle a connection-closed event: a batch of unsubscribes.
    pub fn handle_disconnect(&self, client_id: ClientId) {
        let emptied = self.registry.disconnect_all(client_id);
        tracing::info!(client_id, topics_emptied = emptied.len(), "Client disconnected");
        for topic in &emptied {
            tracing::debug!(topic, "Last subscriber left; driver will stop on its next tick");
        }
        if !emptied.is_empty() {
            metrics::set_topics_active(self.registry.stats().topic_count);
        }
    }

    /// Consume driver stop notifications until shutdown.
    ///
    /// Each notification removes the topic's driver-table entry and then
    /// re-checks the live registry: a topic that regained subscribers while
    /// its driver was winding down gets a fresh driver immediately.
    pub async fn run(self: Arc<Self>) {
        let Some(mut stopped_rx) = self.stopped_rx.lock().take() else {
            tracing::error!("Coordinator stop listener started twice");
            return;
        };

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => {
                    tracing::info!("Coordinator stopped");
                    return;
                }
                topic = stopped_rx.recv() => {
                    // The send half lives in self, so recv can't yield None
                    // before cancellation.
                    let Some(topic) = topic else { return };
                    self.reap_driver(&topic);
                }
            }
        }
    }

    /// Remove a stopped driver and restart it if the topic was resurrected.
    fn reap_driver(&self, topic: &str) {
        let mut drivers = self.drivers.lock();
        let removed = drivers.remove(topic);
        assert!(
            removed.is_some(),
            "driver stop notification for untracked topic {topic}"
        );
        metrics::record_driver_stopped();

        if self.registry.has_subscribers(topic) {
            tracing::info!(topic, "Topic resubscribed during driver shutdown; restarting");
            self.spawn_driver(&mut drivers, topic);
        }
    }

    /// Spawn a driver for a topic and track it. Caller holds the table lock.
    fn spawn_driver(&self, drivers: &mut HashMap<Topic, tokio::task::JoinHandle<()>>, topic: &str) {
        let driver = BroadcastDriver::new(
            topic.to_string(),
            Arc::clone(&self.registry),
            Arc::clone(&self.source),
            self.tick_interval,
            self.stopped_tx.clone(),
            self.shutdown.clone(),
        );
        let previous = drivers.insert(topic.to_string(), tokio::spawn(driver.run()));
        assert!(
            previous.is_none(),
            "second broadcast driver spawned for topic {topic}"
        );
        metrics::record_driver_started();
        tracing::info!(topic, "Broadcast driver started");
    }
}

// =============================================================================
// Tests
// =============================================================================
