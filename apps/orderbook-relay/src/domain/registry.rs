//! Subscription Registry
//!
//! Tracks which client is interested in which topic. The registry is the
//! single source of truth for "does topic X have any subscriber right now";
//! broadcast drivers consult it on every tick and the coordinator acts on
//! the first-subscriber / now-empty transition signals it reports.
//!
//! # Design
//!
//! - A topic key exists in the map if and only if it has at least one
//!   subscriber; entries are removed eagerly when their set empties.
//! - Membership is unique per (topic, client): duplicate subscribes are
//!   idempotent and report "not first".
//! - The registry never performs I/O and never starts or stops drivers.

use std::collections::{HashMap, HashSet, hash_map::Entry};

use parking_lot::RwLock;

use super::client::{ClientHandle, ClientId, Topic};

// =============================================================================
// Statistics
// =============================================================================

/// Point-in-time registry statistics for health reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Number of topics with at least one subscriber.
    pub topic_count: usize,
    /// Number of distinct subscribed clients across all topics.
    pub client_count: usize,
}

// =============================================================================
// Subscription Registry
// =============================================================================

/// Thread-safe mapping from topic to its current subscriber set.
///
/// All operations take the internal lock briefly and never block on I/O,
/// so the registry can be shared freely between connection tasks and
/// broadcast drivers.
///
/// # Example
///
/// ```rust
/// use orderbook_relay::domain::client::ClientHandle;
/// use orderbook_relay::domain::registry::SubscriptionRegistry;
///
/// let registry = SubscriptionRegistry::new();
/// let (tx, _rx) = tokio::sync::mpsc::channel(8);
/// let handle = ClientHandle::new(1, tx);
///
/// // First subscriber starts a driver.
/// assert!(registry.subscribe("BTC-PERPETUAL", handle.clone()));
/// // Re-subscribing is an idempotent no-op.
/// assert!(!registry.subscribe("BTC-PERPETUAL", handle));
///
/// // Last unsubscribe reports the now-empty transition.
/// assert!(registry.unsubscribe("BTC-PERPETUAL", 1));
/// ```
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    topics: RwLock<HashMap<Topic, HashMap<ClientId, ClientHandle>>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a client to a topic's subscriber set.
    ///
    /// Returns `true` iff this was the topic's first subscriber (the signal
    /// to start a broadcast driver). Re-subscribing an already-subscribed
    /// client is a no-op returning `false`.
    pub fn subscribe(&self, topic: &str, handle: ClientHandle) -> bool {
        let mut topics = self.topics.write();
        match topics.entry(topic.to_string()) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().entry(handle.id()).or_insert(handle);
                false
            }
            Entry::Vacant(entry) => {
                entry.insert(HashMap::from([(handle.id(), handle)]));
                true
            }
        }
    }

    /// Remove a client from a topic's subscriber set.
    ///
    /// Returns `true` iff the set became empty and the topic entry was
    /// removed (the signal that the topic's driver may stop). Removing a
    /// client that was not subscribed is a no-op returning `false`.
    pub fn unsubscribe(&self, topic: &str, client: ClientId) -> bool {
        let mut topics = self.topics.write();
        let Some(subscribers) = topics.get_mut(topic) else {
            return false;
        };
        if subscribers.remove(&client).is_none() {
            return false;
        }
        if subscribers.is_empty() {
            topics.remove(topic);
            return true;
        }
        false
    }

    /// Remove a client from every topic it is subscribed to.
    ///
    /// Returns the topics whose subscriber sets became empty, as a batch of
    /// now-empty signals.
    pub fn disconnect_all(&self, client: ClientId) -> Vec<Topic> {
        let mut topics = self.topics.write();
        let mut emptied = Vec::new();
        topics.retain(|topic, subscribers| {
            if subscribers.remove(&client).is_some() && subscribers.is_empty() {
                emptied.push(topic.clone());
                return false;
            }
            true
        });
        emptied
    }

    /// The current subscriber set for a topic, for one broadcast pass.
    ///
    /// Reflects every subscribe/unsubscribe that happened before the call;
    /// operations racing with it land on the next tick.
    #[must_use]
    pub fn snapshot_subscribers(&self, topic: &str) -> Vec<ClientHandle> {
        self.topics
            .read()
            .get(topic)
            .map(|subscribers| subscribers.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether a topic currently has any subscriber.
    ///
    /// Reads live registry state; drivers call this each tick to decide
    /// whether to keep running.
    #[must_use]
    pub fn has_subscribers(&self, topic: &str) -> bool {
        self.topics.read().contains_key(topic)
    }

    /// Current statistics for health reporting.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let topics = self.topics.read();
        let clients: HashSet<ClientId> = topics
            .values()
            .flat_map(|subscribers| subscribers.keys().copied())
            .collect();
        RegistryStats {
            topic_count: topics.len(),
            client_count: clients.len(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
