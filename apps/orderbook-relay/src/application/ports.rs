//! Port Interfaces
//!
//! Interfaces for external systems following the Hexagonal Architecture
//! pattern. The broadcast driver only ever sees these contracts; the
//! Deribit adapter in the infrastructure layer implements them.

use async_trait::async_trait;

// =============================================================================
// Errors
// =============================================================================

/// Error returned by a snapshot source.
///
/// Fetch failures are transient from the core's perspective: the driver
/// logs them and retries on its next tick, and clients never observe them.
#[derive(Debug, Clone, thiserror::Error)]
#[error("snapshot fetch failed for {topic}: {reason}")]
pub struct SnapshotError {
    /// The topic whose fetch failed.
    pub topic: String,
    /// Human-readable failure reason.
    pub reason: String,
}

impl SnapshotError {
    /// Create a new snapshot error.
    #[must_use]
    pub fn new(topic: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Snapshot Source
// =============================================================================

/// Upstream source of topic snapshots.
///
/// Stateless from the core's perspective: each call fetches one current
/// snapshot for the topic or fails independently. The payload is opaque to
/// the relay and passed through to subscribers unmodified.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Fetch the current snapshot for a topic.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError` if the upstream request fails; the error
    /// carries no state and the next call may succeed.
    async fn fetch(&self, topic: &str) -> Result<serde_json::Value, SnapshotError>;
}
