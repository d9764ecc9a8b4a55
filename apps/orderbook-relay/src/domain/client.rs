//! Client Handle Types
//!
//! The relay core's view of one connected subscriber: an opaque identity,
//! a best-effort send capability, and a liveness check.
//!
//! # Ownership
//!
//! The connection task owns the socket and the receiving half of the
//! outbound queue. The registry and broadcast drivers hold cheap clones of
//! the handle; dropping every clone closes the queue, which the writer task
//! observes as end-of-stream.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

// =============================================================================
// Types
// =============================================================================

/// Unique identifier for a connected client.
pub type ClientId = u64;

/// A topic string (an instrument symbol such as `BTC-PERPETUAL`).
pub type Topic = String;

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a process-unique client identifier.
#[must_use]
pub fn allocate_client_id() -> ClientId {
    NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed)
}

// =============================================================================
// Send Errors
// =============================================================================

/// Reasons a best-effort send to a client can be skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ClientSendError {
    /// The client's outbound queue is full; the frame is dropped for this tick.
    #[error("outbound queue full")]
    QueueFull,

    /// The client's connection has closed.
    #[error("connection closed")]
    Closed,
}

// =============================================================================
// Client Handle
// =============================================================================

/// Handle to one connected subscriber.
///
/// Sends are non-blocking: a full queue or a closed connection drops the
/// frame and reports why, so a slow or dead client can never stall a
/// broadcast tick.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    id: ClientId,
    outbound: mpsc::Sender<String>,
}

impl ClientHandle {
    /// Create a handle over a connection's outbound queue.
    #[must_use]
    pub const fn new(id: ClientId, outbound: mpsc::Sender<String>) -> Self {
        Self { id, outbound }
    }

    /// The client's unique identifier.
    #[must_use]
    pub const fn id(&self) -> ClientId {
        self.id
    }

    /// Whether the underlying connection is still open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.outbound.is_closed()
    }

    /// Queue one serialized frame for delivery, without blocking.
    ///
    /// # Errors
    ///
    /// Returns `ClientSendError` if the frame was dropped because the queue
    /// is full or the connection has closed.
    pub fn try_send(&self, frame: String) -> Result<(), ClientSendError> {
        self.outbound.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ClientSendError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => ClientSendError::Closed,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn make_handle(capacity: usize) -> (ClientHandle, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        (ClientHandle::new(allocate_client_id(), tx), rx)
    }

    #[test]
    fn allocated_ids_are_unique() {
        let a = allocate_client_id();
        let b = allocate_client_id();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn try_send_delivers_frame() {
        let (handle, mut rx) = make_handle(4);

        handle.try_send("hello".to_string()).unwrap();

        assert_eq!(rx.recv().await.unwrap(), "hello");
    }

    #[test]
    fn try_send_full_queue_reports_skip() {
        let (handle, _rx) = make_handle(1);

        handle.try_send("first".to_string()).unwrap();
        let err = handle.try_send("second".to_string()).unwrap_err();

        assert_eq!(err, ClientSendError::QueueFull);
    }

    #[test]
    fn try_send_after_close_reports_closed() {
        let (handle, rx) = make_handle(1);
        drop(rx);

        let err = handle.try_send("frame".to_string()).unwrap_err();

        assert_eq!(err, ClientSendError::Closed);
        assert!(!handle.is_open());
    }

    #[test]
    fn handle_is_open_while_receiver_lives() {
        let (handle, _rx) = make_handle(1);
        assert!(handle.is_open());
    }

    #[test]
    fn clones_share_the_connection() {
        let (handle, rx) = make_handle(1);
        let clone = handle.clone();
        assert_eq!(handle.id(), clone.id());

        drop(rx);
        assert!(!clone.is_open());
    }
}
