//! WebSocket Relay Server
//!
//! Accepts subscriber connections and runs one read task plus one write
//! task per connection. The read task parses protocol messages and feeds
//! subscribe/unsubscribe events to the coordinator; the write task drains
//! the client's bounded outbound queue into the socket.
//!
//! The registry only ever sees `ClientHandle` clones; the connection tasks
//! here own the socket halves, so a dying connection tears itself down
//! through the coordinator's disconnect path.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::application::coordinator::RelayCoordinator;
use crate::domain::client::{ClientHandle, allocate_client_id};
use crate::infrastructure::metrics;
use crate::infrastructure::ws::protocol::{ClientRequest, parse_request};

// =============================================================================
// Error Type
// =============================================================================

/// WebSocket server errors.
#[derive(Debug, thiserror::Error)]
pub enum WsServerError {
    /// Failed to bind the listen address.
    #[error("failed to bind {0}: {1}")]
    BindFailed(SocketAddr, String),

    /// Listener failed while running.
    #[error("listener error: {0}")]
    ListenerFailed(String),
}

// =============================================================================
// Relay Server
// =============================================================================

/// WebSocket server fronting the relay coordinator.
pub struct RelayServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    coordinator: Arc<RelayCoordinator>,
    send_queue_capacity: usize,
    shutdown: CancellationToken,
}

impl RelayServer {
    /// Bind the listen address.
    ///
    /// # Errors
    ///
    /// Returns `WsServerError::BindFailed` if the address cannot be bound.
    pub async fn bind(
        addr: SocketAddr,
        coordinator: Arc<RelayCoordinator>,
        send_queue_capacity: usize,
        shutdown: CancellationToken,
    ) -> Result<Self, WsServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| WsServerError::BindFailed(addr, e.to_string()))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| WsServerError::BindFailed(addr, e.to_string()))?;

        Ok(Self {
            listener,
            local_addr,
            coordinator,
            send_queue_capacity,
            shutdown,
        })
    }

    /// The actually-bound address (useful with port 0).
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until cancelled.
    ///
    /// Transient accept errors are logged and the loop continues.
    ///
    /// # Errors
    ///
    /// Returns `WsServerError::ListenerFailed` if the listener breaks
    /// irrecoverably.
    pub async fn run(self) -> Result<(), WsServerError> {
        tracing::info!(addr = %self.local_addr, "WebSocket server listening");

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let coordinator = Arc::clone(&self.coordinator);
                            let capacity = self.send_queue_capacity;
                            let shutdown = self.shutdown.clone();
                            tokio::spawn(async move {
                                handle_connection(stream, peer, coordinator, capacity, shutdown)
                                    .await;
                            });
                        }
                        Err(e) => {
                            // Transient accept errors (EMFILE and friends)
                            // should not kill the listener.
                            tracing::warn!(error = %e, "Failed to accept connection");
                        }
                    }
                }
            }
        }

        tracing::info!("WebSocket server stopped");
        Ok(())
    }
}

// =============================================================================
// Per-Connection Handling
// =============================================================================

static CONNECTED_CLIENTS: AtomicUsize = AtomicUsize::new(0);

/// Handshake, then pump one connection until it closes.
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    coordinator: Arc<RelayCoordinator>,
    send_queue_capacity: usize,
    shutdown: CancellationToken,
) {
    let ws_stream = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::warn!(peer = %peer, error = %e, "WebSocket handshake failed");
            return;
        }
    };
    let (mut write, mut read) = ws_stream.split();

    let client_id = allocate_client_id();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(send_queue_capacity);
    let handle = ClientHandle::new(client_id, outbound_tx);

    tracing::info!(client_id, peer = %peer, "Client connected");
    metrics::set_clients_connected(CONNECTED_CLIENTS.fetch_add(1, Ordering::Relaxed) + 1);

    // Writer task: drains the outbound queue into the socket. Ends when
    // every sender clone is gone or the socket rejects a frame.
    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if write.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
        let _ = write.close().await;
    });

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            message = read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        dispatch(&coordinator, &handle, &text);
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {
                        // Binary and ping/pong frames carry no protocol
                        // meaning for the relay.
                    }
                    Some(Err(e)) => {
                        tracing::debug!(client_id, error = %e, "WebSocket read error");
                        break;
                    }
                }
            }
        }
    }

    coordinator.handle_disconnect(client_id);
    metrics::set_clients_connected(CONNECTED_CLIENTS.fetch_sub(1, Ordering::Relaxed) - 1);

    // The registry no longer holds clones; dropping ours closes the
    // outbound queue and lets the writer finish.
    drop(handle);
    let _ = writer.await;
    tracing::info!(client_id, "Client connection closed");
}

/// Route one parsed frame; replies with the protocol error on rejection.
fn dispatch(coordinator: &Arc<RelayCoordinator>, handle: &ClientHandle, raw: &str) {
    match parse_request(raw) {
        Ok(ClientRequest::Subscribe { symbol }) => {
            coordinator.handle_subscribe(&symbol, handle.clone());
        }
        Ok(ClientRequest::Unsubscribe { symbol }) => {
            coordinator.handle_unsubscribe(&symbol, handle.id());
        }
        Err(reject) => {
            tracing::debug!(client_id = handle.id(), reason = %reject, "Rejected client message");
            if handle.try_send(reject.to_frame()).is_err() {
                tracing::debug!(client_id = handle.id(), "Could not deliver error reply");
            }
        }
    }
}
