#![cfg_attr(
    test,
    allow(
        missing_docs,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Orderbook Relay - Market Data Fan-Out
//!
//! A WebSocket relay that polls Deribit order book snapshots and fans them
//! out to many real-time subscribers. Clients subscribe to instrument
//! symbols; each actively-subscribed symbol gets exactly one broadcast
//! driver that fetches and delivers a snapshot per tick until the last
//! subscriber leaves.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Subscription state and the client-handle abstraction
//!   - `client`: Per-connection handle with best-effort send
//!   - `registry`: Topic → subscriber-set bookkeeping
//!
//! - **Application**: Broadcast scheduling and port definitions
//!   - `ports`: Snapshot source interface
//!   - `driver`: Per-topic fetch-and-broadcast loop
//!   - `coordinator`: Driver lifecycle (start, reap, restart)
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `deribit`: REST client for snapshots and order pass-throughs
//!   - `ws`: WebSocket server and subscription protocol
//!   - `config`: Environment-based configuration
//!   - `health`: Health check HTTP endpoint
//!
//! # Data Flow
//!
//! ```text
//!                  ┌─────────────┐     ┌─────────────┐
//! Deribit REST ───►│  Broadcast  │────►│  WebSocket  │──► Client 1
//!  (per topic)     │   Drivers   │     │   Server    │──► Client 2
//!                  └─────────────┘     └─────────────┘──► Client N
//!                         ▲                   │
//!                         └── Registry ◄──────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Subscription state with no I/O.
pub mod domain;

/// Application layer - Broadcast scheduling and ports.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::client::{ClientHandle, ClientId, ClientSendError, Topic, allocate_client_id};
pub use domain::registry::{RegistryStats, SubscriptionRegistry};

// Application types
pub use application::coordinator::RelayCoordinator;
pub use application::driver::{BroadcastDriver, DEFAULT_TICK_INTERVAL};
pub use application::ports::{SnapshotError, SnapshotSource};

// Infrastructure config
pub use infrastructure::config::{
    BroadcastSettings, ConfigError, Credentials, DeribitSettings, RelayConfig, ServerSettings,
};

// Deribit client
pub use infrastructure::deribit::{DeribitClient, DeribitError};

// WebSocket server (for integration tests)
pub use infrastructure::ws::{ClientRequest, RelayServer, RequestError, WsServerError};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
