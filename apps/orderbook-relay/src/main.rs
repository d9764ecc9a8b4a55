//! Orderbook Relay Binary
//!
//! Starts the Deribit order book relay.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin orderbook-relay
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `DERIBIT_CLIENT_ID`: Deribit API client id
//! - `DERIBIT_CLIENT_SECRET`: Deribit API client secret
//!
//! ## Optional
//! - `DERIBIT_BASE_URL`: API base URL (default: <https://test.deribit.com>)
//! - `RELAY_WS_PORT`: WebSocket server port (default: 8080)
//! - `RELAY_HEALTH_PORT`: Health check HTTP port (default: 8081)
//! - `RELAY_TICK_INTERVAL_SECS`: Broadcast tick interval (default: 5)
//! - `RELAY_ORDER_BOOK_DEPTH`: Order book depth per snapshot (default: 5)
//! - `RELAY_SEND_QUEUE_CAPACITY`: Per-client outbound queue size (default: 64)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `OTEL_SERVICE_NAME`: Service name (default: orderbook-relay)
//! - `RUST_LOG`: Log level (default: info)

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use orderbook_relay::infrastructure::telemetry;
use orderbook_relay::{
    DeribitClient, HealthServer, HealthServerState, RelayConfig, RelayCoordinator, RelayServer,
    SubscriptionRegistry, init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Orderbook Relay");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics();

    let config = RelayConfig::from_env().context("failed to load configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Authenticate with the upstream API before serving anything; a relay
    // that cannot reach its snapshot source has nothing to offer.
    let deribit = Arc::new(
        DeribitClient::new(config.credentials.clone(), &config.deribit)
            .context("failed to build Deribit client")?,
    );
    deribit
        .authenticate()
        .await
        .context("failed to authenticate with Deribit")?;

    // Registry and coordinator
    let registry = Arc::new(SubscriptionRegistry::new());
    let coordinator = RelayCoordinator::new(
        Arc::clone(&registry),
        Arc::clone(&deribit) as Arc<dyn orderbook_relay::SnapshotSource>,
        config.broadcast.tick_interval,
        shutdown_token.clone(),
    );
    tokio::spawn(Arc::clone(&coordinator).run());

    // Health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&registry),
        Arc::clone(&coordinator),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    // WebSocket server
    let ws_addr: SocketAddr = SocketAddr::from(([0, 0, 0, 0], config.server.ws_port));
    let relay_server = RelayServer::bind(
        ws_addr,
        Arc::clone(&coordinator),
        config.broadcast.send_queue_capacity,
        shutdown_token.clone(),
    )
    .await
    .context("failed to bind WebSocket server")?;
    tokio::spawn(async move {
        if let Err(e) = relay_server.run().await {
            tracing::error!(error = %e, "WebSocket server error");
        }
    });

    tracing::info!("Relay ready");

    await_shutdown(shutdown_token).await;

    tracing::info!("Relay stopped");
    Ok(())
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &RelayConfig) {
    tracing::info!(
        base_url = %config.deribit.base_url,
        ws_port = config.server.ws_port,
        health_port = config.server.health_port,
        tick_interval_secs = config.broadcast.tick_interval.as_secs(),
        order_book_depth = config.deribit.order_book_depth,
        "Configuration loaded"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
