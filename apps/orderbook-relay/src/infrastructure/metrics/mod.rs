//! Prometheus Metrics Module
//!
//! Exposes application metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Snapshots**: upstream fetch successes and failures
//! - **Delivery**: frames sent to clients and per-tick skips
//! - **Lifecycle**: broadcast driver starts and stops
//! - **Connections**: connected clients and actively-subscribed topics
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let builder = PrometheusBuilder::new();
            let handle = builder
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "relay_snapshots_fetched_total",
        "Total order book snapshots fetched from the upstream source"
    );
    describe_counter!(
        "relay_snapshot_fetch_errors_total",
        "Total failed upstream snapshot fetches (retried next tick)"
    );
    describe_counter!(
        "relay_messages_sent_total",
        "Total snapshot frames queued to subscribers"
    );
    describe_counter!(
        "relay_sends_skipped_total",
        "Total per-tick deliveries skipped (closed client or full queue)"
    );
    describe_counter!(
        "relay_drivers_started_total",
        "Total broadcast drivers started"
    );
    describe_counter!(
        "relay_drivers_stopped_total",
        "Total broadcast drivers stopped"
    );
    describe_gauge!(
        "relay_clients_connected",
        "Number of currently connected WebSocket clients"
    );
    describe_gauge!(
        "relay_topics_active",
        "Number of topics with at least one subscriber"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a successful upstream snapshot fetch.
pub fn record_snapshot_fetched() {
    counter!("relay_snapshots_fetched_total").increment(1);
}

/// Record a failed upstream snapshot fetch.
pub fn record_fetch_error() {
    counter!("relay_snapshot_fetch_errors_total").increment(1);
}

/// Record frames queued to subscribers in one tick.
pub fn record_messages_sent(count: u64) {
    counter!("relay_messages_sent_total").increment(count);
}

/// Record one delivery skipped for a tick.
pub fn record_send_skipped() {
    counter!("relay_sends_skipped_total").increment(1);
}

/// Record a broadcast driver start.
pub fn record_driver_started() {
    counter!("relay_drivers_started_total").increment(1);
}

/// Record a broadcast driver stop.
pub fn record_driver_stopped() {
    counter!("relay_drivers_stopped_total").increment(1);
}

/// Update the connected client gauge.
pub fn set_clients_connected(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("relay_clients_connected").set(count as f64);
}

/// Update the actively-subscribed topic gauge.
pub fn set_topics_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("relay_topics_active").set(count as f64);
}
