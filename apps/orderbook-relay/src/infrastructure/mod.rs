//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations behind the port
//! interfaces defined in the application layer, plus the serving surface
//! of the relay.

/// Deribit REST client (snapshot source and order pass-throughs).
pub mod deribit;

/// WebSocket server and subscription protocol.
pub mod ws;

/// Configuration loading.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;
