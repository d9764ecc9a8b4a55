//! Application Layer - Broadcast scheduling and port definitions.
//!
//! This layer drives the per-topic broadcast lifecycle over the domain
//! registry and defines the ports through which the core reaches external
//! systems.

/// Per-topic fetch-and-broadcast loop.
pub mod driver;

/// Port interfaces for external systems (snapshot source).
pub mod ports;

/// Topic lifecycle coordination: driver start, stop, and restart.
pub mod coordinator;
