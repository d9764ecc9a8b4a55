//! Deribit REST Adapter
//!
//! Authenticated request/response client for the Deribit `/api/v2` HTTP
//! API. Provides the order book snapshot source used by broadcast drivers
//! plus the pass-through order-management operations (buy, edit, cancel,
//! positions).

mod client;
mod types;

pub use client::{DeribitClient, DeribitError};
pub use types::{ApiError, AuthResult, EditRequest, OrderRequest, PositionsQuery};
