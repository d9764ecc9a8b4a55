//! Client Subscription Protocol
//!
//! Inbound messages are single JSON objects carrying an `action` and a
//! `symbol`. Anything else is rejected with an error reply and never
//! touches the registry.
//!
//! ```json
//! {"action": "subscribe", "symbol": "BTC-PERPETUAL"}
//! ```
//!
//! Rejections mirror the wire contract exactly:
//!
//! - unknown action or missing/empty symbol ->
//!   `{"error": "Invalid action or missing symbol"}`
//! - unparsable payload -> `{"error": "Invalid message format"}`

use serde::{Deserialize, Serialize};

// =============================================================================
// Requests
// =============================================================================

/// A well-formed client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientRequest {
    /// Start streaming a topic to this client.
    Subscribe {
        /// Instrument symbol to stream.
        symbol: String,
    },
    /// Stop streaming a topic to this client.
    Unsubscribe {
        /// Instrument symbol to stop.
        symbol: String,
    },
}

/// Why an inbound message was rejected.
///
/// The `Display` text is the exact wire-level error string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// The payload was not a JSON object.
    #[error("Invalid message format")]
    MalformedPayload,

    /// The action was unknown or the symbol missing/empty.
    #[error("Invalid action or missing symbol")]
    InvalidAction,
}

/// Error reply sent back to the offending client.
#[derive(Debug, Serialize)]
struct ErrorReply<'a> {
    error: &'a str,
}

impl RequestError {
    /// Serialize the rejection as the reply frame for the sender.
    #[must_use]
    pub fn to_frame(self) -> String {
        let message = self.to_string();
        let reply = ErrorReply { error: &message };
        // A single-field struct of strings cannot fail to serialize.
        serde_json::to_string(&reply).unwrap_or_else(|_| String::from("{\"error\":\"internal\"}"))
    }
}

#[derive(Debug, Deserialize)]
struct RawRequest {
    action: Option<String>,
    symbol: Option<String>,
}

/// Parse one inbound text frame into a request.
///
/// # Errors
///
/// Returns the `RequestError` whose reply frame must be sent back to the
/// client; parsing has no side effects.
pub fn parse_request(raw: &str) -> Result<ClientRequest, RequestError> {
    let request: RawRequest =
        serde_json::from_str(raw).map_err(|_| RequestError::MalformedPayload)?;

    let symbol = match request.symbol {
        Some(symbol) if !symbol.is_empty() => symbol,
        _ => return Err(RequestError::InvalidAction),
    };

    match request.action.as_deref() {
        Some("subscribe") => Ok(ClientRequest::Subscribe { symbol }),
        Some("unsubscribe") => Ok(ClientRequest::Unsubscribe { symbol }),
        _ => Err(RequestError::InvalidAction),
    }
}

// =============================================================================
// Tests
// =============================================================================
