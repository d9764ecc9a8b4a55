//! Deribit API Types
//!
//! Request and response shapes for the `/api/v2` endpoints the relay uses.
//! Snapshot payloads stay opaque (`serde_json::Value`); only the envelope
//! and the order-management parameters are typed.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Response Envelope
// =============================================================================

/// Response envelope returned by every Deribit endpoint.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    /// Successful result payload.
    pub result: Option<T>,
    /// Error payload on failure.
    pub error: Option<ApiError>,
}

/// Error payload inside a Deribit response envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    /// Numeric error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
}

/// Result of `public/auth` with the client-credentials grant.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResult {
    /// Bearer token for private endpoints.
    pub access_token: String,
    /// Token lifetime in seconds.
    #[serde(default)]
    pub expires_in: u64,
    /// Refresh token, unused by the relay.
    #[serde(default)]
    pub refresh_token: Option<String>,
}

// =============================================================================
// Order Management Parameters
// =============================================================================

/// Parameters for `private/buy`.
#[derive(Debug, Clone, Serialize)]
pub struct OrderRequest {
    /// Instrument to trade.
    pub instrument_name: String,
    /// Order amount in contract units.
    pub amount: Decimal,
    /// Order type (`limit`, `market`, ...).
    #[serde(rename = "type")]
    pub order_type: String,
    /// Limit price, if applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    /// User-defined order label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Parameters for `private/edit`.
#[derive(Debug, Clone, Serialize)]
pub struct EditRequest {
    /// Order to modify.
    pub order_id: String,
    /// New amount.
    pub amount: Decimal,
    /// New price.
    pub price: Decimal,
}

/// Parameters for `private/get_positions`.
#[derive(Debug, Clone, Serialize)]
pub struct PositionsQuery {
    /// Settlement currency, e.g. `BTC`.
    pub currency: String,
    /// Instrument kind filter, e.g. `future`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_with_result() {
        let body = r#"{"result": {"access_token": "tok", "expires_in": 900}}"#;
        let envelope: ApiResponse<AuthResult> = serde_json::from_str(body).unwrap();

        assert!(envelope.error.is_none());
        let auth = envelope.result.unwrap();
        assert_eq!(auth.access_token, "tok");
        assert_eq!(auth.expires_in, 900);
    }

    #[test]
    fn envelope_with_error() {
        let body = r#"{"error": {"code": 13004, "message": "invalid_credentials"}}"#;
        let envelope: ApiResponse<AuthResult> = serde_json::from_str(body).unwrap();

        assert!(envelope.result.is_none());
        let error = envelope.error.unwrap();
        assert_eq!(error.code, 13004);
        assert_eq!(error.message, "invalid_credentials");
    }

    #[test]
    fn order_request_renames_type_and_skips_absent_fields() {
        let order = OrderRequest {
            instrument_name: "BTC-PERPETUAL".to_string(),
            amount: Decimal::from(40),
            order_type: "limit".to_string(),
            price: Some(Decimal::from(10)),
            label: None,
        };

        let value = serde_json::to_value(&order).unwrap();
        assert_eq!(value["instrument_name"], "BTC-PERPETUAL");
        assert_eq!(value["type"], "limit");
        assert_eq!(value["amount"], "40");
        assert_eq!(value["price"], "10");
        assert!(value.get("label").is_none());
    }

    #[test]
    fn positions_query_skips_absent_kind() {
        let query = PositionsQuery {
            currency: "BTC".to_string(),
            kind: None,
        };

        let value = serde_json::to_value(&query).unwrap();
        assert_eq!(value["currency"], "BTC");
        assert!(value.get("kind").is_none());
    }
}
