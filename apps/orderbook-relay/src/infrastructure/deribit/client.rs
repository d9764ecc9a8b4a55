//! Deribit HTTP Client
//!
//! Thin wrapper over `reqwest` for the Deribit `/api/v2` API. All endpoints
//! are GET requests with query parameters; private endpoints carry a bearer
//! token obtained via the client-credentials grant.
//!
//! A rejected token (HTTP 401) triggers exactly one re-authentication and
//! retry; a second rejection surfaces as `AuthenticationFailed`.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::types::{ApiResponse, AuthResult, EditRequest, OrderRequest, PositionsQuery};
use crate::application::ports::{SnapshotError, SnapshotSource};
use crate::infrastructure::config::{Credentials, DeribitSettings};

const PUBLIC_API: &str = "/api/v2/public";
const PRIVATE_API: &str = "/api/v2/private";

// =============================================================================
// Error Type
// =============================================================================

/// Errors returned by the Deribit client.
#[derive(Debug, thiserror::Error)]
pub enum DeribitError {
    /// Transport-level failure (DNS, connect, timeout, body read).
    #[error("network error: {0}")]
    Network(String),

    /// Credentials were rejected by `public/auth`.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// A private endpoint was called before `authenticate`.
    #[error("not authenticated: authenticate before calling private endpoints")]
    NotAuthenticated,

    /// The bearer token was rejected (HTTP 401).
    #[error("request unauthorized")]
    Unauthorized,

    /// The API returned an error payload.
    #[error("api error {code}: {message}")]
    Api {
        /// Deribit error code (or HTTP status when no payload decodes).
        code: i64,
        /// Error message.
        message: String,
    },

    /// The response body did not match the expected shape.
    #[error("unexpected response: {0}")]
    Decode(String),
}

// =============================================================================
// Deribit Client
// =============================================================================

/// Authenticated Deribit REST client.
///
/// Cheap to share behind an `Arc`; the access token sits behind an internal
/// lock so concurrent drivers can fetch while a re-authentication is in
/// flight.
pub struct DeribitClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Credentials,
    order_book_depth: u32,
    token: parking_lot::RwLock<Option<String>>,
}

impl DeribitClient {
    /// Create a client from credentials and endpoint settings.
    ///
    /// # Errors
    ///
    /// Returns `DeribitError::Network` if the HTTP client cannot be built.
    pub fn new(credentials: Credentials, settings: &DeribitSettings) -> Result<Self, DeribitError> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| DeribitError::Network(e.to_string()))?;

        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            credentials,
            order_book_depth: settings.order_book_depth,
            token: parking_lot::RwLock::new(None),
        })
    }

    /// Whether an access token is currently held.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.token.read().is_some()
    }

    /// Obtain an access token via the client-credentials grant.
    ///
    /// # Errors
    ///
    /// Returns `AuthenticationFailed` if the API rejects the credentials,
    /// or a transport/decode error for malformed exchanges.
    pub async fn authenticate(&self) -> Result<(), DeribitError> {
        let result: Result<AuthResult, DeribitError> = self
            .request(
                PUBLIC_API,
                "/auth",
                &[
                    ("client_id", self.credentials.client_id()),
                    ("client_secret", self.credentials.client_secret()),
                    ("grant_type", "client_credentials"),
                ],
                None,
            )
            .await;

        match result {
            Ok(auth) => {
                *self.token.write() = Some(auth.access_token);
                tracing::info!("Authenticated with Deribit");
                Ok(())
            }
            Err(DeribitError::Api { code, message }) => {
                tracing::error!(code, message, "Deribit authentication rejected");
                Err(DeribitError::AuthenticationFailed)
            }
            Err(e) => Err(e),
        }
    }

    /// Fetch the current order book for an instrument.
    ///
    /// The `result` payload is returned verbatim; the relay never inspects
    /// its structure.
    ///
    /// # Errors
    ///
    /// Returns a `DeribitError` if the request or decode fails.
    pub async fn get_order_book(
        &self,
        instrument: &str,
        depth: u32,
    ) -> Result<serde_json::Value, DeribitError> {
        self.request(
            PUBLIC_API,
            "/get_order_book",
            &[
                ("instrument_name", instrument),
                ("depth", &depth.to_string()),
            ],
            None,
        )
        .await
    }

    /// Place a buy order (pass-through).
    ///
    /// # Errors
    ///
    /// Returns a `DeribitError` if not authenticated or the API rejects
    /// the order.
    pub async fn buy(&self, order: &OrderRequest) -> Result<serde_json::Value, DeribitError> {
        self.get_private("/buy", order).await
    }

    /// Modify an open order (pass-through).
    ///
    /// # Errors
    ///
    /// Returns a `DeribitError` if not authenticated or the API rejects
    /// the modification.
    pub async fn edit(&self, edit: &EditRequest) -> Result<serde_json::Value, DeribitError> {
        self.get_private("/edit", edit).await
    }

    /// Cancel an open order (pass-through).
    ///
    /// # Errors
    ///
    /// Returns a `DeribitError` if not authenticated or the API rejects
    /// the cancellation.
    pub async fn cancel(&self, order_id: &str) -> Result<serde_json::Value, DeribitError> {
        self.get_private("/cancel", &[("order_id", order_id)]).await
    }

    /// Fetch current positions (pass-through).
    ///
    /// # Errors
    ///
    /// Returns a `DeribitError` if not authenticated or the request fails.
    pub async fn get_positions(
        &self,
        query: &PositionsQuery,
    ) -> Result<serde_json::Value, DeribitError> {
        self.get_private("/get_positions", query).await
    }

    /// Call a private endpoint, re-authenticating once on a rejected token.
    async fn get_private<T, Q>(&self, path: &str, query: &Q) -> Result<T, DeribitError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized + Sync,
    {
        let token = self.bearer_token()?;
        match self.request(PRIVATE_API, path, query, Some(&token)).await {
            Err(DeribitError::Unauthorized) => {
                tracing::info!("Access token rejected; re-authenticating");
                self.authenticate().await?;
                let token = self.bearer_token()?;
                match self.request(PRIVATE_API, path, query, Some(&token)).await {
                    Err(DeribitError::Unauthorized) => Err(DeribitError::AuthenticationFailed),
                    other => other,
                }
            }
            other => other,
        }
    }

    fn bearer_token(&self) -> Result<String, DeribitError> {
        self.token
            .read()
            .clone()
            .ok_or(DeribitError::NotAuthenticated)
    }

    /// Single GET request, envelope unwrapping included.
    async fn request<T, Q>(
        &self,
        api_base: &str,
        path: &str,
        query: &Q,
        token: Option<&str>,
    ) -> Result<T, DeribitError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized + Sync,
    {
        let url = format!("{}{api_base}{path}", self.base_url);
        let mut request = self.http.get(&url).query(query);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DeribitError::Network(e.to_string()))?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            return Err(DeribitError::Unauthorized);
        }

        let body = response
            .text()
            .await
            .map_err(|e| DeribitError::Network(e.to_string()))?;

        if !status.is_success() {
            if let Ok(envelope) = serde_json::from_str::<ApiResponse<serde_json::Value>>(&body)
                && let Some(error) = envelope.error
            {
                return Err(DeribitError::Api {
                    code: error.code,
                    message: error.message,
                });
            }
            return Err(DeribitError::Api {
                code: i64::from(status.as_u16()),
                message: body,
            });
        }

        let envelope: ApiResponse<T> =
            serde_json::from_str(&body).map_err(|e| DeribitError::Decode(e.to_string()))?;
        if let Some(error) = envelope.error {
            return Err(DeribitError::Api {
                code: error.code,
                message: error.message,
            });
        }
        envelope
            .result
            .ok_or_else(|| DeribitError::Decode("response missing result".to_string()))
    }
}

// =============================================================================
// Snapshot Source Port
// =============================================================================

#[async_trait]
impl SnapshotSource for DeribitClient {
    async fn fetch(&self, topic: &str) -> Result<serde_json::Value, SnapshotError> {
        self.get_order_book(topic, self.order_book_depth)
            .await
            .map_err(|e| SnapshotError::new(topic, e.to_string()))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client_for(server: &MockServer) -> DeribitClient {
        let settings = DeribitSettings {
            base_url: server.uri(),
            ..DeribitSettings::default()
        };
        let credentials = Credentials::new("id".to_string(), "secret".to_string());
        DeribitClient::new(credentials, &settings).unwrap()
    }

    async fn mount_auth(server: &MockServer, token: &str) {
        Mock::given(method("GET"))
            .and(path("/api/v2/public/auth"))
            .and(query_param("grant_type", "client_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": {"access_token": token, "expires_in": 900}
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn authenticate_stores_token() {
        let server = MockServer::start().await;
        mount_auth(&server, "tok-1").await;

        let client = client_for(&server);
        assert!(!client.is_authenticated());

        client.authenticate().await.unwrap();
        assert!(client.is_authenticated());
    }

    #[tokio::test]
    async fn authenticate_rejection_maps_to_authentication_failed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/public/auth"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"code": 13004, "message": "invalid_credentials"}
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.authenticate().await.unwrap_err();

        assert!(matches!(err, DeribitError::AuthenticationFailed));
        assert!(!client.is_authenticated());
    }

    #[tokio::test]
    async fn order_book_result_is_passed_through() {
        let server = MockServer::start().await;
        let book = json!({
            "bids": [[64000.0, 2.0]],
            "asks": [[64010.0, 1.5]],
            "timestamp": 1_700_000_000_000u64
        });
        Mock::given(method("GET"))
            .and(path("/api/v2/public/get_order_book"))
            .and(query_param("instrument_name", "BTC-PERPETUAL"))
            .and(query_param("depth", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": book.clone()})))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let snapshot = client.get_order_book("BTC-PERPETUAL", 5).await.unwrap();

        assert_eq!(snapshot, book);
    }

    #[tokio::test]
    async fn snapshot_source_fetch_uses_configured_depth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/public/get_order_book"))
            .and(query_param("depth", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": {"ok": true}})))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let snapshot = SnapshotSource::fetch(&client, "BTC-PERPETUAL").await.unwrap();

        assert_eq!(snapshot["ok"], true);
    }

    #[tokio::test]
    async fn snapshot_source_fetch_error_names_the_topic() {
        let server = MockServer::start().await;
        // No mock mounted: wiremock answers 404 with an empty body.

        let client = client_for(&server);
        let err = SnapshotSource::fetch(&client, "BTC-PERPETUAL").await.unwrap_err();

        assert_eq!(err.topic, "BTC-PERPETUAL");
    }

    #[tokio::test]
    async fn private_call_without_auth_fails_fast() {
        let server = MockServer::start().await;

        let client = client_for(&server);
        let err = client.cancel("29287706664").await.unwrap_err();

        assert!(matches!(err, DeribitError::NotAuthenticated));
    }

    #[tokio::test]
    async fn private_call_sends_bearer_token() {
        let server = MockServer::start().await;
        mount_auth(&server, "tok-1").await;
        Mock::given(method("GET"))
            .and(path("/api/v2/private/cancel"))
            .and(header("authorization", "Bearer tok-1"))
            .and(query_param("order_id", "29287706664"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"result": {"order_state": "cancelled"}})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        client.authenticate().await.unwrap();
        let result = client.cancel("29287706664").await.unwrap();

        assert_eq!(result["order_state"], "cancelled");
    }

    #[tokio::test]
    async fn rejected_token_is_refreshed_once() {
        let server = MockServer::start().await;

        // First auth hands out a token the API then rejects; the refresh
        // hands out a good one.
        Mock::given(method("GET"))
            .and(path("/api/v2/public/auth"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": {"access_token": "stale", "expires_in": 900}
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        mount_auth(&server, "fresh").await;

        Mock::given(method("GET"))
            .and(path("/api/v2/private/get_positions"))
            .and(header("authorization", "Bearer stale"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v2/private/get_positions"))
            .and(header("authorization", "Bearer fresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": []})))
            .mount(&server)
            .await;

        let client = client_for(&server);
        client.authenticate().await.unwrap();

        let query = PositionsQuery {
            currency: "BTC".to_string(),
            kind: Some("future".to_string()),
        };
        let positions = client.get_positions(&query).await.unwrap();

        assert_eq!(positions, json!([]));
    }

    #[tokio::test]
    async fn api_error_envelope_is_surfaced() {
        let server = MockServer::start().await;
        mount_auth(&server, "tok-1").await;
        Mock::given(method("GET"))
            .and(path("/api/v2/private/buy"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"code": 10009, "message": "not_enough_funds"}
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        client.authenticate().await.unwrap();

        let order = OrderRequest {
            instrument_name: "BTC-PERPETUAL".to_string(),
            amount: Decimal::from(40),
            order_type: "limit".to_string(),
            price: Some(Decimal::from(10)),
            label: Some("market0000234".to_string()),
        };
        let err = client.buy(&order).await.unwrap_err();

        match err {
            DeribitError::Api { code, message } => {
                assert_eq!(code, 10009);
                assert_eq!(message, "not_enough_funds");
            }
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn edit_passes_through_result() {
        let server = MockServer::start().await;
        mount_auth(&server, "tok-1").await;
        Mock::given(method("GET"))
            .and(path("/api/v2/private/edit"))
            .and(query_param("order_id", "29287706664"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"result": {"order": {"amount": "50"}}})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        client.authenticate().await.unwrap();

        let edit = EditRequest {
            order_id: "29287706664".to_string(),
            amount: Decimal::from(50),
            price: Decimal::from(5),
        };
        let result = client.edit(&edit).await.unwrap();

        assert_eq!(result["order"]["amount"], "50");
    }
}
