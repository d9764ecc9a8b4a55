//! Relay Configuration Settings
//!
//! Configuration types for the relay, loaded from environment variables.

use std::time::Duration;

use crate::application::driver::DEFAULT_TICK_INTERVAL;

/// Deribit API credentials.
#[derive(Clone)]
pub struct Credentials {
    client_id: String,
    client_secret: String,
}

impl Credentials {
    /// Create new credentials.
    #[must_use]
    pub const fn new(client_id: String, client_secret: String) -> Self {
        Self {
            client_id,
            client_secret,
        }
    }

    /// Get the API client id.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Get the API client secret.
    #[must_use]
    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

/// Deribit REST endpoint settings.
#[derive(Debug, Clone)]
pub struct DeribitSettings {
    /// Base URL of the Deribit API.
    pub base_url: String,
    /// Order book depth requested per snapshot.
    pub order_book_depth: u32,
    /// HTTP request timeout.
    pub request_timeout: Duration,
}

impl Default for DeribitSettings {
    fn default() -> Self {
        Self {
            base_url: "https://test.deribit.com".to_string(),
            order_book_depth: 5,
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Broadcast scheduling settings.
#[derive(Debug, Clone)]
pub struct BroadcastSettings {
    /// Interval between broadcast ticks per topic.
    pub tick_interval: Duration,
    /// Capacity of each client's outbound frame queue.
    pub send_queue_capacity: usize,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            send_queue_capacity: 64,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// WebSocket server port.
    pub ws_port: u16,
    /// Health check HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            ws_port: 8080,
            health_port: 8081,
        }
    }
}

/// Complete relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// API credentials.
    pub credentials: Credentials,
    /// Deribit endpoint settings.
    pub deribit: DeribitSettings,
    /// Broadcast scheduling settings.
    pub broadcast: BroadcastSettings,
    /// Server port settings.
    pub server: ServerSettings,
}

impl RelayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        let client_id = std::env::var("DERIBIT_CLIENT_ID")
            .map_err(|_| ConfigError::MissingEnvVar("DERIBIT_CLIENT_ID".to_string()))?;

        let client_secret = std::env::var("DERIBIT_CLIENT_SECRET")
            .map_err(|_| ConfigError::MissingEnvVar("DERIBIT_CLIENT_SECRET".to_string()))?;

        if client_id.is_empty() {
            return Err(ConfigError::EmptyValue("DERIBIT_CLIENT_ID".to_string()));
        }

        if client_secret.is_empty() {
            return Err(ConfigError::EmptyValue("DERIBIT_CLIENT_SECRET".to_string()));
        }

        let deribit = DeribitSettings {
            base_url: std::env::var("DERIBIT_BASE_URL")
                .unwrap_or_else(|_| DeribitSettings::default().base_url),
            order_book_depth: parse_env_u32(
                "RELAY_ORDER_BOOK_DEPTH",
                DeribitSettings::default().order_book_depth,
            ),
            request_timeout: parse_env_duration_secs(
                "RELAY_REQUEST_TIMEOUT_SECS",
                DeribitSettings::default().request_timeout,
            ),
        };

        let broadcast = BroadcastSettings {
            tick_interval: parse_env_duration_secs(
                "RELAY_TICK_INTERVAL_SECS",
                BroadcastSettings::default().tick_interval,
            ),
            send_queue_capacity: parse_env_usize(
                "RELAY_SEND_QUEUE_CAPACITY",
                BroadcastSettings::default().send_queue_capacity,
            ),
        };

        let server = ServerSettings {
            ws_port: parse_env_u16("RELAY_WS_PORT", ServerSettings::default().ws_port),
            health_port: parse_env_u16("RELAY_HEALTH_PORT", ServerSettings::default().health_port),
        };

        Ok(Self {
            credentials: Credentials::new(client_id, client_secret),
            deribit,
            broadcast,
            server,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

fn parse_env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_redacted_debug() {
        let creds = Credentials::new("id123".to_string(), "secret456".to_string());
        let debug = format!("{creds:?}");
        assert!(debug.contains("id123"));
        assert!(!debug.contains("secret456"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn deribit_settings_defaults() {
        let settings = DeribitSettings::default();
        assert_eq!(settings.base_url, "https://test.deribit.com");
        assert_eq!(settings.order_book_depth, 5);
        assert_eq!(settings.request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn broadcast_settings_defaults() {
        let settings = BroadcastSettings::default();
        assert_eq!(settings.tick_interval, Duration::from_secs(5));
        assert_eq!(settings.send_queue_capacity, 64);
    }

    #[test]
    fn server_settings_defaults() {
        let settings = ServerSettings::default();
        assert_eq!(settings.ws_port, 8080);
        assert_eq!(settings.health_port, 8081);
    }
}
