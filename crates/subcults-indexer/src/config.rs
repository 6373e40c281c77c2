//! Client configuration.
//!
//! Covers the Jetstream endpoint, retry timing (base delay, ceiling and
//! jitter), the handshake timeout and optional collection filters.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::IndexerError;

/// Public Jetstream instance used when no endpoint is configured.
pub const DEFAULT_ENDPOINT: &str = "wss://jetstream2.us-east.bsky.network/subscribe";

/// Configuration for the ingestion client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Jetstream WebSocket URL.
    pub endpoint: String,
    /// Delay before the first retry after a failed dial, in milliseconds.
    pub base_delay_ms: u64,
    /// Ceiling for the retry delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Jitter fraction in `[0, 1]`. `0` disables jitter.
    pub jitter: f64,
    /// Opening handshake timeout in seconds.
    pub handshake_timeout_secs: u64,
    /// Minimum pause before redialing after a stream ends, in milliseconds.
    /// `0` redials immediately.
    pub reconnect_floor_ms: u64,
    /// Collection NSIDs passed to Jetstream as `wantedCollections`.
    pub wanted_collections: Vec<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            jitter: 0.2,
            handshake_timeout_secs: 10,
            reconnect_floor_ms: 0,
            wanted_collections: Vec::new(),
        }
    }
}

impl ClientConfig {
    /// Create a configuration for `endpoint` with default timing.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Set the retry delays and jitter.
    ///
    /// Delays are stored in whole milliseconds, rounded up.
    #[must_use]
    pub fn with_backoff(mut self, base: Duration, max: Duration, jitter: f64) -> Self {
        self.base_delay_ms = ceil_millis(base);
        self.max_delay_ms = ceil_millis(max);
        self.jitter = jitter;
        self
    }

    /// Set the minimum pause between a dropped stream and the next dial,
    /// rounded up to whole milliseconds.
    #[must_use]
    pub fn with_reconnect_floor(mut self, floor: Duration) -> Self {
        self.reconnect_floor_ms = ceil_millis(floor);
        self
    }

    /// Restrict the subscription to the given collections.
    #[must_use]
    pub fn with_collections<I, S>(mut self, collections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.wanted_collections = collections.into_iter().map(Into::into).collect();
        self
    }

    /// Load configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or is invalid.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, IndexerError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            IndexerError::Config(format!(
                "failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_json(&content)
    }

    /// Parse configuration from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or the values are invalid.
    pub fn from_json(content: &str) -> Result<Self, IndexerError> {
        let config: Self = serde_json::from_str(content)
            .map_err(|e| IndexerError::Config(format!("invalid JSON: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, IndexerError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<(), IndexerError> {
        if self.endpoint.is_empty() {
            return Err(IndexerError::Config("endpoint cannot be empty".to_string()));
        }

        let url = Url::parse(&self.endpoint)
            .map_err(|e| IndexerError::Config(format!("invalid endpoint URL: {e}")))?;
        if url.scheme() != "ws" && url.scheme() != "wss" {
            return Err(IndexerError::Config(
                "endpoint must start with ws:// or wss://".to_string(),
            ));
        }

        if self.base_delay_ms == 0 {
            return Err(IndexerError::Config(
                "base_delay_ms must be greater than 0".to_string(),
            ));
        }

        if self.base_delay_ms > self.max_delay_ms {
            return Err(IndexerError::Config(format!(
                "base_delay_ms ({}) cannot exceed max_delay_ms ({})",
                self.base_delay_ms, self.max_delay_ms
            )));
        }

        if !self.jitter.is_finite() || !(0.0..=1.0).contains(&self.jitter) {
            return Err(IndexerError::Config(
                "jitter must be within [0, 1]".to_string(),
            ));
        }

        if self.handshake_timeout_secs == 0 {
            return Err(IndexerError::Config(
                "handshake_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.wanted_collections.iter().any(String::is_empty) {
            return Err(IndexerError::Config(
                "wanted_collections cannot contain empty entries".to_string(),
            ));
        }

        Ok(())
    }

    /// Endpoint URL with the collection filters applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is not a valid URL.
    pub fn subscribe_url(&self) -> Result<Url, IndexerError> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| IndexerError::Config(format!("invalid endpoint URL: {e}")))?;

        if !self.wanted_collections.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for collection in &self.wanted_collections {
                pairs.append_pair("wantedCollections", collection);
            }
        }

        Ok(url)
    }

    /// Base retry delay.
    #[must_use]
    pub const fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Maximum retry delay.
    #[must_use]
    pub const fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Handshake timeout.
    #[must_use]
    pub const fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    /// Pause inserted after a stream ends before redialing.
    #[must_use]
    pub const fn reconnect_floor(&self) -> Duration {
        Duration::from_millis(self.reconnect_floor_ms)
    }
}

fn ceil_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos().div_ceil(1_000_000)).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_is_valid() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.handshake_timeout(), Duration::from_secs(10));
        assert_eq!(config.reconnect_floor(), Duration::ZERO);
    }

    #[test]
    fn test_parse_minimal_config() {
        let json = r#"{ "endpoint": "ws://localhost:6008/subscribe" }"#;

        let config = ClientConfig::from_json(json).expect("should parse minimal config");

        assert_eq!(config.endpoint, "ws://localhost:6008/subscribe");
        assert_eq!(config.base_delay(), Duration::from_secs(1));
        assert_eq!(config.max_delay(), Duration::from_secs(60));
        assert!(config.wanted_collections.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            "endpoint": "wss://jetstream.example.com/subscribe",
            "base_delay_ms": 100,
            "max_delay_ms": 1600,
            "jitter": 0.0,
            "handshake_timeout_secs": 5,
            "reconnect_floor_ms": 250,
            "wanted_collections": ["app.subcults.scene", "app.subcults.event"]
        }"#;

        let config = ClientConfig::from_json(json).expect("should parse full config");

        assert_eq!(config.base_delay(), Duration::from_millis(100));
        assert_eq!(config.max_delay(), Duration::from_millis(1600));
        assert_eq!(config.handshake_timeout(), Duration::from_secs(5));
        assert_eq!(config.reconnect_floor(), Duration::from_millis(250));
        assert_eq!(config.wanted_collections.len(), 2);
    }

    #[test]
    fn test_base_delay_exceeding_max_rejected() {
        let config = ClientConfig::default().with_backoff(
            Duration::from_secs(10),
            Duration::from_secs(1),
            0.0,
        );
        let err = config.validate().expect_err("base > max must fail");
        assert!(err.to_string().contains("cannot exceed max_delay_ms"));
    }

    #[test]
    fn test_base_equal_to_max_accepted() {
        let config = ClientConfig::default().with_backoff(
            Duration::from_secs(5),
            Duration::from_secs(5),
            0.0,
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_base_delay_rejected() {
        let config =
            ClientConfig::default().with_backoff(Duration::ZERO, Duration::from_secs(1), 0.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_jitter_bounds() {
        let base = Duration::from_millis(100);
        let max = Duration::from_secs(1);

        assert!(ClientConfig::default().with_backoff(base, max, 0.0).validate().is_ok());
        assert!(ClientConfig::default().with_backoff(base, max, 1.0).validate().is_ok());
        assert!(ClientConfig::default().with_backoff(base, max, -0.1).validate().is_err());
        assert!(ClientConfig::default().with_backoff(base, max, 1.5).validate().is_err());
        assert!(ClientConfig::default().with_backoff(base, max, f64::NAN).validate().is_err());
    }

    #[test]
    fn test_endpoint_must_be_websocket() {
        let err = ClientConfig::new("https://jetstream.example.com")
            .validate()
            .expect_err("http scheme must fail");
        assert!(err.to_string().contains("ws:// or wss://"));

        assert!(ClientConfig::new("").validate().is_err());
        assert!(ClientConfig::new("not a url").validate().is_err());
    }

    #[test]
    fn test_zero_handshake_timeout_rejected() {
        let mut config = ClientConfig::default();
        config.handshake_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_collection_rejected() {
        let config = ClientConfig::default().with_collections(["app.subcults.scene", ""]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_subscribe_url_without_collections() {
        let config = ClientConfig::new("wss://jetstream.example.com/subscribe");
        let url = config.subscribe_url().expect("valid url");
        assert_eq!(url.as_str(), "wss://jetstream.example.com/subscribe");
    }

    #[test]
    fn test_subscribe_url_with_collections() {
        let config = ClientConfig::new("wss://jetstream.example.com/subscribe")
            .with_collections(["app.subcults.scene", "app.subcults.rsvp"]);
        let url = config.subscribe_url().expect("valid url");

        let wanted: Vec<String> = url
            .query_pairs()
            .filter(|(k, _)| k == "wantedCollections")
            .map(|(_, v)| v.into_owned())
            .collect();
        assert_eq!(wanted, vec!["app.subcults.scene", "app.subcults.rsvp"]);
    }

    #[test]
    fn test_invalid_json_rejected() {
        let err = ClientConfig::from_json("{ not json").expect_err("must fail");
        assert!(err.to_string().contains("invalid JSON"));
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().expect("failed to create temp file");
        file.write_all(br#"{ "endpoint": "ws://127.0.0.1:6008/subscribe", "jitter": 0.5 }"#)
            .expect("failed to write temp file");

        let config = ClientConfig::from_file(file.path()).expect("should load");
        assert_eq!(config.endpoint, "ws://127.0.0.1:6008/subscribe");
        assert!((config.jitter - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_from_missing_file() {
        let err = ClientConfig::from_file("/nonexistent/indexer.json").expect_err("must fail");
        assert!(err.to_string().contains("failed to read config file"));
    }

    #[test]
    fn test_json_roundtrip_preserves_defaults() {
        let config = ClientConfig::default();
        let json = config.to_json_pretty().expect("serialize");
        let parsed = ClientConfig::from_json(&json).expect("parse");
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_sub_millisecond_durations_round_up() {
        let config = ClientConfig::default()
            .with_backoff(Duration::from_micros(500), Duration::from_micros(1_500), 0.0)
            .with_reconnect_floor(Duration::from_nanos(1));

        assert_eq!(config.base_delay_ms, 1);
        assert_eq!(config.max_delay_ms, 2);
        assert_eq!(config.reconnect_floor_ms, 1);
        assert!(config.validate().is_ok());

        let exact = ClientConfig::default().with_backoff(
            Duration::from_millis(250),
            Duration::from_secs(2),
            0.0,
        );
        assert_eq!(exact.base_delay_ms, 250);
        assert_eq!(exact.max_delay_ms, 2_000);
    }
}
