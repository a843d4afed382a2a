//! Bus configuration.
//!
//! Loads configuration from an optional JSON file and environment variables
//! with sensible defaults. The configuration is built once at startup and
//! handed to the facade; per-call overrides never write back into it.
//!
//! # Environment
//!
//! | Variable | Default |
//! |---|---|
//! | `STREAM_BUS_CONFIG` | unset (path to a JSON file) |
//! | `STREAM_BUS_DRIVER` | `streams` |
//! | `STREAM_BUS_REDIS` | `default` |
//! | `STREAM_BUS_PREFIX` | `stream-bus:` |
//! | `STREAM_BUS_DELIVERY` | `at-least-once` |
//! | `STREAM_BUS_DEDUPE_TTL` | `86400` |
//! | `REDIS_URL` | `redis://127.0.0.1:6379` |
//!
//! # File format
//!
//! ```json
//! {
//!   "defaults": { "driver": "streams", "prefix": "stream-bus:" },
//!   "connections": { "default": "redis://127.0.0.1:6379" },
//!   "consumers": {
//!     "events:inbound": "log",
//!     "events:images": { "handler": "stdout", "group": "images", "count": 10 }
//!   }
//! }
//! ```

use crate::error::{BusError, Result};
use crate::options::{BusOptions, DEFAULT_CONNECTION};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::path::Path;
use std::str::FromStr;

/// Default store URL for the `default` connection.
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// A statically configured topic → handler binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConsumerBinding {
    /// Just the handler name.
    Handler(String),
    /// Handler name plus per-topic options.
    Detailed {
        /// Handler name.
        handler: String,
        /// Per-topic options.
        #[serde(flatten)]
        options: BusOptions,
    },
}

impl ConsumerBinding {
    /// The bound handler name.
    #[must_use]
    pub fn handler(&self) -> &str {
        match self {
            Self::Handler(handler) | Self::Detailed { handler, .. } => handler,
        }
    }

    /// Per-topic options (empty for a bare handler name).
    #[must_use]
    pub fn options(&self) -> BusOptions {
        match self {
            Self::Handler(_) => BusOptions::default(),
            Self::Detailed { options, .. } => options.clone(),
        }
    }
}

/// Complete bus configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamBusConfig {
    /// Global option defaults.
    pub defaults: BusOptions,
    /// Connection name → store URL.
    pub connections: BTreeMap<String, String>,
    /// Topic → handler binding.
    pub consumers: BTreeMap<String, ConsumerBinding>,
}

impl Default for StreamBusConfig {
    fn default() -> Self {
        let mut connections = BTreeMap::new();
        connections.insert(DEFAULT_CONNECTION.to_string(), DEFAULT_REDIS_URL.to_string());

        Self {
            defaults: BusOptions::default(),
            connections,
            consumers: BTreeMap::new(),
        }
    }
}

impl StreamBusConfig {
    /// Load from `STREAM_BUS_CONFIG` (if set) with environment overrides on top.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::InvalidOption`] if the file cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let base = match env::var("STREAM_BUS_CONFIG") {
            Ok(path) if !path.is_empty() => Self::from_file(path)?,
            _ => Self::default(),
        };
        Ok(base.with_env_overrides())
    }

    /// Load configuration from environment variables only.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Parse a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::InvalidOption`] if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            BusError::InvalidOption(format!("cannot read config {}: {e}", path.display()))
        })?;
        Self::from_json(&raw)
    }

    /// Parse a JSON configuration document.
    ///
    /// The `default` connection is only added when the document names no
    /// connections at all.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::InvalidOption`] if the document is malformed.
    pub fn from_json(raw: &str) -> Result<Self> {
        let mut config: Self = serde_json::from_str(raw)
            .map_err(|e| BusError::InvalidOption(format!("invalid config: {e}")))?;
        if config.connections.is_empty() {
            config
                .connections
                .insert(DEFAULT_CONNECTION.to_string(), DEFAULT_REDIS_URL.to_string());
        }
        Ok(config)
    }

    /// Apply environment variables over this configuration.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(driver) = parse_env("STREAM_BUS_DRIVER") {
            self.defaults.driver = Some(driver);
        }
        if let Ok(connection) = env::var("STREAM_BUS_REDIS") {
            self.defaults.connection = Some(connection);
        }
        if let Ok(prefix) = env::var("STREAM_BUS_PREFIX") {
            self.defaults.prefix = Some(prefix);
        }
        if let Some(delivery) = parse_env("STREAM_BUS_DELIVERY") {
            self.defaults.delivery = Some(delivery);
        }
        if let Some(ttl) = parse_env("STREAM_BUS_DEDUPE_TTL") {
            self.defaults.dedupe_ttl = Some(ttl);
        }
        if let Ok(url) = env::var("REDIS_URL") {
            self.connections.insert(DEFAULT_CONNECTION.to_string(), url);
        }
        self
    }

    /// Per-topic options declared in the consumers map.
    #[must_use]
    pub fn topic_options(&self) -> BTreeMap<String, BusOptions> {
        self.consumers
            .iter()
            .map(|(topic, binding)| (topic.clone(), binding.options()))
            .collect()
    }

    /// Connection names the defaults and configured consumers resolve to.
    #[must_use]
    pub fn referenced_connections(&self) -> BTreeSet<String> {
        let fallback = self
            .defaults
            .connection
            .clone()
            .unwrap_or_else(|| DEFAULT_CONNECTION.to_string());

        let mut names = BTreeSet::from([fallback.clone()]);
        for binding in self.consumers.values() {
            names.insert(binding.options().connection.unwrap_or_else(|| fallback.clone()));
        }
        names
    }
}

fn parse_env<T: FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    let parsed = raw.parse().ok();
    if parsed.is_none() {
        tracing::warn!(variable = name, value = %raw, "Ignoring unparseable environment value");
    }
    parsed
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::options::{Delivery, Driver};

    #[test]
    fn default_has_default_connection() {
        let config = StreamBusConfig::default();
        assert_eq!(
            config.connections.get(DEFAULT_CONNECTION).map(String::as_str),
            Some(DEFAULT_REDIS_URL)
        );
        assert!(config.consumers.is_empty());
    }

    #[test]
    fn parses_both_consumer_binding_shapes() {
        let config = StreamBusConfig::from_json(
            r#"{
                "defaults": { "driver": "streams", "delivery": "effectively-once" },
                "consumers": {
                    "events:inbound": "log",
                    "events:images": { "handler": "stdout", "driver": "lists", "block": 1 }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.defaults.driver, Some(Driver::Log));
        assert_eq!(config.defaults.delivery, Some(Delivery::EffectivelyOnce));

        let inbound = &config.consumers["events:inbound"];
        assert_eq!(inbound.handler(), "log");
        assert_eq!(inbound.options(), BusOptions::default());

        let images = &config.consumers["events:images"];
        assert_eq!(images.handler(), "stdout");
        assert_eq!(images.options().driver, Some(Driver::Queue));
        assert_eq!(images.options().block, Some(1));

        assert!(config.connections.contains_key(DEFAULT_CONNECTION));
    }

    #[test]
    fn topic_options_follow_consumers() {
        let config = StreamBusConfig::from_json(
            r#"{ "consumers": { "a": { "handler": "h", "group": "ga" }, "b": "h" } }"#,
        )
        .unwrap();
        let topics = config.topic_options();
        assert_eq!(topics["a"].group.as_deref(), Some("ga"));
        assert_eq!(topics["b"], BusOptions::default());
    }

    #[test]
    fn named_connections_replace_default() {
        let config = StreamBusConfig::from_json(
            r#"{ "defaults": { "connection": "main" }, "connections": { "main": "redis://cache:6379" } }"#,
        )
        .unwrap();

        assert_eq!(config.connections.keys().collect::<Vec<_>>(), vec!["main"]);
        assert_eq!(
            config.referenced_connections(),
            BTreeSet::from(["main".to_string()])
        );
    }

    #[test]
    fn referenced_connections_follow_consumers() {
        let config = StreamBusConfig::from_json(
            r#"{
                "connections": { "default": "redis://a:6379", "jobs": "redis://b:6379", "unused": "redis://c:6379" },
                "consumers": {
                    "events:a": "log",
                    "events:b": { "handler": "log", "connection": "jobs" }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(
            config.referenced_connections(),
            BTreeSet::from(["default".to_string(), "jobs".to_string()])
        );
    }

    #[test]
    fn rejects_malformed_document() {
        assert!(matches!(
            StreamBusConfig::from_json("{ nope"),
            Err(BusError::InvalidOption(_))
        ));
    }
}
