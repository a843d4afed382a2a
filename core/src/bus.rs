//! The bus facade.
//!
//! [`StreamBus`] is the single entry point for producers and consumers. For
//! every call it:
//!
//! 1. layers call options over per-topic options over global defaults,
//! 2. resolves the physical key and the store connection,
//! 3. selects the transport driver,
//! 4. delegates.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use stream_bus_core::bus::StreamBus;
//! use stream_bus_core::options::BusOptions;
//! # use stream_bus_core::store::StreamStore;
//! # fn example(store: Arc<dyn StreamStore>) -> stream_bus_core::Result<()> {
//! let bus = StreamBus::builder()
//!     .defaults(BusOptions::new().prefix("stream-bus:"))
//!     .connection("default", store)
//!     .build();
//!
//! assert_eq!(bus.key("events:outbound", &BusOptions::new())?, "stream-bus:events:outbound");
//! # Ok(())
//! # }
//! ```

use crate::config::StreamBusConfig;
use crate::dedup::DedupGate;
use crate::envelope::{Envelope, Message, Payload};
use crate::error::{BusError, Result};
use crate::key;
use crate::options::{BusOptions, Driver, ResolvedOptions};
use crate::store::StreamStore;
use crate::transport::{self, Transport};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Message bus facade over one or more stores.
#[derive(Clone)]
pub struct StreamBus {
    defaults: BusOptions,
    topics: BTreeMap<String, BusOptions>,
    connections: HashMap<String, Arc<dyn StreamStore>>,
}

impl std::fmt::Debug for StreamBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut connections: Vec<&String> = self.connections.keys().collect();
        connections.sort();
        f.debug_struct("StreamBus")
            .field("defaults", &self.defaults)
            .field("topics", &self.topics)
            .field("connections", &connections)
            .finish()
    }
}

impl StreamBus {
    /// Create a builder.
    #[must_use]
    pub fn builder() -> StreamBusBuilder {
        StreamBusBuilder::default()
    }

    /// Layer `options` over the topic's configured options and the defaults.
    #[must_use]
    pub fn merged_options(&self, topic: &str, options: &BusOptions) -> BusOptions {
        let layered = match self.topics.get(topic) {
            Some(topic_options) => self.defaults.overlay(topic_options),
            None => self.defaults.clone(),
        };
        layered.overlay(options)
    }

    /// Fully resolved options for a call on `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::InvalidOption`] if a resolved value is out of range.
    pub fn resolve(&self, topic: &str, options: &BusOptions) -> Result<ResolvedOptions> {
        self.merged_options(topic, options).resolve()
    }

    /// The driver a call on `topic` with `options` would use.
    #[must_use]
    pub fn resolved_driver(&self, topic: &str, options: &BusOptions) -> Driver {
        self.merged_options(topic, options).resolved_driver()
    }

    /// Physical key for `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::InvalidOption`] if the options do not resolve.
    pub fn key(&self, topic: &str, options: &BusOptions) -> Result<String> {
        let resolved = self.resolve(topic, options)?;
        Ok(key::resolve(topic, &resolved.prefix))
    }

    /// The store registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::UnknownConnection`] if nothing is registered.
    pub fn store(&self, name: &str) -> Result<Arc<dyn StreamStore>> {
        self.connections
            .get(name)
            .cloned()
            .ok_or_else(|| BusError::UnknownConnection {
                name: name.to_string(),
            })
    }

    fn transport(&self, resolved: &ResolvedOptions) -> Result<Box<dyn Transport>> {
        let store = self.store(&resolved.connection)?;
        Ok(transport::for_driver(resolved.driver, store))
    }

    /// Publish `payload` to `topic`.
    ///
    /// Returns the store record id (log driver) or the envelope id (queue
    /// driver).
    ///
    /// # Errors
    ///
    /// Returns an error if options do not resolve, the connection is unknown,
    /// or the store rejects the write.
    pub async fn publish(
        &self,
        topic: &str,
        payload: Payload,
        options: &BusOptions,
    ) -> Result<String> {
        let resolved = self.resolve(topic, options)?;
        let key = key::resolve(topic, &resolved.prefix);
        let envelope = Envelope::new(payload);

        self.transport(&resolved)?.publish(&key, &envelope).await
    }

    /// Read the next batch of messages from `topic`.
    ///
    /// Never fails for an empty or missing topic: the result is simply empty.
    ///
    /// # Errors
    ///
    /// Returns an error if options do not resolve, the connection is unknown,
    /// or the store fails.
    pub async fn read(&self, topic: &str, options: &BusOptions) -> Result<Vec<Message>> {
        let resolved = self.resolve(topic, options)?;
        let key = key::resolve(topic, &resolved.prefix);

        self.transport(&resolved)?.read(&key, &resolved).await
    }

    /// Acknowledge one or more record ids on `topic`.
    ///
    /// On the queue driver this is a no-op that returns `0` without touching
    /// the store, so callers can acknowledge unconditionally.
    ///
    /// # Errors
    ///
    /// Returns an error if the log store fails.
    pub async fn ack<I, S>(&self, topic: &str, ids: I, options: &BusOptions) -> Result<u64>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let merged = self.merged_options(topic, options);
        if merged.resolved_driver() == Driver::Queue {
            return Ok(0);
        }

        let resolved = merged.resolve()?;
        let key = key::resolve(topic, &resolved.prefix);
        let ids: Vec<String> = ids.into_iter().map(Into::into).collect();

        self.transport(&resolved)?
            .acknowledge(&key, &resolved.group, &ids)
            .await
    }

    /// Whether `message_id` on `topic` should be handed to a handler.
    ///
    /// Always `true` under at-least-once delivery; under effectively-once,
    /// `true` only for the first admission within the dedupe TTL.
    ///
    /// # Errors
    ///
    /// Returns an error if options do not resolve or the store fails.
    pub async fn should_process(
        &self,
        topic: &str,
        message_id: &str,
        options: &BusOptions,
    ) -> Result<bool> {
        let resolved = self.resolve(topic, options)?;
        let key = key::resolve(topic, &resolved.prefix);
        let store = self.store(&resolved.connection)?;

        DedupGate::new(store)
            .admit(&key, message_id, resolved.delivery, resolved.dedupe_ttl)
            .await
    }
}

/// Builder for [`StreamBus`].
#[derive(Default)]
pub struct StreamBusBuilder {
    defaults: BusOptions,
    topics: BTreeMap<String, BusOptions>,
    connections: HashMap<String, Arc<dyn StreamStore>>,
}

impl StreamBusBuilder {
    /// Take defaults and per-topic options from `config`.
    ///
    /// Connections still have to be registered with
    /// [`connection`](Self::connection), since stores are built elsewhere.
    #[must_use]
    pub fn config(mut self, config: &StreamBusConfig) -> Self {
        self.defaults = config.defaults.clone();
        self.topics = config.topic_options();
        self
    }

    /// Set the global defaults.
    #[must_use]
    pub fn defaults(mut self, defaults: BusOptions) -> Self {
        self.defaults = defaults;
        self
    }

    /// Set per-topic options.
    #[must_use]
    pub fn topic(mut self, topic: impl Into<String>, options: BusOptions) -> Self {
        self.topics.insert(topic.into(), options);
        self
    }

    /// Register a store under a connection name.
    #[must_use]
    pub fn connection(mut self, name: impl Into<String>, store: Arc<dyn StreamStore>) -> Self {
        self.connections.insert(name.into(), store);
        self
    }

    /// Build the [`StreamBus`].
    #[must_use]
    pub fn build(self) -> StreamBus {
        tracing::debug!(
            connections = self.connections.len(),
            topics = self.topics.len(),
            "StreamBus created"
        );

        StreamBus {
            defaults: self.defaults,
            topics: self.topics,
            connections: self.connections,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_bus_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<StreamBus>();
        assert_sync::<StreamBus>();
    }

    #[test]
    fn precedence_call_over_topic_over_global() {
        let bus = StreamBus::builder()
            .defaults(BusOptions::new().prefix("g:").group("g").count(3))
            .topic("orders", BusOptions::new().prefix("t:").group("t"))
            .build();

        let merged = bus.merged_options("orders", &BusOptions::new().group("c"));
        assert_eq!(merged.prefix.as_deref(), Some("t:"));
        assert_eq!(merged.group.as_deref(), Some("c"));
        assert_eq!(merged.count, Some(3));

        let other = bus.merged_options("payments", &BusOptions::new());
        assert_eq!(other.prefix.as_deref(), Some("g:"));
    }

    #[test]
    fn resolved_driver_uses_topic_options() {
        let bus = StreamBus::builder()
            .topic("jobs", BusOptions::new().driver(Driver::Queue))
            .build();

        assert_eq!(bus.resolved_driver("jobs", &BusOptions::new()), Driver::Queue);
        assert_eq!(bus.resolved_driver("events", &BusOptions::new()), Driver::Log);
        assert_eq!(
            bus.resolved_driver("jobs", &BusOptions::new().driver(Driver::Log)),
            Driver::Log
        );
    }

    #[test]
    fn unknown_connection_is_reported() {
        let bus = StreamBus::builder().build();
        assert!(matches!(
            bus.store("default"),
            Err(BusError::UnknownConnection { .. })
        ));
    }
}
