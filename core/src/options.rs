//! Per-call options and their resolution.
//!
//! [`BusOptions`] is a sparse bag: every field is optional. Bags are layered
//! with [`BusOptions::overlay`] (explicit call options over per-topic options
//! over global defaults) and then turned into a fully populated
//! [`ResolvedOptions`] by [`BusOptions::resolve`]. Layering always produces a
//! new value; nothing is mutated in place.

use crate::error::{BusError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default key prefix.
pub const DEFAULT_PREFIX: &str = "stream-bus:";

/// Default connection name.
pub const DEFAULT_CONNECTION: &str = "default";

/// Default consumer group name.
pub const DEFAULT_GROUP: &str = "default";

/// Default number of records per log read.
pub const DEFAULT_COUNT: usize = 1;

/// Default log block duration, in milliseconds.
pub const DEFAULT_LOG_BLOCK_MS: u64 = 5000;

/// Default queue block duration, in seconds.
pub const DEFAULT_QUEUE_BLOCK_SECS: u64 = 5;

/// Default dedupe record lifetime, in seconds.
pub const DEFAULT_DEDUPE_TTL: u64 = 86_400;

/// Transport driver variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    /// Ordered, consumer-group delivered, acknowledgment based log.
    #[default]
    #[serde(alias = "streams")]
    Log,
    /// Push/pop list with no acknowledgment phase.
    #[serde(alias = "lists")]
    Queue,
}

impl Driver {
    /// Canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Queue => "queue",
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Driver {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "log" | "streams" | "stream" => Ok(Self::Log),
            "queue" | "lists" | "list" => Ok(Self::Queue),
            other => Err(BusError::InvalidOption(format!(
                "unknown driver '{other}' (expected log|queue)"
            ))),
        }
    }
}

/// Delivery guarantee applied by the dedupe gate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Delivery {
    /// No gating; handlers must be idempotent.
    #[default]
    #[serde(rename = "at-least-once")]
    AtLeastOnce,
    /// Best-effort duplicate suppression through TTL-bounded dedupe records.
    #[serde(rename = "effectively-once")]
    EffectivelyOnce,
}

impl Delivery {
    /// Canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AtLeastOnce => "at-least-once",
            Self::EffectivelyOnce => "effectively-once",
        }
    }
}

impl fmt::Display for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Delivery {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "at-least-once" => Ok(Self::AtLeastOnce),
            "effectively-once" => Ok(Self::EffectivelyOnce),
            other => Err(BusError::InvalidOption(format!(
                "unknown delivery '{other}' (expected at-least-once|effectively-once)"
            ))),
        }
    }
}

/// Sparse option bag.
///
/// `block` is interpreted per driver: milliseconds for the log driver, whole
/// seconds for the queue driver. A block of `0` means "do not block".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusOptions {
    /// Transport driver.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver: Option<Driver>,
    /// Store connection name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection: Option<String>,
    /// Key prefix.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    /// Consumer group (log only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Consumer identity within the group (log only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumer: Option<String>,
    /// Records per read (log only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    /// Block duration: milliseconds (log) or seconds (queue).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block: Option<u64>,
    /// Delivery guarantee.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery: Option<Delivery>,
    /// Dedupe record lifetime in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dedupe_ttl: Option<u64>,
}

impl BusOptions {
    /// Empty option bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the driver.
    #[must_use]
    pub const fn driver(mut self, driver: Driver) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Set the connection name.
    #[must_use]
    pub fn connection(mut self, connection: impl Into<String>) -> Self {
        self.connection = Some(connection.into());
        self
    }

    /// Set the key prefix.
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Set the consumer group.
    #[must_use]
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Set the consumer identity.
    #[must_use]
    pub fn consumer(mut self, consumer: impl Into<String>) -> Self {
        self.consumer = Some(consumer.into());
        self
    }

    /// Set the read count.
    #[must_use]
    pub const fn count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    /// Set the block duration (driver units).
    #[must_use]
    pub const fn block(mut self, block: u64) -> Self {
        self.block = Some(block);
        self
    }

    /// Set the delivery guarantee.
    #[must_use]
    pub const fn delivery(mut self, delivery: Delivery) -> Self {
        self.delivery = Some(delivery);
        self
    }

    /// Set the dedupe TTL in seconds.
    #[must_use]
    pub const fn dedupe_ttl(mut self, ttl: u64) -> Self {
        self.dedupe_ttl = Some(ttl);
        self
    }

    /// Layer `over` on top of `self`; fields set in `over` win.
    #[must_use]
    pub fn overlay(&self, over: &Self) -> Self {
        Self {
            driver: over.driver.or(self.driver),
            connection: over.connection.clone().or_else(|| self.connection.clone()),
            prefix: over.prefix.clone().or_else(|| self.prefix.clone()),
            group: over.group.clone().or_else(|| self.group.clone()),
            consumer: over.consumer.clone().or_else(|| self.consumer.clone()),
            count: over.count.or(self.count),
            block: over.block.or(self.block),
            delivery: over.delivery.or(self.delivery),
            dedupe_ttl: over.dedupe_ttl.or(self.dedupe_ttl),
        }
    }

    /// The driver this bag selects, falling back to the default.
    #[must_use]
    pub fn resolved_driver(&self) -> Driver {
        self.driver.unwrap_or_default()
    }

    /// Fill every unset field with its default.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::InvalidOption`] if `count` or `dedupe_ttl` is zero.
    pub fn resolve(&self) -> Result<ResolvedOptions> {
        let driver = self.resolved_driver();

        let count = self.count.unwrap_or(DEFAULT_COUNT);
        if count == 0 {
            return Err(BusError::InvalidOption("count must be positive".to_string()));
        }

        let dedupe_ttl = self.dedupe_ttl.unwrap_or(DEFAULT_DEDUPE_TTL);
        if dedupe_ttl == 0 {
            return Err(BusError::InvalidOption(
                "dedupe_ttl must be positive".to_string(),
            ));
        }

        let block = self.block.unwrap_or(match driver {
            Driver::Log => DEFAULT_LOG_BLOCK_MS,
            Driver::Queue => DEFAULT_QUEUE_BLOCK_SECS,
        });

        Ok(ResolvedOptions {
            driver,
            connection: self
                .connection
                .clone()
                .unwrap_or_else(|| DEFAULT_CONNECTION.to_string()),
            prefix: self
                .prefix
                .clone()
                .unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
            group: self.group.clone().unwrap_or_else(|| DEFAULT_GROUP.to_string()),
            consumer: self.consumer.clone().unwrap_or_else(default_consumer_name),
            count,
            block,
            delivery: self.delivery.unwrap_or_default(),
            dedupe_ttl,
        })
    }
}

/// Fully populated options for a single call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOptions {
    /// Transport driver.
    pub driver: Driver,
    /// Store connection name.
    pub connection: String,
    /// Key prefix.
    pub prefix: String,
    /// Consumer group.
    pub group: String,
    /// Consumer identity.
    pub consumer: String,
    /// Records per read.
    pub count: usize,
    /// Block duration in driver units.
    pub block: u64,
    /// Delivery guarantee.
    pub delivery: Delivery,
    /// Dedupe TTL in seconds.
    pub dedupe_ttl: u64,
}

impl ResolvedOptions {
    /// Block duration converted according to the driver's unit.
    #[must_use]
    pub const fn block_duration(&self) -> Duration {
        match self.driver {
            Driver::Log => Duration::from_millis(self.block),
            Driver::Queue => Duration::from_secs(self.block),
        }
    }
}

/// Consumer identity used when none is configured: the host name if the
/// environment exposes one.
#[must_use]
pub fn default_consumer_name() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "stream-bus".to_string())
}
