//! Redis-backed store for Stream Bus.
//!
//! [`RedisStore`] implements [`StreamStore`] on top of a single Redis
//! endpoint:
//!
//! | Capability | Redis commands |
//! |---|---|
//! | log append / read / ack | `XADD`, `XGROUP CREATE … MKSTREAM`, `XREADGROUP`, `XACK` |
//! | queue push / pop | `RPUSH`, `BLPOP` (or `LPOP` when not blocking) |
//! | dedupe marker | `SET key 1 EX ttl NX` |
//!
//! Log records carry the serialized envelope in a single `message` field, so
//! producers written in other languages can share topics with this crate.
//!
//! # Connection handling
//!
//! Each store wraps a [`ConnectionManager`], which multiplexes commands over
//! one connection and reconnects transparently. Blocking reads occupy that
//! connection for their whole duration, so a process that publishes while it
//! consumes should use a separate named connection for each role.
//!
//! # Example
//!
//! ```no_run
//! use stream_bus_core::{BusOptions, StreamBusConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = StreamBusConfig::load()?;
//! let bus = stream_bus_redis::connect(&config).await?;
//!
//! let mut payload = serde_json::Map::new();
//! payload.insert("type".into(), "image.done".into());
//! let id = bus.publish("events:outbound", payload, &BusOptions::new()).await?;
//! println!("published {id}");
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, Client, RedisError};
use std::sync::Arc;
use std::time::Duration;
use stream_bus_core::error::{BusError, Result};
use stream_bus_core::store::{GroupCreation, GroupRead, StoreFuture, StreamEntry, StreamStore};
use stream_bus_core::{StreamBus, StreamBusConfig};

/// Field holding the serialized envelope in every log record.
pub const ENVELOPE_FIELD: &str = "message";

/// Upper bound on establishing a connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Error code Redis returns when a consumer group already exists.
const BUSYGROUP: &str = "BUSYGROUP";

/// [`StreamStore`] backed by one Redis endpoint.
#[derive(Clone)]
pub struct RedisStore {
    conn_manager: ConnectionManager,
}

impl RedisStore {
    /// Connect to `redis_url`.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - Redis connection URL (e.g., `redis://127.0.0.1:6379`)
    ///
    /// # Errors
    ///
    /// Returns [`BusError::ConnectionFailed`] if the URL is invalid or the
    /// server cannot be reached within [`CONNECT_TIMEOUT`].
    pub async fn new(redis_url: &str) -> Result<Self> {
        Self::with_timeout(redis_url, CONNECT_TIMEOUT).await
    }

    /// Connect to `redis_url`, giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::ConnectionFailed`] if the URL is invalid, the
    /// server refuses, or `timeout` elapses first.
    pub async fn with_timeout(redis_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::open(redis_url).map_err(|e| {
            BusError::ConnectionFailed(format!("Invalid Redis URL '{redis_url}': {e}"))
        })?;

        let conn_manager = tokio::time::timeout(timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| {
                BusError::ConnectionFailed(format!(
                    "Timed out after {timeout:?} connecting to {}",
                    redacted(redis_url)
                ))
            })?
            .map_err(|e| BusError::ConnectionFailed(format!("Failed to connect to Redis: {e}")))?;

        tracing::debug!(url = %redacted(redis_url), "Connected to Redis");
        Ok(Self { conn_manager })
    }

    fn conn(&self) -> ConnectionManager {
        self.conn_manager.clone()
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl StreamStore for RedisStore {
    fn append(&self, key: &str, body: &str) -> StoreFuture<'_, String> {
        let key = key.to_string();
        let body = body.to_string();

        Box::pin(async move {
            let mut conn = self.conn();
            let id: String = conn
                .xadd(&key, "*", &[(ENVELOPE_FIELD, body.as_str())])
                .await
                .map_err(|e| BusError::PublishFailed {
                    key: key.clone(),
                    reason: e.to_string(),
                })?;
            Ok(id)
        })
    }

    fn create_group(&self, key: &str, group: &str) -> StoreFuture<'_, GroupCreation> {
        let key = key.to_string();
        let group = group.to_string();

        Box::pin(async move {
            let mut conn = self.conn();
            let created: redis::RedisResult<()> =
                conn.xgroup_create_mkstream(&key, &group, "0").await;

            match created {
                Ok(()) => Ok(GroupCreation::Created),
                Err(e) if is_busy_group(&e) => Ok(GroupCreation::AlreadyExists),
                Err(e) => Err(BusError::ConsumerGroupError {
                    key,
                    group,
                    reason: e.to_string(),
                }),
            }
        })
    }

    fn read_group(&self, key: &str, read: &GroupRead) -> StoreFuture<'_, Vec<StreamEntry>> {
        let key = key.to_string();
        let mut options = StreamReadOptions::default()
            .group(&read.group, &read.consumer)
            .count(read.count);
        if !read.block.is_zero() {
            options = options.block(usize::try_from(read.block.as_millis()).unwrap_or(usize::MAX));
        }

        Box::pin(async move {
            let mut conn = self.conn();
            // A blocking read that times out replies nil.
            let reply: Option<StreamReadReply> = conn
                .xread_options(&[&key], &[">"], &options)
                .await
                .map_err(|e| BusError::ReadFailed {
                    key: key.clone(),
                    reason: e.to_string(),
                })?;

            let entries = reply
                .map(|reply| reply.keys)
                .unwrap_or_default()
                .into_iter()
                .flat_map(|stream| stream.ids)
                .map(|record| {
                    let body = record.get::<String>(ENVELOPE_FIELD);
                    StreamEntry {
                        id: record.id,
                        body,
                    }
                })
                .collect();
            Ok(entries)
        })
    }

    fn acknowledge(&self, key: &str, group: &str, ids: &[String]) -> StoreFuture<'_, u64> {
        let key = key.to_string();
        let group = group.to_string();
        let ids = ids.to_vec();

        Box::pin(async move {
            if ids.is_empty() {
                return Ok(0);
            }

            let mut conn = self.conn();
            let acked: u64 = conn
                .xack(&key, &group, &ids)
                .await
                .map_err(|e| BusError::AckFailed {
                    key: key.clone(),
                    reason: e.to_string(),
                })?;
            Ok(acked)
        })
    }

    fn push(&self, key: &str, body: &str) -> StoreFuture<'_, u64> {
        let key = key.to_string();
        let body = body.to_string();

        Box::pin(async move {
            let mut conn = self.conn();
            let len: u64 = conn
                .rpush(&key, &body)
                .await
                .map_err(|e| BusError::PublishFailed {
                    key: key.clone(),
                    reason: e.to_string(),
                })?;
            Ok(len)
        })
    }

    fn pop(&self, key: &str, timeout: Duration) -> StoreFuture<'_, Option<String>> {
        let key = key.to_string();

        Box::pin(async move {
            let mut conn = self.conn();
            let read_failed = |e: RedisError| BusError::ReadFailed {
                key: key.clone(),
                reason: e.to_string(),
            };

            if timeout.is_zero() {
                let item: Option<String> = conn.lpop(&key, None).await.map_err(read_failed)?;
                Ok(item)
            } else {
                let item: Option<(String, String)> = conn
                    .blpop(&key, timeout.as_secs_f64())
                    .await
                    .map_err(read_failed)?;
                Ok(item.map(|(_, body)| body))
            }
        })
    }

    fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreFuture<'_, bool> {
        let key = key.to_string();
        let value = value.to_string();
        let ttl_secs = ttl.as_secs().max(1);

        Box::pin(async move {
            let mut conn = self.conn();
            let reply: Option<String> = redis::cmd("SET")
                .arg(&key)
                .arg(&value)
                .arg("EX")
                .arg(ttl_secs)
                .arg("NX")
                .query_async(&mut conn)
                .await
                .map_err(|e| BusError::DedupeFailed {
                    key: key.clone(),
                    reason: e.to_string(),
                })?;
            Ok(reply.is_some())
        })
    }
}

/// Build a [`StreamBus`] over the connections `config` actually uses.
///
/// Only the connections named by the defaults and the configured consumers
/// are dialled; see [`connect_named`] to add names chosen at call time.
///
/// # Errors
///
/// Returns [`BusError::ConnectionFailed`] for the first connection that
/// cannot be established.
pub async fn connect(config: &StreamBusConfig) -> Result<StreamBus> {
    connect_named(config, config.referenced_connections()).await
}

/// Build a [`StreamBus`] with one [`RedisStore`] for each of `names`.
///
/// Names missing from `config.connections` are skipped with a warning; a
/// call that later resolves to one fails with
/// [`BusError::UnknownConnection`].
///
/// # Errors
///
/// Returns [`BusError::ConnectionFailed`] for the first connection that
/// cannot be established within [`CONNECT_TIMEOUT`].
pub async fn connect_named<I, S>(config: &StreamBusConfig, names: I) -> Result<StreamBus>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut builder = StreamBus::builder().config(config);

    for name in names {
        let name = name.as_ref();
        let Some(url) = config.connections.get(name) else {
            tracing::warn!(connection = %name, "Connection is referenced but not configured");
            continue;
        };

        let store = RedisStore::new(url).await.inspect_err(|e| {
            tracing::error!(connection = %name, url = %redacted(url), error = %e, "Redis connection failed");
        })?;
        tracing::info!(connection = %name, url = %redacted(url), "Redis connection ready");
        builder = builder.connection(name.to_string(), Arc::new(store));
    }

    Ok(builder.build())
}

fn is_busy_group(error: &RedisError) -> bool {
    error.code() == Some(BUSYGROUP)
}

/// Strip credentials from a connection URL before logging it.
fn redacted(url: &str) -> String {
    match (url.split_once("://"), url.rsplit_once('@')) {
        (Some((scheme, _)), Some((_, host))) => format!("{scheme}://***@{host}"),
        _ => url.to_string(),
    }
}
