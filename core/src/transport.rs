//! Transport drivers.
//!
//! A [`Transport`] is the capability set `{publish, read, acknowledge}` over
//! one physical key. Two drivers implement it:
//!
//! ```text
//!              publish            read                    acknowledge
//! ┌───────┐  ┌─────────┐  ┌──────────────────────┐  ┌──────────────────┐
//! │  log  │  │ append  │  │ ensure group, then   │  │ drop ids from    │
//! │       │  │ (rec id)│  │ group-scoped read    │  │ group's pending  │
//! ├───────┤  ├─────────┤  ├──────────────────────┤  ├──────────────────┤
//! │ queue │  │  push   │  │ pop head (1 record)  │  │ no-op, always 0  │
//! └───────┘  └─────────┘  └──────────────────────┘  └──────────────────┘
//! ```
//!
//! The queue driver has no acknowledgment phase: a successful pop consumes
//! the record for good. If the handler then fails, the record is lost unless
//! the caller re-publishes it.
//!
//! The log driver acknowledges records it cannot decode as it skips them,
//! so they never reach a handler and do not linger in the pending list.

use crate::envelope::{Envelope, Message};
#[cfg(doc)]
use crate::error::BusError;
use crate::group::GroupManager;
use crate::options::{Driver, ResolvedOptions};
use crate::store::{GroupRead, StoreFuture, StreamStore};
use std::sync::Arc;

/// Capability set shared by both drivers.
pub trait Transport: Send + Sync {
    /// Which driver this is.
    fn driver(&self) -> Driver;

    /// Publish `envelope` to `key`, returning the identifier callers should
    /// keep: the record id for the log driver, the envelope id for the queue.
    ///
    /// # Errors
    ///
    /// Propagates the store's error, [`BusError::PublishFailed`] for a
    /// rejected write.
    fn publish(&self, key: &str, envelope: &Envelope) -> StoreFuture<'_, String>;

    /// Read the next batch of messages from `key`.
    ///
    /// An empty or nonexistent key yields an empty vector.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::ReadFailed`] or [`BusError::ConsumerGroupError`]
    /// if the store fails.
    fn read(&self, key: &str, options: &ResolvedOptions) -> StoreFuture<'_, Vec<Message>>;

    /// Mark `ids` as consumed for `group`, returning how many were pending.
    ///
    /// # Errors
    ///
    /// Propagates the store's error, [`BusError::AckFailed`] for a rejected
    /// acknowledgment.
    fn acknowledge(&self, key: &str, group: &str, ids: &[String]) -> StoreFuture<'_, u64>;
}

/// Select the transport for `driver` over `store`.
#[must_use]
pub fn for_driver(driver: Driver, store: Arc<dyn StreamStore>) -> Box<dyn Transport> {
    match driver {
        Driver::Log => Box::new(LogTransport::new(store)),
        Driver::Queue => Box::new(QueueTransport::new(store)),
    }
}

/// Ordered, consumer-group delivered, acknowledgment based driver.
#[derive(Clone)]
pub struct LogTransport {
    store: Arc<dyn StreamStore>,
    groups: GroupManager,
}

impl LogTransport {
    /// Log driver over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn StreamStore>) -> Self {
        let groups = GroupManager::new(Arc::clone(&store));
        Self { store, groups }
    }
}

impl Transport for LogTransport {
    fn driver(&self) -> Driver {
        Driver::Log
    }

    fn publish(&self, key: &str, envelope: &Envelope) -> StoreFuture<'_, String> {
        let key = key.to_string();
        let body = envelope.to_json();
        let message_id = envelope.id().to_string();

        Box::pin(async move {
            let body = body?;
            let record_id = self.store.append(&key, &body).await?;

            tracing::debug!(
                key = %key,
                record_id = %record_id,
                message_id = %message_id,
                "Message appended to log"
            );

            Ok(record_id)
        })
    }

    fn read(&self, key: &str, options: &ResolvedOptions) -> StoreFuture<'_, Vec<Message>> {
        let key = key.to_string();
        let read = GroupRead {
            group: options.group.clone(),
            consumer: options.consumer.clone(),
            count: options.count,
            block: options.block_duration(),
        };

        Box::pin(async move {
            // A missing log or group is created on demand rather than failing.
            self.groups.ensure(&key, &read.group).await?;

            let entries = self.store.read_group(&key, &read).await?;

            let mut messages = Vec::with_capacity(entries.len());
            let mut skipped = Vec::new();
            for entry in entries {
                let Some(body) = entry.body else {
                    tracing::warn!(key = %key, record_id = %entry.id, "Log record has no message field, skipping");
                    skipped.push(entry.id);
                    continue;
                };

                match Envelope::from_json(&body) {
                    Ok(envelope) => messages.push(Message {
                        id: Some(entry.id),
                        envelope,
                    }),
                    Err(e) => {
                        tracing::warn!(
                            key = %key,
                            record_id = %entry.id,
                            error = %e,
                            "Undecodable log record, skipping"
                        );
                        skipped.push(entry.id);
                    }
                }
            }

            // Nothing can decode these, so leaving them pending would redeliver them forever.
            if !skipped.is_empty() {
                if let Err(e) = self.store.acknowledge(&key, &read.group, &skipped).await {
                    tracing::warn!(
                        key = %key,
                        group = %read.group,
                        count = skipped.len(),
                        error = %e,
                        "Failed to acknowledge skipped log records"
                    );
                }
            }

            tracing::trace!(
                key = %key,
                group = %read.group,
                consumer = %read.consumer,
                count = messages.len(),
                "Log read complete"
            );

            Ok(messages)
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

            let acked = self.store.acknowledge(&key, &group, &ids).await?;

            tracing::trace!(key = %key, group = %group, acked = acked, "Records acknowledged");
            Ok(acked)
        })
    }
}

/// Push/pop list driver with no acknowledgment phase.
#[derive(Clone)]
pub struct QueueTransport {
    store: Arc<dyn StreamStore>,
}

impl QueueTransport {
    /// Queue driver over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn StreamStore>) -> Self {
        Self { store }
    }
}

impl Transport for QueueTransport {
    fn driver(&self) -> Driver {
        Driver::Queue
    }

    fn publish(&self, key: &str, envelope: &Envelope) -> StoreFuture<'_, String> {
        let key = key.to_string();
        let body = envelope.to_json();
        let message_id = envelope.id().to_string();

        Box::pin(async move {
            let body = body?;
            let length = self.store.push(&key, &body).await?;

            tracing::debug!(
                key = %key,
                message_id = %message_id,
                queue_length = length,
                "Message pushed to queue"
            );

            Ok(message_id)
        })
    }

    fn read(&self, key: &str, options: &ResolvedOptions) -> StoreFuture<'_, Vec<Message>> {
        let key = key.to_string();
        let timeout = options.block_duration();

        Box::pin(async move {
            let Some(body) = self.store.pop(&key, timeout).await? else {
                return Ok(Vec::new());
            };

            match Envelope::from_json(&body) {
                Ok(envelope) => Ok(vec![Message {
                    id: Some(envelope.id().to_string()),
                    envelope,
                }]),
                Err(e) => {
                    // Already popped: the record is gone either way.
                    tracing::warn!(key = %key, error = %e, "Undecodable queue item dropped");
                    Ok(Vec::new())
                }
            }
        })
    }

    fn acknowledge(&self, _key: &str, _group: &str, _ids: &[String]) -> StoreFuture<'_, u64> {
        Box::pin(async { Ok(0) })
    }
}
