//! In-memory store for tests.

use chrono::Utc;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use stream_bus_core::error::{BusError, Result};
use stream_bus_core::store::{GroupCreation, GroupRead, StoreFuture, StreamEntry, StreamStore};
use tokio::time::Instant;

/// `<millis>-<sequence>` record id, ordered like the real store's ids.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct RecordId {
    ms: u64,
    seq: u64,
}

impl RecordId {
    fn next_after(last: Self) -> Self {
        let now = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
        if now > last.ms {
            Self { ms: now, seq: 0 }
        } else {
            Self {
                ms: last.ms,
                seq: last.seq + 1,
            }
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        let (ms, seq) = raw.split_once('-')?;
        Some(Self {
            ms: ms.parse().ok()?,
            seq: seq.parse().ok()?,
        })
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

#[derive(Debug, Default)]
struct Group {
    last_delivered: RecordId,
    /// Delivered but unacknowledged record → consumer it went to.
    pending: BTreeMap<RecordId, String>,
}

#[derive(Debug, Default)]
struct Log {
    entries: Vec<(RecordId, String)>,
    last_id: RecordId,
    groups: HashMap<String, Group>,
}

#[derive(Debug, Default)]
struct Inner {
    logs: HashMap<String, Log>,
    lists: HashMap<String, VecDeque<String>>,
    /// Value and expiry; `None` never expires.
    values: HashMap<String, (String, Option<Instant>)>,
    unavailable: bool,
}

fn is_live(expires_at: Option<Instant>, now: Instant) -> bool {
    expires_at.is_none_or(|at| at > now)
}

impl Inner {
    fn check_available(&self) -> Result<()> {
        if self.unavailable {
            Err(BusError::TransportError("store unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

/// In-memory [`StreamStore`].
///
/// Implements the full capability contract with the semantics of the real
/// store: consumer groups track a delivery cursor and a pending set per
/// group, lists are FIFO, and conditional sets honour their TTL (measured
/// with `tokio::time`, so paused-clock tests can advance past it).
///
/// Reads never block: a blocking read on an empty log or list returns
/// immediately with nothing.
///
/// Clones share state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        lock(&self.inner)
    }

    /// Make every subsequent operation fail (or succeed again).
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn set_unavailable(&self, unavailable: bool) -> Result<()> {
        self.lock()?.unavailable = unavailable;
        Ok(())
    }

    /// Number of records in the log at `key`.
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn log_len(&self, key: &str) -> Result<usize> {
        Ok(self.lock()?.logs.get(key).map_or(0, |log| log.entries.len()))
    }

    /// Whether a log exists at `key`.
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn log_exists(&self, key: &str) -> Result<bool> {
        Ok(self.lock()?.logs.contains_key(key))
    }

    /// Whether `group` exists on the log at `key`.
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn group_exists(&self, key: &str, group: &str) -> Result<bool> {
        Ok(self
            .lock()?
            .logs
            .get(key)
            .is_some_and(|log| log.groups.contains_key(group)))
    }

    /// Last record id delivered to `group`.
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn group_cursor(&self, key: &str, group: &str) -> Result<Option<String>> {
        Ok(self
            .lock()?
            .logs
            .get(key)
            .and_then(|log| log.groups.get(group))
            .map(|g| g.last_delivered.to_string()))
    }

    /// Delivered but unacknowledged record ids for `group`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn pending(&self, key: &str, group: &str) -> Result<Vec<String>> {
        Ok(self
            .lock()?
            .logs
            .get(key)
            .and_then(|log| log.groups.get(group))
            .map(|g| g.pending.keys().map(ToString::to_string).collect())
            .unwrap_or_default())
    }

    /// Items currently in the list at `key`, head first.
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn list_items(&self, key: &str) -> Result<Vec<String>> {
        Ok(self
            .lock()?
            .lists
            .get(key)
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default())
    }

    /// Whether an unexpired value is stored at `key`.
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn has_value(&self, key: &str) -> Result<bool> {
        let now = Instant::now();
        Ok(self
            .lock()?
            .values
            .get(key)
            .is_some_and(|(_, expires_at)| is_live(*expires_at, now)))
    }
}

fn lock(inner: &Mutex<Inner>) -> Result<MutexGuard<'_, Inner>> {
    inner
        .lock()
        .map_err(|_| BusError::TransportError("Mutex lock failed".to_string()))
}

impl StreamStore for InMemoryStore {
    fn append(&self, key: &str, body: &str) -> StoreFuture<'_, String> {
        let key = key.to_string();
        let body = body.to_string();

        Box::pin(async move {
            let mut inner = self.lock()?;
            inner.check_available()?;

            let log = inner.logs.entry(key).or_default();
            let id = RecordId::next_after(log.last_id);
            log.last_id = id;
            log.entries.push((id, body));
            Ok(id.to_string())
        })
    }

    fn create_group(&self, key: &str, group: &str) -> StoreFuture<'_, GroupCreation> {
        let key = key.to_string();
        let group = group.to_string();

        Box::pin(async move {
            let mut inner = self.lock()?;
            inner.check_available()?;

            let log = inner.logs.entry(key).or_default();
            if log.groups.contains_key(&group) {
                return Ok(GroupCreation::AlreadyExists);
            }
            log.groups.insert(group, Group::default());
            Ok(GroupCreation::Created)
        })
    }

    fn read_group(&self, key: &str, read: &GroupRead) -> StoreFuture<'_, Vec<StreamEntry>> {
        let key = key.to_string();
        let read = read.clone();

        Box::pin(async move {
            let mut inner = self.lock()?;
            inner.check_available()?;

            let no_group = || BusError::ConsumerGroupError {
                key: key.clone(),
                group: read.group.clone(),
                reason: "NOGROUP no such key or consumer group".to_string(),
            };

            let log = inner.logs.get_mut(&key).ok_or_else(no_group)?;
            let Log {
                entries, groups, ..
            } = log;
            let group = groups.get_mut(&read.group).ok_or_else(no_group)?;

            let batch: Vec<(RecordId, String)> = entries
                .iter()
                .filter(|(id, _)| *id > group.last_delivered)
                .take(read.count)
                .cloned()
                .collect();

            let mut delivered = Vec::with_capacity(batch.len());
            for (id, body) in batch {
                group.last_delivered = id;
                group.pending.insert(id, read.consumer.clone());
                delivered.push(StreamEntry {
                    id: id.to_string(),
                    body: Some(body),
                });
            }
            Ok(delivered)
        })
    }

    fn acknowledge(&self, key: &str, group: &str, ids: &[String]) -> StoreFuture<'_, u64> {
        let key = key.to_string();
        let group = group.to_string();
        let ids = ids.to_vec();

        Box::pin(async move {
            let mut inner = self.lock()?;
            inner.check_available()?;

            let Some(group) = inner
                .logs
                .get_mut(&key)
                .and_then(|log| log.groups.get_mut(&group))
            else {
                return Ok(0);
            };

            let mut acked = 0;
            for id in ids.iter().filter_map(|raw| RecordId::parse(raw)) {
                if group.pending.remove(&id).is_some() {
                    acked += 1;
                }
            }
            Ok(acked)
        })
    }

    fn push(&self, key: &str, body: &str) -> StoreFuture<'_, u64> {
        let key = key.to_string();
        let body = body.to_string();

        Box::pin(async move {
            let mut inner = self.lock()?;
            inner.check_available()?;

            let list = inner.lists.entry(key).or_default();
            list.push_back(body);
            Ok(list.len() as u64)
        })
    }

    fn pop(&self, key: &str, _timeout: Duration) -> StoreFuture<'_, Option<String>> {
        let key = key.to_string();

        Box::pin(async move {
            let mut inner = self.lock()?;
            inner.check_available()?;

            let Some(list) = inner.lists.get_mut(&key) else {
                return Ok(None);
            };
            let item = list.pop_front();
            if list.is_empty() {
                inner.lists.remove(&key);
            }
            Ok(item)
        })
    }

    fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreFuture<'_, bool> {
        let key = key.to_string();
        let value = value.to_string();

        Box::pin(async move {
            let mut inner = self.lock()?;
            inner.check_available()?;

            let now = Instant::now();
            let live = inner
                .values
                .get(&key)
                .is_some_and(|(_, expires_at)| is_live(*expires_at, now));
            if live {
                return Ok(false);
            }
            inner.values.insert(key, (value, now.checked_add(ttl)));
            Ok(true)
        })
    }
}
