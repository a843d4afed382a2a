//! Store capability contract.
//!
//! The bus does not own its storage. A [`StreamStore`] exposes the three
//! structures the transports need:
//!
//! - an append-only log with store-assigned monotonic record ids,
//!   consumer-group scoped exclusive delivery and acknowledgment,
//! - a list supporting push-to-tail and blocking pop-from-head,
//! - an atomic "set if absent, with expiry" primitive for the dedupe gate.
//!
//! Methods take physical keys; topic resolution happens above this layer.
//!
//! # Dyn Compatibility
//!
//! Methods return `Pin<Box<dyn Future>>` instead of using `async fn` so that
//! stores can be held as `Arc<dyn StreamStore>` and selected by connection
//! name at runtime.

use crate::error::Result;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Boxed future returned by store and transport operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// A raw log record: store-assigned id plus the encoded envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    /// Store-assigned record id.
    pub id: String,
    /// Encoded envelope, if the record carries one.
    pub body: Option<String>,
}

/// Outcome of a consumer group creation.
///
/// Both variants mean the group now exists; callers treat them alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupCreation {
    /// The group was created by this call.
    Created,
    /// The group already existed and was left untouched.
    AlreadyExists,
}

/// Parameters of a consumer-group scoped log read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRead {
    /// Consumer group.
    pub group: String,
    /// Consumer identity inside the group.
    pub consumer: String,
    /// Maximum records to return.
    pub count: usize,
    /// How long to wait for records; zero means do not wait.
    pub block: Duration,
}

/// Capability set required of a backing store.
pub trait StreamStore: Send + Sync {
    /// Append `body` to the log at `key`, returning the new record id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the append.
    fn append(&self, key: &str, body: &str) -> StoreFuture<'_, String>;

    /// Create `group` on the log at `key` with its cursor at the beginning,
    /// creating the log if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error for any failure other than the group already existing.
    fn create_group(&self, key: &str, group: &str) -> StoreFuture<'_, GroupCreation>;

    /// Read up to `read.count` records never delivered to `read.group`,
    /// assigning them to `read.consumer`.
    ///
    /// Returns an empty vector when nothing arrives within `read.block`.
    ///
    /// # Errors
    ///
    /// Returns an error if the group does not exist or the store fails.
    fn read_group(&self, key: &str, read: &GroupRead) -> StoreFuture<'_, Vec<StreamEntry>>;

    /// Remove `ids` from the pending set of `group`, returning how many were
    /// pending.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    fn acknowledge(&self, key: &str, group: &str, ids: &[String]) -> StoreFuture<'_, u64>;

    /// Push `body` onto the tail of the list at `key`, returning its new length.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the push.
    fn push(&self, key: &str, body: &str) -> StoreFuture<'_, u64>;

    /// Pop the head of the list at `key`, waiting up to `timeout`.
    ///
    /// A zero timeout pops without waiting.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    fn pop(&self, key: &str, timeout: Duration) -> StoreFuture<'_, Option<String>>;

    /// Atomically set `key` to `value` with a `ttl`, only if it is absent.
    ///
    /// Returns `true` if this call set the key.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreFuture<'_, bool>;
}
