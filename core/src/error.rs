//! Error types for bus operations.
//!
//! Everything below the [`StreamBus`](crate::bus::StreamBus) facade reports
//! through [`BusError`]. Store failures are not individually distinguished
//! past that seam: the consumption loop decides whether a failure is fatal,
//! and nothing at the transport layer retries on its own.

use thiserror::Error;

/// Result type alias for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur during bus operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// Failed to connect to a store endpoint
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The resolved connection name has no registered store
    #[error("Unknown connection '{name}'")]
    UnknownConnection {
        /// The connection name that was requested
        name: String,
    },

    /// Failed to publish a message
    #[error("Publish failed for key '{key}': {reason}")]
    PublishFailed {
        /// The physical key that was targeted
        key: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to read messages
    #[error("Read failed for key '{key}': {reason}")]
    ReadFailed {
        /// The physical key that was read
        key: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to acknowledge messages
    #[error("Acknowledge failed for key '{key}': {reason}")]
    AckFailed {
        /// The physical key that was acknowledged against
        key: String,
        /// The reason for failure
        reason: String,
    },

    /// Consumer group could not be created or used
    #[error("Consumer group '{group}' on '{key}': {reason}")]
    ConsumerGroupError {
        /// The physical key of the log
        key: String,
        /// The consumer group name
        group: String,
        /// The reason for failure
        reason: String,
    },

    /// The dedupe admission check failed to reach the store
    #[error("Dedupe check failed for key '{key}': {reason}")]
    DedupeFailed {
        /// The dedupe record key
        key: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to encode or decode an envelope
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// An option value is out of range or unparseable
    #[error("Invalid option: {0}")]
    InvalidOption(String),

    /// Generic store or network failure
    #[error("Transport error: {0}")]
    TransportError(String),
}
