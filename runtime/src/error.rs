//! Error types for the consumption loop.

use stream_bus_core::BusError;
use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, ConsumeError>;

/// Errors that stop (or prevent starting) a consumption loop.
#[derive(Error, Debug)]
pub enum ConsumeError {
    /// Handler binding missing, unresolvable or failed to construct.
    ///
    /// Reported before the loop starts.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A handler failed while running in once or stop-on-error mode.
    #[error("Handler failed on topic '{topic}' (message {message_id}): {reason}")]
    Handler {
        /// Topic the message came from
        topic: String,
        /// Record id of the failed message, or `-` if it had none
        message_id: String,
        /// Rendered handler error
        reason: String,
    },

    /// A bus operation failed while running in once or stop-on-error mode.
    #[error("Bus operation failed on topic '{topic}': {source}")]
    Bus {
        /// Topic being consumed
        topic: String,
        /// The underlying bus error
        #[source]
        source: BusError,
    },
}
