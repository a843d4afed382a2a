//! # Stream Bus Testing
//!
//! Testing utilities for Stream Bus.
//!
//! This crate provides:
//! - [`InMemoryStore`]: a [`StreamStore`](stream_bus_core::StreamStore) with
//!   real consumer-group, list and TTL semantics, no server required
//! - [`RecordingHandler`] and [`FailingHandler`]: handler doubles
//! - [`payload`]: build a payload from a `serde_json::json!` value
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use stream_bus_core::{BusOptions, StreamBus};
//! use stream_bus_testing::{InMemoryStore, payload};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> stream_bus_core::Result<()> {
//! let store = InMemoryStore::new();
//! let bus = StreamBus::builder()
//!     .connection("default", Arc::new(store.clone()))
//!     .build();
//!
//! let options = BusOptions::new().group("g1").consumer("c1");
//! bus.publish("events", payload(serde_json::json!({"foo": "bar"})), &options).await?;
//! let messages = bus.read("events", &options).await?;
//! assert_eq!(messages.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod handlers;
pub mod store;

pub use handlers::{FailingHandler, RecordingHandler};
pub use store::InMemoryStore;

use stream_bus_core::Payload;

/// Convert a JSON object into a [`Payload`].
///
/// Non-object values produce an empty payload.
#[must_use]
pub fn payload(value: serde_json::Value) -> Payload {
    match value {
        serde_json::Value::Object(map) => map,
        _ => Payload::new(),
    }
}
