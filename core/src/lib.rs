//! # Stream Bus Core
//!
//! Core types, transport drivers and the bus facade for Stream Bus.
//!
//! Producers publish structured payloads to named topics; consumers read,
//! process and acknowledge them. Delivery is at-least-once by default, or
//! effectively-once through a TTL-bounded dedupe gate.
//!
//! ## Data Flow
//!
//! ```text
//! producer ──► StreamBus::publish ──► Transport (log | queue) ──► store
//!
//! store ──► StreamBus::read ──► consumption loop ──► DedupGate ──► handler
//!                                       │
//!                                       └──► StreamBus::ack
//! ```
//!
//! ## Delivery Models
//!
//! - **Log** (`streams`): ordered append-only log with store-assigned record
//!   ids, consumer groups for exclusive delivery, explicit acknowledgment.
//! - **Queue** (`lists`): push to tail, pop from head; a pop is the
//!   consumption, there is nothing to acknowledge.
//!
//! ## Modules
//!
//! - [`envelope`]: the wire unit (`id`, `ts`, `payload`)
//! - [`options`]: option bags, precedence layering and resolution
//! - [`key`]: topic → physical key resolution
//! - [`store`]: the capability contract a backing store implements
//! - [`transport`]: log and queue drivers
//! - [`group`]: idempotent consumer group creation
//! - [`dedup`]: the effectively-once admission gate
//! - [`handler`]: the handler capability contract
//! - [`bus`]: the facade tying it together
//! - [`config`]: startup configuration

pub mod bus;
pub mod config;
pub mod dedup;
pub mod envelope;
pub mod error;
pub mod group;
pub mod handler;
pub mod key;
pub mod options;
pub mod store;
pub mod transport;

pub use bus::{StreamBus, StreamBusBuilder};
pub use config::{ConsumerBinding, StreamBusConfig};
pub use envelope::{Envelope, Message, Payload};
pub use error::{BusError, Result};
pub use handler::{MessageHandler, handler_fn};
pub use options::{BusOptions, Delivery, Driver, ResolvedOptions};
pub use store::{GroupCreation, GroupRead, StreamEntry, StreamStore};
