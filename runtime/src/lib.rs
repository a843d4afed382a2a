//! # Stream Bus Runtime
//!
//! The long-running side of Stream Bus: a consumption loop that reads from
//! one or more topics, filters duplicates, dispatches to handlers and
//! acknowledges what was handled.
//!
//! ## Core Components
//!
//! - **[`Consumer`]**: the read → dedupe → handle → ack state machine
//! - **[`HandlerRegistry`]**: handler name → factory, for configured consumers
//! - **[`metrics`]**: Prometheus counters for the loop
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use stream_bus_core::{StreamBus, handler_fn};
//! use stream_bus_runtime::{Consumer, ConsumerOptions, HandlerRegistry};
//!
//! # async fn example(bus: Arc<StreamBus>, config: stream_bus_core::StreamBusConfig) -> Result<(), Box<dyn std::error::Error>> {
//! let registry = HandlerRegistry::new().register_instance(
//!     "audit",
//!     Arc::new(handler_fn(|payload| async move {
//!         tracing::info!(?payload, "audit");
//!         Ok::<_, anyhow::Error>(())
//!     })),
//! );
//!
//! let bindings = registry.bindings_from_config(&config.consumers)?;
//! let mut consumer = Consumer::new(bus, bindings, ConsumerOptions::default().once(true))?;
//! let report = consumer.run().await?;
//! println!("processed {}", report.processed);
//! # Ok(())
//! # }
//! ```

pub mod consumer;
pub mod error;
/// Prometheus metrics for observability
pub mod metrics;
pub mod registry;

pub use consumer::{Binding, ConsumeReport, Consumer, ConsumerOptions, LoopState};
pub use error::{ConsumeError, Result};
pub use registry::HandlerRegistry;
