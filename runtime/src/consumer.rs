//! The consumption loop.
//!
//! A [`Consumer`] drives one or more `(topic, handler)` [`Binding`]s through
//! a cooperative, single-task state machine:
//!
//! ```text
//!            ┌──────────────────────────────────────────┐
//!            ▼                                          │
//!        ┌──────┐   ┌─────────┐   ┌─────────────┐       │
//!  ────► │ Idle │──►│ Reading │──►│ Dispatching │───────┘
//!        └──────┘   └─────────┘   └─────────────┘
//!            │                           │
//!            │ once / fatal error        │ fatal error
//!            ▼                           ▼
//!        ┌─────────┐◄────────────────────┘
//!        │ Stopped │
//!        └─────────┘
//! ```
//!
//! Per pass, each binding is fully read and dispatched before the next one
//! is attempted. For every message with an id the dedupe gate is consulted
//! first; rejected messages are acknowledged (log driver) without reaching
//! the handler. Handled messages are acknowledged on success and left
//! pending on failure.
//!
//! When more than one binding is configured, every read uses
//! [`ConsumerOptions::fanout_block`] (zero by default) instead of its
//! configured block duration, so one quiet topic cannot starve the others.
//! This turns blocking reads into polling reads and raises the read volume
//! against the store.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use stream_bus_core::{StreamBus, handler_fn};
//! use stream_bus_runtime::{Binding, Consumer, ConsumerOptions};
//!
//! # async fn example(bus: Arc<StreamBus>) -> Result<(), Box<dyn std::error::Error>> {
//! let handler = Arc::new(handler_fn(|payload| async move {
//!     tracing::info!(?payload, "received");
//!     Ok::<_, anyhow::Error>(())
//! }));
//!
//! let mut consumer = Consumer::new(
//!     bus,
//!     vec![Binding::new("events:inbound", handler)],
//!     ConsumerOptions::default(),
//! )?;
//! consumer.run().await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{ConsumeError, Result};
use crate::metrics::ConsumerMetrics;
use std::sync::Arc;
use std::time::{Duration, Instant};
use stream_bus_core::{BusError, BusOptions, Driver, Message, MessageHandler, StreamBus};

/// Default idle backoff between empty passes.
pub const DEFAULT_IDLE_SLEEP: Duration = Duration::from_millis(200);

/// A topic bound to the handler that processes it.
#[derive(Clone)]
pub struct Binding {
    topic: String,
    handler: Arc<dyn MessageHandler>,
    options: BusOptions,
}

impl Binding {
    /// Bind `handler` to `topic` with no per-binding options.
    #[must_use]
    pub fn new(topic: impl Into<String>, handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            topic: topic.into(),
            handler,
            options: BusOptions::default(),
        }
    }

    /// Set options applied to every bus call made for this binding.
    #[must_use]
    pub fn with_options(mut self, options: BusOptions) -> Self {
        self.options = options;
        self
    }

    /// The bound topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Options applied to this binding's calls.
    #[must_use]
    pub const fn options(&self) -> &BusOptions {
        &self.options
    }
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("topic", &self.topic)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Loop policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerOptions {
    /// Stop after exactly one pass over all bindings.
    pub once: bool,
    /// Sleep between passes that found nothing.
    pub sleep: Duration,
    /// Acknowledge handled and rejected messages (log driver only).
    pub ack: bool,
    /// Stop on the first handler failure.
    pub stop_on_error: bool,
    /// Block duration used for every read when more than one binding is
    /// configured, in the driver's unit.
    pub fanout_block: u64,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            once: false,
            sleep: DEFAULT_IDLE_SLEEP,
            ack: true,
            stop_on_error: false,
            fanout_block: 0,
        }
    }
}

impl ConsumerOptions {
    /// Run a single pass.
    #[must_use]
    pub const fn once(mut self, once: bool) -> Self {
        self.once = once;
        self
    }

    /// Set the idle sleep.
    #[must_use]
    pub const fn sleep(mut self, sleep: Duration) -> Self {
        self.sleep = sleep;
        self
    }

    /// Enable or disable acknowledgment.
    #[must_use]
    pub const fn ack(mut self, ack: bool) -> Self {
        self.ack = ack;
        self
    }

    /// Stop on the first handler failure.
    #[must_use]
    pub const fn stop_on_error(mut self, stop_on_error: bool) -> Self {
        self.stop_on_error = stop_on_error;
        self
    }

    /// Set the fan-out block duration.
    #[must_use]
    pub const fn fanout_block(mut self, block: u64) -> Self {
        self.fanout_block = block;
        self
    }

    const fn failures_are_fatal(&self) -> bool {
        self.once || self.stop_on_error
    }
}

/// Loop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Between passes.
    Idle,
    /// Waiting on a read.
    Reading,
    /// Handing messages to a handler.
    Dispatching,
    /// Terminated; the consumer cannot be run again.
    Stopped,
}

/// Running totals for a consumer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumeReport {
    /// Completed passes over all bindings.
    pub passes: u64,
    /// Messages returned by reads.
    pub read: u64,
    /// Messages handled successfully.
    pub processed: u64,
    /// Messages rejected by the dedupe gate.
    pub skipped: u64,
    /// Handler failures.
    pub failed: u64,
    /// Records acknowledged.
    pub acked: u64,
}

/// Drives bindings through the read → dedupe → handle → ack cycle.
pub struct Consumer {
    bus: Arc<StreamBus>,
    bindings: Arc<[Binding]>,
    options: ConsumerOptions,
    state: LoopState,
    report: ConsumeReport,
}

impl Consumer {
    /// Create a consumer over `bindings`.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumeError::Config`] if `bindings` is empty.
    pub fn new(
        bus: Arc<StreamBus>,
        bindings: Vec<Binding>,
        options: ConsumerOptions,
    ) -> Result<Self> {
        if bindings.is_empty() {
            return Err(ConsumeError::Config(
                "no topic/handler binding configured".to_string(),
            ));
        }

        Ok(Self {
            bus,
            bindings: bindings.into(),
            options,
            state: LoopState::Idle,
            report: ConsumeReport::default(),
        })
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> LoopState {
        self.state
    }

    /// Totals so far.
    #[must_use]
    pub const fn report(&self) -> ConsumeReport {
        self.report
    }

    /// Run until a single pass completes (`once`) or a fatal failure occurs.
    ///
    /// Without `once` this only returns on a fatal failure; stop it by
    /// dropping the future.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumeError::Handler`] or [`ConsumeError::Bus`] when a
    /// failure happens under `once` or `stop_on_error`, and
    /// [`ConsumeError::Config`] if the consumer already stopped.
    pub async fn run(&mut self) -> Result<ConsumeReport> {
        self.ensure_running()?;

        tracing::info!(
            topics = ?self.bindings.iter().map(Binding::topic).collect::<Vec<_>>(),
            once = self.options.once,
            ack = self.options.ack,
            stop_on_error = self.options.stop_on_error,
            "Consumer started"
        );

        loop {
            let found = self.poll().await?;

            if self.options.once {
                self.transition(LoopState::Stopped);
                tracing::info!(report = ?self.report, "Consumer finished single pass");
                return Ok(self.report);
            }

            if found == 0 {
                tracing::trace!(sleep = ?self.options.sleep, "No messages, backing off");
                tokio::time::sleep(self.options.sleep).await;
            }
        }
    }

    /// Make one full pass over every binding, returning how many messages
    /// were read.
    ///
    /// # Errors
    ///
    /// Same as [`run`](Self::run). A fatal failure stops the consumer.
    pub async fn poll(&mut self) -> Result<usize> {
        self.ensure_running()?;

        let bindings = Arc::clone(&self.bindings);
        let fanout = bindings.len() > 1;

        let mut found = 0;
        for binding in bindings.iter() {
            match self.poll_binding(binding, fanout).await {
                Ok(read) => found += read,
                Err(e) => {
                    self.transition(LoopState::Stopped);
                    return Err(e);
                }
            }
        }

        self.report.passes += 1;
        self.transition(LoopState::Idle);
        Ok(found)
    }

    async fn poll_binding(&mut self, binding: &Binding, fanout: bool) -> Result<usize> {
        let topic = binding.topic();
        let options = if fanout {
            binding.options.clone().block(self.options.fanout_block)
        } else {
            binding.options.clone()
        };

        self.transition(LoopState::Reading);
        let messages = match self.bus.read(topic, &options).await {
            Ok(messages) => messages,
            Err(e) => {
                ConsumerMetrics::record_read_error(topic);
                tracing::error!(topic = %topic, error = %e, "Read failed");
                return self.fail_or_continue(topic, e).map(|()| 0);
            }
        };

        ConsumerMetrics::record_read(topic, messages.len());
        self.report.read += messages.len() as u64;
        if messages.is_empty() {
            return Ok(0);
        }

        let acknowledges =
            self.options.ack && self.bus.resolved_driver(topic, &options) == Driver::Log;

        self.transition(LoopState::Dispatching);
        for message in &messages {
            self.dispatch(binding, &options, message, acknowledges).await?;
        }

        Ok(messages.len())
    }

    async fn dispatch(
        &mut self,
        binding: &Binding,
        options: &BusOptions,
        message: &Message,
        acknowledges: bool,
    ) -> Result<()> {
        let topic = binding.topic();

        if let Some(id) = &message.id {
            match self.bus.should_process(topic, id, options).await {
                Ok(true) => {}
                Ok(false) => {
                    self.report.skipped += 1;
                    ConsumerMetrics::record_skipped(topic);
                    tracing::debug!(topic = %topic, message_id = %id, "Skipping duplicate message");
                    if acknowledges {
                        self.acknowledge(topic, id, options).await;
                    }
                    return Ok(());
                }
                Err(e) => {
                    // Not handled and not acknowledged: stays redeliverable on the log.
                    tracing::error!(topic = %topic, message_id = %id, error = %e, "Dedupe check failed");
                    return self.fail_or_continue(topic, e);
                }
            }
        }

        let started = Instant::now();
        match binding.handler.handle(message.payload()).await {
            Ok(()) => {
                ConsumerMetrics::record_processed(topic, started.elapsed());
                self.report.processed += 1;
                if acknowledges {
                    if let Some(id) = &message.id {
                        self.acknowledge(topic, id, options).await;
                    }
                }
                Ok(())
            }
            Err(e) => {
                ConsumerMetrics::record_handler_error(topic, started.elapsed());
                self.report.failed += 1;

                let message_id = message.id.clone().unwrap_or_else(|| "-".to_string());
                let reason = format!("{e:#}");
                tracing::error!(
                    topic = %topic,
                    message_id = %message_id,
                    error = %reason,
                    "Handler failed"
                );

                if self.options.failures_are_fatal() {
                    return Err(ConsumeError::Handler {
                        topic: topic.to_string(),
                        message_id,
                        reason,
                    });
                }
                Ok(())
            }
        }
    }

    async fn acknowledge(&mut self, topic: &str, id: &str, options: &BusOptions) {
        match self.bus.ack(topic, [id], options).await {
            Ok(acked) => {
                self.report.acked += acked;
                ConsumerMetrics::record_acked(topic, acked);
            }
            Err(e) => {
                tracing::warn!(
                    topic = %topic,
                    message_id = %id,
                    error = %e,
                    "Acknowledge failed (message may be redelivered)"
                );
            }
        }
    }

    fn ensure_running(&self) -> Result<()> {
        if self.state == LoopState::Stopped {
            return Err(ConsumeError::Config("consumer already stopped".to_string()));
        }
        Ok(())
    }

    fn fail_or_continue(&self, topic: &str, error: BusError) -> Result<()> {
        if self.options.failures_are_fatal() {
            Err(ConsumeError::Bus {
                topic: topic.to_string(),
                source: error,
            })
        } else {
            Ok(())
        }
    }

    fn transition(&mut self, next: LoopState) {
        if self.state != next {
            tracing::trace!(from = ?self.state, to = ?next, "Consumer state change");
            self.state = next;
        }
    }
}
