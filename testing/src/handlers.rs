//! Handler doubles.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use stream_bus_core::Payload;
use stream_bus_core::handler::{HandlerFuture, MessageHandler};

/// Records every payload it successfully handles.
///
/// Optionally fails for payloads carrying a truthy marker field, which lets
/// one handler exercise both the success and failure paths of a loop.
#[derive(Debug, Clone, Default)]
pub struct RecordingHandler {
    handled: Arc<Mutex<Vec<Payload>>>,
    attempts: Arc<AtomicUsize>,
    fail_marker: Option<String>,
}

impl RecordingHandler {
    /// Handler that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail for payloads where `field` is `true`.
    #[must_use]
    pub fn failing_on(mut self, field: impl Into<String>) -> Self {
        self.fail_marker = Some(field.into());
        self
    }

    /// Payloads handled successfully, in order.
    #[must_use]
    pub fn handled(&self) -> Vec<Payload> {
        self.handled
            .lock()
            .map(|handled| handled.clone())
            .unwrap_or_default()
    }

    /// Number of times `handle` was invoked, including failures.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl MessageHandler for RecordingHandler {
    fn handle<'a>(&'a self, payload: &'a Payload) -> HandlerFuture<'a> {
        Box::pin(async move {
            self.attempts.fetch_add(1, Ordering::SeqCst);

            if let Some(marker) = &self.fail_marker {
                if payload.get(marker).and_then(serde_json::Value::as_bool) == Some(true) {
                    anyhow::bail!("payload marked '{marker}'");
                }
            }

            self.handled
                .lock()
                .map_err(|_| anyhow::anyhow!("Mutex lock failed"))?
                .push(payload.clone());
            Ok(())
        })
    }
}

/// Always fails with a fixed message.
#[derive(Debug, Clone)]
pub struct FailingHandler {
    message: String,
    attempts: Arc<AtomicUsize>,
}

impl FailingHandler {
    /// Handler failing with `message`.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of times `handle` was invoked.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl MessageHandler for FailingHandler {
    fn handle<'a>(&'a self, _payload: &'a Payload) -> HandlerFuture<'a> {
        Box::pin(async move {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(anyhow::anyhow!("{}", self.message))
        })
    }
}
