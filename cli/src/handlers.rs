//! Handlers shipped with the binary.

use std::io::Write;
use std::sync::Arc;
use stream_bus_core::Payload;
use stream_bus_core::handler::{HandlerFuture, MessageHandler};
use stream_bus_runtime::HandlerRegistry;

/// Logs every payload at info level.
#[derive(Debug, Default)]
pub struct LogHandler;

impl MessageHandler for LogHandler {
    fn handle<'a>(&'a self, payload: &'a Payload) -> HandlerFuture<'a> {
        Box::pin(async move {
            let body = serde_json::to_string(payload)?;
            tracing::info!(payload = %body, "Message received");
            Ok(())
        })
    }
}

/// Writes every payload to stdout as one JSON line.
#[derive(Debug, Default)]
pub struct StdoutHandler;

impl MessageHandler for StdoutHandler {
    fn handle<'a>(&'a self, payload: &'a Payload) -> HandlerFuture<'a> {
        Box::pin(async move {
            let line = serde_json::to_string(payload)?;
            write_line(&line)?;
            Ok(())
        })
    }
}

fn write_line(line: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{line}")?;
    stdout.flush()
}

/// Registry holding the built-in handlers.
pub fn builtin_registry() -> HandlerRegistry {
    HandlerRegistry::new()
        .register("log", || Ok(Arc::new(LogHandler) as Arc<dyn MessageHandler>))
        .register("stdout", || Ok(Arc::new(StdoutHandler) as Arc<dyn MessageHandler>))
}
