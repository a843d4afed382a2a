//! Prometheus metrics for the consumption loop.
//!
//! Every counter is labelled with the `topic` it concerns:
//!
//! | Metric | Kind |
//! |---|---|
//! | `stream_bus_messages_read_total` | counter |
//! | `stream_bus_messages_processed_total` | counter |
//! | `stream_bus_messages_skipped_total` | counter |
//! | `stream_bus_messages_acked_total` | counter |
//! | `stream_bus_handler_errors_total` | counter |
//! | `stream_bus_read_errors_total` | counter |
//! | `stream_bus_handler_duration_seconds` | histogram |
//!
//! Without an installed recorder the macros are no-ops, so the loop records
//! unconditionally.
//!
//! # Example
//!
//! ```rust,no_run
//! use stream_bus_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics server.
///
/// Exposes metrics on an HTTP endpoint for Prometheus scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address to bind to (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Install the recorder and spawn the HTTP exporter.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or a recorder is
    /// already installed.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?
            .build()
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let handle = recorder.handle();
        metrics::set_global_recorder(recorder)
            .map_err(|e| MetricsError::Install(e.to_string()))?;

        let addr = self.addr;
        tokio::spawn(async move {
            // ExporterError carries no Debug/Display impl.
            if exporter.await.is_err() {
                tracing::error!(addr = %addr, "Metrics exporter stopped");
            }
        });

        tracing::info!(
            addr = %self.addr,
            "Metrics server started - available at http://{}/metrics",
            self.addr
        );
        self.handle = Some(handle);
        Ok(())
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if server hasn't been started.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    describe_counter!(
        "stream_bus_messages_read_total",
        "Total number of messages returned by reads"
    );
    describe_counter!(
        "stream_bus_messages_processed_total",
        "Total number of messages handled successfully"
    );
    describe_counter!(
        "stream_bus_messages_skipped_total",
        "Total number of messages rejected by the dedupe gate"
    );
    describe_counter!(
        "stream_bus_messages_acked_total",
        "Total number of records acknowledged"
    );
    describe_counter!(
        "stream_bus_handler_errors_total",
        "Total number of handler failures"
    );
    describe_counter!(
        "stream_bus_read_errors_total",
        "Total number of failed reads"
    );
    describe_histogram!(
        "stream_bus_handler_duration_seconds",
        "Time taken by handlers"
    );
}

/// Consumption loop metrics recorder.
pub struct ConsumerMetrics;

impl ConsumerMetrics {
    /// Record a completed read.
    pub fn record_read(topic: &str, count: usize) {
        counter!("stream_bus_messages_read_total", "topic" => topic.to_string())
            .increment(count as u64);
    }

    /// Record a failed read.
    pub fn record_read_error(topic: &str) {
        counter!("stream_bus_read_errors_total", "topic" => topic.to_string()).increment(1);
    }

    /// Record a dedupe rejection.
    pub fn record_skipped(topic: &str) {
        counter!("stream_bus_messages_skipped_total", "topic" => topic.to_string()).increment(1);
    }

    /// Record a handler success.
    pub fn record_processed(topic: &str, duration: Duration) {
        counter!("stream_bus_messages_processed_total", "topic" => topic.to_string())
            .increment(1);
        histogram!("stream_bus_handler_duration_seconds", "topic" => topic.to_string())
            .record(duration.as_secs_f64());
    }

    /// Record a handler failure.
    pub fn record_handler_error(topic: &str, duration: Duration) {
        counter!("stream_bus_handler_errors_total", "topic" => topic.to_string()).increment(1);
        histogram!("stream_bus_handler_duration_seconds", "topic" => topic.to_string())
            .record(duration.as_secs_f64());
    }

    /// Record acknowledged records.
    pub fn record_acked(topic: &str, count: u64) {
        counter!("stream_bus_messages_acked_total", "topic" => topic.to_string())
            .increment(count);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn started_server_renders_consumer_metrics() {
        let mut server = MetricsServer::new("127.0.0.1:0".parse().unwrap());
        assert!(server.render().is_none());

        server.start().unwrap();
        ConsumerMetrics::record_read("events:inbound", 2);
        ConsumerMetrics::record_acked("events:inbound", 1);

        let rendered = server.render().unwrap();
        assert!(rendered.contains("stream_bus_messages_read_total"));
        assert!(rendered.contains("stream_bus_messages_acked_total"));
        assert!(rendered.contains(r#"topic="events:inbound""#));
    }
}
