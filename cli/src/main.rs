//! `stream-bus` binary.
//!
//! Long-running consumer and one-shot publisher for the Stream Bus.
//!
//! # Usage
//!
//! ```bash
//! # Consume one topic with a built-in handler
//! stream-bus consume events:inbound stdout --group workers
//!
//! # Consume every topic listed under "consumers" in $STREAM_BUS_CONFIG
//! stream-bus consume
//!
//! # Publish a payload
//! stream-bus publish events:outbound '{"type":"image.done"}'
//! ```
//!
//! Configuration comes from `STREAM_BUS_CONFIG` (JSON file) and the
//! `STREAM_BUS_*` / `REDIS_URL` environment variables; a `.env` file is
//! loaded first. Set `STREAM_BUS_METRICS_ADDR` to expose Prometheus metrics.

mod args;
mod commands;
mod handlers;

use anyhow::Context;
use args::{Cli, Command};
use clap::Parser;
use std::net::SocketAddr;
use std::process::ExitCode;
use stream_bus_core::StreamBusConfig;
use stream_bus_runtime::metrics::MetricsServer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file
    let _ = dotenvy::dotenv();

    // Logs go to stderr so stdout stays clean for handler output and ids.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,stream_bus=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "stream-bus failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = StreamBusConfig::load()?;
    let _metrics = start_metrics()?;

    match cli.command {
        Command::Consume(args) => {
            let report = commands::consume(args, config).await?;
            tracing::info!(
                processed = report.processed,
                skipped = report.skipped,
                failed = report.failed,
                acked = report.acked,
                "Consumer stopped"
            );
        }
        Command::Publish(args) => {
            commands::publish(args, config).await?;
        }
    }

    Ok(())
}

fn start_metrics() -> anyhow::Result<Option<MetricsServer>> {
    let Ok(raw) = std::env::var("STREAM_BUS_METRICS_ADDR") else {
        return Ok(None);
    };

    let addr: SocketAddr = raw
        .parse()
        .with_context(|| format!("Invalid STREAM_BUS_METRICS_ADDR '{raw}'"))?;
    let mut server = MetricsServer::new(addr);
    server.start()?;
    Ok(Some(server))
}
