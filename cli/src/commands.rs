//! Subcommand implementations.

use crate::args::{ConsumeArgs, PublishArgs};
use crate::handlers::builtin_registry;
use anyhow::Context;
use std::sync::Arc;
use stream_bus_core::{BusOptions, Payload, StreamBusConfig};
use stream_bus_runtime::{Binding, ConsumeError, ConsumeReport, Consumer, HandlerRegistry};

/// Run the consumption loop until it finishes, fails, or Ctrl-C arrives.
pub async fn consume(args: ConsumeArgs, config: StreamBusConfig) -> anyhow::Result<ConsumeReport> {
    let registry = builtin_registry();
    let bindings = resolve_bindings(&args, &config, &registry)?;

    let mut names = config.referenced_connections();
    names.extend(bindings.iter().filter_map(|b| b.options().connection.clone()));
    let bus = stream_bus_redis::connect_named(&config, names).await?;
    let mut consumer = Consumer::new(Arc::new(bus), bindings, args.consumer_options())?;

    let interrupted = tokio::select! {
        result = consumer.run() => {
            result?;
            false
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            true
        }
    };

    let report = consumer.report();
    if interrupted {
        tracing::info!(report = ?report, "Interrupted, shutting down");
    }
    Ok(report)
}

/// Publish one payload and print the returned id.
pub async fn publish(args: PublishArgs, config: StreamBusConfig) -> anyhow::Result<String> {
    let payload: Payload = serde_json::from_str(&args.payload)
        .context("Payload must be a JSON object")?;

    let mut names = config.referenced_connections();
    names.extend(args.bus.connection.clone());
    let bus = stream_bus_redis::connect_named(&config, names).await?;
    let id = bus
        .publish(&args.topic, payload, &args.bus_options())
        .await?;

    tracing::debug!(topic = %args.topic, id = %id, "Published");
    println!("{id}");
    Ok(id)
}

/// Bindings from the command line, or from the configured consumers when no
/// topic was given.
///
/// Command-line options apply as call options on top of whatever the
/// configuration sets for each topic.
pub fn resolve_bindings(
    args: &ConsumeArgs,
    config: &StreamBusConfig,
    registry: &HandlerRegistry,
) -> Result<Vec<Binding>, ConsumeError> {
    let options = args.bus_options();

    match (&args.topic, &args.handler) {
        (Some(topic), Some(handler)) => {
            let handler = registry.build(handler)?;
            Ok(vec![Binding::new(topic.clone(), handler).with_options(options)])
        }
        (None, _) if !config.consumers.is_empty() => Ok(registry
            .bindings_from_config(&config.consumers)?
            .into_iter()
            .map(|binding| with_call_options(binding, &options))
            .collect()),
        _ => Err(ConsumeError::Config(
            "no topic/handler given and no consumers configured".to_string(),
        )),
    }
}

fn with_call_options(binding: Binding, call: &BusOptions) -> Binding {
    let merged = binding.options().overlay(call);
    binding.with_options(merged)
}
