//! Command-line arguments.

use clap::{Args, Parser, Subcommand};
use std::time::Duration;
use stream_bus_core::{BusOptions, Delivery, Driver};
use stream_bus_runtime::ConsumerOptions;

/// stream-bus - publish to and consume from Redis-backed topics
#[derive(Debug, Parser)]
#[command(name = "stream-bus", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Consume messages and dispatch them to a handler
    Consume(ConsumeArgs),
    /// Publish a single JSON payload
    Publish(PublishArgs),
}

/// Options shared by every subcommand.
#[derive(Debug, Clone, Default, Args)]
pub struct BusArgs {
    /// Transport driver: log|queue (also streams|lists)
    #[arg(long)]
    pub driver: Option<Driver>,

    /// Named connection from the configuration
    #[arg(long)]
    pub connection: Option<String>,

    /// Key prefix override
    #[arg(long)]
    pub prefix: Option<String>,

    /// Delivery guarantee: at-least-once|effectively-once
    #[arg(long)]
    pub delivery: Option<Delivery>,

    /// Dedupe record lifetime in seconds
    #[arg(long)]
    pub dedupe_ttl: Option<u64>,
}

impl BusArgs {
    fn options(&self) -> BusOptions {
        BusOptions {
            driver: self.driver,
            connection: self.connection.clone(),
            prefix: self.prefix.clone(),
            delivery: self.delivery,
            dedupe_ttl: self.dedupe_ttl,
            ..BusOptions::default()
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct ConsumeArgs {
    /// Topic to consume; omit to consume every configured consumer
    #[arg(requires = "handler")]
    pub topic: Option<String>,

    /// Name of the handler bound to the topic (built in: log, stdout)
    pub handler: Option<String>,

    #[command(flatten)]
    pub bus: BusArgs,

    /// Consumer group (log only)
    #[arg(long)]
    pub group: Option<String>,

    /// Consumer name within the group (log only)
    #[arg(long)]
    pub consumer: Option<String>,

    /// Messages per read (log only)
    #[arg(long)]
    pub count: Option<usize>,

    /// Block time: milliseconds for log, seconds for queue
    #[arg(long)]
    pub block: Option<u64>,

    /// Read only once and exit
    #[arg(long)]
    pub once: bool,

    /// Sleep in milliseconds when no messages were found
    #[arg(long, default_value_t = 200)]
    pub sleep: u64,

    /// Do not acknowledge messages (log only)
    #[arg(long)]
    pub no_ack: bool,

    /// Exit if a handler fails
    #[arg(long)]
    pub stop_on_error: bool,

    /// Block time used for every read when consuming several topics
    #[arg(long, default_value_t = 0)]
    pub fanout_block: u64,
}

impl ConsumeArgs {
    /// Per-call options given on the command line.
    pub fn bus_options(&self) -> BusOptions {
        BusOptions {
            group: self.group.clone(),
            consumer: self.consumer.clone(),
            count: self.count,
            block: self.block,
            ..self.bus.options()
        }
    }

    pub fn consumer_options(&self) -> ConsumerOptions {
        ConsumerOptions::default()
            .once(self.once)
            .sleep(Duration::from_millis(self.sleep))
            .ack(!self.no_ack)
            .stop_on_error(self.stop_on_error)
            .fanout_block(self.fanout_block)
    }
}

#[derive(Debug, Clone, Args)]
pub struct PublishArgs {
    /// Topic to publish to
    pub topic: String,

    /// JSON object to publish as the payload
    pub payload: String,

    #[command(flatten)]
    pub bus: BusArgs,
}

impl PublishArgs {
    pub fn bus_options(&self) -> BusOptions {
        self.bus.options()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    fn consume(argv: &[&str]) -> ConsumeArgs {
        let cli = Cli::try_parse_from(argv).unwrap();
        match cli.command {
            Command::Consume(args) => args,
            Command::Publish(_) => panic!("expected consume"),
        }
    }

    #[test]
    fn consume_defaults() {
        let args = consume(&["stream-bus", "consume"]);

        assert!(args.topic.is_none());
        assert_eq!(args.bus_options(), BusOptions::default());
        assert_eq!(args.consumer_options(), ConsumerOptions::default());
    }

    #[test]
    fn consume_flags_map_to_options() {
        let args = consume(&[
            "stream-bus",
            "consume",
            "events:inbound",
            "stdout",
            "--driver",
            "lists",
            "--group",
            "workers",
            "--count",
            "10",
            "--block",
            "2",
            "--delivery",
            "effectively-once",
            "--dedupe-ttl",
            "60",
            "--once",
            "--sleep",
            "50",
            "--no-ack",
            "--stop-on-error",
        ]);

        assert_eq!(args.topic.as_deref(), Some("events:inbound"));
        assert_eq!(args.handler.as_deref(), Some("stdout"));

        let options = args.bus_options();
        assert_eq!(options.driver, Some(Driver::Queue));
        assert_eq!(options.group.as_deref(), Some("workers"));
        assert_eq!(options.count, Some(10));
        assert_eq!(options.block, Some(2));
        assert_eq!(options.delivery, Some(Delivery::EffectivelyOnce));
        assert_eq!(options.dedupe_ttl, Some(60));

        let consumer = args.consumer_options();
        assert!(consumer.once);
        assert!(!consumer.ack);
        assert!(consumer.stop_on_error);
        assert_eq!(consumer.sleep, Duration::from_millis(50));
    }

    #[test]
    fn topic_without_handler_is_rejected() {
        assert!(Cli::try_parse_from(["stream-bus", "consume", "events:inbound"]).is_err());
    }

    #[test]
    fn unknown_driver_is_rejected() {
        assert!(Cli::try_parse_from(["stream-bus", "consume", "--driver", "kafka"]).is_err());
    }

    #[test]
    fn publish_args() {
        let cli =
            Cli::try_parse_from(["stream-bus", "publish", "events", r#"{"foo":"bar"}"#, "--driver", "queue"])
                .unwrap();
        let Command::Publish(args) = cli.command else {
            panic!("expected publish");
        };

        assert_eq!(args.topic, "events");
        assert_eq!(args.payload, r#"{"foo":"bar"}"#);
        assert_eq!(args.bus_options().driver, Some(Driver::Queue));
    }
}
