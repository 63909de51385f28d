//! CLI for amqpc
//!
//! Subcommands:
//! - `publish`: send one message
//! - `get`: wait a bounded time for one message
//! - `listen`: print messages from a queue until Ctrl-C
//! - `version`: print the crate version

use std::sync::Arc;

use amqpc::codec;
use amqpc::config::{Settings, load_config};
use amqpc::message::Table;
use amqpc::utils::logging;
use amqpc::{
    AckMode, ConsumeFlags, DeliveryFlags, EnvelopeMetadata, FetchRequest, Fetcher, Message,
    PublishRequest, Publisher, Session, Subscriber, SubscriptionRequest,
};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "amqpc")]
struct Cli {
    /// Broker URL; overrides the configured `broker.url`
    #[arg(long, global = true, env = "AMQPC_URL")]
    url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Publish one message
    Publish(PublishArgs),
    /// Fetch at most one message, waiting up to --wait-secs
    Get {
        #[arg(long)]
        queue: String,
        #[arg(long)]
        wait_secs: Option<i64>,
        #[command(flatten)]
        consume: ConsumeArgs,
    },
    /// Print every message delivered to a queue until interrupted
    Listen {
        #[arg(long)]
        queue: String,
        #[arg(long)]
        auto_ack: bool,
        #[command(flatten)]
        consume: ConsumeArgs,
    },
    /// Print the version
    Version,
}

#[derive(Args)]
struct ConsumeArgs {
    #[arg(long)]
    consumer: Option<String>,
    #[arg(long)]
    exclusive: bool,
    #[arg(long)]
    no_local: bool,
    #[arg(long)]
    no_wait: bool,
    /// Consume argument as key=value; values that parse as JSON keep their type
    #[arg(long = "arg", value_parser = parse_pair)]
    arguments: Vec<(String, Value)>,
}

#[derive(Args)]
struct PublishArgs {
    /// Routing key (the queue name when using the default exchange)
    #[arg(long)]
    routing_key: String,
    #[arg(long, default_value = "")]
    exchange: String,
    #[arg(long)]
    content_type: Option<String>,
    #[arg(long)]
    mandatory: bool,
    #[arg(long)]
    immediate: bool,
    #[arg(long)]
    persistent: bool,
    /// Header as key=value; values that parse as JSON keep their type
    #[arg(long = "header", value_parser = parse_pair)]
    headers: Vec<(String, Value)>,
    #[arg(long)]
    correlation_id: Option<String>,
    #[arg(long)]
    reply_to: Option<String>,
    #[arg(long)]
    expiration: Option<String>,
    #[arg(long)]
    message_id: Option<String>,
    /// Seconds since the unix epoch; 0 leaves the timestamp unset
    #[arg(long, default_value_t = 0)]
    timestamp: i64,
    #[arg(long = "type")]
    kind: Option<String>,
    #[arg(long)]
    user_id: Option<String>,
    #[arg(long)]
    app_id: Option<String>,
    body: String,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            logging::init("info");
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    logging::init(&config.log.level);

    if let Err(e) = run(cli, config).await {
        error!("amqpc failed: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: Settings) -> Result<(), Box<dyn std::error::Error>> {
    if let Command::Version = cli.command {
        println!("amqpc {}", amqpc::VERSION);
        return Ok(());
    }

    let url = cli.url.unwrap_or(config.broker.url);
    let session = Arc::new(Session::start(&url).await?);

    match cli.command {
        Command::Publish(args) => run_publish(session, args).await?,
        Command::Get {
            queue,
            wait_secs,
            consume,
        } => {
            let wait_secs = wait_secs.unwrap_or(config.fetch.wait_secs);
            run_get(session, queue, wait_secs, consume).await?
        }
        Command::Listen {
            queue,
            auto_ack,
            consume,
        } => run_listen(session, queue, auto_ack, consume).await?,
        Command::Version => {}
    }

    Ok(())
}

async fn run_publish(
    session: Arc<Session>,
    args: PublishArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut message = Message::new(args.body);
    message.content_type = args.content_type;
    message.headers = args.headers.into_iter().collect();

    let request = PublishRequest {
        exchange: args.exchange,
        routing_key: args.routing_key,
        message,
        flags: DeliveryFlags {
            mandatory: args.mandatory,
            immediate: args.immediate,
            persistent: args.persistent,
        },
        metadata: EnvelopeMetadata {
            correlation_id: args.correlation_id,
            reply_to: args.reply_to,
            expiration: args.expiration,
            message_id: args.message_id,
            timestamp: args.timestamp,
            kind: args.kind,
            user_id: args.user_id,
            app_id: args.app_id,
        },
    };

    Publisher::new(session).publish(&request).await?;
    info!(routing_key = %request.routing_key, "Message published");
    Ok(())
}

async fn run_get(
    session: Arc<Session>,
    queue: String,
    wait_secs: i64,
    consume: ConsumeArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let flags = consume_flags(&consume);
    let request = FetchRequest {
        queue,
        consumer: consume.consumer,
        flags,
        arguments: consume.arguments.into_iter().collect::<Table>(),
        wait_secs,
    };

    match Fetcher::new(session).get(&request).await? {
        Some(received) if codec::is_msgpack(received.content_type.as_deref()) => {
            println!("{}", received.document()?)
        }
        Some(received) => println!("{}", received.text()),
        None => info!(queue = %request.queue, "No message available"),
    }
    Ok(())
}

async fn run_listen(
    session: Arc<Session>,
    queue: String,
    auto_ack: bool,
    consume: ConsumeArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let flags = consume_flags(&consume);
    let request = SubscriptionRequest {
        queue,
        consumer: consume.consumer,
        ack_mode: if auto_ack {
            AckMode::Auto
        } else {
            AckMode::Manual
        },
        flags,
        arguments: consume.arguments.into_iter().collect(),
    };

    let mut subscription = Subscriber::new(session)
        .listen(&request, |body: String| {
            println!("{body}");
            Ok::<(), std::io::Error>(())
        })
        .await?;

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Shutdown signal received. Closing subscription.");
        }
        _ = subscription.ended() => {
            info!("Broker ended the subscription.");
        }
    }
    let stats = subscription.close().await;
    info!(received = stats.received, failed = stats.failed, "Done");
    Ok(())
}

fn consume_flags(args: &ConsumeArgs) -> ConsumeFlags {
    ConsumeFlags {
        exclusive: args.exclusive,
        no_local: args.no_local,
        no_wait: args.no_wait,
    }
}

fn parse_pair(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}
