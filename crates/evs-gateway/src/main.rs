//! Event Gateway CLI
//!
//! Demo shovel: seeds a source store, replicates it through the gateway
//! handler into a target store, and reports the result.

use clap::Parser;
use evs_event_store::{
    EventReader, EventWriter, InMemoryEventStore, StoreProduceOptions, StoreProducer,
};
use evs_gateway::checkpoint::MemoryCheckpoint;
use evs_gateway::handler::GatewayHandler;
use evs_gateway::shovel::Shovel;
use evs_gateway::transform::StreamPrefixTransform;
use evs_gateway_core::prelude::*;
use evs_gateway_core::ShovelConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "evs-gateway")]
#[command(about = "Event-sourcing gateway: route and republish events between stores")]
#[command(version)]
struct Args {
    /// Events to seed into each source stream
    #[arg(long, env = "EVENTS_PER_STREAM", default_value = "10")]
    events_per_stream: usize,

    /// Comma-separated source stream names
    #[arg(long, env = "SOURCE_STREAMS", default_value = "orders,payments")]
    source_streams: String,

    /// Target stream prefix
    #[arg(long, env = "TARGET_PREFIX", default_value = "replica")]
    target_prefix: String,

    /// Wait for produce confirmation before acknowledging
    #[arg(long, env = "AWAIT_PRODUCE", action = clap::ArgAction::Set, default_value_t = true)]
    await_produce: bool,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)))
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting evs-gateway");

    let source = Arc::new(InMemoryEventStore::new());
    let target = Arc::new(InMemoryEventStore::new());

    let streams: Vec<String> = args
        .source_streams
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    let mut seeded = 0usize;
    for stream in &streams {
        let events: Vec<NewEvent> = (0..args.events_per_stream)
            .map(|n| {
                NewEvent::new(
                    "demo.event",
                    serde_json::to_vec(&serde_json::json!({ "stream": stream, "n": n }))
                        .unwrap_or_default(),
                )
            })
            .collect();
        seeded += events.len();
        source
            .append(
                &StreamName::new(stream.clone()),
                events,
                ExpectedStreamVersion::NoStream,
            )
            .await?;
    }
    info!(streams = streams.len(), events = seeded, "Seeded source store");

    let handler = Arc::new(GatewayHandler::new(
        Arc::new(StoreProducer::new(target.clone())),
        Arc::new(
            StreamPrefixTransform::new(args.target_prefix.as_str(), StoreProduceOptions::default())
                .with_source_id("evs-gateway-demo"),
        ),
        args.await_produce,
    ));

    let shovel = Arc::new(Shovel::new(
        source,
        handler,
        Arc::new(MemoryCheckpoint::new()),
        ShovelConfig::default(),
    ));

    let runner = {
        let shovel = shovel.clone();
        tokio::spawn(async move { shovel.run().await })
    };

    // Stop once everything is replicated, or on Ctrl-C
    let expected = seeded as u64;
    tokio::select! {
        _ = async {
            while shovel.processed_count() < expected {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        } => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    shovel.stop();
    runner.await??;

    for stream in &streams {
        let target_stream = StreamName::new(format!("{}-{}", args.target_prefix, stream));
        let replicated = target
            .read(&target_stream, StreamReadPosition::Start, usize::MAX)
            .await?;
        info!(
            stream = %target_stream,
            events = replicated.len(),
            "Replicated stream"
        );
    }

    info!(processed = shovel.processed_count(), "Gateway stopped gracefully");
    Ok(())
}
