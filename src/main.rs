// Copyright (c) 2026 GeoPulse Project
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/geopulse/geopulse-rs

//! GeoPulse - event-time zone load stream processor
//!
//! Consumes per-zone load samples from the ingress topic, derives each
//! zone's operational state through two sliding event-time windows and a
//! hysteretic state machine, and publishes state-transition alerts plus a
//! materialized current-state record.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use std::path::PathBuf;

use geopulse::config::Config;
use geopulse::core::{spawn_demo_producer, Engine};
use geopulse::metrics::{self, Metrics};
use geopulse::store::redis::RedisStore;
use geopulse::store::{InMemoryStore, StateStore};
use geopulse::transport::kafka::{KafkaSink, KafkaSource};
use geopulse::transport::{AlertSink, EventSource, InMemoryLog, InMemorySink};
use geopulse::VERSION;

/// GeoPulse - event-time zone load stream processor
#[derive(Parser, Debug)]
#[command(name = "geopulse")]
#[command(author = "GeoPulse Project")]
#[command(version = VERSION)]
#[command(about = "Derives per-zone operational states from load sample streams")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long)]
    trace: bool,

    /// Demo mode with synthetic zones (no Kafka/Redis required)
    #[arg(long)]
    demo: bool,

    /// Ingress broker address
    #[arg(long)]
    brokers: Option<String>,

    /// Materialized-state store address
    #[arg(long)]
    store_addr: Option<String>,

    /// Worker shard count
    #[arg(long)]
    workers: Option<usize>,

    /// Metrics HTTP port
    #[arg(long)]
    metrics_port: Option<u16>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.trace {
        Level::TRACE
    } else if args.debug {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(true)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("GeoPulse v{} - zone load stream processor", VERSION);

    // Load configuration, then apply environment and CLI overrides
    let config_path = args.config.unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_create(&config_path)?;
    config.apply_env();

    if args.demo {
        config.demo_mode = true;
    }
    if let Some(brokers) = args.brokers {
        config.ingress.brokers = brokers;
    }
    if let Some(addr) = args.store_addr {
        config.store.addr = addr;
    }
    if let Some(workers) = args.workers {
        config.processor.worker_count = workers;
    }
    if let Some(port) = args.metrics_port {
        config.metrics.port = port;
    }

    info!("Configuration loaded from {:?}", config_path);
    info!("Demo mode: {}", config.demo_mode);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config))
}

async fn run(config: Config) -> Result<()> {
    let config = Arc::new(config);
    let metrics = Arc::new(Metrics::new()?);

    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(4);

    // Metrics endpoint
    let metrics_task = tokio::spawn(metrics::serve(
        metrics.clone(),
        config.metrics.port,
        shutdown_tx.subscribe(),
    ));

    // Ctrl+C triggers the drain
    {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received");
                let _ = shutdown_tx.send(());
            }
        });
    }

    // Wire transports: synthetic in-process in demo mode, Kafka/Redis
    // otherwise
    let (source, sink, store): (Box<dyn EventSource>, Arc<dyn AlertSink>, Arc<dyn StateStore>) =
        if config.demo_mode {
            let (log, source) = InMemoryLog::channel();
            spawn_demo_producer(log, shutdown_tx.subscribe());
            (
                Box::new(source),
                Arc::new(InMemorySink::new()),
                Arc::new(InMemoryStore::new()),
            )
        } else {
            let source = KafkaSource::connect(&config.ingress)?;
            let sink = KafkaSink::connect(&config.ingress.brokers, &config.egress)?;
            let store = RedisStore::connect(&config.store).await?;
            (Box::new(source), Arc::new(sink), Arc::new(store))
        };

    let engine = Engine::new(config.clone(), metrics.clone());
    let result = engine.run(source, sink, store, shutdown_tx.subscribe()).await;

    // Stop the metrics server whether the engine exited cleanly or not
    let _ = shutdown_tx.send(());
    let _ = metrics_task.await;

    info!("GeoPulse shutdown complete");
    result
}
