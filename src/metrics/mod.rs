// Copyright (c) 2026 GeoPulse Project
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/geopulse/geopulse-rs

//! Prometheus counters and the /metrics HTTP endpoint

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::info;

/// All counters the processor maintains. Shared across workers; prometheus
/// types are internally atomic.
pub struct Metrics {
    registry: Registry,
    started_at: Instant,

    pub events_processed: IntCounter,
    pub events_malformed: IntCounter,
    pub state_transitions: IntCounterVec,
    pub alerts_published: IntCounter,
    pub alert_publish_failures: IntCounter,
    pub store_write_failures: IntCounter,
    pub alert_publish_latency: Histogram,
    pub zones_tracked: IntGauge,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let events_processed =
            IntCounter::new("events_processed_total", "Samples processed end to end")?;
        let events_malformed =
            IntCounter::new("events_malformed_total", "Samples dropped at decode/validation")?;
        let state_transitions = IntCounterVec::new(
            Opts::new("state_transitions_total", "Fired zone state transitions"),
            &["from", "to"],
        )?;
        let alerts_published =
            IntCounter::new("alerts_published_total", "Alerts published to the egress topic")?;
        let alert_publish_failures = IntCounter::new(
            "alert_publish_failures_total",
            "Alert publishes that failed and were not retried",
        )?;
        let store_write_failures = IntCounter::new(
            "store_write_failures_total",
            "Best-effort materialized-state writes that failed",
        )?;
        let alert_publish_latency = Histogram::with_opts(
            HistogramOpts::new("alert_publish_latency_ms", "Egress publish latency")
                .buckets(vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0]),
        )?;
        let zones_tracked = IntGauge::new("zones_tracked", "Zones with live in-memory state")?;

        registry.register(Box::new(events_processed.clone()))?;
        registry.register(Box::new(events_malformed.clone()))?;
        registry.register(Box::new(state_transitions.clone()))?;
        registry.register(Box::new(alerts_published.clone()))?;
        registry.register(Box::new(alert_publish_failures.clone()))?;
        registry.register(Box::new(store_write_failures.clone()))?;
        registry.register(Box::new(alert_publish_latency.clone()))?;
        registry.register(Box::new(zones_tracked.clone()))?;

        Ok(Self {
            registry,
            started_at: Instant::now(),
            events_processed,
            events_malformed,
            state_transitions,
            alerts_published,
            alert_publish_failures,
            store_write_failures,
            alert_publish_latency,
            zones_tracked,
        })
    }

    pub fn record_transition(&self, from: &str, to: &str) {
        self.state_transitions.with_label_values(&[from, to]).inc();
    }

    /// Render the registry in the Prometheus text exposition format.
    pub fn render(&self) -> String {
        TextEncoder::new()
            .encode_to_string(&self.registry.gather())
            .unwrap_or_default()
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

/// Serve /metrics and /health until the shutdown signal fires.
pub async fn serve(
    metrics: Arc<Metrics>,
    port: u16,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let app = Router::new()
        .route("/metrics", get(render_metrics))
        .route("/health", get(health))
        .with_state(metrics);

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding metrics listener on {}", addr))?;

    info!("Metrics endpoint listening on http://{}/metrics", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
        .context("metrics server")?;

    Ok(())
}

async fn render_metrics(State(metrics): State<Arc<Metrics>>) -> impl IntoResponse {
    (StatusCode::OK, metrics.render())
}

async fn health(State(metrics): State<Arc<Metrics>>) -> impl IntoResponse {
    let body = serde_json::json!({
        "status": "ok",
        "uptimeSeconds": metrics.uptime_seconds(),
        "eventsProcessed": metrics.events_processed.get(),
        "zonesTracked": metrics.zones_tracked.get(),
    });
    (StatusCode::OK, body.to_string())
}
