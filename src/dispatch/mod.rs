// Copyright (c) 2026 GeoPulse Project
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/geopulse/geopulse-rs

//! Zone dispatcher - hash-partitioned workers with per-zone serial processing

mod emitter;

pub use emitter::Emitter;

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::metrics::Metrics;
use crate::model::SampleEvent;
use crate::state::ZoneState;

/// Ingress coordinates of a dispatched event, echoed back on completion so
/// the offset tracker can advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryTag {
    pub partition: i32,
    pub offset: i64,
}

struct Job {
    event: SampleEvent,
    tag: DeliveryTag,
}

/// Routes events to a fixed pool of worker tasks by zone-id hash. A zone
/// always lands on the same worker and each worker drains its inbox one
/// event at a time, so two events of one zone are never processed
/// concurrently.
pub struct Dispatcher {
    senders: Vec<mpsc::Sender<Job>>,
}

impl Dispatcher {
    /// Spawn `worker_count` workers onto `tasks`. Completions are reported
    /// through `ack_tx`; a worker panic surfaces via the join set and is
    /// fatal to the process.
    pub fn spawn(
        worker_count: usize,
        queue_depth: usize,
        emitter: Arc<Emitter>,
        metrics: Arc<Metrics>,
        ack_tx: mpsc::UnboundedSender<DeliveryTag>,
        tasks: &mut JoinSet<()>,
    ) -> Self {
        assert!(worker_count > 0, "worker count must be positive");

        let mut senders = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let (tx, rx) = mpsc::channel(queue_depth);
            senders.push(tx);
            tasks.spawn(run_worker(
                worker_id,
                rx,
                emitter.clone(),
                metrics.clone(),
                ack_tx.clone(),
            ));
        }

        info!("Dispatcher started with {} workers", worker_count);
        Self { senders }
    }

    /// Hand one decoded event to its zone's worker. Applies backpressure
    /// when the worker's inbox is full.
    pub async fn dispatch(&self, event: SampleEvent, tag: DeliveryTag) -> anyhow::Result<()> {
        let index = worker_index(&event.zone_id, self.senders.len());
        self.senders[index]
            .send(Job { event, tag })
            .await
            .map_err(|_| anyhow::anyhow!("worker {} inbox closed", index))
    }

    /// Drop all inbox senders; workers drain what they hold and exit.
    pub fn close(&mut self) {
        self.senders.clear();
    }
}

/// Stable zone-to-worker assignment.
fn worker_index(zone_id: &str, worker_count: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    zone_id.hash(&mut hasher);
    (hasher.finish() % worker_count as u64) as usize
}

async fn run_worker(
    worker_id: usize,
    mut rx: mpsc::Receiver<Job>,
    emitter: Arc<Emitter>,
    metrics: Arc<Metrics>,
    ack_tx: mpsc::UnboundedSender<DeliveryTag>,
) {
    let mut zones: HashMap<String, ZoneState> = HashMap::new();

    while let Some(job) = rx.recv().await {
        let zone = zones.entry(job.event.zone_id.clone()).or_insert_with(|| {
            metrics.zones_tracked.inc();
            debug!("Worker {} now tracking zone {}", worker_id, job.event.zone_id);
            ZoneState::new(&job.event.zone_id)
        });

        let observation = zone.observe(&job.event);

        if let Some(transition) = observation.transition {
            metrics.record_transition(transition.from.as_str(), transition.to.as_str());
        }
        if let Some(alert) = observation.alert {
            emitter
                .emit(&alert, job.event.latitude, job.event.longitude)
                .await;
        }

        metrics.events_processed.inc();
        let _ = ack_tx.send(job.tag);
    }

    debug!("Worker {} drained, exiting", worker_id);
}
