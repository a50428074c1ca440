//! Engine - wires ingress, dispatcher, and emitter into one run loop

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::Config;
use crate::dispatch::{DeliveryTag, Dispatcher, Emitter};
use crate::metrics::Metrics;
use crate::model::SampleEvent;
use crate::store::StateStore;
use crate::transport::{AlertSink, Delivery, EventSource, OffsetTracker};

const STATS_INTERVAL: Duration = Duration::from_secs(30);

/// What the main loop decided to do after one select round. Resolving the
/// branch first keeps the ingress source free for commits in the handler.
enum Step {
    Ingest(Delivery),
    Ack(DeliveryTag),
    Stats,
    Drain(&'static str),
}

/// The long-running processor core. Owns the run loop: fetch from the
/// ingress, route through the zone dispatcher, commit offsets as workers
/// acknowledge, and drain cleanly on shutdown.
pub struct Engine {
    config: Arc<Config>,
    metrics: Arc<Metrics>,
}

impl Engine {
    pub fn new(config: Arc<Config>, metrics: Arc<Metrics>) -> Self {
        Self { config, metrics }
    }

    /// Run until the shutdown signal fires or the ingress is exhausted.
    /// Worker panics are fatal: the error propagates and the process exits.
    pub async fn run(
        &self,
        mut source: Box<dyn EventSource>,
        sink: Arc<dyn AlertSink>,
        store: Arc<dyn StateStore>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<()> {
        let emitter = Arc::new(Emitter::new(sink, store, self.metrics.clone()));
        let (ack_tx, mut ack_rx) = mpsc::unbounded_channel();
        let mut workers = JoinSet::new();
        let mut dispatcher = Dispatcher::spawn(
            self.config.processor.worker_count,
            self.config.processor.queue_depth,
            emitter,
            self.metrics.clone(),
            ack_tx,
            &mut workers,
        );
        let mut tracker = OffsetTracker::new();

        let mut stats_interval = tokio::time::interval(STATS_INTERVAL);
        stats_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!("Engine running");

        let reason = loop {
            let step = tokio::select! {
                fetched = source.fetch() => match fetched {
                    Ok(Some(delivery)) => Step::Ingest(delivery),
                    Ok(None) => Step::Drain("ingress exhausted"),
                    Err(e) => return Err(e.context("ingress fetch")),
                },
                Some(tag) = ack_rx.recv() => Step::Ack(tag),
                Some(result) = workers.join_next() => {
                    // Workers only exit once the dispatcher closes; an early
                    // exit means a panicked zone slot. Do not resume it.
                    return Err(anyhow!("zone worker terminated: {:?}", result.err()));
                }
                _ = shutdown.recv() => Step::Drain("shutdown signal"),
                _ = stats_interval.tick() => Step::Stats,
            };

            match step {
                Step::Ingest(delivery) => {
                    self.ingest(delivery, &dispatcher, &mut tracker, source.as_mut()).await?;
                }
                Step::Ack(tag) => {
                    if let Some(watermark) = tracker.ack(tag.partition, tag.offset) {
                        commit(source.as_mut(), tag.partition, watermark).await;
                    }
                }
                Step::Stats => self.log_stats(&tracker),
                Step::Drain(reason) => break reason,
            }
        };

        info!("Engine draining ({})", reason);
        dispatcher.close();

        let deadline = Duration::from_millis(self.config.processor.shutdown_deadline_ms);
        let drained = tokio::time::timeout(
            deadline,
            drain(&mut ack_rx, &mut workers, &mut tracker, source.as_mut()),
        )
        .await;

        match drained {
            Ok(result) => result?,
            Err(_) => warn!(
                "Drain deadline ({:?}) exceeded with {} events in flight; they will be redelivered",
                deadline,
                tracker.in_flight()
            ),
        }

        source.flush().await?;
        self.log_stats(&tracker);
        info!("Engine stopped");
        Ok(())
    }

    async fn ingest(
        &self,
        delivery: Delivery,
        dispatcher: &Dispatcher,
        tracker: &mut OffsetTracker,
        source: &mut dyn EventSource,
    ) -> Result<()> {
        let tag = DeliveryTag {
            partition: delivery.partition,
            offset: delivery.offset,
        };
        tracker.record(tag.partition, tag.offset);

        let event = serde_json::from_slice::<SampleEvent>(&delivery.payload)
            .map_err(anyhow::Error::from)
            .and_then(|event| event.validate().map(|_| event));

        match event {
            Ok(event) => dispatcher.dispatch(event, tag).await,
            Err(e) => {
                // Malformed payloads never block offset progress
                self.metrics.events_malformed.inc();
                warn!("Dropping malformed event at {}/{}: {}", tag.partition, tag.offset, e);
                if let Some(watermark) = tracker.ack(tag.partition, tag.offset) {
                    commit(source, tag.partition, watermark).await;
                }
                Ok(())
            }
        }
    }

    fn log_stats(&self, tracker: &OffsetTracker) {
        info!(
            "Processed {} events ({} malformed), {} alerts, {} zones tracked, {} in flight",
            self.metrics.events_processed.get(),
            self.metrics.events_malformed.get(),
            self.metrics.alerts_published.get(),
            self.metrics.zones_tracked.get(),
            tracker.in_flight(),
        );
    }
}

/// Wait for the workers to finish their inboxes, committing acknowledgements
/// as they arrive. Returns once every worker exited and the ack channel
/// closed behind them.
async fn drain(
    ack_rx: &mut mpsc::UnboundedReceiver<DeliveryTag>,
    workers: &mut JoinSet<()>,
    tracker: &mut OffsetTracker,
    source: &mut dyn EventSource,
) -> Result<()> {
    loop {
        tokio::select! {
            maybe_tag = ack_rx.recv() => match maybe_tag {
                Some(tag) => {
                    if let Some(watermark) = tracker.ack(tag.partition, tag.offset) {
                        commit(source, tag.partition, watermark).await;
                    }
                }
                None => break,
            },
            Some(result) = workers.join_next() => {
                if let Err(e) = result {
                    return Err(anyhow!("zone worker terminated during drain: {:?}", e));
                }
            }
        }
    }

    while let Some(result) = workers.join_next().await {
        if let Err(e) = result {
            return Err(anyhow!("zone worker terminated during drain: {:?}", e));
        }
    }
    Ok(())
}

async fn commit(source: &mut dyn EventSource, partition: i32, watermark: i64) {
    if let Err(e) = source.commit(partition, watermark).await {
        warn!("Offset commit failed for partition {}: {}", partition, e);
    }
}
