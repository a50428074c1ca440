//! Alert publication and materialized-state writes for fired transitions

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{info, warn};

use crate::metrics::Metrics;
use crate::model::{Alert, MaterializedZone};
use crate::store::StateStore;
use crate::transport::AlertSink;

/// Performs the two side effects of a fired transition, in order, under the
/// per-zone task: publish the alert, then upsert the materialized record.
/// Neither blocks offset progress — egress retries belong to the transport,
/// and a lost store write is rewritten by the next transition.
pub struct Emitter {
    sink: Arc<dyn AlertSink>,
    store: Arc<dyn StateStore>,
    metrics: Arc<Metrics>,
}

impl Emitter {
    pub fn new(sink: Arc<dyn AlertSink>, store: Arc<dyn StateStore>, metrics: Arc<Metrics>) -> Self {
        Self { sink, store, metrics }
    }

    pub async fn emit(&self, alert: &Alert, latitude: f64, longitude: f64) {
        match serde_json::to_vec(alert) {
            Ok(payload) => {
                let started = Instant::now();
                match self.sink.publish(&alert.zone_id, &payload).await {
                    Ok(()) => {
                        self.metrics.alerts_published.inc();
                        self.metrics
                            .alert_publish_latency
                            .observe(started.elapsed().as_secs_f64() * 1000.0);
                        info!(
                            "Alert {} {:?} -> {:?} at {}",
                            alert.zone_id, alert.previous_state, alert.current_state, alert.timestamp
                        );
                    }
                    Err(e) => {
                        self.metrics.alert_publish_failures.inc();
                        warn!("Alert publish failed for {}: {}", alert.zone_id, e);
                    }
                }
            }
            Err(e) => {
                self.metrics.alert_publish_failures.inc();
                warn!("Alert encode failed for {}: {}", alert.zone_id, e);
            }
        }

        let record = MaterializedZone {
            zone_id: alert.zone_id.clone(),
            state: alert.current_state,
            avg_1m: alert.avg_1m,
            avg_5m: alert.avg_5m,
            latitude,
            longitude,
            last_updated: Utc::now().timestamp_millis(),
        };

        if let Err(e) = self.store.upsert_state(&record).await {
            self.metrics.store_write_failures.inc();
            warn!("Materialized write failed for {}: {}", alert.zone_id, e);
        }
        if let Err(e) = self.store.upsert_geo(&alert.zone_id, longitude, latitude).await {
            self.metrics.store_write_failures.inc();
            warn!("Geo-index refresh failed for {}: {}", alert.zone_id, e);
        }
    }
}
