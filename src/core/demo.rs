//! Synthetic sample producer for demo runs

use std::time::Duration;

use chrono::Utc;
use rand::prelude::*;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

use crate::model::SampleEvent;
use crate::transport::InMemoryLog;

/// Wall-clock delay between synthetic ticks. Each tick advances event time
/// by one full second, so a demo run reaches the interesting transitions in
/// a few seconds instead of minutes.
const TICK: Duration = Duration::from_millis(50);

struct DemoZone {
    zone_id: &'static str,
    latitude: f64,
    longitude: f64,
    profile: Profile,
}

#[derive(Clone, Copy)]
enum Profile {
    /// Pinned high; ramps the zone through STRESSED into CRITICAL
    Overloaded,
    /// Low steady load; never leaves NORMAL
    Calm,
    /// Alternates high/idle each second; hysteresis keeps it NORMAL
    Oscillating,
}

const DEMO_ZONES: [DemoZone; 3] = [
    DemoZone {
        zone_id: "plaza-north",
        latitude: 40.7580,
        longitude: -73.9855,
        profile: Profile::Overloaded,
    },
    DemoZone {
        zone_id: "riverside",
        latitude: 40.8007,
        longitude: -73.9712,
        profile: Profile::Calm,
    },
    DemoZone {
        zone_id: "old-town",
        latitude: 40.7128,
        longitude: -74.0060,
        profile: Profile::Oscillating,
    },
];

/// Spawn the producer task. One event per zone per tick, in accelerated
/// event time, until the shutdown signal fires.
pub fn spawn_demo_producer(log: InMemoryLog, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Demo producer running with {} synthetic zones", DEMO_ZONES.len());

        let mut rng = rand::rngs::StdRng::from_entropy();
        let mut event_time = Utc::now().timestamp_millis();
        let mut tick = tokio::time::interval(TICK);
        let mut sequence: u64 = 0;

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    for (index, zone) in DEMO_ZONES.iter().enumerate() {
                        let load: f64 = match zone.profile {
                            Profile::Overloaded => 0.92 + rng.gen_range(0.0..0.08),
                            Profile::Calm => 0.10 + rng.gen_range(0.0..0.10),
                            Profile::Oscillating => {
                                if sequence % 2 == 0 { 0.80 } else { 0.0 }
                            }
                        };
                        let event = SampleEvent {
                            event_id: uuid::Uuid::new_v4().to_string(),
                            zone_id: zone.zone_id.to_string(),
                            latitude: zone.latitude,
                            longitude: zone.longitude,
                            load: load.clamp(0.0, 1.0),
                            event_timestamp: event_time,
                            produced_at: event_time,
                        };
                        log.send_event(index as i32, &event);
                    }
                    event_time += 1000;
                    sequence += 1;
                }
                _ = shutdown.recv() => {
                    info!("Demo producer stopping");
                    break;
                }
            }
        }
    })
}
