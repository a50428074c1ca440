// Copyright (c) 2026 GeoPulse Project
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/geopulse/geopulse-rs

//! Wire and domain types for zone load samples and alerts

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Maximum tolerated gap between a sample's event time and its produce time.
/// Events claiming to be from the future beyond this are malformed.
pub const MAX_TIMESTAMP_SKEW_MS: i64 = 5_000;

/// A raw load sample as carried on the ingress topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleEvent {
    /// Opaque unique id assigned by the producer
    pub event_id: String,

    /// Zone this sample belongs to
    pub zone_id: String,

    /// Sensor location
    pub latitude: f64,
    pub longitude: f64,

    /// Normalized load in [0.0, 1.0]
    pub load: f64,

    /// When the sensor observed the load (ms since epoch, event time)
    pub event_timestamp: i64,

    /// When the producer published the sample (ms since epoch)
    pub produced_at: i64,
}

impl SampleEvent {
    /// Check the payload invariants. Failing events are dropped and counted;
    /// they never block offset progress.
    pub fn validate(&self) -> Result<()> {
        if self.zone_id.is_empty() {
            bail!("empty zone id");
        }
        if !self.load.is_finite() || self.load < 0.0 || self.load > 1.0 {
            bail!("load {} outside [0.0, 1.0]", self.load);
        }
        if !self.latitude.is_finite() || self.latitude < -90.0 || self.latitude > 90.0 {
            bail!("latitude {} out of range", self.latitude);
        }
        if !self.longitude.is_finite() || self.longitude < -180.0 || self.longitude > 180.0 {
            bail!("longitude {} out of range", self.longitude);
        }
        if self.event_timestamp > self.produced_at + MAX_TIMESTAMP_SKEW_MS {
            bail!(
                "event timestamp {} ahead of produce time {}",
                self.event_timestamp,
                self.produced_at
            );
        }
        Ok(())
    }
}

/// Operational state of a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ZoneStatus {
    Normal,
    Stressed,
    Critical,
}

impl ZoneStatus {
    /// Label used in metrics and the materialized record.
    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneStatus::Normal => "NORMAL",
            ZoneStatus::Stressed => "STRESSED",
            ZoneStatus::Critical => "CRITICAL",
        }
    }
}

/// A state-transition alert as carried on the egress topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub zone_id: String,
    pub previous_state: ZoneStatus,
    pub current_state: ZoneStatus,
    pub avg_1m: f64,
    pub avg_5m: f64,
    /// Event timestamp of the triggering sample (ms since epoch)
    pub timestamp: i64,
}

/// Current-state record written to the materialized store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterializedZone {
    pub zone_id: String,
    pub state: ZoneStatus,
    pub avg_1m: f64,
    pub avg_5m: f64,
    pub latitude: f64,
    pub longitude: f64,
    /// Wall-clock ms since epoch of the write
    pub last_updated: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(load: f64) -> SampleEvent {
        SampleEvent {
            event_id: "e-1".to_string(),
            zone_id: "Z-1".to_string(),
            latitude: 40.7,
            longitude: -74.0,
            load,
            event_timestamp: 1_000_000,
            produced_at: 1_000_500,
        }
    }

    #[test]
    fn test_valid_sample_passes() {
        assert!(sample(0.0).validate().is_ok());
        assert!(sample(0.5).validate().is_ok());
        assert!(sample(1.0).validate().is_ok());
    }

    #[test]
    fn test_load_out_of_range_rejected() {
        assert!(sample(-0.01).validate().is_err());
        assert!(sample(1.01).validate().is_err());
        assert!(sample(f64::NAN).validate().is_err());
    }

    #[test]
    fn test_future_event_timestamp_rejected() {
        let mut event = sample(0.5);
        event.event_timestamp = event.produced_at + MAX_TIMESTAMP_SKEW_MS + 1;
        assert!(event.validate().is_err());

        // Exactly at the skew bound is still acceptable
        event.event_timestamp = event.produced_at + MAX_TIMESTAMP_SKEW_MS;
        assert!(event.validate().is_ok());
    }

    #[test]
    fn test_empty_zone_rejected() {
        let mut event = sample(0.5);
        event.zone_id.clear();
        assert!(event.validate().is_err());
    }

    #[test]
    fn test_wire_field_names() {
        let event = sample(0.5);
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("zoneId").is_some());
        assert!(json.get("eventTimestamp").is_some());
        assert!(json.get("producedAt").is_some());

        let alert = Alert {
            zone_id: "Z-1".to_string(),
            previous_state: ZoneStatus::Normal,
            current_state: ZoneStatus::Stressed,
            avg_1m: 0.8,
            avg_5m: 0.8,
            timestamp: 1_060_000,
        };
        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["previousState"], "NORMAL");
        assert_eq!(json["currentState"], "STRESSED");
        assert!(json.get("avg1m").is_some());
        assert!(json.get("avg5m").is_some());
    }
}
