//! Materialized-state store contract and in-memory implementation

pub mod redis;

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use crate::model::MaterializedZone;

/// The store capability set: upsert the current-state record for a zone and
/// refresh its geo-index membership. Both writes are best effort — the
/// caller logs failures and moves on; the next transition rewrites the
/// record.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn upsert_state(&self, record: &MaterializedZone) -> Result<()>;

    async fn upsert_geo(&self, zone_id: &str, longitude: f64, latitude: f64) -> Result<()>;
}

/// Store backed by process memory, for demo mode and tests.
#[derive(Default)]
pub struct InMemoryStore {
    records: Mutex<HashMap<String, MaterializedZone>>,
    geo: Mutex<HashMap<String, (f64, f64)>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, zone_id: &str) -> Option<MaterializedZone> {
        self.records.lock().unwrap().get(zone_id).cloned()
    }

    pub fn geo_entry(&self, zone_id: &str) -> Option<(f64, f64)> {
        self.geo.lock().unwrap().get(zone_id).copied()
    }

    pub fn zone_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[async_trait]
impl StateStore for InMemoryStore {
    async fn upsert_state(&self, record: &MaterializedZone) -> Result<()> {
        self.records
            .lock()
            .unwrap()
            .insert(record.zone_id.clone(), record.clone());
        Ok(())
    }

    async fn upsert_geo(&self, zone_id: &str, longitude: f64, latitude: f64) -> Result<()> {
        self.geo
            .lock()
            .unwrap()
            .insert(zone_id.to_string(), (longitude, latitude));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ZoneStatus;

    #[tokio::test]
    async fn test_in_memory_upsert_overwrites() {
        let store = InMemoryStore::new();
        let mut record = MaterializedZone {
            zone_id: "Z-1".to_string(),
            state: ZoneStatus::Stressed,
            avg_1m: 0.8,
            avg_5m: 0.8,
            latitude: 40.0,
            longitude: -74.0,
            last_updated: 1,
        };
        store.upsert_state(&record).await.unwrap();
        record.state = ZoneStatus::Critical;
        record.last_updated = 2;
        store.upsert_state(&record).await.unwrap();

        let stored = store.record("Z-1").unwrap();
        assert_eq!(stored.state, ZoneStatus::Critical);
        assert_eq!(stored.last_updated, 2);
        assert_eq!(store.zone_count(), 1);
    }
}
