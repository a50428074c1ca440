// Copyright (c) 2026 GeoPulse Project
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/geopulse/geopulse-rs

//! Redis adapter for the materialized zone-state store

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use tracing::info;

use super::StateStore;
use crate::config::StoreConfig;
use crate::model::MaterializedZone;

/// Writes each zone's current state as a hash at `<prefix>:state:<zoneId>`
/// and maintains a single geo set at `<prefix>:geo` keyed by zone id.
pub struct RedisStore {
    conn: MultiplexedConnection,
    state_prefix: String,
    geo_key: String,
}

impl RedisStore {
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let url = format!("redis://{}", config.addr);
        let client = redis::Client::open(url.as_str())
            .with_context(|| format!("opening store client for {}", config.addr))?;
        let conn = client
            .get_multiplexed_tokio_connection()
            .await
            .with_context(|| format!("connecting to store at {}", config.addr))?;

        info!("Materialized-state store connected at {}", config.addr);

        Ok(Self {
            conn,
            state_prefix: format!("{}:state", config.key_prefix),
            geo_key: format!("{}:geo", config.key_prefix),
        })
    }
}

#[async_trait]
impl StateStore for RedisStore {
    async fn upsert_state(&self, record: &MaterializedZone) -> Result<()> {
        let mut conn = self.conn.clone();
        let key = format!("{}:{}", self.state_prefix, record.zone_id);
        redis::cmd("HSET")
            .arg(&key)
            .arg("zoneId")
            .arg(&record.zone_id)
            .arg("state")
            .arg(record.state.as_str())
            .arg("avg1m")
            .arg(record.avg_1m)
            .arg("avg5m")
            .arg(record.avg_5m)
            .arg("latitude")
            .arg(record.latitude)
            .arg("longitude")
            .arg(record.longitude)
            .arg("lastUpdated")
            .arg(record.last_updated)
            .query_async::<_, ()>(&mut conn)
            .await
            .with_context(|| format!("upserting state for {}", record.zone_id))?;
        Ok(())
    }

    async fn upsert_geo(&self, zone_id: &str, longitude: f64, latitude: f64) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("GEOADD")
            .arg(&self.geo_key)
            .arg(longitude)
            .arg(latitude)
            .arg(zone_id)
            .query_async::<_, ()>(&mut conn)
            .await
            .with_context(|| format!("refreshing geo index for {}", zone_id))?;
        Ok(())
    }
}
