// Copyright (c) 2026 GeoPulse Project
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/geopulse/geopulse-rs

//! Configuration module

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use tracing::info;

/// Main processor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level
    pub log_level: String,

    /// Run against in-process synthetic producers instead of Kafka/Redis
    pub demo_mode: bool,

    /// Ingress transport
    pub ingress: IngressConfig,

    /// Egress transport
    pub egress: EgressConfig,

    /// Materialized-state store
    pub store: StoreConfig,

    /// Worker pool and queues
    pub processor: ProcessorConfig,

    /// Metrics endpoint
    pub metrics: MetricsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            demo_mode: false,
            ingress: IngressConfig::default(),
            egress: EgressConfig::default(),
            store: StoreConfig::default(),
            processor: ProcessorConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();

            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }

            config.save(path)?;
            Ok(config)
        }
    }

    /// Default configuration path
    pub fn default_path() -> PathBuf {
        PathBuf::from("./geopulse.toml")
    }

    /// Apply `GEOPULSE_*` environment overrides on top of the file values.
    pub fn apply_env(&mut self) {
        if let Ok(v) = env::var("GEOPULSE_INGRESS_BROKERS") {
            self.ingress.brokers = v;
        }
        if let Ok(v) = env::var("GEOPULSE_INGRESS_TOPIC") {
            self.ingress.topic = v;
        }
        if let Ok(v) = env::var("GEOPULSE_CONSUMER_GROUP") {
            self.ingress.consumer_group = v;
        }
        if let Ok(v) = env::var("GEOPULSE_EGRESS_TOPIC") {
            self.egress.topic = v;
        }
        if let Ok(v) = env::var("GEOPULSE_STORE_ADDR") {
            self.store.addr = v;
        }
        if let Some(v) = env::var("GEOPULSE_WORKER_COUNT").ok().and_then(|v| v.parse().ok()) {
            self.processor.worker_count = v;
        }
        if let Some(v) = env::var("GEOPULSE_METRICS_PORT").ok().and_then(|v| v.parse().ok()) {
            self.metrics.port = v;
        }
    }
}

/// Ingress transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngressConfig {
    /// Broker bootstrap address
    pub brokers: String,

    /// Subscribed topic
    pub topic: String,

    /// Consumer-group / offset namespace
    pub consumer_group: String,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            topic: "raw.zone.events".to_string(),
            consumer_group: "zone-stream-processor".to_string(),
        }
    }
}

/// Egress transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EgressConfig {
    /// Produced topic
    pub topic: String,

    /// Per-publish delivery timeout in milliseconds
    pub publish_timeout_ms: u64,
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self {
            topic: "zone.alerts".to_string(),
            publish_timeout_ms: 5000,
        }
    }
}

/// Materialized-state store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store endpoint
    pub addr: String,

    /// Key namespace for state records and the geo index
    pub key_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            addr: "localhost:6380".to_string(),
            key_prefix: "zone".to_string(),
        }
    }
}

/// Worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Parallelism shard count; each zone maps to exactly one worker
    pub worker_count: usize,

    /// Bounded inbox depth per worker
    pub queue_depth: usize,

    /// Hard shutdown deadline in milliseconds
    pub shutdown_deadline_ms: u64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            worker_count: 8,
            queue_depth: 1024,
            shutdown_deadline_ms: 10_000,
        }
    }
}

/// Metrics endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// HTTP port exposing /metrics and /health
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { port: 9090 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_contract() {
        let config = Config::default();
        assert_eq!(config.ingress.brokers, "localhost:9092");
        assert_eq!(config.ingress.topic, "raw.zone.events");
        assert_eq!(config.ingress.consumer_group, "zone-stream-processor");
        assert_eq!(config.egress.topic, "zone.alerts");
        assert_eq!(config.store.addr, "localhost:6380");
        assert_eq!(config.metrics.port, 9090);
        assert!(config.processor.worker_count >= 4 && config.processor.worker_count <= 16);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.ingress.topic, config.ingress.topic);
        assert_eq!(parsed.processor.worker_count, config.processor.worker_count);
    }
}
