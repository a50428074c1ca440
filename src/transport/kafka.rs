// Copyright (c) 2026 GeoPulse Project
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/geopulse/geopulse-rs

//! Kafka adapters for the ingress and egress topics

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::Message;
use tracing::{info, warn};

use super::{AlertSink, Backoff, Delivery, EventSource};
use crate::config::{EgressConfig, IngressConfig};

const RECONNECT_INITIAL: Duration = Duration::from_millis(500);
const RECONNECT_MAX: Duration = Duration::from_secs(30);

/// Consumer over the partitioned ingress topic. Offsets are stored manually
/// after downstream processing and committed by the client's periodic
/// auto-commit, so a crash replays only unacknowledged events.
pub struct KafkaSource {
    consumer: StreamConsumer,
    topic: String,
    backoff: Backoff,
}

impl KafkaSource {
    pub fn connect(config: &IngressConfig) -> Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.consumer_group)
            .set("auto.offset.reset", "earliest")
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "false")
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", "6000")
            .create()
            .context("creating ingress consumer")?;

        consumer
            .subscribe(&[&config.topic])
            .with_context(|| format!("subscribing to {}", config.topic))?;

        info!("Ingress consumer subscribed to {} ({})", config.topic, config.brokers);

        Ok(Self {
            consumer,
            topic: config.topic.clone(),
            backoff: Backoff::new(RECONNECT_INITIAL, RECONNECT_MAX),
        })
    }
}

#[async_trait]
impl EventSource for KafkaSource {
    async fn fetch(&mut self) -> Result<Option<Delivery>> {
        loop {
            match self.consumer.recv().await {
                Ok(message) => {
                    self.backoff.reset();
                    let payload = message.payload().unwrap_or_default().to_vec();
                    return Ok(Some(Delivery {
                        payload,
                        partition: message.partition(),
                        offset: message.offset(),
                    }));
                }
                Err(e) => {
                    warn!("Ingress fetch error, backing off {:?}: {}", self.backoff.current(), e);
                    self.backoff.wait().await;
                }
            }
        }
    }

    async fn commit(&mut self, partition: i32, offset: i64) -> Result<()> {
        self.consumer
            .store_offset(&self.topic, partition, offset)
            .map_err(|e| anyhow!("storing offset {}/{}: {}", partition, offset, e))
    }

    async fn flush(&mut self) -> Result<()> {
        // Push stored offsets out synchronously before exit
        match self.consumer.commit_consumer_state(CommitMode::Sync) {
            Ok(()) => Ok(()),
            // Nothing stored yet is not a failure
            Err(rdkafka::error::KafkaError::ConsumerCommit(code))
                if code == rdkafka::types::RDKafkaErrorCode::NoOffset =>
            {
                Ok(())
            }
            Err(e) => Err(anyhow!("final offset commit: {}", e)),
        }
    }
}

/// Producer for the egress alert topic, keyed by zone id. The client's
/// default partitioner hashes the key, so per-zone order is preserved.
pub struct KafkaSink {
    producer: FutureProducer,
    topic: String,
    publish_timeout: Duration,
}

impl KafkaSink {
    pub fn connect(brokers: &str, config: &EgressConfig) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .set("compression.type", "lz4")
            .create()
            .context("creating egress producer")?;

        info!("Egress producer targeting {} ({})", config.topic, brokers);

        Ok(Self {
            producer,
            topic: config.topic.clone(),
            publish_timeout: Duration::from_millis(config.publish_timeout_ms),
        })
    }
}

#[async_trait]
impl AlertSink for KafkaSink {
    async fn publish(&self, key: &str, payload: &[u8]) -> Result<()> {
        let record = FutureRecord::to(&self.topic).key(key).payload(payload);
        self.producer
            .send(record, self.publish_timeout)
            .await
            .map(|_| ())
            .map_err(|(e, _)| anyhow!("publishing alert for {}: {}", key, e))
    }
}
