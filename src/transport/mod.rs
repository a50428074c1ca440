//! Ingress/egress transport contracts and the in-memory implementation

pub mod kafka;

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::model::SampleEvent;

/// One message pulled from the partitioned ingress log.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub payload: Vec<u8>,
    pub partition: i32,
    pub offset: i64,
}

/// The ingress capability set: fetch the next message, commit processed
/// offsets. Reconnection and back-off live inside the adapter; `fetch`
/// returns `None` only when the source is exhausted (in-memory streams).
#[async_trait]
pub trait EventSource: Send {
    async fn fetch(&mut self) -> Result<Option<Delivery>>;

    /// Mark everything up to and including `offset` on `partition` as
    /// processed. The adapter decides when the commit reaches the broker.
    async fn commit(&mut self, partition: i32, offset: i64) -> Result<()>;

    /// Push any buffered commits out before shutdown.
    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// The egress capability set: publish one value under a partitioning key.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn publish(&self, key: &str, payload: &[u8]) -> Result<()>;
}

/// Tracks in-flight offsets per partition so commits only ever cover the
/// contiguous acknowledged prefix. Events complete out of order across
/// zones; committing past a still-pending offset would break at-least-once.
#[derive(Debug, Default)]
pub struct OffsetTracker {
    partitions: HashMap<i32, PartitionProgress>,
}

#[derive(Debug, Default)]
struct PartitionProgress {
    pending: BTreeSet<i64>,
    acked: BTreeSet<i64>,
    committed: Option<i64>,
}

impl OffsetTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a dispatched delivery.
    pub fn record(&mut self, partition: i32, offset: i64) {
        self.partitions.entry(partition).or_default().pending.insert(offset);
    }

    /// Acknowledge a processed delivery. Returns the new committable
    /// watermark for the partition when it advanced.
    pub fn ack(&mut self, partition: i32, offset: i64) -> Option<i64> {
        let progress = self.partitions.get_mut(&partition)?;
        if !progress.pending.remove(&offset) {
            return None;
        }
        progress.acked.insert(offset);

        // Everything below the lowest still-pending offset is committable
        let watermark = match progress.pending.first() {
            Some(&lowest_pending) => progress.acked.range(..lowest_pending).next_back().copied(),
            None => progress.acked.last().copied(),
        }?;

        if progress.committed.map_or(true, |c| watermark > c) {
            progress.committed = Some(watermark);
            progress.acked.retain(|&o| o > watermark);
            Some(watermark)
        } else {
            None
        }
    }

    /// Offsets dispatched but not yet acknowledged, across all partitions.
    pub fn in_flight(&self) -> usize {
        self.partitions.values().map(|p| p.pending.len()).sum()
    }
}

/// Bounded exponential back-off for transport reconnects.
#[derive(Debug)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max, current: initial }
    }

    /// Sleep for the current delay, then double it up to the cap.
    pub async fn wait(&mut self) {
        tokio::time::sleep(self.current).await;
        self.current = (self.current * 2).min(self.max);
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }

    pub fn current(&self) -> Duration {
        self.current
    }
}

/// Producer-side handle of the in-memory log. Used by demo mode and the
/// integration tests; offsets are assigned sequentially per partition.
#[derive(Clone)]
pub struct InMemoryLog {
    tx: mpsc::UnboundedSender<Delivery>,
    next_offsets: Arc<Mutex<HashMap<i32, i64>>>,
    commits: Arc<Mutex<HashMap<i32, i64>>>,
}

impl InMemoryLog {
    pub fn channel() -> (Self, InMemorySource) {
        let (tx, rx) = mpsc::unbounded_channel();
        let commits = Arc::new(Mutex::new(HashMap::new()));
        let log = Self {
            tx,
            next_offsets: Arc::new(Mutex::new(HashMap::new())),
            commits: commits.clone(),
        };
        (log, InMemorySource { rx, commits })
    }

    pub fn send_raw(&self, partition: i32, payload: Vec<u8>) {
        let offset = {
            let mut next = self.next_offsets.lock().unwrap();
            let slot = next.entry(partition).or_insert(0);
            let offset = *slot;
            *slot += 1;
            offset
        };
        let _ = self.tx.send(Delivery { payload, partition, offset });
    }

    pub fn send_event(&self, partition: i32, event: &SampleEvent) {
        let payload = serde_json::to_vec(event).unwrap_or_default();
        self.send_raw(partition, payload);
    }

    /// Highest committed offset per partition, as seen by the source.
    pub fn committed(&self, partition: i32) -> Option<i64> {
        self.commits.lock().unwrap().get(&partition).copied()
    }

    /// A read-only view of commits that outlives the producer handle.
    pub fn commit_view(&self) -> CommitView {
        CommitView(self.commits.clone())
    }
}

/// Observer over the source's committed offsets; holding one does not keep
/// the log channel open.
#[derive(Clone)]
pub struct CommitView(Arc<Mutex<HashMap<i32, i64>>>);

impl CommitView {
    pub fn committed(&self, partition: i32) -> Option<i64> {
        self.0.lock().unwrap().get(&partition).copied()
    }
}

/// Consumer side of the in-memory log.
pub struct InMemorySource {
    rx: mpsc::UnboundedReceiver<Delivery>,
    commits: Arc<Mutex<HashMap<i32, i64>>>,
}

#[async_trait]
impl EventSource for InMemorySource {
    async fn fetch(&mut self) -> Result<Option<Delivery>> {
        Ok(self.rx.recv().await)
    }

    async fn commit(&mut self, partition: i32, offset: i64) -> Result<()> {
        self.commits.lock().unwrap().insert(partition, offset);
        Ok(())
    }
}

/// Alert sink that retains everything published, for demo mode and tests.
#[derive(Default)]
pub struct InMemorySink {
    published: Mutex<Vec<(String, Vec<u8>)>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlertSink for InMemorySink {
    async fn publish(&self, key: &str, payload: &[u8]) -> Result<()> {
        self.published.lock().unwrap().push((key.to_string(), payload.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_commits_contiguous_prefix_only() {
        let mut tracker = OffsetTracker::new();
        for offset in 0..4 {
            tracker.record(0, offset);
        }

        // Acking out of order: nothing committable until 0 lands
        assert_eq!(tracker.ack(0, 2), None);
        assert_eq!(tracker.ack(0, 1), None);
        assert_eq!(tracker.ack(0, 0), Some(2));
        assert_eq!(tracker.ack(0, 3), Some(3));
        assert_eq!(tracker.in_flight(), 0);
    }

    #[test]
    fn test_tracker_partitions_independent() {
        let mut tracker = OffsetTracker::new();
        tracker.record(0, 0);
        tracker.record(1, 0);
        assert_eq!(tracker.ack(1, 0), Some(0));
        assert_eq!(tracker.in_flight(), 1);
        assert_eq!(tracker.ack(0, 0), Some(0));
    }

    #[test]
    fn test_tracker_ignores_unknown_ack() {
        let mut tracker = OffsetTracker::new();
        tracker.record(0, 5);
        assert_eq!(tracker.ack(0, 99), None);
        assert_eq!(tracker.ack(2, 5), None);
        assert_eq!(tracker.ack(0, 5), Some(5));
    }

    #[test]
    fn test_backoff_doubles_to_cap() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(1));
        assert_eq!(backoff.current(), Duration::from_millis(100));
        tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap()
            .block_on(async {
                tokio::time::pause();
                for _ in 0..6 {
                    backoff.wait().await;
                }
            });
        assert_eq!(backoff.current(), Duration::from_secs(1));
        backoff.reset();
        assert_eq!(backoff.current(), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_in_memory_log_round_trip() {
        let (log, mut source) = InMemoryLog::channel();
        log.send_raw(0, b"a".to_vec());
        log.send_raw(0, b"b".to_vec());

        let first = source.fetch().await.unwrap().unwrap();
        assert_eq!(first.offset, 0);
        let second = source.fetch().await.unwrap().unwrap();
        assert_eq!(second.offset, 1);
        assert_eq!(second.payload, b"b");

        source.commit(0, 1).await.unwrap();
        assert_eq!(log.committed(0), Some(1));

        drop(log);
        assert!(source.fetch().await.unwrap().is_none());
    }
}
