// Copyright (c) 2026 GeoPulse Project
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/geopulse/geopulse-rs

//! Event-time sliding aggregation over per-second buckets

use std::collections::BTreeMap;

/// Rebuild the running sum from buckets every this many insertions to keep
/// incremental float error bounded on long streams.
const REBUILD_INTERVAL: u64 = 1 << 20;

/// One second of accumulated load.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowBucket {
    pub sum: f64,
    pub count: u64,
}

/// A sliding window of `size_secs` seconds of event time, bucketed per
/// second. Eviction is anchored on the incoming event's second, never wall
/// clock, so replaying the same stream reproduces the same averages.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    size_secs: i64,
    buckets: BTreeMap<i64, WindowBucket>,
    total_sum: f64,
    total_count: u64,
    inserts: u64,
}

impl SlidingWindow {
    pub fn new(size_secs: i64) -> Self {
        assert!(size_secs > 0, "window size must be positive");
        Self {
            size_secs,
            buckets: BTreeMap::new(),
            total_sum: 0.0,
            total_count: 0,
            inserts: 0,
        }
    }

    /// Insert one sample at `event_timestamp` (ms), evicting every bucket
    /// that falls out of the window anchored at the sample's own second.
    ///
    /// A stale sample whose second is older than everything in the window is
    /// still inserted into a freshly created past bucket; the next in-window
    /// sample sweeps it out. The transient dent in the average is part of
    /// the contract.
    pub fn add(&mut self, event_timestamp: i64, load: f64) {
        let k = event_timestamp.div_euclid(1000);

        // Evict buckets with k - key >= size_secs
        let cutoff = k - self.size_secs;
        while let Some((&oldest, bucket)) = self.buckets.first_key_value() {
            if oldest > cutoff {
                break;
            }
            self.total_sum -= bucket.sum;
            assert!(
                self.total_count >= bucket.count,
                "window count underflow at bucket {}",
                oldest
            );
            self.total_count -= bucket.count;
            self.buckets.remove(&oldest);
        }

        let bucket = self.buckets.entry(k).or_insert(WindowBucket { sum: 0.0, count: 0 });
        bucket.sum += load;
        bucket.count += 1;
        self.total_sum += load;
        self.total_count += 1;

        self.inserts += 1;
        if self.inserts % REBUILD_INTERVAL == 0 {
            self.rebuild_totals();
        }
    }

    /// Mean load over the window; 0.0 when empty, never NaN.
    pub fn average(&self) -> f64 {
        if self.total_count == 0 {
            0.0
        } else {
            self.total_sum / self.total_count as f64
        }
    }

    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    #[cfg(test)]
    fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Oldest and newest bucket keys currently held.
    #[cfg(test)]
    fn key_span(&self) -> Option<(i64, i64)> {
        match (self.buckets.first_key_value(), self.buckets.last_key_value()) {
            (Some((&lo, _)), Some((&hi, _))) => Some((lo, hi)),
            _ => None,
        }
    }

    fn rebuild_totals(&mut self) {
        self.total_sum = self.buckets.values().map(|b| b.sum).sum();
        self.total_count = self.buckets.values().map(|b| b.count).sum();
    }
}
