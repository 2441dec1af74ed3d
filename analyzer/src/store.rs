//! Per-endpoint time-series of (timestamp, RTT) pairs with burst metadata.
//!
//! Samples are created by the tail follower, shrunk only by window trimming,
//! and dropped wholesale on log rotation. Order within an endpoint matches
//! append order, which matches log order.

use std::collections::HashMap;

/// Sample store plus the parallel burst-meta map used for loss accounting.
#[derive(Debug, Default, Clone)]
pub struct SampleStore {
    samples: HashMap<String, Vec<(i64, f64)>>,
    bursts: HashMap<String, Vec<(i64, usize)>>,
}

impl SampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one validated sample for an endpoint.
    pub fn append_sample(&mut self, endpoint_id: &str, ts: i64, rtt_ms: f64) {
        self.samples
            .entry(endpoint_id.to_string())
            .or_default()
            .push((ts, rtt_ms));
    }

    /// Record one burst (log line) and how many samples it carried, counting
    /// entries that were later rejected as invalid.
    pub fn append_burst(&mut self, endpoint_id: &str, ts: i64, sample_count: usize) {
        self.bursts
            .entry(endpoint_id.to_string())
            .or_default()
            .push((ts, sample_count));
    }

    /// Drop everything older than the cutoff timestamp.
    pub fn trim(&mut self, cutoff_ms: i64) {
        for arr in self.samples.values_mut() {
            arr.retain(|&(ts, _)| ts >= cutoff_ms);
        }
        for arr in self.bursts.values_mut() {
            arr.retain(|&(ts, _)| ts >= cutoff_ms);
        }
    }

    /// Samples restricted to `ts >= min_ts` (the session subset).
    pub fn filter_since(&self, min_ts: i64) -> HashMap<String, Vec<(i64, f64)>> {
        self.samples
            .iter()
            .map(|(id, arr)| {
                let kept = arr.iter().copied().filter(|&(ts, _)| ts >= min_ts).collect();
                (id.clone(), kept)
            })
            .collect()
    }

    pub fn samples(&self) -> &HashMap<String, Vec<(i64, f64)>> {
        &self.samples
    }

    pub fn bursts(&self) -> &HashMap<String, Vec<(i64, usize)>> {
        &self.bursts
    }

    /// Drop all in-memory data (log rotation / truncation recovery).
    pub fn clear(&mut self) {
        self.samples.clear();
        self.bursts.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trim_drops_only_old_entries() {
        let mut store = SampleStore::new();
        store.append_sample("a", 1_000, 5.0);
        store.append_sample("a", 2_000, 6.0);
        store.append_burst("a", 1_000, 2);
        store.append_burst("a", 2_000, 2);
        store.trim(1_500);
        assert_eq!(store.samples()["a"], vec![(2_000, 6.0)]);
        assert_eq!(store.bursts()["a"], vec![(2_000, 2)]);
    }

    #[test]
    fn filter_since_is_a_view() {
        let mut store = SampleStore::new();
        store.append_sample("a", 1_000, 5.0);
        store.append_sample("a", 2_000, 6.0);
        let view = store.filter_since(2_000);
        assert_eq!(view["a"], vec![(2_000, 6.0)]);
        // Original untouched.
        assert_eq!(store.samples()["a"].len(), 2);
    }
}
