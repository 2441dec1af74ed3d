//! Per-endpoint latency statistics: tail-aware quantiles and jitter.

use std::collections::{BTreeMap, HashMap};

use locus_types::MeasurementRecord;

/// Summary of one endpoint's windowed samples.
#[derive(Debug, Clone, Copy)]
pub struct EndpointStats {
    pub count: usize,
    pub p05: f64,
    pub p50: f64,
    pub p95: f64,
    pub min: f64,
    pub jitter: f64,
}

/// Sorted by endpoint id so report ordering is stable.
pub type StatsMap = BTreeMap<String, EndpointStats>;

/// Linear-interpolated quantile over ascending sorted values.
/// Fractional index q * (n - 1), interpolating between adjacent ranks.
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    if sorted.len() == 1 {
        return sorted[0];
    }
    let idx = q * (sorted.len() - 1) as f64;
    let lo = idx.floor() as usize;
    let hi = idx.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    sorted[lo] + (sorted[hi] - sorted[lo]) * (idx - lo as f64)
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    if n % 2 == 1 {
        Some(sorted[n / 2])
    } else {
        Some((sorted[n / 2 - 1] + sorted[n / 2]) / 2.0)
    }
}

fn summarize(values: &mut Vec<f64>) -> Option<EndpointStats> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let p05 = quantile(values, 0.05);
    let p50 = quantile(values, 0.50);
    let p95 = quantile(values, 0.95);
    Some(EndpointStats {
        count: values.len(),
        p05,
        p50,
        p95,
        min: values[0],
        jitter: (p95 - p05).max(0.0),
    })
}

/// Summarize a (possibly filtered) sample-store view. Endpoints with no
/// samples are omitted.
pub fn compute_stats_from_samples(samples: &HashMap<String, Vec<(i64, f64)>>) -> StatsMap {
    let mut out = StatsMap::new();
    for (id, arr) in samples {
        let mut vals: Vec<f64> = arr.iter().map(|&(_, v)| v).collect();
        if let Some(st) = summarize(&mut vals) {
            out.insert(id.clone(), st);
        }
    }
    out
}

/// Summarize raw measurement records (baseline files). Applies the same
/// finite/non-negative filter as live ingestion.
pub fn compute_stats_from_records(records: &[MeasurementRecord]) -> StatsMap {
    let mut grouped: HashMap<String, Vec<f64>> = HashMap::new();
    for rec in records {
        if rec.endpoint_id.is_empty() {
            continue;
        }
        let vals = grouped.entry(rec.endpoint_id.clone()).or_default();
        for &v in &rec.samples_ms {
            if v.is_finite() && v >= 0.0 {
                vals.push(v);
            }
        }
    }
    let mut out = StatsMap::new();
    for (id, mut vals) in grouped {
        if let Some(st) = summarize(&mut vals) {
            out.insert(id, st);
        }
    }
    out
}
