//! Snapshot report builders: per-endpoint stats, burst health, baseline
//! deltas, and configuration hygiene.

use std::collections::{BTreeMap, HashMap};

use locus_types::{
    BaselineDelta, CalibrationFile, DuplicateHost, Endpoint, EndpointReport, HealthReport, Hygiene,
};

use crate::calibration::adjust_rtt_ms;
use crate::geo::max_distance_km;
use crate::stats::StatsMap;

/// One report row per endpoint with stats, sorted by id.
pub fn build_endpoint_reports(
    stats: &StatsMap,
    endpoints: &HashMap<String, Endpoint>,
    effective_speed_km_s: f64,
    cal: Option<&CalibrationFile>,
) -> Vec<EndpointReport> {
    let mut out = Vec::new();
    for (ep_id, st) in stats {
        let ep = endpoints.get(ep_id);
        let p05_adj = adjust_rtt_ms(st.p05, ep_id, cal);
        let p50_adj = adjust_rtt_ms(st.p50, ep_id, cal);
        out.push(EndpointReport {
            id: ep_id.clone(),
            host: ep.map_or_else(|| "?".to_string(), |e| e.host.clone()),
            count: st.count as u64,
            p05_ms: st.p05,
            p50_ms: st.p50,
            p95_ms: st.p95,
            jitter_ms: st.jitter,
            p05_adj_ms: p05_adj,
            p50_adj_ms: p50_adj,
            max_dist_km_tight: max_distance_km(p05_adj, effective_speed_km_s),
            max_dist_km_loose: max_distance_km(p50_adj, effective_speed_km_s),
            lat: ep.and_then(|e| e.lat),
            lon: ep.and_then(|e| e.lon),
        });
    }
    out
}

/// Burst-loss accounting per endpoint. Expected counts are absent when
/// `samplesPerEndpoint` is unconfigured.
pub fn build_health_reports(
    bursts: &HashMap<String, Vec<(i64, usize)>>,
    samples_per_endpoint: u32,
) -> Vec<HealthReport> {
    let mut ids: Vec<&String> = bursts.keys().collect();
    ids.sort();
    let mut out = Vec::new();
    for id in ids {
        let entries = &bursts[id];
        let burst_count = entries.len() as u64;
        let sample_count: u64 = entries.iter().map(|&(_, n)| n as u64).sum();
        let expected = if samples_per_endpoint > 0 {
            Some(burst_count * samples_per_endpoint as u64)
        } else {
            None
        };
        let loss_pct = expected.filter(|&e| e > 0).map(|e| {
            ((e as f64 - sample_count as f64) / e as f64 * 100.0).max(0.0)
        });
        out.push(HealthReport {
            id: id.clone(),
            burst_count,
            sample_count,
            expected_samples: expected,
            loss_pct,
            last_seen_ms: entries.iter().map(|&(ts, _)| ts).max(),
        });
    }
    out
}

/// Raw p05 movement for endpoints present in both baseline and session.
pub fn build_deltas(baseline: &StatsMap, session: &StatsMap) -> Vec<BaselineDelta> {
    let mut out = Vec::new();
    for (ep_id, b) in baseline {
        let s = match session.get(ep_id) {
            Some(s) => s,
            None => continue,
        };
        out.push(BaselineDelta {
            id: ep_id.clone(),
            delta_p05_ms: s.p05 - b.p05,
            baseline_p05_ms: b.p05,
            session_p05_ms: s.p05,
        });
    }
    out
}

/// Configuration hygiene: endpoints without coordinates can't constrain the
/// estimate, missing regions hurt reporting, and shared hosts usually mean
/// a copy-paste mistake.
pub fn build_hygiene(endpoints: &[Endpoint]) -> Hygiene {
    let mut missing_coords = Vec::new();
    let mut missing_region = Vec::new();
    let mut host_map: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for ep in endpoints {
        if ep.lat.is_none() || ep.lon.is_none() {
            missing_coords.push(ep.id.clone());
        }
        if ep.region_hint.as_deref().unwrap_or("").is_empty() {
            missing_region.push(ep.id.clone());
        }
        if !ep.host.is_empty() {
            host_map.entry(ep.host.clone()).or_default().push(ep.id.clone());
        }
    }
    let duplicate_hosts = host_map
        .into_iter()
        .filter(|(_, ids)| ids.len() > 1)
        .map(|(host, ids)| DuplicateHost { host, ids })
        .collect();
    Hygiene {
        missing_coords,
        missing_region,
        duplicate_hosts,
    }
}
