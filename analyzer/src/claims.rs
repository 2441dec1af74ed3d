//! Falsification checks: can each endpoint's RTT bound reach the claim?
//!
//! Every RTT implies a maximum great-circle distance between the measured
//! host and the endpoint. A claimed location farther away than that bound is
//! falsified by the endpoint. The tight bound uses the adjusted p05, the
//! loose bound the adjusted p50, so a claim surviving the loose check can
//! still fail the tight one, never the reverse.

use std::collections::HashMap;

use locus_types::{CalibrationFile, ClaimCheck, Endpoint};

use crate::calibration::adjust_rtt_ms;
use crate::geo::{haversine_km, max_distance_km};
use crate::stats::StatsMap;

pub fn build_claim_checks(
    stats: &StatsMap,
    endpoints: &HashMap<String, Endpoint>,
    claim_lat: f64,
    claim_lon: f64,
    effective_speed_km_s: f64,
    cal: Option<&CalibrationFile>,
) -> Vec<ClaimCheck> {
    let mut out = Vec::new();
    for (ep_id, st) in stats {
        let ep = match endpoints.get(ep_id) {
            Some(ep) => ep,
            None => continue,
        };
        let (lat, lon) = match (ep.lat, ep.lon) {
            (Some(lat), Some(lon)) => (lat, lon),
            _ => continue,
        };
        let dist_km = haversine_km(claim_lat, claim_lon, lat, lon);
        let p05_adj = adjust_rtt_ms(st.p05, ep_id, cal);
        let p50_adj = adjust_rtt_ms(st.p50, ep_id, cal);
        let tight = max_distance_km(p05_adj, effective_speed_km_s);
        let loose = max_distance_km(p50_adj, effective_speed_km_s);
        out.push(ClaimCheck {
            id: ep_id.clone(),
            dist_km,
            max_tight_km: tight,
            max_loose_km: loose,
            falsify_tight: tight.map(|t| dist_km > t),
            falsify_loose: loose.map(|l| dist_km > l),
        });
    }
    out
}
