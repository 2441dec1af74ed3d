//! Weighted grid-search geolocation with a jointly estimated timing bias.
//!
//! The cost surface is nonconvex once RTTs are clamped non-negative and the
//! shared bias is clamped at zero, so no closed-form solver is used: a
//! coarse exhaustive pass over the whole world finds the basin, a bounded
//! fine pass refines it, and the confidence bands re-sample the fine grid
//! around the minimum. Scan order is deterministic (lat outer, lon inner,
//! ascending) and the first-found minimum wins, so results are reproducible
//! for identical inputs.

use std::collections::HashMap;

use locus_types::{Band, CalibrationFile, Ellipse, Endpoint, Estimate};

use crate::calibration::adjust_rtt_ms;
use crate::constants::{
    MIN_JITTER_MS, MS_PER_SEC, RTT_FACTOR, SSE_EPSILON, WORLD_LAT_MAX, WORLD_LON_MAX,
};
use crate::geo::{haversine_km, km_per_deg};
use crate::stats::StatsMap;

/// One usable endpoint observation: known coordinates, positive adjusted
/// reference RTT, jitter-derived weight.
#[derive(Debug, Clone, Copy)]
pub struct Observation {
    pub lat: f64,
    pub lon: f64,
    pub rtt_ms: f64,
    pub jitter_ms: f64,
}

/// Gather observations from per-endpoint stats. The reference RTT is the
/// adjusted p05 (or min when p05 is zero); endpoints without coordinates or
/// without a positive adjusted RTT contribute nothing.
pub fn collect_observations(
    stats: &StatsMap,
    endpoints: &HashMap<String, Endpoint>,
    cal: Option<&CalibrationFile>,
) -> Vec<Observation> {
    let mut obs = Vec::new();
    for (ep_id, st) in stats {
        let ep = match endpoints.get(ep_id) {
            Some(ep) => ep,
            None => continue,
        };
        let (lat, lon) = match (ep.lat, ep.lon) {
            (Some(lat), Some(lon)) => (lat, lon),
            _ => continue,
        };
        let rtt_raw = if st.p05 > 0.0 { st.p05 } else { st.min };
        let rtt = adjust_rtt_ms(rtt_raw, ep_id, cal);
        if rtt <= 0.0 {
            continue;
        }
        let jitter = if st.jitter > 0.0 { st.jitter } else { MIN_JITTER_MS };
        obs.push(Observation {
            lat,
            lon,
            rtt_ms: rtt,
            jitter_ms: jitter.max(MIN_JITTER_MS),
        });
    }
    obs
}

/// Weighted SSE at a candidate point, with the closed-form nonnegative bias
/// that minimizes it: bias = max(0, Σ w·(rtt − pred) / Σ w).
pub fn sse_for_candidate(lat: f64, lon: f64, obs: &[Observation], speed_km_s: f64) -> (f64, f64) {
    let speed_km_ms = speed_km_s / MS_PER_SEC;
    let mut sum_w = 0.0;
    let mut sum_wx = 0.0;
    for o in obs {
        let pred_no_bias = RTT_FACTOR * haversine_km(lat, lon, o.lat, o.lon) / speed_km_ms;
        let w = 1.0 / o.jitter_ms;
        sum_w += w;
        sum_wx += w * (o.rtt_ms - pred_no_bias);
    }
    let bias = if sum_w > 0.0 { (sum_wx / sum_w).max(0.0) } else { 0.0 };
    let mut sse = 0.0;
    for o in obs {
        let pred = RTT_FACTOR * haversine_km(lat, lon, o.lat, o.lon) / speed_km_ms + bias;
        let w = 1.0 / o.jitter_ms;
        let err = o.rtt_ms - pred;
        sse += w * err * err;
    }
    (sse, bias)
}

/// Exhaustive scan over a lat/lon box. Latitude is clamped to the world;
/// longitude is left as given so refinement windows can straddle ±180.
#[allow(clippy::too_many_arguments)]
fn grid_search_bounds(
    obs: &[Observation],
    speed_km_s: f64,
    lat_min: f64,
    lat_max: f64,
    lon_min: f64,
    lon_max: f64,
    step: f64,
) -> Option<(f64, f64, f64, f64)> {
    if step <= 0.0 {
        return None;
    }
    let mut best: Option<(f64, f64, f64, f64)> = None;
    let mut lat = lat_min.max(-WORLD_LAT_MAX);
    let lat_stop = lat_max.min(WORLD_LAT_MAX);
    while lat <= lat_stop {
        let mut lon = lon_min;
        while lon <= lon_max {
            let (sse, bias) = sse_for_candidate(lat, lon, obs, speed_km_s);
            if best.map_or(true, |b| sse < b.2) {
                best = Some((lat, lon, sse, bias));
            }
            lon += step;
        }
        lat += step;
    }
    best
}

fn grid_search(obs: &[Observation], speed_km_s: f64, step: f64) -> Option<(f64, f64, f64, f64)> {
    grid_search_bounds(
        obs,
        speed_km_s,
        -WORLD_LAT_MAX,
        WORLD_LAT_MAX,
        -WORLD_LON_MAX,
        WORLD_LON_MAX,
        step,
    )
}

/// Isocontour band: every fine-grid candidate whose SSE stays within the
/// threshold, reduced to a bounding box, a great-circle radius, and a local
/// tangent-plane covariance ellipse.
#[allow(clippy::too_many_arguments)]
fn fit_band(
    obs: &[Observation],
    speed_km_s: f64,
    center_lat: f64,
    center_lon: f64,
    best_sse: f64,
    step: f64,
    factor: f64,
    window_deg: f64,
) -> Option<Band> {
    if step <= 0.0 {
        return None;
    }
    let threshold = (best_sse * (1.0 + factor)).max(best_sse + SSE_EPSILON);
    let lat_min = (center_lat - window_deg).max(-WORLD_LAT_MAX);
    let lat_max = (center_lat + window_deg).min(WORLD_LAT_MAX);
    let lon_min = center_lon - window_deg;
    let lon_max = center_lon + window_deg;

    let mut min_lat = center_lat;
    let mut max_lat = center_lat;
    let mut min_lon = center_lon;
    let mut max_lon = center_lon;
    let mut max_dist: f64 = 0.0;
    let mut points: u64 = 0;
    let (mut sum_dx, mut sum_dy) = (0.0, 0.0);
    let (mut sum_dx2, mut sum_dy2, mut sum_dxdy) = (0.0, 0.0, 0.0);
    let km_deg = km_per_deg();
    let cos_lat = center_lat.to_radians().cos();

    let mut lat = lat_min;
    while lat <= lat_max {
        let mut lon = lon_min;
        while lon <= lon_max {
            let (sse, _) = sse_for_candidate(lat, lon, obs, speed_km_s);
            if sse <= threshold {
                points += 1;
                max_dist = max_dist.max(haversine_km(center_lat, center_lon, lat, lon));
                min_lat = min_lat.min(lat);
                max_lat = max_lat.max(lat);
                min_lon = min_lon.min(lon);
                max_lon = max_lon.max(lon);
                let dx = (lon - center_lon) * cos_lat * km_deg;
                let dy = (lat - center_lat) * km_deg;
                sum_dx += dx;
                sum_dy += dy;
                sum_dx2 += dx * dx;
                sum_dy2 += dy * dy;
                sum_dxdy += dx * dy;
            }
            lon += step;
        }
        lat += step;
    }

    if points == 0 {
        return None;
    }

    let ellipse = if points >= 2 {
        let n = points as f64;
        let mean_dx = sum_dx / n;
        let mean_dy = sum_dy / n;
        let var_x = (sum_dx2 / n - mean_dx * mean_dx).max(0.0);
        let var_y = (sum_dy2 / n - mean_dy * mean_dy).max(0.0);
        let cov_xy = sum_dxdy / n - mean_dx * mean_dy;
        // Analytic eigendecomposition of the 2x2 covariance.
        let trace = var_x + var_y;
        let det = var_x * var_y - cov_xy * cov_xy;
        let root = (trace * trace / 4.0 - det).max(0.0).sqrt();
        let eig1 = trace / 2.0 + root;
        let eig2 = trace / 2.0 - root;
        Some(Ellipse {
            major_km: if eig1 > 0.0 { eig1.sqrt() } else { 0.0 },
            minor_km: if eig2 > 0.0 { eig2.sqrt() } else { 0.0 },
            angle_deg: 0.5 * (2.0 * cov_xy).atan2(var_x - var_y).to_degrees(),
        })
    } else {
        None
    };

    Some(Band {
        radius_km: max_dist,
        sse_threshold: threshold,
        points,
        min_lat,
        max_lat,
        min_lon,
        max_lon,
        ellipse,
    })
}

/// Full estimate: coarse world scan, bounded refinement, tight and loose
/// confidence bands. Returns None below three usable observations.
#[allow(clippy::too_many_arguments)]
pub fn estimate_location(
    stats: &StatsMap,
    endpoints: &HashMap<String, Endpoint>,
    effective_speed_km_s: f64,
    grid_deg: f64,
    refine_deg: f64,
    band_factor: f64,
    band_window_deg: f64,
    cal: Option<&CalibrationFile>,
) -> Option<Estimate> {
    let obs = collect_observations(stats, endpoints, cal);
    if obs.len() < 3 {
        return None;
    }

    let (coarse_lat, coarse_lon, _, _) = grid_search(&obs, effective_speed_km_s, grid_deg)?;
    let window = grid_deg.max(refine_deg * crate::constants::REFINE_WINDOW_MULT);
    let (lat, lon, sse, bias) = grid_search_bounds(
        &obs,
        effective_speed_km_s,
        coarse_lat - window,
        coarse_lat + window,
        coarse_lon - window,
        coarse_lon + window,
        refine_deg,
    )?;

    let tight_factor = (band_factor * 0.5).max(0.05);
    let band_window = band_window_deg.max(window);
    let band_tight = fit_band(
        &obs,
        effective_speed_km_s,
        lat,
        lon,
        sse,
        refine_deg,
        tight_factor,
        band_window,
    );
    let band_loose = fit_band(
        &obs,
        effective_speed_km_s,
        lat,
        lon,
        sse,
        refine_deg,
        band_factor,
        band_window,
    );

    Some(Estimate {
        lat,
        lon,
        bias_ms: bias,
        sse,
        points: obs.len() as u64,
        band_tight,
        band_loose,
    })
}
