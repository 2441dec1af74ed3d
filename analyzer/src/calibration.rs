//! Per-endpoint affine RTT correction: `adjusted = (raw − bias) / scale`.
//!
//! The operator reports their true location while samples are flowing; each
//! endpoint with known coordinates then contributes an (expected, observed)
//! training point. Training points live in a bounded FIFO ring per endpoint
//! so refits stay responsive to drift without unbounded memory. Fits are
//! unweighted least squares with the scale clamped to a sane interval and
//! the bias clamped non-negative.

use std::path::Path;

use anyhow::Context;
use locus_types::{
    CalibrationEntry, CalibrationFile, CalibrationHealth, CalibrationMeta, CalibrationSample,
    DriftDelta, DriftReport, Endpoint,
};
use serde::Serialize;
use tracing::warn;

use crate::constants::{
    CALIB_DRIFT_WARN_MS, MAX_CALIBRATION_SAMPLES, MAX_CALIBRATION_SCALE, MIN_CALIBRATION_SCALE,
    MS_PER_SEC, RTT_FACTOR,
};
use crate::geo::haversine_km;
use crate::stats::{median, StatsMap};

/// Result summary of a calibration generation, surfaced via the job status.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateOutcome {
    pub ok: bool,
    pub path: String,
    pub count: usize,
    pub source: String,
}

/// Look up an endpoint's calibration entry, falling back from `id@path` to
/// the base `id` (probe-path suffixes share the endpoint's correction).
pub fn calibration_entry<'a>(
    cal: &'a CalibrationFile,
    endpoint_id: &str,
) -> Option<&'a CalibrationEntry> {
    if let Some(entry) = cal.endpoints.get(endpoint_id) {
        return Some(entry);
    }
    endpoint_id
        .split_once('@')
        .and_then(|(base, _)| cal.endpoints.get(base))
}

/// Apply the correction. Unknown endpoints and absent calibration pass the
/// raw value through; results never go negative.
pub fn adjust_rtt_ms(rtt_ms: f64, endpoint_id: &str, cal: Option<&CalibrationFile>) -> f64 {
    let entry = match cal.and_then(|c| calibration_entry(c, endpoint_id)) {
        Some(e) => e,
        None => return rtt_ms,
    };
    let scale = if entry.scale <= 0.0 { 1.0 } else { entry.scale };
    ((rtt_ms - entry.bias_ms) / scale).max(0.0)
}

/// Fit (bias, scale, rmse) from a ring of training points.
fn fit_curve(samples: &[CalibrationSample]) -> (f64, f64, Option<f64>) {
    if samples.is_empty() {
        return (0.0, 1.0, None);
    }
    if samples.len() < 2 {
        let last = &samples[samples.len() - 1];
        return ((last.rtt_ms - last.expected_ms).max(0.0), 1.0, None);
    }
    let n = samples.len() as f64;
    let mean_x = samples.iter().map(|s| s.expected_ms).sum::<f64>() / n;
    let mean_y = samples.iter().map(|s| s.rtt_ms).sum::<f64>() / n;
    let var_x = samples
        .iter()
        .map(|s| (s.expected_ms - mean_x).powi(2))
        .sum::<f64>()
        / n;
    if var_x <= 0.0 {
        // All expected values identical: no slope information.
        return ((mean_y - mean_x).max(0.0), 1.0, None);
    }
    let cov_xy = samples
        .iter()
        .map(|s| (s.expected_ms - mean_x) * (s.rtt_ms - mean_y))
        .sum::<f64>()
        / n;
    let scale = (cov_xy / var_x).clamp(MIN_CALIBRATION_SCALE, MAX_CALIBRATION_SCALE);
    let bias = (mean_y - scale * mean_x).max(0.0);
    let rmse = (samples
        .iter()
        .map(|s| (s.rtt_ms - (bias + scale * s.expected_ms)).powi(2))
        .sum::<f64>()
        / n)
        .sqrt();
    (bias, scale, Some(rmse))
}

fn push_bounded(ring: &mut Vec<CalibrationSample>, sample: CalibrationSample) {
    ring.push(sample);
    if ring.len() > MAX_CALIBRATION_SAMPLES {
        let excess = ring.len() - MAX_CALIBRATION_SAMPLES;
        ring.drain(..excess);
    }
}

/// Build a calibration from the current stats and a self-reported location,
/// merging training points into any previous calibration's rings and
/// refitting every endpoint that has points.
#[allow(clippy::too_many_arguments)]
pub fn build_calibration(
    endpoints_cfg: &[Endpoint],
    stats: &StatsMap,
    lat: f64,
    lon: f64,
    speed_km_s: f64,
    path_stretch: f64,
    previous: Option<&CalibrationFile>,
    source: &str,
    now_ms: i64,
) -> CalibrationFile {
    let path_stretch = path_stretch.max(1.0);
    let effective_speed = speed_km_s / path_stretch;
    let speed_km_ms = effective_speed / MS_PER_SEC;

    let mut samples = previous.map(|p| p.samples.clone()).unwrap_or_default();

    for (ep_id, st) in stats {
        let base_id = ep_id.split('@').next().unwrap_or(ep_id);
        let ep = match endpoints_cfg.iter().find(|e| e.id == base_id) {
            Some(ep) => ep,
            None => continue,
        };
        let (ep_lat, ep_lon) = match (ep.lat, ep.lon) {
            (Some(lat), Some(lon)) => (lat, lon),
            _ => continue,
        };
        let rtt = if st.p05 > 0.0 { st.p05 } else { st.min };
        if rtt <= 0.0 {
            continue;
        }
        let dist_km = haversine_km(lat, lon, ep_lat, ep_lon);
        let expected_ms = RTT_FACTOR * dist_km / speed_km_ms;
        push_bounded(
            samples.entry(ep_id.clone()).or_default(),
            CalibrationSample {
                lat,
                lon,
                dist_km,
                expected_ms,
                rtt_ms: rtt,
                source: source.to_string(),
                ts: now_ms,
            },
        );
    }

    let mut fitted = std::collections::BTreeMap::new();
    for (ep_id, ring) in &samples {
        let (bias_ms, scale, rmse_ms) = fit_curve(ring);
        fitted.insert(
            ep_id.clone(),
            CalibrationEntry {
                bias_ms,
                scale,
                sample_count: ring.len() as u64,
                rmse_ms,
            },
        );
    }

    CalibrationFile {
        generated_at: now_ms,
        calibration_lat: lat,
        calibration_lon: lon,
        speed_km_s,
        path_stretch,
        endpoints: fitted,
        samples,
        path: None,
    }
}

// ── File I/O ──────────────────────────────────────────────────────────────────

/// Tolerant load: any failure returns None so a corrupt file never takes the
/// analyzer down.
pub fn load_calibration(path: &Path) -> Option<CalibrationFile> {
    let data = match std::fs::read_to_string(path) {
        Ok(d) => d,
        Err(e) => {
            warn!("could not read calibration {}: {e}", path.display());
            return None;
        }
    };
    match serde_json::from_str::<CalibrationFile>(&data) {
        Ok(mut cal) => {
            if cal.path.is_none() {
                cal.path = Some(path.display().to_string());
            }
            Some(cal)
        }
        Err(e) => {
            warn!("could not parse calibration {}: {e}", path.display());
            None
        }
    }
}

pub fn save_calibration(path: &Path, cal: &CalibrationFile) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(cal)?;
    std::fs::write(path, json)
        .with_context(|| format!("writing calibration {}", path.display()))?;
    Ok(())
}

// ── Snapshot blocks ───────────────────────────────────────────────────────────

pub fn calibration_meta(cal: &CalibrationFile) -> CalibrationMeta {
    CalibrationMeta {
        path: cal.path.clone(),
        generated_at: cal.generated_at,
        calibration_lat: cal.calibration_lat,
        calibration_lon: cal.calibration_lon,
        count: cal.endpoints.len() as u64,
        sample_count: cal.samples.values().map(|v| v.len() as u64).sum(),
    }
}

pub fn calibration_health(
    cal: &CalibrationFile,
    now_ms: i64,
    drift: Option<DriftReport>,
) -> CalibrationHealth {
    let age_ms = if cal.generated_at > 0 {
        // Tolerate second-resolution timestamps from older files.
        let gen_ms = if cal.generated_at < 1_000_000_000_000 {
            cal.generated_at * 1000
        } else {
            cal.generated_at
        };
        Some(now_ms - gen_ms)
    } else {
        None
    };
    let drift_warn = drift.as_ref().map(|d| d.median_abs_ms >= CALIB_DRIFT_WARN_MS);
    CalibrationHealth {
        generated_at: cal.generated_at,
        age_ms,
        drift,
        drift_warn,
        warn_threshold_ms: CALIB_DRIFT_WARN_MS,
    }
}

/// Adjusted-p05 movement between baseline and session stats, per endpoint.
/// None when either side (or the calibration) is missing.
pub fn build_calibration_drift(
    baseline: Option<&StatsMap>,
    session: &StatsMap,
    cal: Option<&CalibrationFile>,
) -> Option<DriftReport> {
    let baseline = baseline?;
    cal?;
    let mut deltas: Vec<DriftDelta> = Vec::new();
    for (ep_id, b) in baseline {
        let s = match session.get(ep_id) {
            Some(s) => s,
            None => continue,
        };
        let b_adj = adjust_rtt_ms(b.p05, ep_id, cal);
        let s_adj = adjust_rtt_ms(s.p05, ep_id, cal);
        deltas.push(DriftDelta {
            id: ep_id.clone(),
            delta_ms: s_adj - b_adj,
        });
    }
    if deltas.is_empty() {
        return None;
    }
    let abs_vals: Vec<f64> = deltas.iter().map(|d| d.delta_ms.abs()).collect();
    let median_abs_ms = median(&abs_vals)?;
    let max_abs_ms = abs_vals.iter().cloned().fold(f64::MIN, f64::max);
    let mut worst = deltas.clone();
    worst.sort_by(|a, b| {
        b.delta_ms
            .abs()
            .partial_cmp(&a.delta_ms.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    worst.truncate(3);
    Some(DriftReport {
        count: deltas.len() as u64,
        median_abs_ms,
        max_abs_ms,
        worst,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(expected: f64, rtt: f64) -> CalibrationSample {
        CalibrationSample {
            lat: 0.0,
            lon: 0.0,
            dist_km: 0.0,
            expected_ms: expected,
            rtt_ms: rtt,
            source: "window".into(),
            ts: 0,
        }
    }

    #[test]
    fn fit_single_point_is_pure_bias() {
        let (bias, scale, rmse) = fit_curve(&[sample(10.0, 14.0)]);
        assert_eq!(bias, 4.0);
        assert_eq!(scale, 1.0);
        assert!(rmse.is_none());
    }

    #[test]
    fn fit_recovers_slope_and_intercept() {
        // rtt = 2 + 1.5 * expected, exactly.
        let pts: Vec<_> = [10.0, 20.0, 30.0]
            .iter()
            .map(|&x| sample(x, 2.0 + 1.5 * x))
            .collect();
        let (bias, scale, rmse) = fit_curve(&pts);
        assert!((scale - 1.5).abs() < 1e-9);
        assert!((bias - 2.0).abs() < 1e-9);
        assert!(rmse.unwrap() < 1e-9);
    }

    #[test]
    fn fit_clamps_scale_at_both_ends() {
        // Steep slope: rtt = 10 * expected -> clamps to MAX.
        let steep: Vec<_> = [1.0, 2.0, 3.0].iter().map(|&x| sample(x, 10.0 * x)).collect();
        let (_, scale, _) = fit_curve(&steep);
        assert_eq!(scale, MAX_CALIBRATION_SCALE);

        // Shallow slope: rtt = 0.1 * expected -> clamps to MIN.
        let shallow: Vec<_> = [10.0, 20.0, 30.0].iter().map(|&x| sample(x, 0.1 * x)).collect();
        let (_, scale, _) = fit_curve(&shallow);
        assert_eq!(scale, MIN_CALIBRATION_SCALE);
    }

    #[test]
    fn ring_evicts_oldest() {
        let mut ring = Vec::new();
        for i in 0..(MAX_CALIBRATION_SAMPLES + 5) {
            push_bounded(&mut ring, sample(i as f64, i as f64));
        }
        assert_eq!(ring.len(), MAX_CALIBRATION_SAMPLES);
        assert_eq!(ring[0].expected_ms, 5.0);
    }
}
