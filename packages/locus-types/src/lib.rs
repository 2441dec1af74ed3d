//! # locus-types
//!
//! Shared data model for the Locus latency-geolocation suite.
//!
//! These types are used by:
//! - `locus-analyzer`: building and serving analysis snapshots
//! - the measurement probe: producing JSONL measurement records
//! - downstream consumers: dashboards and report tooling reading snapshot JSON
//!
//! Everything here is wire-visible. Field names are part of the snapshot
//! contract, so structs serialize with camelCase keys and optional blocks are
//! omitted when absent.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ── Endpoint configuration ────────────────────────────────────────────────────

/// A probe target with a known network address and, usually, known
/// geographic coordinates. Endpoints are configuration-owned and immutable
/// within a session; updates replace the whole set atomically.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub id: String,
    pub host: String,
    /// Valid range 1..=65535; kept wide so imports can be validated with
    /// row-level errors instead of failing to parse.
    pub port: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region_hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
}

/// Network path a probe binds to when measuring (VPN interface, alternate
/// egress IP). Identified by the suffix after `@` in logged endpoint ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbePath {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_interface: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_ip: Option<String>,
}

/// Root configuration document. Unknown keys are preserved across rewrites
/// so operator tooling can keep probe-only settings in the same file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigDoc {
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
    #[serde(default)]
    pub samples_per_endpoint: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_paths: Option<Vec<ProbePath>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// ── Measurement record (one log line) ────────────────────────────────────────

/// One burst of probes against one endpoint, as appended to the JSONL log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementRecord {
    pub ts_unix_ms: i64,
    pub endpoint_id: String,
    #[serde(default)]
    pub samples_ms: Vec<f64>,
}

// ── Calibration file ──────────────────────────────────────────────────────────

/// One (expected, observed) training point for an endpoint's affine fit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationSample {
    pub lat: f64,
    pub lon: f64,
    pub dist_km: f64,
    pub expected_ms: f64,
    pub rtt_ms: f64,
    /// "baseline" or "window": which stats set supplied the reference RTT.
    pub source: String,
    pub ts: i64,
}

fn default_scale() -> f64 {
    1.0
}

/// Fitted affine correction for one endpoint: `adjusted = (raw − bias) / scale`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationEntry {
    #[serde(default)]
    pub bias_ms: f64,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub sample_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rmse_ms: Option<f64>,
}

/// On-disk calibration document. Consumers tolerate missing fields by
/// treating them as defaults; `path` is informational only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct CalibrationFile {
    pub generated_at: i64,
    pub calibration_lat: f64,
    pub calibration_lon: f64,
    pub speed_km_s: f64,
    pub path_stretch: f64,
    pub endpoints: BTreeMap<String, CalibrationEntry>,
    pub samples: BTreeMap<String, Vec<CalibrationSample>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

// ── Snapshot: per-endpoint blocks ────────────────────────────────────────────

/// Windowed latency statistics for one endpoint, with calibration-adjusted
/// reference RTTs and the distance bounds they imply.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointReport {
    pub id: String,
    pub host: String,
    pub count: u64,
    pub p05_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub jitter_ms: f64,
    pub p05_adj_ms: f64,
    pub p50_adj_ms: f64,
    /// None when the adjusted reference RTT is not positive.
    pub max_dist_km_tight: Option<f64>,
    pub max_dist_km_loose: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
}

/// Burst-level delivery accounting for one endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub id: String,
    pub burst_count: u64,
    pub sample_count: u64,
    /// Absent when `samplesPerEndpoint` is unconfigured (0).
    pub expected_samples: Option<u64>,
    pub loss_pct: Option<f64>,
    pub last_seen_ms: Option<i64>,
}

/// Distance-bound check of one endpoint against the claimed location.
/// The falsify fields are null when the corresponding bound is undefined.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimCheck {
    pub id: String,
    pub dist_km: f64,
    pub max_tight_km: Option<f64>,
    pub max_loose_km: Option<f64>,
    pub falsify_tight: Option<bool>,
    pub falsify_loose: Option<bool>,
}

// ── Snapshot: estimate ────────────────────────────────────────────────────────

/// Covariance ellipse of the in-band candidate cloud, fitted on east/north
/// km offsets in the tangent plane at the estimate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ellipse {
    pub major_km: f64,
    pub minor_km: f64,
    pub angle_deg: f64,
}

/// Isocontour confidence band: all refinement-grid candidates whose SSE is
/// within the threshold of the minimum.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Band {
    pub radius_km: f64,
    pub sse_threshold: f64,
    pub points: u64,
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ellipse: Option<Ellipse>,
}

/// Joint position + nonnegative-bias estimate from the weighted grid search.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Estimate {
    pub lat: f64,
    pub lon: f64,
    pub bias_ms: f64,
    pub sse: f64,
    /// Number of endpoint observations used.
    pub points: u64,
    pub band_tight: Option<Band>,
    pub band_loose: Option<Band>,
}

// ── Snapshot: calibration status ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub generated_at: i64,
    pub calibration_lat: f64,
    pub calibration_lon: f64,
    pub count: u64,
    pub sample_count: u64,
}

/// Per-endpoint adjusted-p05 shift between baseline and session stats.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftDelta {
    pub id: String,
    pub delta_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftReport {
    pub count: u64,
    pub median_abs_ms: f64,
    pub max_abs_ms: f64,
    /// Up to three endpoints with the largest absolute drift.
    pub worst: Vec<DriftDelta>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationHealth {
    pub generated_at: i64,
    pub age_ms: Option<i64>,
    pub drift: Option<DriftReport>,
    pub drift_warn: Option<bool>,
    pub warn_threshold_ms: f64,
}

// ── Snapshot: status blocks ──────────────────────────────────────────────────

/// Tail-follower status. `resetReason` is "rotated" or "truncated" and is
/// auto-cleared after the notice window expires.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogStatus {
    pub missing: bool,
    pub error: Option<String>,
    pub reset_reason: Option<String>,
    pub reset_at_ms: Option<i64>,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoBaselineInfo {
    pub enabled: bool,
    pub minutes: i64,
    pub start_ms: Option<i64>,
    pub end_ms: Option<i64>,
    pub complete: bool,
    pub output_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateHost {
    pub host: String,
    pub ids: Vec<String>,
}

/// Configuration hygiene: endpoints that will degrade analysis quality.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hygiene {
    pub missing_coords: Vec<String>,
    pub missing_region: Vec<String>,
    pub duplicate_hosts: Vec<DuplicateHost>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claim {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub start_ms: i64,
}

/// Per-endpoint p05 delta between baseline and session (raw, unadjusted).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaselineDelta {
    pub id: String,
    pub delta_p05_ms: f64,
    pub baseline_p05_ms: f64,
    pub session_p05_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaselineBlock {
    pub endpoints: Vec<EndpointReport>,
    pub deltas: Vec<BaselineDelta>,
    pub calibration_drift: Option<DriftReport>,
}

/// Analysis parameters in effect for the snapshot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Params {
    pub speed_km_s: f64,
    pub effective_speed_km_s: f64,
    pub path_stretch: f64,
    pub grid_deg: f64,
    pub refine_deg: f64,
    pub band_factor: f64,
    pub band_window_deg: f64,
}

// ── Snapshot root ─────────────────────────────────────────────────────────────

/// One consistent view of the analyzer: everything derived from the same
/// critical section, serialized for downstream consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub updated_at: i64,
    pub window_minutes: i64,
    pub params: Params,
    pub endpoints: Vec<EndpointReport>,
    pub health: Vec<HealthReport>,
    pub estimate: Option<Estimate>,
    pub calibration: Option<CalibrationMeta>,
    pub calibration_health: Option<CalibrationHealth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim_checks: Option<Vec<ClaimCheck>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim: Option<Claim>,
    pub hygiene: Hygiene,
    pub log_status: LogStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_baseline: Option<AutoBaselineInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline: Option<BaselineBlock>,
}

// ── Calibration job status ────────────────────────────────────────────────────

/// Status of the single-slot calibration job supervisor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationJobStatus {
    pub running: bool,
    pub kind: Option<String>,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
    pub error: Option<String>,
    pub result: Option<serde_json::Value>,
}
