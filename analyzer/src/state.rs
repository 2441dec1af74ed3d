//! # state
//!
//! The state aggregator: one shared object that owns ingestion, windowing,
//! summarization, and snapshot assembly.
//!
//! ## Architecture
//! Single-writer, multi-reader around one `tokio::sync::Mutex`. A snapshot
//! request ingests new log bytes, trims the window, and derives every report
//! block inside one critical section, so all fields of a snapshot are
//! mutually consistent. The estimator is pure and runs on a copied
//! observation set *outside* the lock (its CPU cost must not block
//! ingestion); its result is cached and refreshed at most once per
//! `estimate_interval_ms`. Calibration jobs run on a worker task and only
//! take the lock to swap calibration in or out.
//!
//! ## Invariants
//! - The sample store never holds negative or non-finite RTTs.
//! - The measurement log is read-only to this module.
//! - Rotation/truncation drops derived state and surfaces a reset notice
//!   for `LOG_RESET_NOTICE_MS`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context};
use locus_types::{
    AutoBaselineInfo, BaselineBlock, CalibrationFile, Claim, ConfigDoc, Endpoint, LogStatus,
    MeasurementRecord, ProbePath, SessionInfo, Snapshot,
};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::calibration::{
    build_calibration, build_calibration_drift, calibration_health, calibration_meta,
    load_calibration, save_calibration, GenerateOutcome,
};
use crate::claims::build_claim_checks;
use crate::config::{load_config, save_config, validate_endpoints, validate_probe_paths};
use crate::constants::{
    DEFAULT_AUTO_BASELINE_MINUTES, DEFAULT_BAND_FACTOR, DEFAULT_BAND_WINDOW_DEG,
    DEFAULT_ESTIMATE_INTERVAL_MS, DEFAULT_GRID_DEG, DEFAULT_LOG_FILE, DEFAULT_PATH_STRETCH,
    DEFAULT_REFINE_DEG, DEFAULT_SPEED_KM_S, DEFAULT_WINDOW_MINUTES, MS_PER_MIN,
};
use crate::estimator::estimate_location;
use crate::log_tail::{load_records, LogTailer, ParsedRecord};
use crate::reports::{build_deltas, build_endpoint_reports, build_health_reports, build_hygiene};
use crate::stats::{compute_stats_from_records, compute_stats_from_samples, StatsMap};
use crate::store::SampleStore;

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

// ── Options ───────────────────────────────────────────────────────────────────

/// Construction parameters; analysis tunables are fixed for the life of the
/// manager (endpoint sets are not, see `replace_endpoints`).
#[derive(Debug, Clone)]
pub struct StateOptions {
    pub config_path: PathBuf,
    pub log_path: PathBuf,
    pub baseline_path: Option<PathBuf>,
    pub auto_baseline_minutes: i64,
    pub auto_baseline_out: Option<PathBuf>,
    pub calibration_path: Option<PathBuf>,
    pub claim_lat: Option<f64>,
    pub claim_lon: Option<f64>,
    pub speed_km_s: f64,
    pub path_stretch: f64,
    pub window_minutes: i64,
    pub grid_deg: f64,
    pub refine_deg: f64,
    pub band_factor: f64,
    pub band_window_deg: f64,
    pub estimate_interval_ms: i64,
}

impl StateOptions {
    pub fn new(config_path: PathBuf, log_path: PathBuf) -> Self {
        Self {
            config_path,
            log_path,
            baseline_path: None,
            auto_baseline_minutes: DEFAULT_AUTO_BASELINE_MINUTES,
            auto_baseline_out: None,
            calibration_path: None,
            claim_lat: None,
            claim_lon: None,
            speed_km_s: DEFAULT_SPEED_KM_S,
            path_stretch: DEFAULT_PATH_STRETCH,
            window_minutes: DEFAULT_WINDOW_MINUTES,
            grid_deg: DEFAULT_GRID_DEG,
            refine_deg: DEFAULT_REFINE_DEG,
            band_factor: DEFAULT_BAND_FACTOR,
            band_window_deg: DEFAULT_BAND_WINDOW_DEG,
            estimate_interval_ms: DEFAULT_ESTIMATE_INTERVAL_MS,
        }
    }
}

#[derive(Debug, Error)]
pub enum ReplaceConfigError {
    /// Row-numbered validation errors; nothing was written.
    #[error("endpoint validation failed: {0:?}")]
    Validation(Vec<String>),
    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

// ── Auto-baseline capture ─────────────────────────────────────────────────────

#[derive(Debug)]
struct AutoBaseline {
    enabled: bool,
    minutes: i64,
    out_path: Option<PathBuf>,
    start_ms: Option<i64>,
    end_ms: Option<i64>,
    records: Vec<MeasurementRecord>,
    lines: Vec<String>,
    complete: bool,
}

impl AutoBaseline {
    fn new(enabled: bool, minutes: i64, out_path: Option<PathBuf>) -> Self {
        Self {
            enabled,
            minutes,
            out_path,
            start_ms: None,
            end_ms: None,
            records: Vec::new(),
            lines: Vec::new(),
            complete: false,
        }
    }

    /// The first ingested record pins the capture window; everything with a
    /// timestamp inside it joins the baseline, regardless of arrival poll.
    fn capture(&mut self, rec: &ParsedRecord) {
        if !self.enabled || self.complete {
            return;
        }
        if self.start_ms.is_none() {
            self.start_ms = Some(rec.ts_unix_ms);
            self.end_ms = Some(rec.ts_unix_ms + self.minutes * MS_PER_MIN);
        }
        if rec.ts_unix_ms <= self.end_ms.unwrap_or(i64::MAX) {
            self.records.push(MeasurementRecord {
                ts_unix_ms: rec.ts_unix_ms,
                endpoint_id: rec.endpoint_id.clone(),
                samples_ms: rec.samples_ms.clone(),
            });
            if self.out_path.is_some() {
                self.lines.push(rec.raw.clone());
            }
        }
    }

    fn maybe_finalize(&mut self, now_ms: i64) -> Option<StatsMap> {
        if !self.enabled || self.complete {
            return None;
        }
        let end = self.end_ms?;
        if now_ms < end {
            return None;
        }
        let stats = compute_stats_from_records(&self.records);
        if let Some(out) = &self.out_path {
            if !self.lines.is_empty() {
                if let Err(e) = write_lines(out, &self.lines) {
                    warn!("auto-baseline: could not write {}: {e}", out.display());
                }
            }
        }
        info!(
            "auto-baseline complete: {} records, {} endpoints",
            self.records.len(),
            stats.len()
        );
        self.complete = true;
        self.records.clear();
        self.lines.clear();
        Some(stats)
    }

    fn info(&self) -> AutoBaselineInfo {
        AutoBaselineInfo {
            enabled: true,
            minutes: self.minutes,
            start_ms: self.start_ms,
            end_ms: self.end_ms,
            complete: self.complete,
            output_path: self.out_path.as_ref().map(|p| p.display().to_string()),
        }
    }
}

fn write_lines(path: &Path, lines: &[String]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut body = lines.join("\n");
    body.push('\n');
    std::fs::write(path, body)
}

// ── State manager ─────────────────────────────────────────────────────────────

struct Inner {
    config: ConfigDoc,
    endpoints: HashMap<String, Endpoint>,
    tail: LogTailer,
    store: SampleStore,
    session_start_ms: Option<i64>,
    baseline_stats: Option<StatsMap>,
    calibration: Option<CalibrationFile>,
    auto_baseline: AutoBaseline,
    estimate_cache: Option<locus_types::Estimate>,
    estimate_cache_ms: i64,
}

fn endpoint_map(endpoints: &[Endpoint]) -> HashMap<String, Endpoint> {
    endpoints.iter().map(|ep| (ep.id.clone(), ep.clone())).collect()
}

pub struct StateManager {
    config_path: PathBuf,
    claim: Option<Claim>,
    speed_km_s: f64,
    path_stretch: f64,
    effective_speed_km_s: f64,
    window_minutes: i64,
    grid_deg: f64,
    refine_deg: f64,
    band_factor: f64,
    band_window_deg: f64,
    estimate_interval_ms: i64,
    inner: Mutex<Inner>,
}

impl StateManager {
    pub fn new(opts: StateOptions) -> anyhow::Result<Self> {
        let config = load_config(&opts.config_path)?;
        let endpoints = endpoint_map(&config.endpoints);

        let mut log_path = opts.log_path;
        if log_path.is_dir() {
            log_path = log_path.join(DEFAULT_LOG_FILE);
        }

        let baseline_stats = match &opts.baseline_path {
            Some(path) if path.exists() => {
                let records = load_records(path)
                    .with_context(|| format!("reading baseline {}", path.display()))?;
                Some(compute_stats_from_records(
                    &records
                        .iter()
                        .map(|r| MeasurementRecord {
                            ts_unix_ms: r.ts_unix_ms,
                            endpoint_id: r.endpoint_id.clone(),
                            samples_ms: r.samples_ms.clone(),
                        })
                        .collect::<Vec<_>>(),
                ))
            }
            _ => None,
        };

        let calibration = opts
            .calibration_path
            .as_deref()
            .filter(|p| p.exists())
            .and_then(load_calibration);

        let auto_enabled = baseline_stats.is_none() && opts.auto_baseline_minutes > 0;
        let path_stretch = opts.path_stretch.max(1.0);
        let claim = match (opts.claim_lat, opts.claim_lon) {
            (Some(lat), Some(lon)) => Some(Claim { lat, lon }),
            _ => None,
        };

        Ok(Self {
            config_path: opts.config_path,
            claim,
            speed_km_s: opts.speed_km_s,
            path_stretch,
            effective_speed_km_s: opts.speed_km_s / path_stretch,
            window_minutes: opts.window_minutes,
            grid_deg: opts.grid_deg,
            refine_deg: opts.refine_deg,
            band_factor: opts.band_factor,
            band_window_deg: opts.band_window_deg,
            estimate_interval_ms: opts.estimate_interval_ms,
            inner: Mutex::new(Inner {
                config,
                endpoints,
                tail: LogTailer::new(log_path),
                store: SampleStore::new(),
                session_start_ms: None,
                baseline_stats,
                calibration,
                auto_baseline: AutoBaseline::new(
                    auto_enabled,
                    opts.auto_baseline_minutes,
                    opts.auto_baseline_out,
                ),
                estimate_cache: None,
                estimate_cache_ms: 0,
            }),
        })
    }

    pub fn effective_speed_km_s(&self) -> f64 {
        self.effective_speed_km_s
    }

    /// Pin the session start; subsequent snapshots compute stats only from
    /// samples at or after this instant.
    pub async fn mark_session(&self) -> i64 {
        let start = now_ms();
        self.inner.lock().await.session_start_ms = Some(start);
        start
    }

    /// Atomically replace the endpoint set (and probe paths). Validation
    /// failures leave both the file and the in-memory set untouched.
    pub async fn replace_endpoints(
        &self,
        endpoints: Vec<Endpoint>,
        probe_paths: Option<Vec<ProbePath>>,
    ) -> Result<(), ReplaceConfigError> {
        let mut errors = validate_endpoints(&endpoints);
        if let Some(paths) = &probe_paths {
            errors.extend(validate_probe_paths(paths));
        }
        if !errors.is_empty() {
            return Err(ReplaceConfigError::Validation(errors));
        }
        let mut inner = self.inner.lock().await;
        let mut cfg = inner.config.clone();
        cfg.endpoints = endpoints;
        cfg.probe_paths = probe_paths.filter(|p| !p.is_empty());
        save_config(&self.config_path, &cfg)?;
        inner.endpoints = endpoint_map(&cfg.endpoints);
        inner.config = cfg;
        Ok(())
    }

    /// Swap in a calibration; its `path` field is the record of where it
    /// came from.
    pub async fn set_calibration(&self, cal: CalibrationFile) {
        self.inner.lock().await.calibration = Some(cal);
    }

    pub async fn clear_calibration(&self) {
        self.inner.lock().await.calibration = None;
    }

    /// Load a calibration file and swap it in. Tolerant parse; an unusable
    /// file is an error and leaves the current calibration in place.
    pub async fn load_calibration_file(&self, path: &Path) -> anyhow::Result<()> {
        match load_calibration(path) {
            Some(cal) => {
                self.set_calibration(cal).await;
                Ok(())
            }
            None => bail!("Failed to load calibration"),
        }
    }

    /// Build, persist, and swap in a calibration for the operator's reported
    /// location. The file write happens before the swap so an I/O failure
    /// leaves the in-memory calibration untouched.
    pub async fn generate_calibration(
        &self,
        lat: f64,
        lon: f64,
        output_path: Option<PathBuf>,
        prefer_baseline: bool,
    ) -> anyhow::Result<GenerateOutcome> {
        let (endpoints_cfg, baseline_stats, samples, previous) = {
            let inner = self.inner.lock().await;
            (
                inner.config.endpoints.clone(),
                inner.baseline_stats.clone(),
                inner.store.samples().clone(),
                inner.calibration.clone(),
            )
        };

        let (stats_source, source_label) = match baseline_stats {
            Some(stats) if prefer_baseline => (stats, "baseline"),
            _ => (compute_stats_from_samples(&samples), "window"),
        };
        if stats_source.is_empty() {
            bail!("No stats available yet");
        }

        let mut cal = build_calibration(
            &endpoints_cfg,
            &stats_source,
            lat,
            lon,
            self.speed_km_s,
            self.path_stretch,
            previous.as_ref(),
            source_label,
            now_ms(),
        );
        if cal.endpoints.is_empty() {
            bail!("No endpoints with lat/lon in stats");
        }

        let out_path = match output_path {
            Some(p) => p,
            None => self
                .config_path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join("calibration.json"),
        };
        cal.path = Some(out_path.display().to_string());
        save_calibration(&out_path, &cal)?;
        let count = cal.endpoints.len();
        self.set_calibration(cal).await;
        info!(
            "calibration generated: {count} endpoints from {source_label} stats -> {}",
            out_path.display()
        );
        Ok(GenerateOutcome {
            ok: true,
            path: out_path.display().to_string(),
            count,
            source: source_label.to_string(),
        })
    }

    /// Operator reset: drop in-memory samples and re-read the log from the
    /// start on the next snapshot. The log itself is never touched.
    pub async fn reset_ingest(&self) {
        let mut inner = self.inner.lock().await;
        inner.store.clear();
        inner.tail.reset_offset();
    }

    /// Ingest, window, summarize, and assemble one consistent snapshot.
    pub async fn snapshot(&self) -> Snapshot {
        let now = now_ms();
        let (mut snap, estimate_inputs) = {
            let mut guard = self.inner.lock().await;
            let inner = &mut *guard;

            let outcome = inner.tail.poll(now);
            if outcome.reset.is_some() {
                inner.store.clear();
            }
            for rec in &outcome.records {
                inner.auto_baseline.capture(rec);
                for &v in &rec.samples_ms {
                    if v.is_finite() && v >= 0.0 {
                        inner.store.append_sample(&rec.endpoint_id, rec.ts_unix_ms, v);
                    }
                }
                inner
                    .store
                    .append_burst(&rec.endpoint_id, rec.ts_unix_ms, rec.burst_len);
            }

            if self.window_minutes > 0 {
                inner.store.trim(now - self.window_minutes * MS_PER_MIN);
            }
            if let Some(stats) = inner.auto_baseline.maybe_finalize(now) {
                inner.baseline_stats = Some(stats);
            }
            inner.tail.expire_reset_notice(now);

            let session_samples = match inner.session_start_ms {
                Some(start) => inner.store.filter_since(start),
                None => inner.store.samples().clone(),
            };
            let session_stats = compute_stats_from_samples(&session_samples);
            let cal = inner.calibration.as_ref();

            let endpoint_reports = build_endpoint_reports(
                &session_stats,
                &inner.endpoints,
                self.effective_speed_km_s,
                cal,
            );
            let health =
                build_health_reports(inner.store.bursts(), inner.config.samples_per_endpoint);
            let claim_checks = self.claim.map(|c| {
                build_claim_checks(
                    &session_stats,
                    &inner.endpoints,
                    c.lat,
                    c.lon,
                    self.effective_speed_km_s,
                    cal,
                )
            });

            let (baseline_block, drift) = match &inner.baseline_stats {
                Some(baseline) => {
                    let reports = build_endpoint_reports(
                        baseline,
                        &inner.endpoints,
                        self.effective_speed_km_s,
                        cal,
                    );
                    let deltas = build_deltas(baseline, &session_stats);
                    let drift = build_calibration_drift(Some(baseline), &session_stats, cal);
                    (
                        Some(BaselineBlock {
                            endpoints: reports,
                            deltas,
                            calibration_drift: drift.clone(),
                        }),
                        drift,
                    )
                }
                None => (None, None),
            };

            let estimate_inputs = if inner.estimate_cache_ms == 0
                || now - inner.estimate_cache_ms >= self.estimate_interval_ms
            {
                Some((
                    session_stats.clone(),
                    inner.endpoints.clone(),
                    inner.calibration.clone(),
                ))
            } else {
                None
            };

            let snap = Snapshot {
                updated_at: now,
                window_minutes: self.window_minutes,
                params: locus_types::Params {
                    speed_km_s: self.speed_km_s,
                    effective_speed_km_s: self.effective_speed_km_s,
                    path_stretch: self.path_stretch,
                    grid_deg: self.grid_deg,
                    refine_deg: self.refine_deg,
                    band_factor: self.band_factor,
                    band_window_deg: self.band_window_deg,
                },
                endpoints: endpoint_reports,
                health,
                estimate: inner.estimate_cache.clone(),
                calibration: cal.map(calibration_meta),
                calibration_health: cal.map(|c| calibration_health(c, now, drift)),
                claim_checks,
                claim: self.claim,
                hygiene: build_hygiene(&inner.config.endpoints),
                log_status: LogStatus {
                    missing: inner.tail.missing(),
                    error: inner.tail.error().map(str::to_string),
                    reset_reason: inner.tail.reset_reason().map(str::to_string),
                    reset_at_ms: inner.tail.reset_at_ms(),
                    path: inner.tail.path().display().to_string(),
                },
                session: inner.session_start_ms.map(|start_ms| SessionInfo { start_ms }),
                auto_baseline: inner
                    .auto_baseline
                    .enabled
                    .then(|| inner.auto_baseline.info()),
                baseline: baseline_block,
            };
            (snap, estimate_inputs)
        };

        if let Some((stats, endpoints, cal)) = estimate_inputs {
            let estimate = estimate_location(
                &stats,
                &endpoints,
                self.effective_speed_km_s,
                self.grid_deg,
                self.refine_deg,
                self.band_factor,
                self.band_window_deg,
                cal.as_ref(),
            );
            let mut inner = self.inner.lock().await;
            inner.estimate_cache = estimate.clone();
            inner.estimate_cache_ms = now;
            snap.estimate = estimate;
        }
        snap
    }
}
