//! Tunable defaults and physical constants for the analyzer.
//!
//! Every value here that shapes an estimate is also exposed as a CLI flag;
//! the rest are fixed model constants.

/// Rolling sample window, minutes. `<= 0` disables trimming.
pub const DEFAULT_WINDOW_MINUTES: i64 = 30;

/// Coarse grid step over the whole world, degrees.
pub const DEFAULT_GRID_DEG: f64 = 2.0;

/// Refinement grid step, degrees.
pub const DEFAULT_REFINE_DEG: f64 = 0.25;

/// Refinement window half-width = max(grid, refine * REFINE_WINDOW_MULT).
pub const REFINE_WINDOW_MULT: f64 = 10.0;

/// Loose confidence-band SSE factor; tight is max(0.05, factor / 2).
pub const DEFAULT_BAND_FACTOR: f64 = 0.25;

/// Minimum half-width of the band sampling window, degrees.
pub const DEFAULT_BAND_WINDOW_DEG: f64 = 5.0;

/// Propagation speed in km/s. ~2/3 c, typical for long-haul fiber.
pub const DEFAULT_SPEED_KM_S: f64 = 200_000.0;

/// Routing indirection factor; divides the effective speed. Clamped >= 1.
pub const DEFAULT_PATH_STRETCH: f64 = 1.0;

/// Round-trip halving: one-way time = rtt / RTT_FACTOR.
pub const RTT_FACTOR: f64 = 2.0;

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Floor on jitter when weighting observations (1 / jitter).
pub const MIN_JITTER_MS: f64 = 1.0;

pub const MIN_CALIBRATION_SCALE: f64 = 0.5;
pub const MAX_CALIBRATION_SCALE: f64 = 2.0;

/// Per-endpoint training ring capacity; oldest samples are evicted first.
pub const MAX_CALIBRATION_SAMPLES: usize = 32;

/// Median absolute adjusted-p05 drift that flags a stale calibration.
pub const CALIB_DRIFT_WARN_MS: f64 = 15.0;

/// How long a rotation/truncation reset reason stays visible in snapshots.
pub const LOG_RESET_NOTICE_MS: i64 = 30_000;

/// Minimum interval between estimator runs; snapshots in between reuse the
/// cached estimate.
pub const DEFAULT_ESTIMATE_INTERVAL_MS: i64 = 5_000;

/// When no baseline log is supplied, capture the first N minutes as one.
pub const DEFAULT_AUTO_BASELINE_MINUTES: i64 = 10;

/// Follow-mode snapshot period.
pub const DEFAULT_REFRESH_MS: u64 = 2_000;

/// Endpoint port assumed by imports when the column is empty.
pub const DEFAULT_PORT: u32 = 9000;

/// Additive floor on the band SSE threshold, so a near-zero minimum still
/// admits neighbors.
pub const SSE_EPSILON: f64 = 1e-6;

pub const MS_PER_SEC: f64 = 1000.0;
pub const MS_PER_MIN: i64 = 60_000;

pub const WORLD_LAT_MAX: f64 = 90.0;
pub const WORLD_LON_MAX: f64 = 180.0;

/// File name used when the log path points at a directory.
pub const DEFAULT_LOG_FILE: &str = "measurements.jsonl";
