//! main.rs — Locus analyzer entry point
//!
//! Thin CLI over the state aggregator: build a `StateManager` from flags,
//! then either print one snapshot (default), follow the log and print one
//! snapshot per refresh tick, or run a one-shot calibration generation
//! through the supervisor. Snapshots go to stdout as JSON; logging goes to
//! stderr so the output stream stays machine-readable.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::time::interval;
use tracing::info;

use locus_analyzer::constants::{
    DEFAULT_AUTO_BASELINE_MINUTES, DEFAULT_BAND_FACTOR, DEFAULT_BAND_WINDOW_DEG,
    DEFAULT_ESTIMATE_INTERVAL_MS, DEFAULT_GRID_DEG, DEFAULT_PATH_STRETCH, DEFAULT_REFINE_DEG,
    DEFAULT_REFRESH_MS, DEFAULT_SPEED_KM_S, DEFAULT_WINDOW_MINUTES,
};
use locus_analyzer::{CalibrationSupervisor, StateManager, StateOptions};

#[derive(Parser, Debug)]
#[command(name = "locus-analyze", about = "Latency-constraint geolocation analyzer")]
struct Args {
    /// Config JSON with endpoints (and optional probe paths)
    #[arg(long)]
    config: PathBuf,
    /// Live JSONL measurement log (or a directory containing one)
    #[arg(long)]
    log: PathBuf,
    /// Baseline JSONL path; disables auto-baseline capture
    #[arg(long)]
    baseline: Option<PathBuf>,
    /// Capture the first N minutes as baseline when --baseline is omitted
    #[arg(long, default_value_t = DEFAULT_AUTO_BASELINE_MINUTES)]
    auto_baseline_minutes: i64,
    /// Optional output path for the captured baseline JSONL
    #[arg(long)]
    auto_baseline_out: Option<PathBuf>,
    /// Calibration JSON path to load at startup
    #[arg(long)]
    calibration: Option<PathBuf>,
    /// Claimed location to falsify (requires both)
    #[arg(long)]
    claim_lat: Option<f64>,
    #[arg(long)]
    claim_lon: Option<f64>,
    #[arg(long, default_value_t = DEFAULT_SPEED_KM_S)]
    speed_km_s: f64,
    #[arg(long, default_value_t = DEFAULT_PATH_STRETCH)]
    path_stretch: f64,
    #[arg(long, default_value_t = DEFAULT_WINDOW_MINUTES)]
    window_minutes: i64,
    /// Coarse grid step, degrees
    #[arg(long, default_value_t = DEFAULT_GRID_DEG)]
    grid: f64,
    /// Refinement grid step, degrees
    #[arg(long, default_value_t = DEFAULT_REFINE_DEG)]
    refine: f64,
    #[arg(long, default_value_t = DEFAULT_BAND_FACTOR)]
    band_factor: f64,
    #[arg(long, default_value_t = DEFAULT_BAND_WINDOW_DEG)]
    band_window_deg: f64,
    /// Snapshot period in follow mode, milliseconds
    #[arg(long, default_value_t = DEFAULT_REFRESH_MS)]
    refresh_ms: u64,
    /// Minimum interval between estimator runs, milliseconds
    #[arg(long, default_value_t = DEFAULT_ESTIMATE_INTERVAL_MS)]
    estimate_interval_ms: i64,
    /// Keep running and print one snapshot per refresh tick
    #[arg(long)]
    follow: bool,
    /// Pretty-print the snapshot JSON (one-shot mode only)
    #[arg(long)]
    pretty: bool,
    /// Generate a calibration for this operator location, then exit
    #[arg(long)]
    calibrate_lat: Option<f64>,
    #[arg(long)]
    calibrate_lon: Option<f64>,
    /// Output path for the generated calibration JSON
    #[arg(long)]
    calibration_out: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "locus_analyzer=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut opts = StateOptions::new(args.config.clone(), args.log.clone());
    opts.baseline_path = args.baseline;
    opts.auto_baseline_minutes = args.auto_baseline_minutes;
    opts.auto_baseline_out = args.auto_baseline_out;
    opts.calibration_path = args.calibration;
    opts.claim_lat = args.claim_lat;
    opts.claim_lon = args.claim_lon;
    opts.speed_km_s = args.speed_km_s;
    opts.path_stretch = args.path_stretch;
    opts.window_minutes = args.window_minutes;
    opts.grid_deg = args.grid;
    opts.refine_deg = args.refine;
    opts.band_factor = args.band_factor;
    opts.band_window_deg = args.band_window_deg;
    opts.estimate_interval_ms = args.estimate_interval_ms;

    let manager = Arc::new(StateManager::new(opts).expect("unusable --config/--log"));

    // One-shot calibration generation, then exit.
    if let (Some(lat), Some(lon)) = (args.calibrate_lat, args.calibrate_lon) {
        // Ingest what the log already has so the window stats are populated.
        let _ = manager.snapshot().await;
        let supervisor = CalibrationSupervisor::new(manager.clone());
        supervisor
            .generate(lat, lon, args.calibration_out)
            .await
            .expect("calibration job slot busy at startup");
        let status = supervisor.wait_idle().await;
        println!(
            "{}",
            serde_json::to_string_pretty(&status).expect("serializing job status")
        );
        if status.error.is_some() {
            std::process::exit(1);
        }
        return;
    }

    if !args.follow {
        let snap = manager.snapshot().await;
        let out = if args.pretty {
            serde_json::to_string_pretty(&snap)
        } else {
            serde_json::to_string(&snap)
        };
        println!("{}", out.expect("serializing snapshot"));
        return;
    }

    info!(
        "locus analyzer v{} following {} ({}ms refresh)",
        env!("CARGO_PKG_VERSION"),
        args.log.display(),
        args.refresh_ms
    );
    let mut ticker = interval(Duration::from_millis(args.refresh_ms.max(100)));
    loop {
        ticker.tick().await;
        let snap = manager.snapshot().await;
        match serde_json::to_string(&snap) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::warn!("snapshot serialization failed: {e}"),
        }
    }
}
