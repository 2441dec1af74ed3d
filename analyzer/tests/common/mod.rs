//! Shared fixtures for the integration tests: a three-endpoint config and
//! helpers for writing measurement log lines.

use std::io::Write;
use std::path::{Path, PathBuf};

use locus_analyzer::StateOptions;

/// nyc / lon / fra, all with coordinates; two samples expected per burst.
pub const CONFIG_JSON: &str = r#"{
  "endpoints": [
    { "id": "nyc", "host": "1.2.3.4", "port": 9000, "regionHint": "us-east", "lat": 40.7, "lon": -74.0 },
    { "id": "lon", "host": "5.6.7.8", "port": 9000, "regionHint": "eu-west", "lat": 51.5, "lon": -0.1 },
    { "id": "fra", "host": "9.9.9.9", "port": 9000, "regionHint": "eu-central", "lat": 50.1, "lon": 8.7 }
  ],
  "samplesPerEndpoint": 2
}"#;

pub fn write_config(dir: &Path) -> PathBuf {
    let path = dir.join("config.json");
    std::fs::write(&path, CONFIG_JSON).unwrap();
    path
}

pub fn record_line(ts: i64, endpoint_id: &str, samples: &[f64]) -> String {
    let vals: Vec<String> = samples.iter().map(|v| v.to_string()).collect();
    format!(
        r#"{{"tsUnixMs":{ts},"endpointId":"{endpoint_id}","samplesMs":[{}]}}"#,
        vals.join(",")
    )
}

pub fn append_lines(path: &Path, lines: &[String]) {
    let mut f = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    for line in lines {
        writeln!(f, "{line}").unwrap();
    }
}

/// Options with the estimate cache disabled so every snapshot recomputes,
/// which keeps split-read comparisons meaningful.
pub fn base_options(dir: &Path) -> StateOptions {
    let config_path = write_config(dir);
    let log_path = dir.join("measurements.jsonl");
    let mut opts = StateOptions::new(config_path, log_path);
    opts.estimate_interval_ms = 0;
    opts.auto_baseline_minutes = 0;
    opts
}
