//! Endpoint configuration: typed load/save plus tolerant text import.
//!
//! Operators paste endpoint sets as either JSON (an object with an
//! `endpoints` key, or a bare array) or CSV (headered `id,host,port,region,
//! lat,lon`, or positional). Rows missing id/host are skipped; everything
//! else is surfaced by `validate_endpoints` as row-numbered errors so the
//! whole set can be rejected atomically.

use std::net::IpAddr;
use std::path::Path;

use anyhow::Context;
use locus_types::{ConfigDoc, Endpoint, ProbePath};
use serde_json::Value;
use thiserror::Error;

use crate::constants::{DEFAULT_PORT, WORLD_LAT_MAX, WORLD_LON_MAX};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("{0}")]
    Invalid(String),
}

pub fn load_config(path: &Path) -> anyhow::Result<ConfigDoc> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let cfg = serde_json::from_str(&data)
        .with_context(|| format!("parsing config {}", path.display()))?;
    Ok(cfg)
}

pub fn save_config(path: &Path, cfg: &ConfigDoc) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(cfg)?;
    std::fs::write(path, json)
        .with_context(|| format!("writing config {}", path.display()))?;
    Ok(())
}

// ── Field helpers ─────────────────────────────────────────────────────────────

fn string_field(v: &Value, key: &str) -> String {
    match v.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn float_field(v: &Value, key: &str) -> Result<Option<f64>, ConfigError> {
    match v.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) => {
            let s = s.trim();
            if s.is_empty() {
                return Ok(None);
            }
            s.parse::<f64>()
                .map(Some)
                .map_err(|_| ConfigError::Invalid(format!("invalid number for {key}: {s}")))
        }
        Some(other) => Err(ConfigError::Invalid(format!(
            "invalid value for {key}: {other}"
        ))),
    }
}

fn parse_port_str(raw: &str, default_port: u32) -> Result<u32, ConfigError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(default_port);
    }
    raw.parse::<u32>()
        .map_err(|_| ConfigError::Invalid(format!("invalid port {raw}")))
}

fn parse_float_cell(raw: &str, what: &str) -> Result<Option<f64>, ConfigError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<f64>()
        .map(Some)
        .map_err(|_| ConfigError::Invalid(format!("invalid {what} {raw}")))
}

// ── Endpoint import ───────────────────────────────────────────────────────────

/// Parse an endpoint set from pasted JSON or CSV text.
pub fn parse_endpoints_text(text: &str) -> Result<Vec<Endpoint>, ConfigError> {
    parse_endpoints_text_with_port(text, DEFAULT_PORT)
}

pub fn parse_endpoints_text_with_port(
    text: &str,
    default_port: u32,
) -> Result<Vec<Endpoint>, ConfigError> {
    let raw = text.trim();
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    if raw.starts_with('[') || raw.starts_with('{') {
        return parse_endpoints_json(raw, default_port);
    }
    parse_endpoints_csv(raw, default_port)
}

fn parse_endpoints_json(raw: &str, default_port: u32) -> Result<Vec<Endpoint>, ConfigError> {
    let data: Value = serde_json::from_str(raw)?;
    let items = match &data {
        Value::Object(map) => match map.get("endpoints") {
            Some(Value::Array(arr)) => arr.clone(),
            None | Some(Value::Null) => Vec::new(),
            Some(_) => {
                return Err(ConfigError::Invalid(
                    "Invalid JSON payload for endpoints".into(),
                ))
            }
        },
        Value::Array(arr) => arr.clone(),
        _ => {
            return Err(ConfigError::Invalid(
                "Invalid JSON payload for endpoints".into(),
            ))
        }
    };

    let mut out = Vec::new();
    for item in &items {
        if !item.is_object() {
            continue;
        }
        let id = string_field(item, "id");
        let host = string_field(item, "host");
        if id.is_empty() || host.is_empty() {
            continue;
        }
        let port = match item.get("port") {
            None | Some(Value::Null) => default_port,
            Some(Value::Number(n)) => {
                let p = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64));
                match p {
                    Some(0) => default_port,
                    Some(p) if p > 0 && p <= u32::MAX as i64 => p as u32,
                    _ => {
                        return Err(ConfigError::Invalid(format!("invalid port {n}")));
                    }
                }
            }
            Some(Value::String(s)) => parse_port_str(s, default_port)?,
            Some(other) => {
                return Err(ConfigError::Invalid(format!("invalid port {other}")));
            }
        };
        let region = {
            let r = string_field(item, "regionHint");
            if r.is_empty() {
                string_field(item, "region")
            } else {
                r
            }
        };
        out.push(Endpoint {
            id,
            host,
            port,
            region_hint: if region.is_empty() { None } else { Some(region) },
            lat: float_field(item, "lat")?,
            lon: float_field(item, "lon")?,
        });
    }
    Ok(out)
}

fn parse_endpoints_csv(raw: &str, default_port: u32) -> Result<Vec<Endpoint>, ConfigError> {
    let lines: Vec<&str> = raw.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return Ok(Vec::new());
    }
    let first = lines[0].to_lowercase();
    let has_header = first.contains("id") && first.contains("host");
    let joined = lines.join("\n");

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(has_header)
        .flexible(true)
        .from_reader(joined.as_bytes());

    let mut out = Vec::new();
    if has_header {
        let headers = reader.headers()?.clone();
        let col = |name: &str| headers.iter().position(|h| h.trim() == name);
        let (id_col, host_col) = match (col("id"), col("host")) {
            (Some(i), Some(h)) => (i, h),
            _ => return Ok(Vec::new()),
        };
        let port_col = col("port");
        let region_col = col("region").or_else(|| col("regionHint"));
        let lat_col = col("lat");
        let lon_col = col("lon");

        for record in reader.records() {
            let record = record?;
            let cell = |idx: Option<usize>| idx.and_then(|i| record.get(i)).unwrap_or("");
            let id = cell(Some(id_col)).trim().to_string();
            let host = cell(Some(host_col)).trim().to_string();
            if id.is_empty() || host.is_empty() {
                continue;
            }
            let region = cell(region_col).trim().to_string();
            out.push(Endpoint {
                id,
                host,
                port: parse_port_str(cell(port_col), default_port)?,
                region_hint: if region.is_empty() { None } else { Some(region) },
                lat: parse_float_cell(cell(lat_col), "lat")?,
                lon: parse_float_cell(cell(lon_col), "lon")?,
            });
        }
        return Ok(out);
    }

    // Positional: id,host,port,region,lat,lon
    for record in reader.records() {
        let record = record?;
        if record.len() < 2 {
            continue;
        }
        let id = record.get(0).unwrap_or("").trim().to_string();
        let host = record.get(1).unwrap_or("").trim().to_string();
        if id.is_empty() || host.is_empty() {
            continue;
        }
        let region = record.get(3).unwrap_or("").trim().to_string();
        out.push(Endpoint {
            id,
            host,
            port: parse_port_str(record.get(2).unwrap_or(""), default_port)?,
            region_hint: if region.is_empty() { None } else { Some(region) },
            lat: parse_float_cell(record.get(4).unwrap_or(""), "lat")?,
            lon: parse_float_cell(record.get(5).unwrap_or(""), "lon")?,
        });
    }
    Ok(out)
}

// ── Probe-path import ─────────────────────────────────────────────────────────

pub fn parse_probe_paths_text(text: &str) -> Result<Vec<ProbePath>, ConfigError> {
    let raw = text.trim();
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    if raw.starts_with('[') || raw.starts_with('{') {
        let data: Value = serde_json::from_str(raw)?;
        let items = match &data {
            Value::Object(map) => match map.get("probePaths") {
                Some(Value::Array(arr)) => arr.clone(),
                None | Some(Value::Null) => Vec::new(),
                Some(_) => {
                    return Err(ConfigError::Invalid(
                        "Invalid JSON payload for probePaths".into(),
                    ))
                }
            },
            Value::Array(arr) => arr.clone(),
            _ => {
                return Err(ConfigError::Invalid(
                    "Invalid JSON payload for probePaths".into(),
                ))
            }
        };
        let mut out = Vec::new();
        for item in &items {
            if !item.is_object() {
                continue;
            }
            let id = string_field(item, "id");
            if id.is_empty() {
                continue;
            }
            let iface = string_field(item, "bindInterface");
            let ip = string_field(item, "bindIp");
            out.push(ProbePath {
                id,
                bind_interface: if iface.is_empty() { None } else { Some(iface) },
                bind_ip: if ip.is_empty() { None } else { Some(ip) },
            });
        }
        return Ok(out);
    }

    let lines: Vec<&str> = raw.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return Ok(Vec::new());
    }
    let has_header = lines[0].to_lowercase().contains("id");
    let joined = lines.join("\n");
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(has_header)
        .flexible(true)
        .from_reader(joined.as_bytes());

    let mut out = Vec::new();
    if has_header {
        let headers = reader.headers()?.clone();
        let col = |name: &str| headers.iter().position(|h| h.trim() == name);
        let id_col = match col("id") {
            Some(i) => i,
            None => return Ok(Vec::new()),
        };
        let iface_col = col("bindInterface").or_else(|| col("bind_interface"));
        let ip_col = col("bindIp").or_else(|| col("bind_ip"));
        for record in reader.records() {
            let record = record?;
            let cell = |idx: Option<usize>| idx.and_then(|i| record.get(i)).unwrap_or("");
            let id = cell(Some(id_col)).trim().to_string();
            if id.is_empty() {
                continue;
            }
            let iface = cell(iface_col).trim().to_string();
            let ip = cell(ip_col).trim().to_string();
            out.push(ProbePath {
                id,
                bind_interface: if iface.is_empty() { None } else { Some(iface) },
                bind_ip: if ip.is_empty() { None } else { Some(ip) },
            });
        }
        return Ok(out);
    }

    for record in reader.records() {
        let record = record?;
        let id = record.get(0).unwrap_or("").trim().to_string();
        if id.is_empty() {
            continue;
        }
        let iface = record.get(1).unwrap_or("").trim().to_string();
        let ip = record.get(2).unwrap_or("").trim().to_string();
        out.push(ProbePath {
            id,
            bind_interface: if iface.is_empty() { None } else { Some(iface) },
            bind_ip: if ip.is_empty() { None } else { Some(ip) },
        });
    }
    Ok(out)
}

// ── Validation ────────────────────────────────────────────────────────────────

/// Row-numbered validation errors; an empty result means the set is usable.
pub fn validate_endpoints(endpoints: &[Endpoint]) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for (idx, ep) in endpoints.iter().enumerate() {
        let row = idx + 1;
        if ep.id.is_empty() {
            errors.push(format!("Row {row}: missing id"));
        }
        if ep.host.is_empty() {
            errors.push(format!("Row {row}: missing host"));
        }
        if !seen.insert(ep.id.clone()) {
            errors.push(format!("Row {row}: duplicate id {}", ep.id));
        }
        if ep.port == 0 || ep.port > 65535 {
            errors.push(format!("Row {row}: invalid port {}", ep.port));
        }
        if let Some(lat) = ep.lat {
            if !(-WORLD_LAT_MAX..=WORLD_LAT_MAX).contains(&lat) {
                errors.push(format!("Row {row}: invalid lat {lat}"));
            }
        }
        if let Some(lon) = ep.lon {
            if !(-WORLD_LON_MAX..=WORLD_LON_MAX).contains(&lon) {
                errors.push(format!("Row {row}: invalid lon {lon}"));
            }
        }
    }
    errors
}

pub fn validate_probe_paths(paths: &[ProbePath]) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for (idx, p) in paths.iter().enumerate() {
        let row = idx + 1;
        if p.id.is_empty() {
            errors.push(format!("Path {row}: missing id"));
        }
        if !seen.insert(p.id.clone()) {
            errors.push(format!("Path {row}: duplicate id {}", p.id));
        }
        if let Some(ip) = &p.bind_ip {
            if ip.parse::<IpAddr>().is_err() {
                errors.push(format!("Path {row}: invalid bindIp {ip}"));
            }
        }
    }
    errors
}
