//! Tail follower for the append-only measurement log.
//!
//! Each poll re-stats the file and reads only the bytes past the last
//! offset, so any byte range is ingested at most once. Rotation (inode
//! change) and truncation (size below offset) reset the offset to zero and
//! tell the caller to drop derived state; the reset reason stays visible to
//! snapshot readers until the notice window expires.
//!
//! Malformed lines and records with missing/invalid required fields are
//! skipped silently: the probe keeps writing, the analyzer keeps reading.

use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::constants::LOG_RESET_NOTICE_MS;

pub const RESET_ROTATED: &str = "rotated";
pub const RESET_TRUNCATED: &str = "truncated";

/// One successfully parsed log line.
#[derive(Debug, Clone)]
pub struct ParsedRecord {
    /// The raw line, kept for auto-baseline persistence.
    pub raw: String,
    pub ts_unix_ms: i64,
    pub endpoint_id: String,
    /// Numeric entries of `samplesMs`, unfiltered.
    pub samples_ms: Vec<f64>,
    /// Raw length of the `samplesMs` list (burst size, including entries
    /// later rejected as invalid).
    pub burst_len: usize,
}

#[derive(Debug, Default)]
pub struct PollOutcome {
    pub records: Vec<ParsedRecord>,
    /// Set when this poll detected rotation or truncation; the caller must
    /// drop the sample store before applying `records`.
    pub reset: Option<&'static str>,
}

#[derive(Debug)]
pub struct LogTailer {
    path: PathBuf,
    offset: u64,
    inode: Option<u64>,
    size: u64,
    missing: bool,
    error: Option<String>,
    reset_reason: Option<&'static str>,
    reset_at_ms: Option<i64>,
}

#[cfg(unix)]
fn file_ino(md: &std::fs::Metadata) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    Some(md.ino())
}

#[cfg(not(unix))]
fn file_ino(_md: &std::fs::Metadata) -> Option<u64> {
    // No inode on this platform; rotation degrades to truncation detection.
    None
}

impl LogTailer {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            offset: 0,
            inode: None,
            size: 0,
            missing: false,
            error: None,
            reset_reason: None,
            reset_at_ms: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn missing(&self) -> bool {
        self.missing
    }

    /// File size at the last poll.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn reset_reason(&self) -> Option<&'static str> {
        self.reset_reason
    }

    pub fn reset_at_ms(&self) -> Option<i64> {
        self.reset_at_ms
    }

    /// Drop the read position (operator-initiated re-ingest).
    pub fn reset_offset(&mut self) {
        self.offset = 0;
    }

    /// Clear the reset notice once it has been visible long enough.
    pub fn expire_reset_notice(&mut self, now_ms: i64) {
        if let Some(at) = self.reset_at_ms {
            if now_ms - at > LOG_RESET_NOTICE_MS {
                self.reset_reason = None;
                self.reset_at_ms = None;
            }
        }
    }

    fn mark_reset(&mut self, reason: &'static str, now_ms: i64) {
        warn!("measurement log {}: {reason}, resetting ingest state", self.path.display());
        self.offset = 0;
        self.reset_reason = Some(reason);
        self.reset_at_ms = Some(now_ms);
    }

    /// Read and parse everything appended since the previous poll.
    pub fn poll(&mut self, now_ms: i64) -> PollOutcome {
        let mut outcome = PollOutcome::default();

        let md = match std::fs::metadata(&self.path) {
            Ok(md) => md,
            Err(e) => {
                self.missing = true;
                self.error = if e.kind() == std::io::ErrorKind::NotFound {
                    None
                } else {
                    Some(e.to_string())
                };
                return outcome;
            }
        };
        self.missing = false;
        self.error = None;

        let ino = file_ino(&md);
        match (self.inode, ino) {
            (None, _) => self.inode = ino,
            (Some(prev), Some(cur)) if prev != cur => {
                self.mark_reset(RESET_ROTATED, now_ms);
                outcome.reset = Some(RESET_ROTATED);
                self.inode = Some(cur);
            }
            _ => {
                if md.len() < self.offset {
                    self.mark_reset(RESET_TRUNCATED, now_ms);
                    outcome.reset = Some(RESET_TRUNCATED);
                }
            }
        }
        self.size = md.len();

        let mut file = match std::fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) => {
                self.error = Some(e.to_string());
                return outcome;
            }
        };
        if let Err(e) = file.seek(SeekFrom::Start(self.offset)) {
            self.error = Some(e.to_string());
            return outcome;
        }
        let mut buf = Vec::new();
        match file.read_to_end(&mut buf) {
            Ok(_) => {}
            Err(e) => {
                self.error = Some(e.to_string());
                return outcome;
            }
        }
        self.offset += buf.len() as u64;

        let text = String::from_utf8_lossy(&buf);
        for line in text.lines() {
            let raw = line.trim();
            if raw.is_empty() {
                continue;
            }
            if let Some(rec) = parse_record_line(raw) {
                outcome.records.push(rec);
            }
        }
        outcome
    }
}

/// Parse one log line. Returns None for anything that is not a record with
/// an integer `tsUnixMs`, a non-empty string `endpointId`, and a list (or
/// absent) `samplesMs`. Extra fields are ignored.
pub fn parse_record_line(raw: &str) -> Option<ParsedRecord> {
    let value: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            debug!("skipping malformed log line: {e}");
            return None;
        }
    };
    let ts_unix_ms = value.get("tsUnixMs")?.as_i64()?;
    let endpoint_id = match value.get("endpointId") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        _ => return None,
    };
    let (samples_ms, burst_len) = match value.get("samplesMs") {
        None | Some(Value::Null) => (Vec::new(), 0),
        Some(Value::Array(arr)) => {
            let nums = arr.iter().filter_map(Value::as_f64).collect();
            (nums, arr.len())
        }
        Some(_) => return None,
    };
    Some(ParsedRecord {
        raw: raw.to_string(),
        ts_unix_ms,
        endpoint_id,
        samples_ms,
        burst_len,
    })
}

/// Load a whole JSONL file (baseline sets), skipping bad lines the same way
/// live ingestion does.
pub fn load_records(path: &Path) -> std::io::Result<Vec<ParsedRecord>> {
    let data = std::fs::read_to_string(path)?;
    Ok(data
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| parse_record_line(l.trim()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_record() {
        let rec = parse_record_line(r#"{"tsUnixMs":1700000000000,"endpointId":"nyc","samplesMs":[12.5,13.0]}"#)
            .unwrap();
        assert_eq!(rec.endpoint_id, "nyc");
        assert_eq!(rec.samples_ms, vec![12.5, 13.0]);
        assert_eq!(rec.burst_len, 2);
    }

    #[test]
    fn missing_samples_list_is_an_empty_burst() {
        let rec = parse_record_line(r#"{"tsUnixMs":1,"endpointId":"a"}"#).unwrap();
        assert!(rec.samples_ms.is_empty());
        assert_eq!(rec.burst_len, 0);
    }

    #[test]
    fn rejects_bad_records() {
        assert!(parse_record_line("not json").is_none());
        assert!(parse_record_line(r#"{"tsUnixMs":1.5,"endpointId":"a","samplesMs":[]}"#).is_none());
        assert!(parse_record_line(r#"{"endpointId":"a","samplesMs":[]}"#).is_none());
        assert!(parse_record_line(r#"{"tsUnixMs":1,"samplesMs":[]}"#).is_none());
        assert!(parse_record_line(r#"{"tsUnixMs":1,"endpointId":"a","samplesMs":"x"}"#).is_none());
    }

    #[test]
    fn non_numeric_entries_count_toward_burst_only() {
        let rec = parse_record_line(r#"{"tsUnixMs":1,"endpointId":"a","samplesMs":[5.0,"x",7.0]}"#)
            .unwrap();
        assert_eq!(rec.samples_ms, vec![5.0, 7.0]);
        assert_eq!(rec.burst_len, 3);
    }
}
