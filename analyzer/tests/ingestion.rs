//! Tail-follower lifecycle against real files: at-most-once ingestion,
//! rotation/truncation recovery, window trimming, and auto-baseline capture.

mod common;

use common::{append_lines, base_options, record_line};
use locus_analyzer::constants::LOG_RESET_NOTICE_MS;
use locus_analyzer::log_tail::LogTailer;
use locus_analyzer::state::now_ms;
use locus_analyzer::StateManager;
use tempfile::tempdir;

#[tokio::test]
async fn split_reads_equal_whole_read() {
    let dir = tempdir().unwrap();
    let opts = base_options(dir.path());
    let log = opts.log_path.clone();
    let ts = now_ms();

    let lines = vec![
        record_line(ts, "nyc", &[12.0, 13.5]),
        record_line(ts, "lon", &[30.0, 31.0]),
        record_line(ts + 1000, "nyc", &[12.5]),
        record_line(ts + 1000, "fra", &[41.0, 40.0]),
    ];

    // Manager A ingests in two reads.
    let a = StateManager::new(opts.clone()).unwrap();
    append_lines(&log, &lines[..2]);
    let _ = a.snapshot().await;
    append_lines(&log, &lines[2..]);
    let split = a.snapshot().await;

    // Manager B ingests the whole log at once.
    let b = StateManager::new(opts).unwrap();
    let whole = b.snapshot().await;

    assert_eq!(
        serde_json::to_value(&split.endpoints).unwrap(),
        serde_json::to_value(&whole.endpoints).unwrap()
    );
    assert_eq!(
        serde_json::to_value(&split.health).unwrap(),
        serde_json::to_value(&whole.health).unwrap()
    );
}

#[tokio::test]
async fn malformed_lines_and_invalid_samples_are_skipped() {
    let dir = tempdir().unwrap();
    let opts = base_options(dir.path());
    let log = opts.log_path.clone();
    let ts = now_ms();

    append_lines(
        &log,
        &[
            "not json at all".to_string(),
            r#"{"endpointId":"nyc","samplesMs":[1.0]}"#.to_string(),
            format!(r#"{{"tsUnixMs":{ts},"endpointId":"nyc","samplesMs":"oops"}}"#),
            format!(r#"{{"tsUnixMs":{ts},"endpointId":"nyc","samplesMs":[-5.0,7.0,"x"]}}"#),
        ],
    );

    let manager = StateManager::new(opts).unwrap();
    let snap = manager.snapshot().await;

    // Only the last line is a record; of its burst of 3, only 7.0 is valid.
    assert_eq!(snap.endpoints.len(), 1);
    assert_eq!(snap.endpoints[0].count, 1);
    assert_eq!(snap.endpoints[0].p50_ms, 7.0);
    assert_eq!(snap.health.len(), 1);
    assert_eq!(snap.health[0].burst_count, 1);
    assert_eq!(snap.health[0].sample_count, 3);
}

#[tokio::test]
async fn truncation_resets_the_store() {
    let dir = tempdir().unwrap();
    let opts = base_options(dir.path());
    let log = opts.log_path.clone();
    let ts = now_ms();

    append_lines(
        &log,
        &[
            record_line(ts, "nyc", &[10.0]),
            record_line(ts, "lon", &[20.0]),
            record_line(ts, "fra", &[30.0]),
        ],
    );
    let manager = StateManager::new(opts).unwrap();
    let snap = manager.snapshot().await;
    assert_eq!(snap.endpoints.len(), 3);
    assert!(snap.log_status.reset_reason.is_none());

    // Rewrite in place with less content: size < offset.
    std::fs::write(&log, format!("{}\n", record_line(ts, "nyc", &[11.0]))).unwrap();
    let snap = manager.snapshot().await;
    assert_eq!(snap.log_status.reset_reason.as_deref(), Some("truncated"));
    assert!(snap.log_status.reset_at_ms.is_some());
    assert_eq!(snap.endpoints.len(), 1);
    assert_eq!(snap.endpoints[0].p50_ms, 11.0);
}

#[cfg(unix)]
#[tokio::test]
async fn rotation_resets_the_store() {
    let dir = tempdir().unwrap();
    let opts = base_options(dir.path());
    let log = opts.log_path.clone();
    let ts = now_ms();

    append_lines(&log, &[record_line(ts, "nyc", &[10.0])]);
    let manager = StateManager::new(opts).unwrap();
    let _ = manager.snapshot().await;

    // Replace the file wholesale: new inode, fresh content.
    let staged = dir.path().join("rotated.jsonl");
    append_lines(&staged, &[record_line(ts, "lon", &[25.0])]);
    std::fs::rename(&staged, &log).unwrap();

    let snap = manager.snapshot().await;
    assert_eq!(snap.log_status.reset_reason.as_deref(), Some("rotated"));
    assert_eq!(snap.endpoints.len(), 1);
    assert_eq!(snap.endpoints[0].id, "lon");
}

#[tokio::test]
async fn missing_log_is_tolerated_and_recovers() {
    let dir = tempdir().unwrap();
    let opts = base_options(dir.path());
    let log = opts.log_path.clone();

    let manager = StateManager::new(opts).unwrap();
    let snap = manager.snapshot().await;
    assert!(snap.log_status.missing);
    assert!(snap.endpoints.is_empty());

    append_lines(&log, &[record_line(now_ms(), "nyc", &[9.0])]);
    let snap = manager.snapshot().await;
    assert!(!snap.log_status.missing);
    assert_eq!(snap.endpoints.len(), 1);
}

#[tokio::test]
async fn window_trimming_drops_old_samples() {
    let dir = tempdir().unwrap();
    let opts = base_options(dir.path());
    let log = opts.log_path.clone();
    let ts = now_ms();
    let stale = ts - (opts.window_minutes + 1) * 60_000;

    append_lines(
        &log,
        &[
            record_line(stale, "nyc", &[99.0]),
            record_line(ts, "nyc", &[10.0]),
        ],
    );
    let manager = StateManager::new(opts).unwrap();
    let snap = manager.snapshot().await;
    assert_eq!(snap.endpoints.len(), 1);
    assert_eq!(snap.endpoints[0].count, 1);
    assert_eq!(snap.endpoints[0].p50_ms, 10.0);
    // Burst meta is trimmed too.
    assert_eq!(snap.health[0].burst_count, 1);
}

#[tokio::test]
async fn empty_bursts_count_toward_loss() {
    let dir = tempdir().unwrap();
    let opts = base_options(dir.path());
    let log = opts.log_path.clone();
    let ts = now_ms();

    append_lines(
        &log,
        &[
            record_line(ts, "nyc", &[10.0, 11.0]),
            // A burst that delivered nothing: samplesMs omitted entirely.
            format!(r#"{{"tsUnixMs":{},"endpointId":"nyc"}}"#, ts + 500),
        ],
    );
    let manager = StateManager::new(opts).unwrap();
    let snap = manager.snapshot().await;

    let health = &snap.health[0];
    assert_eq!(health.burst_count, 2);
    assert_eq!(health.sample_count, 2);
    // samplesPerEndpoint = 2 -> expected 4, lost half.
    assert_eq!(health.expected_samples, Some(4));
    assert_eq!(health.loss_pct, Some(50.0));
    assert_eq!(health.last_seen_ms, Some(ts + 500));
}

#[tokio::test]
async fn auto_baseline_captures_and_persists() {
    let dir = tempdir().unwrap();
    let mut opts = base_options(dir.path());
    opts.auto_baseline_minutes = 1;
    opts.auto_baseline_out = Some(dir.path().join("baseline.jsonl"));
    let log = opts.log_path.clone();

    // Records old enough that the capture window has already closed.
    let ts = now_ms() - 10 * 60_000;
    let lines = vec![
        record_line(ts, "nyc", &[12.0, 12.5]),
        record_line(ts + 30_000, "lon", &[30.0]),
    ];
    append_lines(&log, &lines);

    let manager = StateManager::new(opts).unwrap();
    let snap = manager.snapshot().await;

    let auto = snap.auto_baseline.expect("auto baseline enabled");
    assert!(auto.complete);
    assert_eq!(auto.start_ms, Some(ts));
    assert_eq!(auto.end_ms, Some(ts + 60_000));

    let baseline = snap.baseline.expect("baseline block present");
    assert_eq!(baseline.endpoints.len(), 2);

    let persisted = std::fs::read_to_string(dir.path().join("baseline.jsonl")).unwrap();
    let persisted_lines: Vec<&str> = persisted.lines().collect();
    assert_eq!(persisted_lines, lines.iter().map(String::as_str).collect::<Vec<_>>());
}

#[tokio::test]
async fn session_marking_restricts_stats_to_newer_samples() {
    let dir = tempdir().unwrap();
    let opts = base_options(dir.path());
    let log = opts.log_path.clone();

    append_lines(&log, &[record_line(now_ms() - 5_000, "nyc", &[50.0])]);
    let manager = StateManager::new(opts).unwrap();
    let snap = manager.snapshot().await;
    assert!(snap.session.is_none());
    assert_eq!(snap.endpoints[0].count, 1);

    let start = manager.mark_session().await;
    append_lines(&log, &[record_line(now_ms(), "nyc", &[10.0])]);
    let snap = manager.snapshot().await;
    assert_eq!(snap.session.map(|s| s.start_ms), Some(start));
    // The pre-session sample is still stored but filtered out of stats.
    assert_eq!(snap.endpoints[0].count, 1);
    assert_eq!(snap.endpoints[0].p50_ms, 10.0);
}

#[tokio::test]
async fn endpoint_replacement_validates_before_writing() {
    let dir = tempdir().unwrap();
    let opts = base_options(dir.path());
    let config_path = opts.config_path.clone();
    let manager = StateManager::new(opts).unwrap();

    let dup = locus_analyzer::config::parse_endpoints_text("id,host,port\na,h1,9000\na,h2,9000\n")
        .unwrap();
    let err = manager.replace_endpoints(dup, None).await.unwrap_err();
    assert!(err.to_string().contains("duplicate id a"));
    // Rejected atomically: the config file still holds the original set.
    let on_disk = locus_analyzer::config::load_config(&config_path).unwrap();
    assert_eq!(on_disk.endpoints.len(), 3);

    let fresh =
        locus_analyzer::config::parse_endpoints_text("id,host,port\nx,10.0.0.1,9000\n").unwrap();
    manager.replace_endpoints(fresh, None).await.unwrap();
    let snap = manager.snapshot().await;
    assert_eq!(snap.hygiene.missing_coords, vec!["x".to_string()]);
    let on_disk = locus_analyzer::config::load_config(&config_path).unwrap();
    assert_eq!(on_disk.endpoints.len(), 1);
    // Unrelated config keys survive the rewrite.
    assert_eq!(on_disk.samples_per_endpoint, 2);
}

#[test]
fn reset_notice_expires_after_the_window() {
    let dir = tempdir().unwrap();
    let log = dir.path().join("m.jsonl");
    append_lines(&log, &[record_line(1, "nyc", &[1.0]), record_line(2, "nyc", &[2.0])]);

    let mut tail = LogTailer::new(log.clone());
    let now = now_ms();
    let _ = tail.poll(now);
    std::fs::write(&log, "").unwrap();
    let outcome = tail.poll(now);
    assert_eq!(outcome.reset, Some("truncated"));
    assert_eq!(tail.reset_reason(), Some("truncated"));

    tail.expire_reset_notice(now + LOG_RESET_NOTICE_MS / 2);
    assert!(tail.reset_reason().is_some());
    tail.expire_reset_notice(now + LOG_RESET_NOTICE_MS + 1);
    assert!(tail.reset_reason().is_none());
    assert!(tail.reset_at_ms().is_none());
}
