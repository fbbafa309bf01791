//! Integration tests: CSV layout, replay, evaluation and run manifests.
//!
//! Validates:
//! 1. Written CSV files read back with identical values.
//! 2. Legacy `time`/`risk` headers and missing required columns.
//! 3. Replay of CSV and plain traces matches a direct scheduler run.
//! 4. Fixed-vs-adaptive evaluation over real replayed data.
//! 5. Artifact index digests match file contents.
//!
//! Run: cargo test -p havfs-harness --test offline_tooling_test

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::Digest;

use havfs_core::{MetricsSnapshot, Scheduler, SchedulerConfig};
use havfs_harness::config::parse_scheduler_config;
use havfs_harness::evaluation::{EvaluationReport, ReportFormat};
use havfs_harness::record::{CycleRecord, RecordState, read_csv, write_csv};
use havfs_harness::replay::{load_trace, replay};
use havfs_harness::structured_log::ArtifactIndex;
use havfs_harness::HarnessError;

fn unique_tmp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time should be after UNIX_EPOCH")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("{prefix}-{}-{nanos}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn sha256_hex(path: &Path) -> String {
    let bytes = std::fs::read(path).expect("read artifact for sha");
    let digest = sha2::Sha256::digest(&bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn volatile_trace() -> Vec<f64> {
    let mut v = Vec::new();
    for block in 0..6 {
        v.extend(std::iter::repeat_n(12.0, 15));
        v.push(if block % 2 == 0 { 97.0 } else { 70.0 });
        v.extend(std::iter::repeat_n(60.0, 3));
    }
    v
}

fn direct_run(trace: &[f64]) -> Vec<CycleRecord> {
    let mut s = Scheduler::new(SchedulerConfig::default()).unwrap();
    let mut elapsed = 0.0;
    trace
        .iter()
        .map(|&x| {
            let snap = MetricsSnapshot::new("cpu0", x);
            let d = s.update(snap.clone());
            let r = CycleRecord::adaptive(0.0, elapsed, snap, &d);
            elapsed += d.interval;
            r
        })
        .collect()
}

#[test]
fn csv_round_trips_through_disk() {
    let dir = unique_tmp_dir("havfs-csv");
    let path = dir.join("run.csv");
    let records = direct_run(&volatile_trace());
    write_csv(std::fs::File::create(&path).unwrap(), &records, false).unwrap();

    let back = read_csv(&path).unwrap();
    assert_eq!(back.len(), records.len());
    for (a, b) in records.iter().zip(&back) {
        assert_eq!(a.metrics, b.metrics);
        assert_eq!(a.interval, b.interval);
        assert_eq!(a.risk_score, b.risk_score);
        assert_eq!(a.elapsed_time, b.elapsed_time);
        assert_eq!(a.state, b.state);
        assert!(b.explain.is_none());
    }
    assert!(back.iter().any(|r| r.state == RecordState::High));
}

#[test]
fn legacy_headers_are_accepted() {
    let dir = unique_tmp_dir("havfs-legacy");
    let path = dir.join("legacy.csv");
    std::fs::write(
        &path,
        "time,device_id,utilization,temperature,power,memory_usage,bandwidth,risk,interval,state\n\
         0.0,cpu0,12.5,50.0,30.0,41.0,0.0,0.02,5.0,LOW\n\
         5.0,cpu0,88.0,50.0,30.0,41.0,0.0,0.61,2.5,HIGH\n",
    )
    .unwrap();
    let rows = read_csv(&path).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].elapsed_time, 5.0);
    assert_eq!(rows[1].risk_score, 0.61);
    assert_eq!(rows[1].state, RecordState::High);
    assert_eq!(rows[0].metrics.memory_usage, 41.0);
    assert_eq!(rows[0].timestamp, 0.0);
}

#[test]
fn legacy_havfs_display_labels_are_accepted() {
    let dir = unique_tmp_dir("havfs-legacy-labels");
    let path = dir.join("havfs.csv");
    std::fs::write(
        &path,
        "time,device_id,utilization,temperature,power,memory_usage,bandwidth,risk,interval,state\r\n\
         0.0,cpu0,10.0,50.0,30.0,41.0,0.0,2.0,5.0,稳定(低频基准)\r\n\
         5.0,cpu0,95.0,50.0,30.0,41.0,0.0,61.0,2.5,高频(阈值触发)\r\n\
         7.5,cpu0,12.0,50.0,30.0,41.0,0.0,19.0,2.7,恢复(线性回升)\r\n",
    )
    .unwrap();
    let rows = read_csv(&path).unwrap();
    let states: Vec<RecordState> = rows.iter().map(|r| r.state).collect();
    assert_eq!(states, vec![RecordState::Low, RecordState::High, RecordState::Low]);

    // the same file feeds replay and evaluation
    let samples = load_trace(&path).unwrap();
    assert_eq!(samples.len(), 3);
    let report = EvaluationReport::compare(&rows, &rows);
    assert_eq!(report.havfs.samples, 3);
}

#[test]
fn malformed_csv_reports_location() {
    let dir = unique_tmp_dir("havfs-bad-csv");
    let missing = dir.join("missing.csv");
    std::fs::write(&missing, "timestamp,utilization\n1,2\n").unwrap();
    match read_csv(&missing) {
        Err(HarnessError::MissingColumn { column, .. }) => assert_eq!(column, "interval"),
        other => panic!("expected missing column, got {other:?}"),
    }

    let bad = dir.join("bad.csv");
    std::fs::write(&bad, "utilization,interval\n1,2\nabc,2\n").unwrap();
    match read_csv(&bad) {
        Err(HarnessError::Parse { line, .. }) => assert_eq!(line, 3),
        other => panic!("expected parse error, got {other:?}"),
    }
}

#[test]
fn replay_of_csv_matches_direct_run() {
    let dir = unique_tmp_dir("havfs-replay");
    let input = dir.join("fixed.csv");
    let trace = volatile_trace();
    let fixed: Vec<CycleRecord> = trace
        .iter()
        .enumerate()
        .map(|(i, &x)| {
            CycleRecord::fixed(1000.0 + i as f64, i as f64, MetricsSnapshot::new("cpu0", x), 1.0)
        })
        .collect();
    write_csv(std::fs::File::create(&input).unwrap(), &fixed, false).unwrap();

    let samples = load_trace(&input).unwrap();
    let out = replay(samples, SchedulerConfig::default()).unwrap();
    let direct = direct_run(&trace);
    assert_eq!(out.records.len(), direct.len());
    for (r, d) in out.records.iter().zip(&direct) {
        assert_eq!(r.interval, d.interval);
        assert_eq!(r.risk_score, d.risk_score);
        assert_eq!(r.state, d.state);
        assert_eq!(r.elapsed_time, d.elapsed_time);
    }
    assert_eq!(out.records[3].timestamp, 1003.0);
    assert!(out.stats.high_cycles > 0);
}

#[test]
fn plain_trace_replay_uses_file_stem_as_device() {
    let dir = unique_tmp_dir("havfs-plain");
    let input = dir.join("gpu7.txt");
    std::fs::write(&input, "# utilization trace\n10\n10.5\n\n95\n").unwrap();
    let samples = load_trace(&input).unwrap();
    assert_eq!(samples.len(), 3);
    assert_eq!(samples[0].snapshot.device_id, "gpu7");
    let out = replay(samples, SchedulerConfig::default()).unwrap();
    assert_eq!(out.records[2].state, RecordState::High);

    std::fs::write(&input, "10\nbusy\n").unwrap();
    assert!(matches!(load_trace(&input), Err(HarnessError::Parse { line: 2, .. })));
}

#[test]
fn replay_honors_config_file_values() {
    let cfg = parse_scheduler_config(r#"{"t_min": 1.0, "t_max": 10.0}"#).unwrap();
    let samples = load_trace_from(&[10.0; 5]);
    let out = replay(samples, cfg).unwrap();
    // target = 10 - 0.02 * 9
    assert!((out.records[4].interval - 9.82).abs() < 1e-9);
}

fn load_trace_from(values: &[f64]) -> Vec<havfs_harness::replay::TraceSample> {
    values
        .iter()
        .map(|&v| havfs_harness::replay::TraceSample {
            timestamp: 0.0,
            snapshot: MetricsSnapshot::new("cpu0", v),
        })
        .collect()
}

#[test]
fn evaluation_over_replayed_runs() {
    let trace = volatile_trace();
    let fixed: Vec<CycleRecord> = trace
        .iter()
        .enumerate()
        .map(|(i, &x)| CycleRecord::fixed(0.0, i as f64 * 2.0, MetricsSnapshot::new("cpu0", x), 2.0))
        .collect();
    // the adaptive monitor sees a subsample of the same signal
    let adaptive = direct_run(&trace.iter().copied().step_by(2).collect::<Vec<_>>());

    let report = EvaluationReport::compare(&fixed, &adaptive);
    assert_eq!(report.fixed.samples, trace.len());
    assert_eq!(report.havfs.samples, trace.len().div_ceil(2));
    assert!(report.sample_reduction_pct.unwrap() > 40.0);
    assert_eq!(report.fixed.mean_risk, Some(0.0));
    assert!(report.havfs.max_risk.unwrap() > 40.0);
    assert!(report.fixed.burst_latency_s.is_some());

    let json: serde_json::Value =
        serde_json::from_str(&report.render(ReportFormat::Json).unwrap()).unwrap();
    assert!(json["sample_reduction_pct"].is_number());
    assert!(json["havfs"]["redundancy_pct"].is_number());
}

#[test]
fn artifact_index_hashes_files() {
    let dir = unique_tmp_dir("havfs-artifacts");
    let path = dir.join("run.csv");
    std::fs::write(&path, "timestamp,utilization,interval\n0,1,2\n").unwrap();
    let mut index = ArtifactIndex::new("run-x");
    index.add_file(&path, "csv").unwrap();
    let json: serde_json::Value = serde_json::from_str(&index.to_json().unwrap()).unwrap();
    assert_eq!(json["artifacts"][0]["sha256"], sha256_hex(&path));
    assert_eq!(json["artifacts"][0]["size_bytes"], 37);
}
