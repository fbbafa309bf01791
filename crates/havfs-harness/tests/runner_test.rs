//! Integration tests: experiment runner on simulated time.
//!
//! Validates:
//! 1. Fixed mode samples at the fixed cadence and records `FIXED` rows.
//! 2. Adaptive mode records scheduler decisions and stops when the trace ends.
//! 3. Spikes produce HIGH rows, buffered snapshots and a valid decision log.
//! 4. Shutdown, cycle caps and failing reporters are handled without aborting.
//! 5. Overhead columns appear only when measurement is enabled.
//!
//! Run: cargo test -p havfs-harness --test runner_test

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use havfs_core::SchedulerConfig;
use havfs_harness::collector::{SimulatedGpuCollector, TraceCollector};
use havfs_harness::record::{CycleRecord, RecordState, read_csv};
use havfs_harness::reporter::{CsvReporter, DecisionLogReporter, Reporter, SharedEmitter};
use havfs_harness::structured_log::{LogEmitter, Outcome, validate_log_str};
use havfs_harness::{
    Clock, ExperimentRunner, ManualClock, ReportError, SamplingMode, ShutdownSignal, SystemClock,
};

fn unique_tmp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time should be after UNIX_EPOCH")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("{prefix}-{}-{nanos}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn csv_reporter(path: &PathBuf, with_overhead: bool) -> Box<dyn Reporter> {
    Box::new(CsvReporter::create(path, with_overhead).expect("create csv"))
}

struct FailingReporter {
    calls: Arc<Mutex<u32>>,
}

impl Reporter for FailingReporter {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn report(&mut self, _record: &CycleRecord) -> Result<(), ReportError> {
        *self.calls.lock() += 1;
        Err(ReportError::Serialize {
            reporter: "failing",
            message: "sink unavailable".to_string(),
        })
    }
}

#[test]
fn fixed_mode_samples_at_fixed_cadence() {
    let dir = unique_tmp_dir("havfs-runner-fixed");
    let csv = dir.join("fixed.csv");
    let mut reporters = vec![csv_reporter(&csv, false)];
    let mut collector = SimulatedGpuCollector::new("gpu0", 11);
    let clock = ManualClock::new(1_700_000_000.0);

    let mut runner = ExperimentRunner::new(
        "run-fixed",
        SamplingMode::Fixed { interval: 2.0 },
        SchedulerConfig::default(),
        10.0,
    )
    .unwrap();
    let summary = runner
        .run(&mut collector, &mut reporters, &clock, &ShutdownSignal::new())
        .unwrap();
    drop(reporters);

    assert_eq!(summary.cycles, 5);
    assert_eq!(summary.high_cycles, 0);
    assert_eq!(summary.mean_interval, 2.0);
    assert_eq!(summary.outcome, Outcome::Completed);
    assert_eq!(summary.mode, "fixed");
    assert!(runner.scheduler().is_none());

    let rows = read_csv(&csv).unwrap();
    assert_eq!(rows.len(), 5);
    let elapsed: Vec<f64> = rows.iter().map(|r| r.elapsed_time).collect();
    assert_eq!(elapsed, vec![0.0, 2.0, 4.0, 6.0, 8.0]);
    assert!(rows.iter().all(|r| r.state == RecordState::Fixed && r.risk_score == 0.0));
    assert_eq!(rows[0].timestamp, 1_700_000_000.0);
    assert!(rows.iter().all(|r| r.overhead.is_none()));
}

#[test]
fn adaptive_mode_stops_when_trace_is_exhausted() {
    let dir = unique_tmp_dir("havfs-runner-adaptive");
    let csv = dir.join("havfs.csv");
    let mut reporters = vec![csv_reporter(&csv, false)];
    let mut collector = TraceCollector::from_utilization("cpu0", &[10.0; 8]);
    let clock = ManualClock::new(0.0);

    let mut runner =
        ExperimentRunner::new("run-a", SamplingMode::Adaptive, SchedulerConfig::default(), 1e9)
            .unwrap();
    let summary = runner
        .run(&mut collector, &mut reporters, &clock, &ShutdownSignal::new())
        .unwrap();
    drop(reporters);

    assert_eq!(summary.cycles, 8);
    assert_eq!(summary.high_cycles, 0);
    assert!((summary.mean_interval - 4.91).abs() < 1e-9);
    assert!((clock.elapsed() - 8.0 * 4.91).abs() < 1e-9);

    let rows = read_csv(&csv).unwrap();
    assert_eq!(rows.len(), 8);
    for row in &rows {
        assert_eq!(row.state, RecordState::Low);
        assert!((row.risk_score - 2.0).abs() < 1e-9);
        assert!((row.interval - 4.91).abs() < 1e-9);
    }
}

#[test]
fn spike_is_logged_buffered_and_recovered_from() {
    let mut trace = vec![10.0; 20];
    trace.push(95.0);
    trace.extend(std::iter::repeat_n(10.0, 60));

    let emitter: SharedEmitter = Arc::new(Mutex::new(LogEmitter::to_buffer("run-spike")));
    let mut reporters: Vec<Box<dyn Reporter>> = vec![Box::new(DecisionLogReporter::new(
        Arc::clone(&emitter),
        "havfs",
    ))];
    let mut collector = TraceCollector::from_utilization("cpu0", &trace);
    let clock = ManualClock::new(0.0);

    let mut runner =
        ExperimentRunner::new("run-spike", SamplingMode::Adaptive, SchedulerConfig::default(), 1e9)
            .unwrap()
            .with_log(Arc::clone(&emitter))
            .with_artifacts(vec!["out/spike.csv".to_string()]);
    let summary = runner
        .run(&mut collector, &mut reporters, &clock, &ShutdownSignal::new())
        .unwrap();

    assert_eq!(summary.cycles, trace.len() as u64);
    assert!(summary.high_cycles >= 1);
    assert!(summary.buffered_high_risk >= 1);
    assert_eq!(summary.min_interval.map(|m| m < 4.91), Some(true));
    let scheduler = runner.scheduler().unwrap();
    assert_eq!(scheduler.stats().transitions, 2);

    let guard = emitter.lock();
    let text = std::str::from_utf8(guard.buffer_contents().unwrap()).unwrap();
    let (lines, errors) = validate_log_str(text);
    assert!(errors.is_empty(), "{errors:?}");
    // start + end + one decision per cycle + two transitions
    assert_eq!(lines, trace.len() + 4);
    assert!(text.lines().next().unwrap().contains("\"experiment_start\""));
    let end: serde_json::Value = serde_json::from_str(text.lines().last().unwrap()).unwrap();
    assert_eq!(end["event"], "experiment_end");
    assert_eq!(end["artifact_refs"][0], "out/spike.csv");
    assert_eq!(text.matches("\"regime_transition\"").count(), 2);
    assert!(text.contains("\"threshold_triggered\""));
}

#[test]
fn pre_triggered_shutdown_runs_no_cycles() {
    let shutdown = ShutdownSignal::new();
    shutdown.trigger();
    let mut collector = TraceCollector::from_utilization("cpu0", &[10.0; 4]);
    let mut runner =
        ExperimentRunner::new("run-c", SamplingMode::Adaptive, SchedulerConfig::default(), 60.0)
            .unwrap();
    let summary = runner
        .run(&mut collector, &mut [], &ManualClock::new(0.0), &shutdown)
        .unwrap();
    assert_eq!(summary.cycles, 0);
    assert_eq!(summary.mean_interval, 0.0);
    assert_eq!(summary.outcome, Outcome::Cancelled);
}

#[test]
fn cycle_cap_limits_the_run() {
    let mut collector = SimulatedGpuCollector::new("gpu0", 3);
    let mut runner = ExperimentRunner::new(
        "run-cap",
        SamplingMode::Adaptive,
        SchedulerConfig::default(),
        1e9,
    )
    .unwrap()
    .with_max_cycles(25);
    let summary = runner
        .run(&mut collector, &mut [], &ManualClock::new(0.0), &ShutdownSignal::new())
        .unwrap();
    assert_eq!(summary.cycles, 25);
    assert!(summary.min_interval.unwrap() >= 0.5);
    assert!(summary.max_interval.unwrap() <= 5.0);
}

#[test]
fn failing_reporter_does_not_stop_the_run() {
    let dir = unique_tmp_dir("havfs-runner-failing");
    let csv = dir.join("out.csv");
    let calls = Arc::new(Mutex::new(0));
    let emitter: SharedEmitter = Arc::new(Mutex::new(LogEmitter::to_buffer("run-f")));
    let mut reporters: Vec<Box<dyn Reporter>> = vec![
        Box::new(FailingReporter {
            calls: Arc::clone(&calls),
        }),
        csv_reporter(&csv, false),
    ];
    let mut collector = TraceCollector::from_utilization("cpu0", &[5.0, 6.0, 7.0]);
    let mut runner =
        ExperimentRunner::new("run-f", SamplingMode::Adaptive, SchedulerConfig::default(), 1e9)
            .unwrap()
            .with_log(Arc::clone(&emitter));
    let summary = runner
        .run(&mut collector, &mut reporters, &ManualClock::new(0.0), &ShutdownSignal::new())
        .unwrap();
    drop(reporters);

    assert_eq!(summary.cycles, 3);
    assert_eq!(summary.reporter_errors, 3);
    assert_eq!(*calls.lock(), 3);
    assert_eq!(read_csv(&csv).unwrap().len(), 3);

    let guard = emitter.lock();
    let text = std::str::from_utf8(guard.buffer_contents().unwrap()).unwrap();
    assert_eq!(text.matches("\"reporter_error\"").count(), 3);
    assert!(validate_log_str(text).1.is_empty());
}

#[test]
fn overhead_columns_follow_measurement_flag() {
    let dir = unique_tmp_dir("havfs-runner-overhead");
    let csv = dir.join("overhead.csv");
    let mut reporters = vec![csv_reporter(&csv, true)];
    let mut collector = TraceCollector::from_utilization("cpu0", &[10.0, 20.0, 30.0]);
    let mut runner =
        ExperimentRunner::new("run-o", SamplingMode::Adaptive, SchedulerConfig::default(), 1e9)
            .unwrap()
            .with_overhead_measurement(true);
    runner
        .run(&mut collector, &mut reporters, &ManualClock::new(0.0), &ShutdownSignal::new())
        .unwrap();
    drop(reporters);

    let text = std::fs::read_to_string(&csv).unwrap();
    assert!(text.lines().next().unwrap().ends_with(",state,overhead_cpu,overhead_mem_mb"));
    let rows = read_csv(&csv).unwrap();
    assert_eq!(rows.len(), 3);
    for row in rows {
        let o = row.overhead.expect("overhead present");
        assert!(o.cpu_percent >= 0.0);
        assert!(o.mem_mb > 0.0);
    }
}

#[test]
fn overhead_window_includes_the_sleep() {
    let dir = unique_tmp_dir("havfs-runner-overhead-real");
    let csv = dir.join("overhead.csv");
    let mut reporters = vec![csv_reporter(&csv, true)];
    let mut collector = TraceCollector::from_utilization("cpu0", &[10.0; 4]);
    let mut runner = ExperimentRunner::new(
        "run-or",
        SamplingMode::Fixed { interval: 0.1 },
        SchedulerConfig::default(),
        60.0,
    )
    .unwrap()
    .with_overhead_measurement(true);
    runner
        .run(&mut collector, &mut reporters, &SystemClock::new(), &ShutdownSignal::new())
        .unwrap();
    drop(reporters);

    let rows = read_csv(&csv).unwrap();
    assert_eq!(rows.len(), 4);
    // first reading has no window yet
    assert_eq!(rows[0].overhead.unwrap().cpu_percent, 0.0);
    for row in &rows[1..] {
        let o = row.overhead.unwrap();
        // one cycle is mostly sleep, so the monitor is far from CPU-bound
        assert!(o.cpu_percent < 90.0, "{}", o.cpu_percent);
    }
}
