//! Offline replay of a recorded trace through a fresh scheduler.
//!
//! No sleeping: the timeline is simulated. Each replayed record keeps the
//! source timestamp and gets `elapsed_time` = sum of the intervals decided
//! before it, i.e. when an adaptive monitor would have taken that sample.
//!
//! Input is either a CSV in the record layout (only `utilization` and
//! `interval` are required) or a plain trace with one utilization value per
//! line (`#` comments allowed).

use std::path::Path;

use havfs_core::{MetricsSnapshot, Scheduler, SchedulerConfig, SchedulerStats};

use crate::collector::{Collector, TraceCollector};
use crate::error::HarnessError;
use crate::record::{CycleRecord, read_csv};

/// Decisions for every sample of a trace.
#[derive(Debug, Clone)]
pub struct ReplayOutcome {
    pub records: Vec<CycleRecord>,
    pub stats: SchedulerStats,
    pub buffered_high_risk: usize,
}

/// One loaded sample with its original timestamp.
#[derive(Debug, Clone)]
pub struct TraceSample {
    pub timestamp: f64,
    pub snapshot: MetricsSnapshot,
}

/// Load a CSV record file or a plain utilization trace.
pub fn load_trace(path: &Path) -> Result<Vec<TraceSample>, HarnessError> {
    let text = std::fs::read_to_string(path)?;
    let first = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#'));
    match first {
        None => Ok(Vec::new()),
        Some(line) if line.parse::<f64>().is_ok() => parse_plain_trace(path, &text),
        Some(_) => Ok(read_csv(path)?
            .into_iter()
            .map(|r| TraceSample {
                timestamp: r.timestamp,
                snapshot: r.metrics,
            })
            .collect()),
    }
}

fn parse_plain_trace(path: &Path, text: &str) -> Result<Vec<TraceSample>, HarnessError> {
    let device = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("trace")
        .to_string();
    let mut out = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let value = line.parse::<f64>().map_err(|_| HarnessError::Parse {
            path: path.to_path_buf(),
            line: idx + 1,
            message: format!("expected a utilization value, got `{line}`"),
        })?;
        out.push(TraceSample {
            timestamp: 0.0,
            snapshot: MetricsSnapshot::new(&device, value),
        });
    }
    Ok(out)
}

/// Feed `samples` through a new scheduler built from `config`.
pub fn replay(samples: Vec<TraceSample>, config: SchedulerConfig) -> Result<ReplayOutcome, HarnessError> {
    let mut scheduler = Scheduler::new(config)?;
    let device = samples
        .first()
        .map_or_else(|| "trace".to_string(), |s| s.snapshot.device_id.clone());
    let timestamps: Vec<f64> = samples.iter().map(|s| s.timestamp).collect();
    let mut collector =
        TraceCollector::new(device, samples.into_iter().map(|s| s.snapshot).collect());

    let mut records = Vec::with_capacity(timestamps.len());
    let mut elapsed = 0.0;
    for &timestamp in &timestamps {
        let snapshot = collector.collect();
        let decision = scheduler.update(snapshot.clone());
        records.push(CycleRecord::adaptive(timestamp, elapsed, snapshot, &decision));
        elapsed += decision.interval;
    }

    Ok(ReplayOutcome {
        records,
        stats: scheduler.stats(),
        buffered_high_risk: scheduler.risk_buffer().size(),
    })
}
