//! Fixed-vs-adaptive comparison of two recorded runs.
//!
//! Metrics per run:
//! - sample count
//! - redundancy: share of samples whose utilization moved less than
//!   [`REDUNDANCY_THRESHOLD`] points from the previous sample, over all samples
//! - mean self-overhead (CPU percent, resident MiB) when the columns exist
//! - burst response latency: for each sample above [`BURST_LOAD`] percent,
//!   the delay until the first sample at or after it, within
//!   [`BURST_WINDOW_S`] seconds, whose interval is below
//!   [`RESPONSIVE_INTERVAL_S`]; averaged over bursts that got a response
//! - mean and max risk score

use std::fmt::Write as _;

use serde::Serialize;

use crate::record::CycleRecord;

pub const REDUNDANCY_THRESHOLD: f64 = 1.0;
pub const BURST_LOAD: f64 = 50.0;
pub const RESPONSIVE_INTERVAL_S: f64 = 1.0;
pub const BURST_WINDOW_S: f64 = 5.0;

/// Output format for [`EvaluationReport::render`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Json,
    Plain,
}

impl ReportFormat {
    #[must_use]
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "plain" | "text" | "txt" => Some(Self::Plain),
            _ => None,
        }
    }
}

/// Metrics for one recorded run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunMetrics {
    pub samples: usize,
    pub redundancy_pct: f64,
    pub mean_overhead_cpu: Option<f64>,
    pub mean_overhead_mem_mb: Option<f64>,
    /// `None` when the run never exceeded the burst load.
    pub burst_latency_s: Option<f64>,
    pub mean_risk: Option<f64>,
    pub max_risk: Option<f64>,
}

/// Side-by-side comparison of a fixed-rate and an adaptive run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub fixed: RunMetrics,
    pub havfs: RunMetrics,
    /// `(fixed - havfs) / fixed * 100`; `None` when the fixed run is empty.
    pub sample_reduction_pct: Option<f64>,
    /// Redundancy drop, percentage points.
    pub redundancy_improvement_pp: f64,
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Redundant-sample share, percent of all samples.
#[must_use]
pub fn redundancy_pct(records: &[CycleRecord], threshold: f64) -> f64 {
    if records.len() < 2 {
        return 0.0;
    }
    let redundant = records
        .windows(2)
        .filter(|w| (w[1].metrics.utilization - w[0].metrics.utilization).abs() < threshold)
        .count();
    redundant as f64 / records.len() as f64 * 100.0
}

/// Mean burst response delay, seconds. `None` if no sample exceeded
/// `load`; `Some(0.0)` if bursts occurred but none got a response.
#[must_use]
pub fn burst_latency(records: &[CycleRecord], load: f64, responsive: f64, window: f64) -> Option<f64> {
    let mut bursts = 0usize;
    let mut delays = Vec::new();
    for (i, burst) in records.iter().enumerate() {
        if burst.metrics.utilization <= load {
            continue;
        }
        bursts += 1;
        let t0 = burst.elapsed_time;
        let reacted = records[i..]
            .iter()
            .filter(|r| r.elapsed_time <= t0 + window)
            .find(|r| r.interval < responsive);
        if let Some(r) = reacted {
            let delay = r.elapsed_time - t0;
            if delay >= 0.0 {
                delays.push(delay);
            }
        }
    }
    if bursts == 0 {
        return None;
    }
    Some(mean(delays.into_iter()).unwrap_or(0.0))
}

impl RunMetrics {
    #[must_use]
    pub fn from_records(records: &[CycleRecord]) -> Self {
        let overheads: Vec<_> = records.iter().filter_map(|r| r.overhead).collect();
        Self {
            samples: records.len(),
            redundancy_pct: redundancy_pct(records, REDUNDANCY_THRESHOLD),
            mean_overhead_cpu: mean(overheads.iter().map(|o| o.cpu_percent)),
            mean_overhead_mem_mb: mean(overheads.iter().map(|o| o.mem_mb)),
            burst_latency_s: burst_latency(records, BURST_LOAD, RESPONSIVE_INTERVAL_S, BURST_WINDOW_S),
            mean_risk: mean(records.iter().map(|r| r.risk_score)),
            max_risk: records.iter().map(|r| r.risk_score).reduce(f64::max),
        }
    }
}

impl EvaluationReport {
    #[must_use]
    pub fn compare(fixed: &[CycleRecord], havfs: &[CycleRecord]) -> Self {
        let fixed_m = RunMetrics::from_records(fixed);
        let havfs_m = RunMetrics::from_records(havfs);
        let sample_reduction_pct = (fixed_m.samples > 0).then(|| {
            (fixed_m.samples as f64 - havfs_m.samples as f64) / fixed_m.samples as f64 * 100.0
        });
        Self {
            redundancy_improvement_pp: fixed_m.redundancy_pct - havfs_m.redundancy_pct,
            sample_reduction_pct,
            fixed: fixed_m,
            havfs: havfs_m,
        }
    }

    pub fn render(&self, format: ReportFormat) -> Result<String, serde_json::Error> {
        match format {
            ReportFormat::Json => serde_json::to_string_pretty(self),
            ReportFormat::Plain => Ok(self.to_plain()),
        }
    }

    fn to_plain(&self) -> String {
        let opt = |v: Option<f64>, digits: usize| {
            v.map_or_else(|| "n/a".to_string(), |x| format!("{x:.digits$}"))
        };
        let mut out = String::new();
        let _ = writeln!(out, "== sampling evaluation ==");
        let _ = writeln!(out, "[1] collection efficiency");
        let _ = writeln!(out, "    fixed samples      : {}", self.fixed.samples);
        let _ = writeln!(out, "    adaptive samples   : {}", self.havfs.samples);
        let _ = writeln!(out, "    reduction          : {}%", opt(self.sample_reduction_pct, 2));
        let _ = writeln!(out, "[2] redundancy (|delta util| < {REDUNDANCY_THRESHOLD})");
        let _ = writeln!(out, "    fixed              : {:.2}%", self.fixed.redundancy_pct);
        let _ = writeln!(out, "    adaptive           : {:.2}%", self.havfs.redundancy_pct);
        let _ = writeln!(out, "    improvement        : {:.2} pp", self.redundancy_improvement_pp);
        let _ = writeln!(out, "[3] self overhead (adaptive, mean)");
        let _ = writeln!(out, "    cpu                : {}%", opt(self.havfs.mean_overhead_cpu, 2));
        let _ = writeln!(out, "    resident memory    : {} MiB", opt(self.havfs.mean_overhead_mem_mb, 2));
        let _ = writeln!(out, "[4] burst response latency");
        let _ = writeln!(out, "    adaptive           : {} s", opt(self.havfs.burst_latency_s, 4));
        let _ = writeln!(out, "[5] risk score (0-100)");
        let _ = writeln!(out, "    mean               : {}", opt(self.havfs.mean_risk, 2));
        let _ = writeln!(out, "    max                : {}", opt(self.havfs.max_risk, 2));
        out
    }
}
