//! Per-cycle export record and its CSV layout.
//!
//! Column order, one row per cycle:
//!
//! ```text
//! timestamp,elapsed_time,device_id,utilization,temperature,power,memory_usage,
//! bandwidth,risk_score,interval,state[,overhead_cpu,overhead_mem_mb]
//! ```
//!
//! - `timestamp`: Unix seconds (fractional)
//! - `elapsed_time`: seconds since experiment start
//! - `risk_score`: fused risk on the 0-100 scale (0 in fixed mode)
//! - `interval`: seconds slept after this sample
//! - `state`: `LOW`, `HIGH`, or `FIXED` for the fixed-rate baseline
//! - `overhead_cpu`: the monitor's own CPU percent over the cycle
//! - `overhead_mem_mb`: the monitor's peak resident set, MiB
//!
//! The two overhead columns are present only when overhead measurement was
//! enabled for the run. Device ids must not contain commas; the writer
//! replaces any with `_`.
//!
//! The reader is header-driven and also accepts the legacy column names
//! `time` (for `elapsed_time`) and `risk` (for `risk_score`), plus the
//! legacy display labels in `state` (see [`RecordState::from_str_loose`]).

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use havfs_core::{Decision, DecisionLabel, MetricsSnapshot, RegimeState, RiskComponents};
use serde::{Deserialize, Serialize};

use crate::error::HarnessError;

pub const BASE_COLUMNS: [&str; 11] = [
    "timestamp",
    "elapsed_time",
    "device_id",
    "utilization",
    "temperature",
    "power",
    "memory_usage",
    "bandwidth",
    "risk_score",
    "interval",
    "state",
];

pub const OVERHEAD_COLUMNS: [&str; 2] = ["overhead_cpu", "overhead_mem_mb"];

const LEGACY_HIGH_PREFIX: &str = "高频";
const LEGACY_LOW_PREFIXES: [&str; 2] = ["恢复", "稳定"];

/// Sampling state written to the `state` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordState {
    Low,
    High,
    /// Fixed-rate baseline; no decision was taken.
    Fixed,
}

impl RecordState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::High => "HIGH",
            Self::Fixed => "FIXED",
        }
    }

    /// Also accepts the display labels written by the legacy experiment
    /// script: `高频(...)` is high, `恢复(...)` and `稳定(...)` are low.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Option<Self> {
        let s = s.trim();
        match s.to_ascii_lowercase().as_str() {
            "low" => return Some(Self::Low),
            "high" => return Some(Self::High),
            "fixed" => return Some(Self::Fixed),
            _ => {}
        }
        if s.starts_with(LEGACY_HIGH_PREFIX) {
            Some(Self::High)
        } else if LEGACY_LOW_PREFIXES.iter().any(|p| s.starts_with(p)) {
            Some(Self::Low)
        } else {
            None
        }
    }
}

impl From<RegimeState> for RecordState {
    fn from(regime: RegimeState) -> Self {
        match regime {
            RegimeState::Low => Self::Low,
            RegimeState::High => Self::High,
        }
    }
}

/// Monitor self-cost over one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Overhead {
    pub cpu_percent: f64,
    pub mem_mb: f64,
}

/// Why an adaptive cycle decided what it did. Not part of the CSV layout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Explain {
    pub label: DecisionLabel,
    pub components: RiskComponents,
    pub prediction: f64,
}

/// One exported row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleRecord {
    pub timestamp: f64,
    pub elapsed_time: f64,
    pub metrics: MetricsSnapshot,
    pub risk_score: f64,
    pub interval: f64,
    pub state: RecordState,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub overhead: Option<Overhead>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub explain: Option<Explain>,
}

impl CycleRecord {
    /// Record for an adaptive cycle.
    #[must_use]
    pub fn adaptive(
        timestamp: f64,
        elapsed_time: f64,
        metrics: MetricsSnapshot,
        decision: &Decision,
    ) -> Self {
        Self {
            timestamp,
            elapsed_time,
            metrics,
            risk_score: decision.risk_percent,
            interval: decision.interval,
            state: decision.regime.into(),
            overhead: None,
            explain: Some(Explain {
                label: decision.label,
                components: decision.components,
                prediction: decision.prediction,
            }),
        }
    }

    /// Record for a fixed-rate baseline cycle.
    #[must_use]
    pub fn fixed(timestamp: f64, elapsed_time: f64, metrics: MetricsSnapshot, interval: f64) -> Self {
        Self {
            timestamp,
            elapsed_time,
            metrics,
            risk_score: 0.0,
            interval,
            state: RecordState::Fixed,
            overhead: None,
            explain: None,
        }
    }

    #[must_use]
    pub fn with_overhead(mut self, overhead: Overhead) -> Self {
        self.overhead = Some(overhead);
        self
    }

    /// CSV row without trailing newline.
    #[must_use]
    pub fn to_csv_row(&self, with_overhead: bool) -> String {
        let m = &self.metrics;
        let mut row = format!(
            "{},{},{},{},{},{},{},{},{},{},{}",
            self.timestamp,
            self.elapsed_time,
            m.device_id.replace(',', "_"),
            m.utilization,
            m.temperature,
            m.power,
            m.memory_usage,
            m.bandwidth,
            self.risk_score,
            self.interval,
            self.state.as_str(),
        );
        if with_overhead {
            let o = self.overhead.unwrap_or(Overhead {
                cpu_percent: 0.0,
                mem_mb: 0.0,
            });
            row.push_str(&format!(",{},{}", o.cpu_percent, o.mem_mb));
        }
        row
    }
}

/// Header line for the given layout, without trailing newline.
#[must_use]
pub fn csv_header(with_overhead: bool) -> String {
    let mut cols: Vec<&str> = BASE_COLUMNS.to_vec();
    if with_overhead {
        cols.extend(OVERHEAD_COLUMNS);
    }
    cols.join(",")
}

/// Write `records` as a complete CSV document.
pub fn write_csv<W: Write>(
    mut out: W,
    records: &[CycleRecord],
    with_overhead: bool,
) -> std::io::Result<()> {
    writeln!(out, "{}", csv_header(with_overhead))?;
    for record in records {
        writeln!(out, "{}", record.to_csv_row(with_overhead))?;
    }
    out.flush()
}

/// Load every record from a CSV file written by [`write_csv`] (or by the
/// legacy experiment script).
pub fn read_csv(path: &Path) -> Result<Vec<CycleRecord>, HarnessError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines().enumerate();

    let header = loop {
        match lines.next() {
            Some((_, line)) => {
                let line = line?;
                if !line.trim().is_empty() {
                    break line;
                }
            }
            None => return Ok(Vec::new()),
        }
    };
    let columns: HashMap<String, usize> = header
        .split(',')
        .enumerate()
        .map(|(i, name)| (name.trim().to_string(), i))
        .collect();

    let find = |names: &[&str]| names.iter().find_map(|n| columns.get(*n).copied());
    let require = |names: &[&str]| {
        find(names).ok_or_else(|| HarnessError::MissingColumn {
            path: path.to_path_buf(),
            column: names[0].to_string(),
        })
    };

    let utilization = require(&["utilization"])?;
    let interval = require(&["interval"])?;
    let timestamp = find(&["timestamp"]);
    let elapsed = find(&["elapsed_time", "time"]);
    let device = find(&["device_id"]);
    let temperature = find(&["temperature"]);
    let power = find(&["power"]);
    let memory = find(&["memory_usage"]);
    let bandwidth = find(&["bandwidth"]);
    let risk = find(&["risk_score", "risk"]);
    let state = find(&["state"]);
    let overhead_cpu = find(&["overhead_cpu"]);
    let overhead_mem = find(&["overhead_mem_mb"]);

    let mut records = Vec::new();
    for (idx, line) in lines {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let line_no = idx + 1;
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();

        let number = |col: Option<usize>| -> Result<f64, HarnessError> {
            let Some(col) = col else { return Ok(0.0) };
            let raw = fields.get(col).copied().unwrap_or("");
            if raw.is_empty() || raw.eq_ignore_ascii_case("none") {
                return Ok(0.0);
            }
            raw.parse::<f64>().map_err(|_| HarnessError::Parse {
                path: path.to_path_buf(),
                line: line_no,
                message: format!("invalid number `{raw}` in column {col}"),
            })
        };

        let device_id = device
            .and_then(|c| fields.get(c))
            .map_or_else(|| "unknown".to_string(), |s| (*s).to_string());
        let metrics = MetricsSnapshot::new(device_id, number(Some(utilization))?)
            .with_temperature(number(temperature)?)
            .with_power(number(power)?)
            .with_memory_usage(number(memory)?)
            .with_bandwidth(number(bandwidth)?);

        let state = match state.and_then(|c| fields.get(c)) {
            Some(raw) => {
                RecordState::from_str_loose(raw).ok_or_else(|| HarnessError::Parse {
                    path: path.to_path_buf(),
                    line: line_no,
                    message: format!("unknown state `{raw}`"),
                })?
            }
            None => RecordState::Fixed,
        };

        let overhead = match (overhead_cpu, overhead_mem) {
            (Some(_), Some(_)) => Some(Overhead {
                cpu_percent: number(overhead_cpu)?,
                mem_mb: number(overhead_mem)?,
            }),
            _ => None,
        };

        records.push(CycleRecord {
            timestamp: number(timestamp)?,
            elapsed_time: number(elapsed)?,
            metrics,
            risk_score: number(risk)?,
            interval: number(Some(interval))?,
            state,
            overhead,
            explain: None,
        });
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(util: f64, state: RecordState) -> CycleRecord {
        CycleRecord {
            timestamp: 1_700_000_000.5,
            elapsed_time: 1.25,
            metrics: MetricsSnapshot::new("cpu0", util).with_temperature(50.0),
            risk_score: 12.5,
            interval: 2.0,
            state,
            overhead: None,
            explain: None,
        }
    }

    #[test]
    fn header_matches_documented_order() {
        assert_eq!(
            csv_header(false),
            "timestamp,elapsed_time,device_id,utilization,temperature,power,memory_usage,bandwidth,risk_score,interval,state"
        );
        assert!(csv_header(true).ends_with(",state,overhead_cpu,overhead_mem_mb"));
    }

    #[test]
    fn row_has_one_field_per_column() {
        let r = record(33.0, RecordState::High);
        assert_eq!(r.to_csv_row(false).split(',').count(), BASE_COLUMNS.len());
        assert_eq!(
            r.to_csv_row(true).split(',').count(),
            BASE_COLUMNS.len() + OVERHEAD_COLUMNS.len()
        );
        assert!(r.to_csv_row(false).ends_with(",12.5,2,HIGH"));
    }

    #[test]
    fn commas_in_device_id_are_replaced() {
        let mut r = record(1.0, RecordState::Low);
        r.metrics.device_id = "gpu,0".to_string();
        assert!(r.to_csv_row(false).contains(",gpu_0,"));
    }

    #[test]
    fn state_parsing_is_loose() {
        assert_eq!(RecordState::from_str_loose("high"), Some(RecordState::High));
        assert_eq!(RecordState::from_str_loose("FIXED"), Some(RecordState::Fixed));
        assert_eq!(RecordState::from_str_loose("medium"), None);
        assert_eq!(RecordState::from_str_loose("高频(突变检测)"), Some(RecordState::High));
        assert_eq!(RecordState::from_str_loose(" 恢复(线性回升)"), Some(RecordState::Low));
        assert_eq!(RecordState::from_str_loose("稳定(低频基准)"), Some(RecordState::Low));
        assert_eq!(RecordState::from(RegimeState::Low), RecordState::Low);
    }
}
