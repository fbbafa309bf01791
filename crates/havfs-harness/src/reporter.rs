//! Output sinks for per-cycle records.
//!
//! A failing reporter returns [`ReportError`]; the runner logs it and keeps
//! sampling. Nothing here feeds back into the decision engine.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::ReportError;
use crate::exporter::PrometheusExporter;
use crate::record::{CycleRecord, RecordState, csv_header};
use crate::structured_log::{LogEmitter, LogEntry, LogLevel, events};

/// Destination for cycle records.
pub trait Reporter {
    /// Short identifier used in error messages and logs.
    fn name(&self) -> &'static str;

    fn report(&mut self, record: &CycleRecord) -> Result<(), ReportError>;

    fn flush(&mut self) -> Result<(), ReportError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Console
// ---------------------------------------------------------------------------

/// One human-readable line per cycle.
pub struct ConsoleReporter<W: Write = std::io::Stdout> {
    out: W,
}

impl ConsoleReporter {
    #[must_use]
    pub fn stdout() -> Self {
        Self {
            out: std::io::stdout(),
        }
    }
}

impl<W: Write> ConsoleReporter<W> {
    #[must_use]
    pub fn new(out: W) -> Self {
        Self { out }
    }

    #[must_use]
    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Console line format shared with progress output.
#[must_use]
pub fn console_line(record: &CycleRecord) -> String {
    format!(
        "t={:6.1}s | {} util={:5.1}% | risk={:.2} | interval={:.2}s | state={}",
        record.elapsed_time,
        record.metrics.device_id,
        record.metrics.utilization,
        record.risk_score,
        record.interval,
        record.state.as_str(),
    )
}

impl<W: Write> Reporter for ConsoleReporter<W> {
    fn name(&self) -> &'static str {
        "console"
    }

    fn report(&mut self, record: &CycleRecord) -> Result<(), ReportError> {
        writeln!(self.out, "{}", console_line(record)).map_err(|e| ReportError::io("console", e))
    }

    fn flush(&mut self) -> Result<(), ReportError> {
        self.out.flush().map_err(|e| ReportError::io("console", e))
    }
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

/// Streams records in the CSV layout of [`crate::record`].
pub struct CsvReporter<W: Write> {
    out: W,
    with_overhead: bool,
    rows: u64,
}

impl CsvReporter<BufWriter<File>> {
    /// Create (truncate) `path`, creating parent directories as needed.
    pub fn create(path: &Path, with_overhead: bool) -> std::io::Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        Self::new(BufWriter::new(File::create(path)?), with_overhead)
    }
}

impl<W: Write> CsvReporter<W> {
    /// Writes the header immediately.
    pub fn new(mut out: W, with_overhead: bool) -> std::io::Result<Self> {
        writeln!(out, "{}", csv_header(with_overhead))?;
        Ok(Self {
            out,
            with_overhead,
            rows: 0,
        })
    }

    #[must_use]
    pub fn rows(&self) -> u64 {
        self.rows
    }

    #[must_use]
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Reporter for CsvReporter<W> {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn report(&mut self, record: &CycleRecord) -> Result<(), ReportError> {
        writeln!(self.out, "{}", record.to_csv_row(self.with_overhead))
            .map_err(|e| ReportError::io("csv", e))?;
        self.rows += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ReportError> {
        self.out.flush().map_err(|e| ReportError::io("csv", e))
    }
}

// ---------------------------------------------------------------------------
// Prometheus
// ---------------------------------------------------------------------------

/// Publishes each record into a shared [`PrometheusExporter`].
pub struct PrometheusReporter {
    exporter: Arc<PrometheusExporter>,
}

impl PrometheusReporter {
    #[must_use]
    pub fn new(exporter: Arc<PrometheusExporter>) -> Self {
        Self { exporter }
    }
}

impl Reporter for PrometheusReporter {
    fn name(&self) -> &'static str {
        "prometheus"
    }

    fn report(&mut self, record: &CycleRecord) -> Result<(), ReportError> {
        self.exporter.publish(record);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Decision log
// ---------------------------------------------------------------------------

/// Emitter shared between the runner and the decision log reporter.
pub type SharedEmitter = Arc<Mutex<LogEmitter>>;

/// Writes one `sampling_decision` event per adaptive cycle, plus a
/// `regime_transition` event whenever a device changes regime.
pub struct DecisionLogReporter {
    emitter: SharedEmitter,
    mode: &'static str,
    last_state: HashMap<String, RecordState>,
}

impl DecisionLogReporter {
    #[must_use]
    pub fn new(emitter: SharedEmitter, mode: &'static str) -> Self {
        Self {
            emitter,
            mode,
            last_state: HashMap::new(),
        }
    }

    fn serialize_err(e: serde_json::Error) -> ReportError {
        ReportError::Serialize {
            reporter: "decision_log",
            message: e.to_string(),
        }
    }
}

impl Reporter for DecisionLogReporter {
    fn name(&self) -> &'static str {
        "decision_log"
    }

    fn report(&mut self, record: &CycleRecord) -> Result<(), ReportError> {
        // fixed-mode cycles carry no decision
        let Some(explain) = record.explain else {
            return Ok(());
        };
        let device = record.metrics.device_id.as_str();
        let mut emitter = self.emitter.lock();

        // every regime machine starts LOW
        let prev = self
            .last_state
            .insert(device.to_string(), record.state)
            .unwrap_or(RecordState::Low);
        if prev != record.state {
            let trace_id = emitter.next_trace_id(device);
            let entry = LogEntry::new(trace_id, LogLevel::Info, events::REGIME_TRANSITION)
                .with_device(device)
                .with_mode(self.mode)
                .with_regime(record.state.as_str())
                .with_details(serde_json::json!({
                    "from": prev.as_str(),
                    "to": record.state.as_str(),
                    "elapsed_time": record.elapsed_time,
                    "risk_percent": record.risk_score,
                }));
            emitter
                .emit_entry(entry)
                .map_err(|e| ReportError::io("decision_log", e))?;
        }

        let risk_inputs = serde_json::to_value(explain.components).map_err(Self::serialize_err)?;
        let trace_id = emitter.next_trace_id(device);
        let entry = LogEntry::new(trace_id, LogLevel::Info, events::SAMPLING_DECISION)
            .with_device(device)
            .with_mode(self.mode)
            .with_regime(record.state.as_str())
            .with_decision(explain.label, risk_inputs, record.interval, record.risk_score)
            .with_details(serde_json::json!({
                "utilization": record.metrics.utilization,
                "prediction": explain.prediction,
                "elapsed_time": record.elapsed_time,
            }));
        emitter
            .emit_entry(entry)
            .map_err(|e| ReportError::io("decision_log", e))
    }

    fn flush(&mut self) -> Result<(), ReportError> {
        self.emitter
            .lock()
            .flush()
            .map_err(|e| ReportError::io("decision_log", e))
    }
}
