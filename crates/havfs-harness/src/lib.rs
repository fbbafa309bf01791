//! Experiment harness around the HAVFS decision engine.
//!
//! This crate provides:
//! - Collectors: host CPU via procfs, a seeded simulated GPU, an NPU slot,
//!   and trace replay
//! - Reporters: console, CSV, Prometheus exporter, JSONL decision log
//! - Experiment runner: fixed-rate baseline or adaptive sampling, with
//!   optional self-overhead measurement and cancellable sleeps
//! - Offline tooling: replay a recorded trace, compare two runs
//! - Structured logging and artifact manifests
//!
//! The only unsafe code is the `getrusage` and `signal` FFI, each allowed
//! locally.

#![deny(unsafe_code)]

pub mod collector;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod experiment;
pub mod exporter;
pub mod overhead;
pub mod record;
pub mod replay;
pub mod reporter;
pub mod structured_log;

pub use collector::{Collector, DeviceKind};
pub use error::{HarnessError, ReportError};
pub use evaluation::{EvaluationReport, ReportFormat, RunMetrics};
pub use experiment::{
    Clock, ExperimentRunner, ExperimentSummary, ManualClock, ModeKind, SamplingMode,
    ShutdownSignal, SystemClock,
};
pub use exporter::PrometheusExporter;
pub use record::{CycleRecord, RecordState};
pub use reporter::Reporter;
