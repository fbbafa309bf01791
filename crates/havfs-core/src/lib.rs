//! Adaptive sampling decision engine.
//!
//! Decides how long a monitoring agent should wait before sampling a device
//! again. Instead of polling at a fixed interval, the engine predicts
//! near-term load, scores the risk that the next interval hides something
//! important, and maps that risk to an interval: tight just before and
//! during volatile or high-load periods, relaxed while the signal is calm.
//!
//! # Architecture
//!
//! - **Trend predictor** (`predictor`): Holt double exponential smoothing
//! - **Risk analyzer** (`risk_analyzer`): anomaly/jump/pressure/drift fusion into [0, 1]
//! - **Interval controller** (`interval_controller`): linear mapping + asymmetric approach
//! - **Hysteresis** (`hysteresis`): `Low`/`High` regime with separate enter/exit thresholds
//! - **Risk buffer** (`risk_buffer`): bounded log of high-regime snapshots
//! - **Scheduler** (`scheduler`): per-device orchestrator, one call per cycle
//! - **Configuration** (`config`): validated tuning surface
//!
//! The engine never acquires data and never performs I/O. Collectors,
//! reporters and the sampling loop live in `havfs-harness`.

pub mod config;
pub mod hysteresis;
pub mod interval_controller;
pub mod metrics;
pub mod predictor;
pub mod risk_analyzer;
pub mod risk_buffer;
pub mod scheduler;

pub use config::{ConfigError, FusionWeights, NormalizationScales, SchedulerConfig};
pub use hysteresis::{HysteresisStateMachine, RegimeState};
pub use interval_controller::HybridIntervalController;
pub use metrics::MetricsSnapshot;
pub use predictor::TrendPredictor;
pub use risk_analyzer::{FusedRisk, RiskAnalyzer, RiskAssessment, RiskComponents};
pub use risk_buffer::RiskBuffer;
pub use scheduler::{Decision, DecisionLabel, Scheduler, SchedulerStats};
