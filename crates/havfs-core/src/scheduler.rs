//! # Adaptive sampling scheduler
//!
//! One [`Scheduler`] per monitored device. Each call to
//! [`Scheduler::update`] runs one full decision cycle in a fixed order:
//!
//! 1. extract utilization `x` from the snapshot (non-finite values are
//!    replaced, see below)
//! 2. `x̂ = predictor.update(x)`
//! 3. `risk = analyzer.compute(x, x̂)`
//! 4. `interval = controller.step(risk)`
//! 5. `regime = fsm.update(risk)`
//! 6. if `regime == High`, buffer the snapshot
//!
//! and returns the interval to sleep before the next cycle, the risk on a
//! 0-100 scale and the regime.
//!
//! ## Non-finite input
//!
//! NaN or infinite utilization is a collector bug. Rather than letting it
//! poison the predictor state, the scheduler substitutes the previous finite
//! observation (0.0 before any), counts the event in
//! [`SchedulerStats::sanitized`], and runs the cycle normally.
//!
//! Every call is pure in-memory arithmetic over `O(window_size)` data. The
//! scheduler is `Send` and shares nothing, so independent devices can run on
//! independent threads without locking.

use crate::config::{ConfigError, SchedulerConfig};
use crate::hysteresis::{HysteresisStateMachine, RegimeState};
use crate::interval_controller::HybridIntervalController;
use crate::metrics::MetricsSnapshot;
use crate::predictor::TrendPredictor;
use crate::risk_analyzer::{RiskAnalyzer, RiskComponents};
use crate::risk_buffer::RiskBuffer;

/// Why the current decision looks the way it does. Display only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DecisionLabel {
    /// High regime with utilization above the static limit.
    ThresholdTriggered,
    /// High regime driven by a large first difference.
    JumpDetected,
    /// High regime without a single dominant cause.
    HighRiskZone,
    /// Low regime, interval still climbing back toward `t_max`.
    Recovering,
    /// Low regime at the slowest cadence.
    Stable,
}

impl DecisionLabel {
    pub const ALL: [Self; 5] = [
        Self::ThresholdTriggered,
        Self::JumpDetected,
        Self::HighRiskZone,
        Self::Recovering,
        Self::Stable,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ThresholdTriggered => "threshold_triggered",
            Self::JumpDetected => "jump_detected",
            Self::HighRiskZone => "high_risk_zone",
            Self::Recovering => "recovering",
            Self::Stable => "stable",
        }
    }
}

/// Output of one decision cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    /// Seconds to wait before the next sample.
    pub interval: f64,
    /// Fused risk on a 0-100 scale.
    pub risk_percent: f64,
    pub regime: RegimeState,
    pub label: DecisionLabel,
    /// The cycle's risk components, for explainability.
    pub components: RiskComponents,
    /// Predictor output produced this cycle (forecast for the next sample).
    pub prediction: f64,
}

impl Decision {
    /// The `(interval, risk_percent, regime)` triple.
    #[must_use]
    pub fn as_tuple(&self) -> (f64, f64, RegimeState) {
        (self.interval, self.risk_percent, self.regime)
    }
}

/// Running counters for one scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SchedulerStats {
    pub cycles: u64,
    pub high_cycles: u64,
    pub transitions: u64,
    /// Non-finite utilization values replaced before use.
    pub sanitized: u64,
    pub min_interval: Option<f64>,
    pub max_interval: Option<f64>,
}

impl SchedulerStats {
    /// Fraction of cycles spent in the high regime.
    #[must_use]
    pub fn high_ratio(&self) -> f64 {
        if self.cycles == 0 {
            0.0
        } else {
            self.high_cycles as f64 / self.cycles as f64
        }
    }

    fn record_interval(&mut self, interval: f64) {
        self.min_interval = Some(self.min_interval.map_or(interval, |m| m.min(interval)));
        self.max_interval = Some(self.max_interval.map_or(interval, |m| m.max(interval)));
    }
}

/// Per-device adaptive sampling decision engine.
#[derive(Debug, Clone)]
pub struct Scheduler {
    config: SchedulerConfig,
    predictor: TrendPredictor,
    analyzer: RiskAnalyzer,
    controller: HybridIntervalController,
    fsm: HysteresisStateMachine,
    buffer: RiskBuffer,
    last_finite: Option<f64>,
    stats: SchedulerStats,
}

impl Scheduler {
    /// Validates `config` and builds every component.
    pub fn new(config: SchedulerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            predictor: TrendPredictor::new(config.alpha, config.beta)?,
            analyzer: RiskAnalyzer::new(
                config.window_size,
                config.static_limit,
                config.weights,
                config.scales,
            )?,
            controller: HybridIntervalController::new(
                config.t_min,
                config.t_max,
                config.decrease_factor,
                config.increase_step,
            )?,
            fsm: HysteresisStateMachine::new(config.enter_high, config.exit_high)?,
            buffer: RiskBuffer::new(config.buffer_capacity)?,
            last_finite: None,
            stats: SchedulerStats::default(),
            config,
        })
    }

    /// Run one decision cycle for `snapshot`.
    pub fn update(&mut self, snapshot: MetricsSnapshot) -> Decision {
        let x = self.sanitize(snapshot.utilization);

        let prediction = self.predictor.update(x);
        let assessment = self.analyzer.assess(x, prediction);
        let interval = self.controller.step(assessment.risk);
        let regime = self.fsm.update(assessment.risk);
        if regime == RegimeState::High {
            self.buffer.store(snapshot);
        }

        self.stats.cycles += 1;
        if regime == RegimeState::High {
            self.stats.high_cycles += 1;
        }
        self.stats.transitions = self.fsm.transitions();
        self.stats.record_interval(interval);

        Decision {
            interval,
            risk_percent: assessment.risk.as_percent(),
            regime,
            label: self.label(regime, &assessment.components),
            components: assessment.components,
            prediction,
        }
    }

    fn sanitize(&mut self, x: f64) -> f64 {
        if x.is_finite() {
            self.last_finite = Some(x);
            x
        } else {
            self.stats.sanitized += 1;
            self.last_finite.unwrap_or(0.0)
        }
    }

    fn label(&self, regime: RegimeState, components: &RiskComponents) -> DecisionLabel {
        match regime {
            RegimeState::High if components.anomaly > 0.0 => DecisionLabel::ThresholdTriggered,
            RegimeState::High if components.jump > self.config.jump_label_threshold => {
                DecisionLabel::JumpDetected
            }
            RegimeState::High => DecisionLabel::HighRiskZone,
            RegimeState::Low if !self.controller.is_relaxed() => DecisionLabel::Recovering,
            RegimeState::Low => DecisionLabel::Stable,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn regime(&self) -> RegimeState {
        self.fsm.state()
    }

    pub fn current_interval(&self) -> f64 {
        self.controller.current_interval()
    }

    pub fn predictor(&self) -> &TrendPredictor {
        &self.predictor
    }

    pub fn risk_buffer(&self) -> &RiskBuffer {
        &self.buffer
    }

    /// Mutable access for draining buffered snapshots.
    pub fn risk_buffer_mut(&mut self) -> &mut RiskBuffer {
        &mut self.buffer
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }
}
