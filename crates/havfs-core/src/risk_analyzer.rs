//! # Risk analyzer
//!
//! Quantifies how likely the next sampling interval hides something
//! important. Four independent signals are derived from each observation:
//!
//! - **Anomaly** `A = max(0, x - static_limit)`: excess over an absolute
//!   pressure ceiling.
//! - **Jump** `J = |x - x_prev|`: first difference (0 on the first call).
//! - **Pressure** `P = mean(window)`: sliding-window load level, the window
//!   including `x`.
//! - **Drift** `D = |x - x̂|`: residual of the trend predictor, a proxy for
//!   model uncertainty.
//!
//! Each signal is divided by its saturation scale and capped at 1, then the
//! normalized components are combined with the fusion weights:
//!
//! ```text
//! R = w_a*nA + w_j*nJ + w_p*nP + w_d*nD,   R clamped to [0, 1]
//! ```

use crate::config::{ConfigError, FusionWeights, NormalizationScales};

/// Fused risk score. Always within `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct FusedRisk(f64);

impl FusedRisk {
    pub const ZERO: Self = Self(0.0);
    pub const MAX: Self = Self(1.0);

    /// Clamp an arbitrary value into `[0, 1]`. NaN maps to 0.
    #[must_use]
    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            Self(0.0)
        } else {
            Self(value.clamp(0.0, 1.0))
        }
    }

    #[must_use]
    pub const fn value(self) -> f64 {
        self.0
    }

    /// The score on the 0-100 reporting scale.
    #[must_use]
    pub fn as_percent(self) -> f64 {
        self.0 * 100.0
    }
}

/// Raw and normalized risk components of one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RiskComponents {
    pub anomaly: f64,
    pub jump: f64,
    pub pressure: f64,
    pub drift: f64,
    pub norm_anomaly: f64,
    pub norm_jump: f64,
    pub norm_pressure: f64,
    pub norm_drift: f64,
}

/// Output of [`RiskAnalyzer::assess`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskAssessment {
    pub components: RiskComponents,
    pub risk: FusedRisk,
}

/// Stateful risk computation for one observation stream.
#[derive(Debug, Clone)]
pub struct RiskAnalyzer {
    static_limit: f64,
    weights: FusionWeights,
    scales: NormalizationScales,
    /// Ring buffer of recent raw observations.
    window: Vec<f64>,
    /// Next write position in `window`.
    write_pos: usize,
    /// Number of valid entries in `window` (capped at capacity).
    count: usize,
    prev: Option<f64>,
}

impl RiskAnalyzer {
    /// Creates an analyzer with a pressure window of `window_size` entries.
    pub fn new(
        window_size: usize,
        static_limit: f64,
        weights: FusionWeights,
        scales: NormalizationScales,
    ) -> Result<Self, ConfigError> {
        if window_size == 0 {
            return Err(ConfigError::Invalid {
                field: "window_size",
                value: "0".to_string(),
                reason: "must be >= 1",
            });
        }
        if !static_limit.is_finite() {
            return Err(ConfigError::Invalid {
                field: "static_limit",
                value: static_limit.to_string(),
                reason: "must be finite",
            });
        }
        weights.validate()?;
        scales.validate()?;
        Ok(Self {
            static_limit,
            weights,
            scales,
            window: vec![0.0; window_size],
            write_pos: 0,
            count: 0,
            prev: None,
        })
    }

    /// Fused risk for observation `x` given the prediction made for it.
    pub fn compute(&mut self, x: f64, x_predicted: f64) -> FusedRisk {
        self.assess(x, x_predicted).risk
    }

    /// Like [`compute`](Self::compute) but also returns every component.
    pub fn assess(&mut self, x: f64, x_predicted: f64) -> RiskAssessment {
        let anomaly = (x - self.static_limit).max(0.0);
        let jump = self.prev.map_or(0.0, |prev| (x - prev).abs());
        self.push(x);
        let pressure = self.window_mean();
        let drift = (x - x_predicted).abs();
        self.prev = Some(x);

        let norm_anomaly = saturate(anomaly, self.scales.anomaly);
        let norm_jump = saturate(jump, self.scales.jump);
        let norm_pressure = saturate(pressure, self.scales.pressure);
        let norm_drift = saturate(drift, self.scales.drift);

        let fused = self.weights.anomaly * norm_anomaly
            + self.weights.jump * norm_jump
            + self.weights.pressure * norm_pressure
            + self.weights.drift * norm_drift;

        RiskAssessment {
            components: RiskComponents {
                anomaly,
                jump,
                pressure,
                drift,
                norm_anomaly,
                norm_jump,
                norm_pressure,
                norm_drift,
            },
            risk: FusedRisk::new(fused),
        }
    }

    fn push(&mut self, x: f64) {
        let cap = self.window.len();
        self.window[self.write_pos] = x;
        self.write_pos = (self.write_pos + 1) % cap;
        if self.count < cap {
            self.count += 1;
        }
    }

    /// Mean of the observations currently in the window (0 when empty).
    pub fn window_mean(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        // While filling, entries occupy [0, count); once full, all slots are live.
        self.window[..self.count].iter().sum::<f64>() / self.count as f64
    }

    /// Number of observations currently in the window.
    pub fn window_len(&self) -> usize {
        self.count
    }

    /// The previous observation, if any.
    pub fn previous(&self) -> Option<f64> {
        self.prev
    }
}

/// `min(value / scale, 1)`, floored at 0 for negative inputs.
fn saturate(value: f64, scale: f64) -> f64 {
    (value / scale).clamp(0.0, 1.0)
}
