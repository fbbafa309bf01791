//! Scheduler configuration.
//!
//! Every tuning constant of the decision engine lives here: interval bounds,
//! predictor smoothing, risk calibration (static limit, saturation scales,
//! fusion weights), hysteresis thresholds, controller step sizes and the
//! high-risk buffer capacity.
//!
//! The normalization scales and fusion weights are empirically tuned
//! defaults. Recalibrate them per device type against recorded traces.
//!
//! A configuration is checked once by [`SchedulerConfig::validate`]; every
//! component constructor in this crate runs the subset of checks it relies
//! on, so an invalid value can never reach the per-cycle path.

use thiserror::Error;

/// Tolerance for the "weights sum to one" check.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Construction-time configuration failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A field holds a value outside its documented domain.
    #[error("invalid config field `{field}` = {value}: {reason}")]
    Invalid {
        field: &'static str,
        value: String,
        reason: &'static str,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, value: impl ToString, reason: &'static str) -> Self {
        Self::Invalid {
            field,
            value: value.to_string(),
            reason,
        }
    }

    /// Name of the offending field.
    #[must_use]
    pub fn field(&self) -> &'static str {
        match self {
            Self::Invalid { field, .. } => field,
        }
    }
}

/// Weights applied to the normalized risk components before summing.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FusionWeights {
    pub anomaly: f64,
    pub jump: f64,
    pub pressure: f64,
    pub drift: f64,
}

impl FusionWeights {
    #[must_use]
    pub const fn new(anomaly: f64, jump: f64, pressure: f64, drift: f64) -> Self {
        Self {
            anomaly,
            jump,
            pressure,
            drift,
        }
    }

    #[must_use]
    pub fn sum(&self) -> f64 {
        self.anomaly + self.jump + self.pressure + self.drift
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, w) in [
            ("weights.anomaly", self.anomaly),
            ("weights.jump", self.jump),
            ("weights.pressure", self.pressure),
            ("weights.drift", self.drift),
        ] {
            if !w.is_finite() || w < 0.0 {
                return Err(ConfigError::invalid(field, w, "must be finite and >= 0"));
            }
        }
        let sum = self.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ConfigError::invalid("weights", sum, "must sum to 1.0"));
        }
        Ok(())
    }
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self::new(0.3, 0.3, 0.2, 0.2)
    }
}

/// Raw component value at which each normalized component saturates at 1.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct NormalizationScales {
    pub anomaly: f64,
    pub jump: f64,
    pub pressure: f64,
    pub drift: f64,
}

impl NormalizationScales {
    #[must_use]
    pub const fn new(anomaly: f64, jump: f64, pressure: f64, drift: f64) -> Self {
        Self {
            anomaly,
            jump,
            pressure,
            drift,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, s) in [
            ("scales.anomaly", self.anomaly),
            ("scales.jump", self.jump),
            ("scales.pressure", self.pressure),
            ("scales.drift", self.drift),
        ] {
            if !s.is_finite() || s <= 0.0 {
                return Err(ConfigError::invalid(field, s, "must be finite and > 0"));
            }
        }
        Ok(())
    }
}

impl Default for NormalizationScales {
    fn default() -> Self {
        Self::new(20.0, 50.0, 100.0, 40.0)
    }
}

/// Full configuration of one [`crate::Scheduler`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SchedulerConfig {
    /// Shortest sampling interval, seconds.
    pub t_min: f64,
    /// Longest sampling interval, seconds. Also the initial interval.
    pub t_max: f64,
    /// Absolute pressure ceiling above which the anomaly component grows.
    pub static_limit: f64,
    /// Length of the pressure window.
    pub window_size: usize,
    /// Predictor level smoothing, in (0, 1).
    pub alpha: f64,
    /// Predictor trend smoothing, in (0, 1).
    pub beta: f64,
    /// Risk above which the regime enters `High`.
    pub enter_high: f64,
    /// Risk below which the regime leaves `High`.
    pub exit_high: f64,
    pub weights: FusionWeights,
    pub scales: NormalizationScales,
    /// Maximum snapshots retained by the high-risk buffer.
    pub buffer_capacity: usize,
    /// Per-cycle multiplicative shrink bound while risk rises, in (0, 1).
    pub decrease_factor: f64,
    /// Per-cycle additive growth bound while risk falls, seconds.
    pub increase_step: f64,
    /// Jump size above which a `High` decision is labeled as a jump.
    pub jump_label_threshold: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            t_min: 0.5,
            t_max: 5.0,
            static_limit: 80.0,
            window_size: 10,
            alpha: 0.6,
            beta: 0.3,
            enter_high: 0.4,
            exit_high: 0.2,
            weights: FusionWeights::default(),
            scales: NormalizationScales::default(),
            buffer_capacity: 50,
            decrease_factor: 0.5,
            increase_step: 0.2,
            jump_label_threshold: 20.0,
        }
    }
}

impl SchedulerConfig {
    #[must_use]
    pub fn with_interval_bounds(mut self, t_min: f64, t_max: f64) -> Self {
        self.t_min = t_min;
        self.t_max = t_max;
        self
    }

    #[must_use]
    pub fn with_smoothing(mut self, alpha: f64, beta: f64) -> Self {
        self.alpha = alpha;
        self.beta = beta;
        self
    }

    #[must_use]
    pub fn with_thresholds(mut self, enter_high: f64, exit_high: f64) -> Self {
        self.enter_high = enter_high;
        self.exit_high = exit_high;
        self
    }

    #[must_use]
    pub fn with_weights(mut self, weights: FusionWeights) -> Self {
        self.weights = weights;
        self
    }

    #[must_use]
    pub fn with_scales(mut self, scales: NormalizationScales) -> Self {
        self.scales = scales;
        self
    }

    #[must_use]
    pub fn with_static_limit(mut self, static_limit: f64) -> Self {
        self.static_limit = static_limit;
        self
    }

    #[must_use]
    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }

    #[must_use]
    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_controller_steps(mut self, decrease_factor: f64, increase_step: f64) -> Self {
        self.decrease_factor = decrease_factor;
        self.increase_step = increase_step;
        self
    }

    /// Check every field. Returns the first violation found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_smoothing(self.alpha, self.beta)?;
        validate_interval_bounds(self.t_min, self.t_max)?;
        validate_thresholds(self.enter_high, self.exit_high)?;
        self.weights.validate()?;
        self.scales.validate()?;
        validate_controller_steps(self.decrease_factor, self.increase_step)?;
        if !self.static_limit.is_finite() {
            return Err(ConfigError::invalid(
                "static_limit",
                self.static_limit,
                "must be finite",
            ));
        }
        if self.window_size == 0 {
            return Err(ConfigError::invalid("window_size", 0, "must be >= 1"));
        }
        if self.buffer_capacity == 0 {
            return Err(ConfigError::invalid("buffer_capacity", 0, "must be >= 1"));
        }
        if !self.jump_label_threshold.is_finite() || self.jump_label_threshold < 0.0 {
            return Err(ConfigError::invalid(
                "jump_label_threshold",
                self.jump_label_threshold,
                "must be finite and >= 0",
            ));
        }
        Ok(())
    }
}

pub(crate) fn validate_smoothing(alpha: f64, beta: f64) -> Result<(), ConfigError> {
    if !(alpha > 0.0 && alpha < 1.0) {
        return Err(ConfigError::invalid("alpha", alpha, "must be in (0, 1)"));
    }
    if !(beta > 0.0 && beta < 1.0) {
        return Err(ConfigError::invalid("beta", beta, "must be in (0, 1)"));
    }
    Ok(())
}

pub(crate) fn validate_interval_bounds(t_min: f64, t_max: f64) -> Result<(), ConfigError> {
    if !t_min.is_finite() || t_min < 0.0 {
        return Err(ConfigError::invalid("t_min", t_min, "must be finite and >= 0"));
    }
    if !t_max.is_finite() || t_max <= t_min {
        return Err(ConfigError::invalid("t_max", t_max, "must be finite and > t_min"));
    }
    Ok(())
}

pub(crate) fn validate_thresholds(enter_high: f64, exit_high: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&enter_high) {
        return Err(ConfigError::invalid(
            "enter_high",
            enter_high,
            "must be in [0, 1]",
        ));
    }
    if !(exit_high >= 0.0 && exit_high < enter_high) {
        return Err(ConfigError::invalid(
            "exit_high",
            exit_high,
            "must be >= 0 and strictly below enter_high",
        ));
    }
    Ok(())
}

pub(crate) fn validate_controller_steps(
    decrease_factor: f64,
    increase_step: f64,
) -> Result<(), ConfigError> {
    if !(decrease_factor > 0.0 && decrease_factor < 1.0) {
        return Err(ConfigError::invalid(
            "decrease_factor",
            decrease_factor,
            "must be in (0, 1)",
        ));
    }
    if !increase_step.is_finite() || increase_step <= 0.0 {
        return Err(ConfigError::invalid(
            "increase_step",
            increase_step,
            "must be finite and > 0",
        ));
    }
    Ok(())
}
