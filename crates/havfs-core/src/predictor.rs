//! # Trend predictor
//!
//! Holt linear trend (double exponential smoothing). Two recursive
//! estimates are kept: the smoothed baseline (`level`) and its per-step
//! slope (`trend`). The one-step-ahead forecast is `level + trend`.
//!
//! ```text
//! level_t = alpha * x_t + (1 - alpha) * (level_{t-1} + trend_{t-1})
//! trend_t = beta * (level_t - level_{t-1}) + (1 - beta) * trend_{t-1}
//! x̂_{t+1} = level_t + trend_t
//! ```
//!
//! The first observation seeds `level = x`, `trend = 0`, so a constant
//! signal is predicted exactly from the very first call onwards.

use crate::config::{ConfigError, validate_smoothing};

/// Holt double exponential smoothing over a scalar stream.
#[derive(Debug, Clone)]
pub struct TrendPredictor {
    alpha: f64,
    beta: f64,
    level: Option<f64>,
    trend: Option<f64>,
}

impl TrendPredictor {
    /// Creates a predictor. Both coefficients must lie strictly in (0, 1).
    pub fn new(alpha: f64, beta: f64) -> Result<Self, ConfigError> {
        validate_smoothing(alpha, beta)?;
        Ok(Self {
            alpha,
            beta,
            level: None,
            trend: None,
        })
    }

    /// Feed one observation, return the prediction for the next one.
    pub fn update(&mut self, x: f64) -> f64 {
        let (Some(level), Some(trend)) = (self.level, self.trend) else {
            self.level = Some(x);
            self.trend = Some(0.0);
            return x;
        };

        let next_level = self.alpha * x + (1.0 - self.alpha) * (level + trend);
        let next_trend = self.beta * (next_level - level) + (1.0 - self.beta) * trend;
        self.level = Some(next_level);
        self.trend = Some(next_trend);
        next_level + next_trend
    }

    /// Current smoothed baseline, `None` before the first observation.
    pub fn level(&self) -> Option<f64> {
        self.level
    }

    /// Current smoothed slope, `None` before the first observation.
    pub fn trend(&self) -> Option<f64> {
        self.trend
    }

    /// Forecast for the next observation without consuming one.
    pub fn forecast(&self) -> Option<f64> {
        Some(self.level? + self.trend?)
    }

    /// Forget all history.
    pub fn reset(&mut self) {
        self.level = None;
        self.trend = None;
    }
}
