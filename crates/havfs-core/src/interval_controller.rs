//! # Hybrid interval controller
//!
//! Maps fused risk to a sampling interval in two stages.
//!
//! **Stage 1, continuous mapping.** Risk 0 maps to `t_max`, risk 1 to
//! `t_min`, linearly in between:
//!
//! ```text
//! target = t_max - risk * (t_max - t_min)
//! ```
//!
//! **Stage 2, asymmetric approach.** The live interval moves toward the
//! target at a bounded rate that differs by direction:
//!
//! - target below current (risk rising): multiplicative decrease,
//!   `current = max(target, current * decrease_factor)`. At most halves per
//!   cycle with the default factor and never undershoots the target.
//! - otherwise (risk falling): additive increase,
//!   `current = min(target, current + increase_step)`.
//!
//! Missing a spike costs more than over-sampling a calm period, so the
//! safety action (shrinking) is fast and the relaxing action is slow. This
//! is AIMD with the roles of increase and decrease swapped relative to
//! congestion control.
//!
//! Invariant: `t_min <= current <= t_max` after every step.

use crate::config::{ConfigError, validate_controller_steps, validate_interval_bounds};
use crate::risk_analyzer::FusedRisk;

/// Rate-limited risk→interval controller.
#[derive(Debug, Clone)]
pub struct HybridIntervalController {
    t_min: f64,
    t_max: f64,
    decrease_factor: f64,
    increase_step: f64,
    /// Live sampling interval, seconds.
    current: f64,
}

impl HybridIntervalController {
    /// Creates a controller starting at the slowest cadence, `t_max`.
    pub fn new(
        t_min: f64,
        t_max: f64,
        decrease_factor: f64,
        increase_step: f64,
    ) -> Result<Self, ConfigError> {
        validate_interval_bounds(t_min, t_max)?;
        validate_controller_steps(decrease_factor, increase_step)?;
        Ok(Self {
            t_min,
            t_max,
            decrease_factor,
            increase_step,
            current: t_max,
        })
    }

    /// Stage-1 target interval for a given risk.
    pub fn target_for(&self, risk: FusedRisk) -> f64 {
        let target = self.t_max - risk.value() * (self.t_max - self.t_min);
        target.clamp(self.t_min, self.t_max)
    }

    /// Advance one cycle and return the new interval.
    pub fn step(&mut self, risk: FusedRisk) -> f64 {
        let target = self.target_for(risk);
        let next = if target < self.current {
            target.max(self.current * self.decrease_factor)
        } else {
            target.min(self.current + self.increase_step)
        };
        self.current = next.clamp(self.t_min, self.t_max);
        self.current
    }

    /// Live sampling interval, seconds.
    pub fn current_interval(&self) -> f64 {
        self.current
    }

    /// Whether the controller sits at its slowest cadence.
    pub fn is_relaxed(&self) -> bool {
        self.current >= self.t_max
    }
}
