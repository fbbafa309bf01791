//! Two-threshold regime classifier.
//!
//! `Low -> High` requires `risk > enter_high`; `High -> Low` requires
//! `risk < exit_high`. Inside the dead band `[exit_high, enter_high]` the
//! regime holds whatever value it had, so risk hovering around a single
//! cutoff cannot make the label flap.

use crate::config::{ConfigError, validate_thresholds};
use crate::risk_analyzer::FusedRisk;

/// Coarse operating regime.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "UPPERCASE"))]
pub enum RegimeState {
    #[default]
    Low,
    High,
}

impl RegimeState {
    /// Stable uppercase label used in exported records.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::High => "HIGH",
        }
    }

    /// Parse from string (case-insensitive).
    #[must_use]
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

impl std::fmt::Display for RegimeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct HysteresisStateMachine {
    enter_high: f64,
    exit_high: f64,
    state: RegimeState,
    transitions: u64,
}

impl HysteresisStateMachine {
    /// Requires `0 <= exit_high < enter_high <= 1`.
    pub fn new(enter_high: f64, exit_high: f64) -> Result<Self, ConfigError> {
        validate_thresholds(enter_high, exit_high)?;
        Ok(Self {
            enter_high,
            exit_high,
            state: RegimeState::Low,
            transitions: 0,
        })
    }

    pub fn update(&mut self, risk: FusedRisk) -> RegimeState {
        let r = risk.value();
        let next = match self.state {
            RegimeState::Low if r > self.enter_high => RegimeState::High,
            RegimeState::High if r < self.exit_high => RegimeState::Low,
            current => current,
        };
        if next != self.state {
            self.transitions += 1;
            self.state = next;
        }
        self.state
    }

    pub fn state(&self) -> RegimeState {
        self.state
    }

    /// Number of regime changes since construction.
    pub fn transitions(&self) -> u64 {
        self.transitions
    }
}
