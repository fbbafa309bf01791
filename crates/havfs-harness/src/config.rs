//! Scheduler configuration loading for the harness.
//!
//! Precedence, lowest first: built-in defaults, JSON config file, CLI
//! interval overrides. The merged result is validated before use.

use std::path::Path;

use havfs_core::SchedulerConfig;

use crate::error::HarnessError;

/// Interval bounds given on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IntervalOverrides {
    pub t_min: Option<f64>,
    pub t_max: Option<f64>,
}

/// Parse a JSON config document. Missing fields take defaults.
pub fn parse_scheduler_config(json: &str) -> Result<SchedulerConfig, HarnessError> {
    Ok(serde_json::from_str(json)?)
}

/// Load `path`, or the defaults when no file is given.
pub fn load_scheduler_config(path: Option<&Path>) -> Result<SchedulerConfig, HarnessError> {
    match path {
        Some(p) => parse_scheduler_config(&std::fs::read_to_string(p)?),
        None => Ok(SchedulerConfig::default()),
    }
}

/// Apply overrides and validate.
pub fn resolve(
    mut config: SchedulerConfig,
    overrides: IntervalOverrides,
) -> Result<SchedulerConfig, HarnessError> {
    if let Some(t_min) = overrides.t_min {
        config.t_min = t_min;
    }
    if let Some(t_max) = overrides.t_max {
        config.t_max = t_max;
    }
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = parse_scheduler_config(r#"{"t_min": 0.25, "enter_high": 0.5}"#).unwrap();
        assert_eq!(cfg.t_min, 0.25);
        assert_eq!(cfg.enter_high, 0.5);
        assert_eq!(cfg.t_max, SchedulerConfig::default().t_max);
        assert_eq!(cfg.window_size, 10);
    }

    #[test]
    fn overrides_win_and_are_validated() {
        let cfg = resolve(
            SchedulerConfig::default(),
            IntervalOverrides {
                t_min: Some(1.0),
                t_max: Some(10.0),
            },
        )
        .unwrap();
        assert_eq!((cfg.t_min, cfg.t_max), (1.0, 10.0));

        let err = resolve(
            SchedulerConfig::default(),
            IntervalOverrides {
                t_min: Some(6.0),
                t_max: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, HarnessError::Config(_)));
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(
            parse_scheduler_config("{ t_min: }"),
            Err(HarnessError::Json(_))
        ));
    }

    #[test]
    fn no_file_means_defaults() {
        assert_eq!(load_scheduler_config(None).unwrap(), SchedulerConfig::default());
    }
}
