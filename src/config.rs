use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tuning knobs for the solver.
///
/// The setters reject values which aren't strictly positive and leave the
/// previous value in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    step: f64,
    max_iterations: usize,
    accuracy: u32,
    max_time: Duration,
    max_variables_per_block: usize,
}

impl SolverConfig {
    pub const DEFAULT_STEP: f64 = 0.01;
    pub const DEFAULT_MAX_ITERATIONS: usize = 100;
    pub const DEFAULT_ACCURACY: u32 = 4;
    pub const DEFAULT_MAX_TIME: Duration = Duration::from_secs(60);
    pub const DEFAULT_MAX_VARIABLES_PER_BLOCK: usize = 8;
    /// Rounding to more places than this overflows the `10^accuracy` scale.
    pub const MAX_ACCURACY: u32 = f64::MAX_10_EXP as u32;

    /// The finite difference step used when approximating derivatives.
    pub fn step(&self) -> f64 { self.step }

    /// The number of Newton-Raphson corrections a block may take.
    pub fn max_iterations(&self) -> usize { self.max_iterations }

    /// The number of decimal places residuals and results are rounded to.
    pub fn accuracy(&self) -> u32 { self.accuracy }

    /// The wall-clock budget for a single solve.
    pub fn max_time(&self) -> Duration { self.max_time }

    pub fn max_variables_per_block(&self) -> usize {
        self.max_variables_per_block
    }

    pub fn set_step(&mut self, step: f64) -> Result<(), ConfigError> {
        // written this way so NaN gets rejected too
        if !(step > 0.0 && step.is_finite()) {
            return Err(ConfigError::not_positive("step", step));
        }

        self.step = step;
        Ok(())
    }

    pub fn set_max_iterations(
        &mut self,
        max_iterations: usize,
    ) -> Result<(), ConfigError> {
        if max_iterations == 0 {
            return Err(ConfigError::not_positive(
                "maximum iterations",
                max_iterations,
            ));
        }

        self.max_iterations = max_iterations;
        Ok(())
    }

    pub fn set_accuracy(&mut self, accuracy: u32) -> Result<(), ConfigError> {
        if accuracy == 0 {
            return Err(ConfigError::not_positive("accuracy", accuracy));
        }
        if accuracy > SolverConfig::MAX_ACCURACY {
            return Err(ConfigError::TooLarge {
                setting: "accuracy",
                value: accuracy.to_string(),
                max: SolverConfig::MAX_ACCURACY.to_string(),
            });
        }

        self.accuracy = accuracy;
        Ok(())
    }

    pub fn set_max_time(&mut self, max_time: Duration) -> Result<(), ConfigError> {
        if max_time == Duration::from_secs(0) {
            return Err(ConfigError::not_positive(
                "maximum time",
                format!("{:?}", max_time),
            ));
        }

        self.max_time = max_time;
        Ok(())
    }

    pub fn set_max_variables_per_block(
        &mut self,
        max_variables: usize,
    ) -> Result<(), ConfigError> {
        if max_variables == 0 {
            return Err(ConfigError::not_positive(
                "maximum variables",
                max_variables,
            ));
        }

        self.max_variables_per_block = max_variables;
        Ok(())
    }

    /// Check a config which didn't go through the setters (e.g. one that was
    /// deserialized).
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut copy = SolverConfig::default();
        copy.set_step(self.step)?;
        copy.set_max_iterations(self.max_iterations)?;
        copy.set_accuracy(self.accuracy)?;
        copy.set_max_time(self.max_time)?;
        copy.set_max_variables_per_block(self.max_variables_per_block)?;

        Ok(())
    }
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            step: SolverConfig::DEFAULT_STEP,
            max_iterations: SolverConfig::DEFAULT_MAX_ITERATIONS,
            accuracy: SolverConfig::DEFAULT_ACCURACY,
            max_time: SolverConfig::DEFAULT_MAX_TIME,
            max_variables_per_block:
                SolverConfig::DEFAULT_MAX_VARIABLES_PER_BLOCK,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{value} is an invalid number for {setting}")]
    NotPositive {
        setting: &'static str,
        value: String,
    },
    #[error("{value} is too large for {setting} (the maximum is {max})")]
    TooLarge {
        setting: &'static str,
        value: String,
        max: String,
    },
}

impl ConfigError {
    fn not_positive<V: ToString>(setting: &'static str, value: V) -> Self {
        ConfigError::NotPositive {
            setting,
            value: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SolverConfig::default();

        assert_eq!(config.step(), 0.01);
        assert_eq!(config.max_iterations(), 100);
        assert_eq!(config.accuracy(), 4);
        assert_eq!(config.max_time(), Duration::from_secs(60));
        assert_eq!(config.max_variables_per_block(), 8);
    }

    #[test]
    fn invalid_values_are_rejected_and_ignored() {
        let mut config = SolverConfig::default();

        let err = config.set_step(-0.5).unwrap_err();
        assert_eq!(err.to_string(), "-0.5 is an invalid number for step");
        assert!(config.set_step(f64::NAN).is_err());
        assert!(config.set_max_iterations(0).is_err());
        assert!(config.set_accuracy(0).is_err());
        assert!(config.set_max_time(Duration::from_secs(0)).is_err());
        assert!(config.set_max_variables_per_block(0).is_err());

        assert_eq!(config, SolverConfig::default());
    }

    #[test]
    fn accuracy_is_capped_where_rounding_still_works() {
        let mut config = SolverConfig::default();

        let err = config.set_accuracy(400).unwrap_err();
        assert_eq!(
            err.to_string(),
            "400 is too large for accuracy (the maximum is 308)"
        );
        assert!(config.set_accuracy(309).is_err());
        assert_eq!(config.accuracy(), SolverConfig::DEFAULT_ACCURACY);

        config.set_accuracy(SolverConfig::MAX_ACCURACY).unwrap();
        assert!(10_f64.powi(config.accuracy() as i32).is_finite());
    }

    #[test]
    fn valid_values_are_applied() {
        let mut config = SolverConfig::default();

        config.set_step(0.001).unwrap();
        config.set_max_iterations(10).unwrap();
        config.set_accuracy(6).unwrap();

        assert_eq!(config.step(), 0.001);
        assert_eq!(config.max_iterations(), 10);
        assert_eq!(config.accuracy(), 6);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: SolverConfig =
            serde_json::from_str(r#"{ "accuracy": 2 }"#).unwrap();

        assert_eq!(config.accuracy(), 2);
        assert_eq!(config.step(), SolverConfig::DEFAULT_STEP);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn deserialized_configs_can_be_validated() {
        let config: SolverConfig =
            serde_json::from_str(r#"{ "max_iterations": 0 }"#).unwrap();

        assert!(config.validate().is_err());
    }
}
