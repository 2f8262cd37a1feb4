//! Simulator configuration and device defaults.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Device defaults
// ---------------------------------------------------------------------------

/// Default fixed time step in seconds.
pub const DEFAULT_TIME_STEP: f64 = 0.001;
/// Default number of samples kept per history ring.
pub const DEFAULT_HISTORY_LENGTH: usize = 1000;
/// Node current sums above this magnitude (amps) are reported.
pub const DEFAULT_CURRENT_EPSILON: f64 = 1e-9;

pub const DEFAULT_RESISTANCE: f64 = 1000.0;
pub const DEFAULT_CAPACITANCE: f64 = 1e-6;
pub const DEFAULT_INDUCTANCE: f64 = 1e-3;
pub const DEFAULT_VOLTAGE: f64 = 5.0;
pub const DEFAULT_CURRENT: f64 = 0.01;
pub const DEFAULT_FREQUENCY: f64 = 1000.0;

/// Room temperature reported by resistors that dissipate nothing.
pub const AMBIENT_TEMPERATURE: f64 = 25.0;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A configuration value outside its valid range.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("time step must be positive and finite, got {0}")]
    InvalidTimeStep(f64),
    #[error("history length must be at least 1")]
    ZeroHistoryLength,
    #[error("current epsilon must be non-negative, got {0}")]
    InvalidEpsilon(f64),
    #[error("fps smoothing must be in (0, 1], got {0}")]
    InvalidSmoothing(f64),
}

// ---------------------------------------------------------------------------
// SimConfig
// ---------------------------------------------------------------------------

/// Tunables for a [`Simulator`](crate::simulator::Simulator).
///
/// Every field has a default, so partial config files deserialize cleanly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Fixed step used when `update` is called without an elapsed time.
    pub time_step: f64,
    /// Maximum samples per history ring.
    pub history_length: usize,
    /// Threshold for the per-node current conservation check.
    pub current_epsilon: f64,
    /// Weight of the newest sample in the fps moving average.
    pub fps_smoothing: f64,
    /// Number of recent events kept by the event bus.
    pub event_log_capacity: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            time_step: DEFAULT_TIME_STEP,
            history_length: DEFAULT_HISTORY_LENGTH,
            current_epsilon: DEFAULT_CURRENT_EPSILON,
            fps_smoothing: 0.1,
            event_log_capacity: 256,
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.time_step.is_finite() || self.time_step <= 0.0 {
            return Err(ConfigError::InvalidTimeStep(self.time_step));
        }
        if self.history_length == 0 {
            return Err(ConfigError::ZeroHistoryLength);
        }
        if self.current_epsilon.is_nan() || self.current_epsilon < 0.0 {
            return Err(ConfigError::InvalidEpsilon(self.current_epsilon));
        }
        if self.fps_smoothing.is_nan() || self.fps_smoothing <= 0.0 || self.fps_smoothing > 1.0 {
            return Err(ConfigError::InvalidSmoothing(self.fps_smoothing));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SimConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.time_step, 0.001);
        assert_eq!(config.history_length, 1000);
    }

    #[test]
    fn rejects_bad_values() {
        let mut config = SimConfig::default();
        config.time_step = 0.0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidTimeStep(0.0)));

        let mut config = SimConfig::default();
        config.time_step = f64::NAN;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTimeStep(_))
        ));

        let mut config = SimConfig::default();
        config.history_length = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroHistoryLength));

        let mut config = SimConfig::default();
        config.fps_smoothing = 1.5;
        assert_eq!(config.validate(), Err(ConfigError::InvalidSmoothing(1.5)));

        let mut config = SimConfig::default();
        config.current_epsilon = -1.0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidEpsilon(-1.0)));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: SimConfig = serde_json::from_str(r#"{"time_step": 0.01}"#).unwrap();
        assert_eq!(config.time_step, 0.01);
        assert_eq!(config.history_length, DEFAULT_HISTORY_LENGTH);
        assert_eq!(config.event_log_capacity, 256);
    }
}
