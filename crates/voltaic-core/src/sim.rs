use serde::{Deserialize, Serialize};

use crate::component::StateValue;
use crate::profiling::StepProfile;

/// Lifecycle of a simulator: `Stopped -> Running <-> Paused -> Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RunState {
    #[default]
    Stopped,
    Running,
    Paused,
}

/// Statistics for one completed step, also carried by the update event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepStats {
    /// Steps completed since the last reset.
    pub iteration: u64,
    /// Simulated seconds this step advanced by.
    pub dt: f64,
    /// Simulated time after the step.
    pub simulation_time: f64,
    /// Smoothed steps per wall-clock second.
    pub fps: f64,
    /// Nodes whose current sum exceeded the conservation threshold.
    pub unbalanced_nodes: usize,
    pub profile: StepProfile,
}

/// Exponential moving average of `1 / interval`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FpsMeter {
    fps: f64,
}

impl FpsMeter {
    pub fn record(&mut self, interval: f64, smoothing: f64) {
        if interval > 0.0 && interval.is_finite() {
            self.fps = (1.0 - smoothing) * self.fps + smoothing / interval;
        }
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn reset(&mut self) {
        self.fps = 0.0;
    }
}

/// FNV-1a hash over simulation state, used to compare two runs for
/// determinism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateHash(pub u64);

impl StateHash {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    pub fn new() -> Self {
        Self(Self::FNV_OFFSET)
    }

    pub fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= b as u64;
            self.0 = self.0.wrapping_mul(Self::FNV_PRIME);
        }
    }

    pub fn write_u64(&mut self, v: u64) {
        self.write(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.write(&v.to_le_bytes());
    }

    /// Feed an f64 by bit pattern.
    pub fn write_f64(&mut self, v: f64) {
        self.write(&v.to_bits().to_le_bytes());
    }

    pub fn write_str(&mut self, s: &str) {
        self.write(s.as_bytes());
    }

    /// Feed a state value, tagged by variant so a flag never collides with
    /// a scalar of the same reading.
    pub fn write_state_value(&mut self, value: &StateValue) {
        match value {
            StateValue::Scalar(v) => {
                self.write(&[0]);
                self.write_f64(*v);
            }
            StateValue::Flag(b) => self.write(&[1, u8::from(*b)]),
            StateValue::Label(label) => {
                self.write(&[2]);
                self.write_str(label);
            }
            StateValue::Nested(map) => {
                self.write(&[3]);
                self.write_u64(map.len() as u64);
                for (key, v) in map {
                    self.write_str(key);
                    self.write_f64(*v);
                }
            }
        }
    }

    pub fn finish(self) -> u64 {
        self.0
    }
}

impl Default for StateHash {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_state_starts_stopped() {
        assert_eq!(RunState::default(), RunState::Stopped);
    }

    #[test]
    fn fps_moving_average() {
        let mut meter = FpsMeter::default();
        meter.record(0.01, 0.1);
        // 0.9 * 0 + 0.1 * 100
        assert!((meter.fps() - 10.0).abs() < 1e-9);
        meter.record(0.01, 0.1);
        assert!((meter.fps() - 19.0).abs() < 1e-9);
    }

    #[test]
    fn fps_ignores_degenerate_intervals() {
        let mut meter = FpsMeter::default();
        meter.record(0.0, 0.1);
        meter.record(-1.0, 0.1);
        meter.record(f64::INFINITY, 0.1);
        assert_eq!(meter.fps(), 0.0);
    }

    #[test]
    fn state_hash_deterministic() {
        let mut h1 = StateHash::new();
        h1.write_u64(42);
        h1.write_f64(0.5);

        let mut h2 = StateHash::new();
        h2.write_u64(42);
        h2.write_f64(0.5);

        assert_eq!(h1.finish(), h2.finish());
    }

    #[test]
    fn state_hash_differs_for_different_inputs() {
        let mut h1 = StateHash::new();
        h1.write_f64(1.0);

        let mut h2 = StateHash::new();
        h2.write_f64(-1.0);

        assert_ne!(h1.finish(), h2.finish());
    }

    #[test]
    fn state_hash_tags_value_variants() {
        let hash = |value: StateValue| {
            let mut h = StateHash::new();
            h.write_state_value(&value);
            h.finish()
        };
        assert_ne!(hash(StateValue::Flag(true)), hash(StateValue::Scalar(1.0)));
        assert_eq!(hash(StateValue::Flag(false)), hash(StateValue::Flag(false)));

        let nested = |key: &str| {
            StateValue::Nested([(key.to_string(), 0.5)].into_iter().collect())
        };
        assert_ne!(hash(nested("p1")), hash(nested("p2")));
        assert_eq!(hash(nested("p1")), hash(nested("p1")));
    }
}
