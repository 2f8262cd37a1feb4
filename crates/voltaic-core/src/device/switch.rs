use serde::{Deserialize, Serialize};

use super::{TerminalSpec, limit_magnitude};
use crate::component::{ComponentState, StateDelta, StateValue, keys};
use crate::view::DeviceContext;

/// Contact resistance of a closed switch.
const CLOSED_RESISTANCE: f64 = 0.01;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Switch {
    #[serde(alias = "state")]
    pub closed: bool,
    pub max_current: f64,
}

impl Default for Switch {
    fn default() -> Self {
        Self {
            closed: false,
            max_current: 5.0,
        }
    }
}

impl Switch {
    pub const TERMINALS: &'static [TerminalSpec] = &[
        TerminalSpec::new("p1", -1.0, 0.0),
        TerminalSpec::new("p2", 1.0, 0.0),
    ];

    pub fn closed() -> Self {
        Self {
            closed: true,
            ..Self::default()
        }
    }

    pub fn toggle(&mut self) {
        self.closed = !self.closed;
    }

    pub(crate) fn default_state(&self) -> ComponentState {
        ComponentState::new()
            .with_terminals(&["p1", "p2"])
            .with(keys::CLOSED, StateValue::Flag(self.closed))
    }

    pub(crate) fn calculate(&self, ctx: &DeviceContext<'_>) -> StateDelta {
        let v1 = ctx.voltage("p1");
        let v2 = ctx.voltage("p2");
        let current = if self.closed {
            limit_magnitude((v1 - v2) / CLOSED_RESISTANCE, self.max_current)
        } else {
            0.0
        };
        StateDelta::new()
            .voltage("p1", v1)
            .voltage("p2", v2)
            .current("p1", current)
            .current("p2", -current)
            .flag(keys::CLOSED, self.closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Device;
    use crate::test_utils::*;

    #[test]
    fn open_switch_carries_nothing() {
        let mut bench = DeviceBench::new(Switch::default());
        bench.hold("p1", 5.0);
        let delta = bench.calculate(0.001);
        assert_eq!(delta_current(&delta, "p1"), 0.0);
        assert_eq!(delta.get(keys::CLOSED), Some(&StateValue::Flag(false)));
    }

    #[test]
    fn closed_switch_conducts_with_limit() {
        let mut bench = DeviceBench::new(Switch::closed());
        bench.hold("p1", 0.01);
        let delta = bench.calculate(0.001);
        assert_close(delta_current(&delta, "p1"), 1.0);

        bench.hold("p1", -5.0);
        let delta = bench.calculate(0.001);
        assert_close(delta_current(&delta, "p1"), -5.0);
    }

    #[test]
    fn toggling_takes_effect_on_next_step() {
        let mut bench = DeviceBench::new(Switch::default());
        bench.hold("p1", 0.01);
        bench.step(0.001);
        assert_eq!(bench.component().state().current("p1"), Some(0.0));

        if let Some(Device::Switch(s)) = bench.sim.device_mut(bench.id) {
            s.toggle();
        }
        bench.step(0.001);
        assert_close(bench.component().state().current("p1").unwrap(), 1.0);
        assert_eq!(bench.component().state().flag(keys::CLOSED), Some(true));
    }

    #[test]
    fn legacy_state_property_name_is_accepted() {
        let s: Switch = serde_json::from_str(r#"{"state": true}"#).unwrap();
        assert!(s.closed);
    }
}
