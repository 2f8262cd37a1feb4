use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};

use super::{TerminalSpec, limit_magnitude};
use crate::component::{ComponentState, StateDelta, keys};
use crate::config::{DEFAULT_CURRENT, DEFAULT_FREQUENCY, DEFAULT_VOLTAGE};
use crate::view::DeviceContext;

const SOURCE_TERMINALS: &[TerminalSpec] = &[
    TerminalSpec::new("pos", 0.0, 1.5),
    TerminalSpec::new("neg", 0.0, -1.5),
];

/// Load assumed behind a current source once it hits its compliance limit.
const NOMINAL_LOAD_OHMS: f64 = 1000.0;

/// Current a voltage source delivers: whatever the rest of its positive
/// node draws, with the sign flipped.
fn source_current(ctx: &DeviceContext<'_>, max_current: f64) -> f64 {
    limit_magnitude(-ctx.peer_current("pos"), max_current)
}

// ---------------------------------------------------------------------------
// DC voltage source
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DcVoltageSource {
    pub voltage: f64,
    pub max_current: f64,
}

impl Default for DcVoltageSource {
    fn default() -> Self {
        Self {
            voltage: DEFAULT_VOLTAGE,
            max_current: 1.0,
        }
    }
}

impl DcVoltageSource {
    pub const TERMINALS: &'static [TerminalSpec] = SOURCE_TERMINALS;

    pub fn new(voltage: f64) -> Self {
        Self {
            voltage,
            ..Self::default()
        }
    }

    pub(crate) fn default_state(&self) -> ComponentState {
        ComponentState::new()
            .with_terminals(&["pos", "neg"])
            .with_scalar(keys::POWER, 0.0)
    }

    pub(crate) fn calculate(&self, ctx: &DeviceContext<'_>) -> StateDelta {
        let current = source_current(ctx, self.max_current);
        StateDelta::new()
            .voltage("pos", self.voltage)
            .voltage("neg", 0.0)
            .current("pos", current)
            .current("neg", -current)
            .scalar(keys::POWER, self.voltage * current)
            .drive("pos", self.voltage)
            .drive("neg", 0.0)
    }
}

// ---------------------------------------------------------------------------
// AC voltage source
// ---------------------------------------------------------------------------

/// Sinusoidal source: `v(t) = amplitude * sin(2*pi*frequency*t + phase)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcVoltageSource {
    pub amplitude: f64,
    /// Hertz.
    pub frequency: f64,
    /// Degrees.
    pub phase: f64,
    pub max_current: f64,
}

impl Default for AcVoltageSource {
    fn default() -> Self {
        Self {
            amplitude: DEFAULT_VOLTAGE,
            frequency: DEFAULT_FREQUENCY,
            phase: 0.0,
            max_current: 1.0,
        }
    }
}

impl AcVoltageSource {
    pub const TERMINALS: &'static [TerminalSpec] = SOURCE_TERMINALS;

    pub fn new(amplitude: f64, frequency: f64) -> Self {
        Self {
            amplitude,
            frequency,
            ..Self::default()
        }
    }

    pub fn voltage_at(&self, time: f64) -> f64 {
        self.amplitude * (TAU * self.frequency * time + self.phase.to_radians()).sin()
    }

    pub(crate) fn default_state(&self) -> ComponentState {
        ComponentState::new()
            .with_terminals(&["pos", "neg"])
            .with_scalar(keys::POWER, 0.0)
            .with_scalar(keys::INSTANTANEOUS_VOLTAGE, 0.0)
            .with_scalar(keys::TIME, 0.0)
    }

    /// Evaluated at the end of the step being computed.
    pub(crate) fn calculate(&self, ctx: &DeviceContext<'_>) -> StateDelta {
        let time = ctx.simulation_time() + ctx.dt();
        let voltage = self.voltage_at(time);
        let current = source_current(ctx, self.max_current);
        StateDelta::new()
            .voltage("pos", voltage)
            .voltage("neg", 0.0)
            .current("pos", current)
            .current("neg", -current)
            .scalar(keys::POWER, voltage * current)
            .scalar(keys::INSTANTANEOUS_VOLTAGE, voltage)
            .scalar(keys::TIME, time)
            .drive("pos", voltage)
            .drive("neg", 0.0)
    }
}

// ---------------------------------------------------------------------------
// DC current source
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DcCurrentSource {
    pub current: f64,
    /// Compliance voltage.
    pub max_voltage: f64,
}

impl Default for DcCurrentSource {
    fn default() -> Self {
        Self {
            current: DEFAULT_CURRENT,
            max_voltage: 12.0,
        }
    }
}

impl DcCurrentSource {
    pub const TERMINALS: &'static [TerminalSpec] = SOURCE_TERMINALS;

    pub fn new(current: f64) -> Self {
        Self {
            current,
            ..Self::default()
        }
    }

    pub(crate) fn default_state(&self) -> ComponentState {
        ComponentState::new()
            .with_terminals(&["pos", "neg"])
            .with_scalar(keys::POWER, 0.0)
            .with_scalar(keys::NUM_POS_CONNECTIONS, 0.0)
            .with_scalar(keys::NUM_NEG_CONNECTIONS, 0.0)
    }

    /// Pushes the configured current until the drop across it exceeds the
    /// compliance voltage, then behaves as a clamped voltage into a
    /// nominal load.
    pub(crate) fn calculate(&self, ctx: &DeviceContext<'_>) -> StateDelta {
        let v_neg = ctx.voltage("neg");
        let mut v_pos = ctx.voltage("pos");
        let mut drop = v_pos - v_neg;
        let mut current = self.current;
        if drop.abs() > self.max_voltage {
            drop = self.max_voltage.copysign(drop);
            v_pos = v_neg + drop;
            current = drop / NOMINAL_LOAD_OHMS;
        }
        StateDelta::new()
            .voltage("pos", v_pos)
            .voltage("neg", v_neg)
            .current("pos", current)
            .current("neg", -current)
            .scalar(keys::POWER, drop * current)
            .scalar(keys::NUM_POS_CONNECTIONS, ctx.link_count("pos") as f64)
            .scalar(keys::NUM_NEG_CONNECTIONS, ctx.link_count("neg") as f64)
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Component;
    use crate::device::Resistor;
    use crate::id::ComponentId;
    use crate::test_utils::*;

    #[test]
    fn dc_source_drives_its_terminals() {
        let bench = DeviceBench::new(DcVoltageSource::new(9.0));
        let delta = bench.calculate(0.001);
        assert_eq!(delta.drives().len(), 2);
        assert_eq!(delta.drives()[0].terminal, "pos");
        assert_eq!(delta.drives()[0].volts, 9.0);
        assert_eq!(delta.drives()[1].volts, 0.0);
    }

    #[test]
    fn dc_source_node_takes_voltage_after_commit() {
        let mut bench = DeviceBench::new(DcVoltageSource::new(9.0));
        bench.step(0.001);
        assert_eq!(bench.sim.voltage_at(bench.id, "pos"), 9.0);
        assert_eq!(bench.sim.voltage_at(bench.id, "neg"), 0.0);
    }

    #[test]
    fn dc_source_supplies_what_its_node_draws() {
        let mut sim = running_sim();
        let src = ComponentId(1);
        let r = ComponentId(2);
        sim.add_component(Component::new(src, DcVoltageSource::new(5.0)));
        sim.add_component(Component::new(r, Resistor::new(1000.0)));
        sim.connect(src, "pos", r, "p1");
        sim.connect(src, "neg", r, "p2");
        // step 1 drives the node; step 2 the resistor conducts; step 3 the
        // source sees the resistor's committed current
        for _ in 0..3 {
            sim.update(None);
        }
        assert_close(sim.current_at(r, "p1"), 0.005);
        assert_close(sim.current_at(src, "pos"), -0.005);
        assert_close(
            sim.component(src).unwrap().state().scalar(keys::POWER).unwrap(),
            -0.025,
        );
    }

    #[test]
    fn dc_source_current_is_limited() {
        let mut sim = running_sim();
        let src = ComponentId(1);
        let r = ComponentId(2);
        let mut source = DcVoltageSource::new(5.0);
        source.max_current = 0.001;
        sim.add_component(Component::new(src, source));
        sim.add_component(Component::new(r, Resistor::new(10.0)));
        sim.connect(src, "pos", r, "p1");
        sim.connect(src, "neg", r, "p2");
        for _ in 0..3 {
            sim.update(None);
        }
        assert_close(sim.current_at(src, "pos"), -0.001);
    }

    #[test]
    fn ac_source_evaluates_at_end_of_step() {
        let source = AcVoltageSource::new(10.0, 250.0);
        let bench = DeviceBench::new(source.clone());
        let delta = bench.calculate(0.001);
        // quarter period of 250 Hz is 1 ms
        assert_close(delta_scalar(&delta, keys::INSTANTANEOUS_VOLTAGE), 10.0);
        assert_close(delta_scalar(&delta, keys::TIME), 0.001);
        assert_close(source.voltage_at(0.002), 0.0);
    }

    #[test]
    fn ac_source_phase_is_in_degrees() {
        let mut source = AcVoltageSource::new(2.0, 50.0);
        source.phase = 90.0;
        assert_close(source.voltage_at(0.0), 2.0);
    }

    #[test]
    fn current_source_within_compliance() {
        let mut bench = DeviceBench::new(DcCurrentSource::new(0.02));
        bench.hold("pos", 3.0);
        let delta = bench.calculate(0.001);
        assert_close(delta_current(&delta, "pos"), 0.02);
        assert_close(delta_current(&delta, "neg"), -0.02);
        assert_close(delta_scalar(&delta, keys::POWER), 0.06);
    }

    #[test]
    fn current_source_clamps_at_compliance() {
        let mut bench = DeviceBench::new(DcCurrentSource::new(0.02));
        bench.hold("pos", 20.0);
        let delta = bench.calculate(0.001);
        assert_close(delta_voltage(&delta, "pos"), 12.0);
        assert_close(delta_current(&delta, "pos"), 0.012);
    }

    #[test]
    fn current_source_counts_links() {
        let mut sim = running_sim();
        let src = ComponentId(1);
        sim.add_component(Component::new(src, DcCurrentSource::default()));
        sim.add_component(Component::new(ComponentId(2), Resistor::default()));
        sim.add_component(Component::new(ComponentId(3), Resistor::default()));
        sim.connect(src, "pos", ComponentId(2), "p1");
        sim.connect(src, "pos", ComponentId(3), "p1");
        sim.update(None);
        let state = sim.component(src).unwrap().state();
        assert_eq!(state.scalar(keys::NUM_POS_CONNECTIONS), Some(2.0));
        assert_eq!(state.scalar(keys::NUM_NEG_CONNECTIONS), Some(0.0));
    }
}
