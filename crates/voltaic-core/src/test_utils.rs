//! Shared test helpers for unit tests, integration tests, and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use std::collections::BTreeMap;

use crate::component::{Component, StateDelta, StateValue};
use crate::config::SimConfig;
use crate::device::{DcVoltageSource, Device, Ground, Resistor};
use crate::id::{ComponentId, TerminalRef};
use crate::simulator::Simulator;

// ===========================================================================
// Numeric helpers
// ===========================================================================

/// Absolute tolerance used by [`assert_close`].
pub const TOLERANCE: f64 = 1e-9;

#[track_caller]
pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() <= TOLERANCE,
        "expected {expected}, got {actual}"
    );
}

// ===========================================================================
// Delta accessors
// ===========================================================================

fn nested(delta: &StateDelta, category: &str, key: &str) -> f64 {
    match delta.get(category) {
        Some(StateValue::Nested(map)) => map.get(key).copied().unwrap_or_else(|| {
            panic!("delta has no {category}.{key}");
        }),
        other => panic!("delta {category} is {other:?}, not a nested map"),
    }
}

#[track_caller]
pub fn delta_current(delta: &StateDelta, terminal: &str) -> f64 {
    nested(delta, crate::component::keys::CURRENTS, terminal)
}

#[track_caller]
pub fn delta_voltage(delta: &StateDelta, terminal: &str) -> f64 {
    nested(delta, crate::component::keys::VOLTAGES, terminal)
}

#[track_caller]
pub fn delta_scalar(delta: &StateDelta, category: &str) -> f64 {
    delta
        .get(category)
        .and_then(StateValue::as_number)
        .unwrap_or_else(|| panic!("delta has no numeric {category}"))
}

// ===========================================================================
// Simulators
// ===========================================================================

/// A started simulator with the default configuration.
pub fn running_sim() -> Simulator {
    let mut sim = Simulator::new(SimConfig::default());
    sim.start();
    sim
}

/// One device under test with every terminal on its own node, next to an
/// unconnected ground so none of its terminals becomes the reference.
/// Terminal voltages are set with [`hold`](DeviceBench::hold).
pub struct DeviceBench {
    pub sim: Simulator,
    pub id: ComponentId,
}

impl DeviceBench {
    pub fn new(device: impl Into<Device>) -> Self {
        let mut sim = running_sim();
        let id = ComponentId(1);
        sim.add_component(Component::new(ComponentId(0), Ground::default()));
        sim.add_component(Component::new(id, device));
        sim.build_circuit();
        Self { sim, id }
    }

    /// Set the node voltage at one of the device's terminals.
    #[track_caller]
    pub fn hold(&mut self, terminal: &str, volts: f64) -> &mut Self {
        assert!(
            self.sim.set_terminal_voltage(self.id, terminal, volts),
            "no terminal {terminal}"
        );
        self
    }

    /// Run the compute phase only.
    pub fn calculate(&self, dt: f64) -> StateDelta {
        self.sim
            .calculate_component(self.id, dt)
            .unwrap_or_else(|| panic!("device {} missing", self.id))
    }

    /// Run one full step of `dt` seconds.
    pub fn step(&mut self, dt: f64) {
        self.sim.update(Some(dt));
    }

    pub fn component(&self) -> &Component {
        self.sim
            .component(self.id)
            .unwrap_or_else(|| panic!("device {} missing", self.id))
    }
}

// ===========================================================================
// Component sets
// ===========================================================================

/// Link two terminals in both directions, as `Simulator::connect` does.
pub fn link_pair(set: &mut BTreeMap<ComponentId, Component>, a: TerminalRef, b: TerminalRef) {
    if let Some(c) = set.get_mut(&a.component) {
        c.link(&a.terminal, b.clone());
    }
    if let Some(c) = set.get_mut(&b.component) {
        c.link(&b.terminal, a);
    }
}

/// A resistor ladder: a 10 V source feeding `rungs` series resistors, with
/// a shunt resistor from every junction to ground. Built and started.
///
/// Ids: 0 is the source, 1 is ground, then series/shunt pairs.
pub fn resistor_ladder(rungs: usize) -> Simulator {
    let mut sim = running_sim();
    let source = ComponentId(0);
    let ground = ComponentId(1);
    sim.add_component(Component::new(source, DcVoltageSource::new(10.0)));
    sim.add_component(Component::new(ground, Ground::default()));
    sim.connect(source, "neg", ground, "gnd");

    let mut feed = (source, "pos");
    for rung in 0..rungs as u32 {
        let series = ComponentId(2 + 2 * rung);
        let shunt = ComponentId(3 + 2 * rung);
        sim.add_component(Component::new(series, Resistor::new(1000.0)));
        sim.add_component(Component::new(shunt, Resistor::new(2000.0)));
        sim.connect(feed.0, feed.1, series, "p1");
        sim.connect(series, "p2", shunt, "p1");
        sim.connect(shunt, "p2", ground, "gnd");
        feed = (series, "p2");
    }
    sim.build_circuit();
    sim
}
