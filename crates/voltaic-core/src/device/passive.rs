use serde::{Deserialize, Serialize};

use super::TerminalSpec;
use crate::component::{ComponentState, StateDelta, keys};
use crate::config::{AMBIENT_TEMPERATURE, DEFAULT_CAPACITANCE, DEFAULT_INDUCTANCE, DEFAULT_RESISTANCE};
use crate::view::DeviceContext;

// ---------------------------------------------------------------------------
// Resistor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Resistor {
    /// Ohms.
    pub resistance: f64,
    /// Rated dissipation in watts; scales the reported temperature.
    pub max_power: f64,
}

impl Default for Resistor {
    fn default() -> Self {
        Self {
            resistance: DEFAULT_RESISTANCE,
            max_power: 0.25,
        }
    }
}

impl Resistor {
    pub const TERMINALS: &'static [TerminalSpec] = &[
        TerminalSpec::new("p1", -1.5, 0.0),
        TerminalSpec::new("p2", 1.5, 0.0),
    ];

    pub fn new(resistance: f64) -> Self {
        Self {
            resistance,
            ..Self::default()
        }
    }

    pub(crate) fn default_state(&self) -> ComponentState {
        ComponentState::new()
            .with_terminals(&["p1", "p2"])
            .with_scalar(keys::POWER, 0.0)
            .with_scalar(keys::TEMPERATURE, AMBIENT_TEMPERATURE)
    }

    /// Ohm's law across the two nodes; current flows p1 to p2.
    pub(crate) fn calculate(&self, ctx: &DeviceContext<'_>) -> StateDelta {
        let v1 = ctx.voltage("p1");
        let v2 = ctx.voltage("p2");
        let drop = v1 - v2;
        let current = if self.resistance > 0.0 {
            drop / self.resistance
        } else {
            0.0
        };
        let power = drop * current;
        let temperature = if power > 0.0 && self.max_power > 0.0 {
            AMBIENT_TEMPERATURE + (power / self.max_power) * 50.0
        } else {
            AMBIENT_TEMPERATURE
        };
        StateDelta::new()
            .voltage("p1", v1)
            .voltage("p2", v2)
            .current("p1", current)
            .current("p2", -current)
            .scalar(keys::POWER, power)
            .scalar(keys::TEMPERATURE, temperature)
    }
}

// ---------------------------------------------------------------------------
// Capacitor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capacitor {
    /// Farads.
    pub capacitance: f64,
    /// Voltage rating. Informational.
    pub max_voltage: f64,
}

impl Default for Capacitor {
    fn default() -> Self {
        Self {
            capacitance: DEFAULT_CAPACITANCE,
            max_voltage: 50.0,
        }
    }
}

impl Capacitor {
    pub const TERMINALS: &'static [TerminalSpec] = &[
        TerminalSpec::new("p1", -1.0, 0.0),
        TerminalSpec::new("p2", 1.0, 0.0),
    ];

    pub fn new(capacitance: f64) -> Self {
        Self {
            capacitance,
            ..Self::default()
        }
    }

    pub(crate) fn default_state(&self) -> ComponentState {
        ComponentState::new()
            .with_terminals(&["p1", "p2"])
            .with_scalar(keys::CHARGE, 0.0)
            .with_scalar(keys::ENERGY, 0.0)
    }

    /// Charge tracks `C * V`; current is the charge change over the step.
    pub(crate) fn calculate(&self, ctx: &DeviceContext<'_>) -> StateDelta {
        let v1 = ctx.voltage("p1");
        let v2 = ctx.voltage("p2");
        let drop = v1 - v2;
        let previous_charge = ctx.state().scalar(keys::CHARGE).unwrap_or(0.0);
        let charge = self.capacitance * drop;
        let dt = ctx.dt();
        let current = if dt > 0.0 {
            (charge - previous_charge) / dt
        } else {
            0.0
        };
        let energy = 0.5 * self.capacitance * drop * drop;
        StateDelta::new()
            .voltage("p1", v1)
            .voltage("p2", v2)
            .current("p1", current)
            .current("p2", -current)
            .scalar(keys::CHARGE, charge)
            .scalar(keys::ENERGY, energy)
    }
}

// ---------------------------------------------------------------------------
// Inductor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Inductor {
    /// Henries.
    pub inductance: f64,
    /// Current rating. Informational.
    pub max_current: f64,
}

impl Default for Inductor {
    fn default() -> Self {
        Self {
            inductance: DEFAULT_INDUCTANCE,
            max_current: 1.0,
        }
    }
}

impl Inductor {
    pub const TERMINALS: &'static [TerminalSpec] = &[
        TerminalSpec::new("p1", -1.5, 0.0),
        TerminalSpec::new("p2", 1.5, 0.0),
    ];

    pub fn new(inductance: f64) -> Self {
        Self {
            inductance,
            ..Self::default()
        }
    }

    pub(crate) fn default_state(&self) -> ComponentState {
        ComponentState::new()
            .with_terminals(&["p1", "p2"])
            .with_scalar(keys::FLUX, 0.0)
            .with_scalar(keys::ENERGY, 0.0)
    }

    /// Integrates `dI = V * dt / L` onto the last committed current.
    pub(crate) fn calculate(&self, ctx: &DeviceContext<'_>) -> StateDelta {
        let v1 = ctx.voltage("p1");
        let v2 = ctx.voltage("p2");
        let drop = v1 - v2;
        let increment = if self.inductance > 0.0 {
            drop * ctx.dt() / self.inductance
        } else {
            0.0
        };
        let current = ctx.state().current("p1").unwrap_or(0.0) + increment;
        let flux = self.inductance * current;
        let energy = 0.5 * self.inductance * current * current;
        StateDelta::new()
            .voltage("p1", v1)
            .voltage("p2", v2)
            .current("p1", current)
            .current("p2", -current)
            .scalar(keys::FLUX, flux)
            .scalar(keys::ENERGY, energy)
    }
}

// ---------------------------------------------------------------------------
// Ground
// ---------------------------------------------------------------------------

/// The 0 V reference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ground {}

impl Ground {
    pub const TERMINALS: &'static [TerminalSpec] = &[TerminalSpec::new("gnd", 0.0, -0.5)];

    pub(crate) fn default_state(&self) -> ComponentState {
        ComponentState::new().with_terminals(&["gnd"])
    }

    /// Sinks whatever the rest of its node delivers, so the node balances.
    pub(crate) fn calculate(&self, ctx: &DeviceContext<'_>) -> StateDelta {
        let current = -ctx.peer_current("gnd");
        StateDelta::new()
            .voltage("gnd", 0.0)
            .current("gnd", current)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
