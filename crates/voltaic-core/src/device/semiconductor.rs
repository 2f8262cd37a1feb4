use serde::{Deserialize, Serialize};

use super::TerminalSpec;
use crate::component::{ComponentState, StateDelta, StateValue, keys};
use crate::view::DeviceContext;

const JUNCTION_TERMINALS: &[TerminalSpec] = &[
    TerminalSpec::new("anode", -1.0, 0.0),
    TerminalSpec::new("cathode", 1.0, 0.0),
];

/// Series resistance of a conducting junction.
const ON_RESISTANCE: f64 = 0.1;

/// A junction turns on slightly below its nominal forward voltage.
const TURN_ON_FRACTION: f64 = 0.9;

/// Base-emitter path modeled as a fixed resistor.
const BASE_RESISTANCE: f64 = 1000.0;

/// Forward current through a junction, or `None` when it is off.
fn forward_current(drop: f64, forward_voltage: f64, max_current: f64) -> Option<f64> {
    (drop > forward_voltage * TURN_ON_FRACTION)
        .then(|| ((drop - forward_voltage) / ON_RESISTANCE).min(max_current))
}

fn junction_state() -> ComponentState {
    ComponentState::new()
        .with_terminals(&["anode", "cathode"])
        .with_scalar(keys::POWER, 0.0)
        .with(keys::CONDUCTING, StateValue::Flag(false))
}

// ---------------------------------------------------------------------------
// Diode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Diode {
    pub forward_voltage: f64,
    pub max_current: f64,
}

impl Default for Diode {
    fn default() -> Self {
        Self {
            forward_voltage: 0.7,
            max_current: 1.0,
        }
    }
}

impl Diode {
    pub const TERMINALS: &'static [TerminalSpec] = JUNCTION_TERMINALS;

    pub(crate) fn default_state(&self) -> ComponentState {
        junction_state()
    }

    pub(crate) fn calculate(&self, ctx: &DeviceContext<'_>) -> StateDelta {
        let va = ctx.voltage("anode");
        let vk = ctx.voltage("cathode");
        let drop = va - vk;
        let forward = forward_current(drop, self.forward_voltage, self.max_current);
        let current = forward.unwrap_or(0.0);
        StateDelta::new()
            .voltage("anode", va)
            .voltage("cathode", vk)
            .current("anode", current)
            .current("cathode", -current)
            .scalar(keys::POWER, drop * current)
            .flag(keys::CONDUCTING, forward.is_some())
    }
}

// ---------------------------------------------------------------------------
// LED
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Led {
    pub forward_voltage: f64,
    pub max_current: f64,
    pub color: String,
}

impl Default for Led {
    fn default() -> Self {
        Self {
            forward_voltage: 2.0,
            max_current: 0.02,
            color: "red".to_string(),
        }
    }
}

impl Led {
    pub const TERMINALS: &'static [TerminalSpec] = JUNCTION_TERMINALS;

    /// Leakage reported while reverse biased.
    pub const REVERSE_LEAKAGE: f64 = -1e-9;

    pub fn colored(color: impl Into<String>) -> Self {
        Self {
            color: color.into(),
            ..Self::default()
        }
    }

    pub(crate) fn default_state(&self) -> ComponentState {
        junction_state()
            .with_scalar(keys::BRIGHTNESS, 0.0)
            .with(keys::COLOR, StateValue::Label(self.color.clone()))
    }

    pub(crate) fn calculate(&self, ctx: &DeviceContext<'_>) -> StateDelta {
        let va = ctx.voltage("anode");
        let vk = ctx.voltage("cathode");
        let drop = va - vk;
        let forward = forward_current(drop, self.forward_voltage, self.max_current);
        let current = match forward {
            Some(i) => i,
            None if drop < 0.0 => Self::REVERSE_LEAKAGE,
            None => 0.0,
        };
        let brightness = match forward {
            Some(i) if i > 0.0 && self.max_current > 0.0 => (i / self.max_current).min(1.0),
            _ => 0.0,
        };
        StateDelta::new()
            .voltage("anode", va)
            .voltage("cathode", vk)
            .current("anode", current)
            .current("cathode", -current)
            .scalar(keys::POWER, drop * current)
            .flag(keys::CONDUCTING, forward.is_some())
            .scalar(keys::BRIGHTNESS, brightness)
            .label(keys::COLOR, self.color.clone())
    }
}

// ---------------------------------------------------------------------------
// BJT
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BjtPolarity {
    #[default]
    Npn,
    Pnp,
}

/// Operating region of a bipolar transistor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BjtRegion {
    Cutoff,
    Active,
    Saturation,
}

impl BjtRegion {
    pub fn as_str(self) -> &'static str {
        match self {
            BjtRegion::Cutoff => "cutoff",
            BjtRegion::Active => "active",
            BjtRegion::Saturation => "saturation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bjt {
    /// Current gain (hFE).
    pub gain: f64,
    pub polarity: BjtPolarity,
    pub vbe_threshold: f64,
    /// Informational.
    pub vce_saturation: f64,
    pub max_collector_current: f64,
}

impl Default for Bjt {
    fn default() -> Self {
        Self {
            gain: 100.0,
            polarity: BjtPolarity::Npn,
            vbe_threshold: 0.7,
            vce_saturation: 0.2,
            max_collector_current: 0.5,
        }
    }
}

impl Bjt {
    pub const TERMINALS: &'static [TerminalSpec] = &[
        TerminalSpec::new("collector", 0.0, 1.5),
        TerminalSpec::new("base", -1.5, 0.0),
        TerminalSpec::new("emitter", 0.0, -1.5),
    ];

    pub fn pnp() -> Self {
        Self {
            polarity: BjtPolarity::Pnp,
            ..Self::default()
        }
    }

    pub(crate) fn default_state(&self) -> ComponentState {
        ComponentState::new()
            .with_terminals(&["collector", "base", "emitter"])
            .with_scalar(keys::POWER, 0.0)
            .with(keys::REGION, StateValue::Label(BjtRegion::Cutoff.as_str().to_string()))
    }

    /// Classify the operating region from junction voltages, already
    /// oriented for the device polarity.
    pub fn region(&self, vbe: f64, vbc: f64) -> BjtRegion {
        if vbe < self.vbe_threshold {
            BjtRegion::Cutoff
        } else if vbc > 0.0 {
            BjtRegion::Saturation
        } else {
            BjtRegion::Active
        }
    }

    pub(crate) fn calculate(&self, ctx: &DeviceContext<'_>) -> StateDelta {
        let vc = ctx.voltage("collector");
        let vb = ctx.voltage("base");
        let ve = ctx.voltage("emitter");
        let (vbe, vce, vbc) = match self.polarity {
            BjtPolarity::Npn => (vb - ve, vc - ve, vb - vc),
            BjtPolarity::Pnp => (ve - vb, ve - vc, vc - vb),
        };

        let region = self.region(vbe, vbc);
        let (ib, ic) = match region {
            BjtRegion::Cutoff => (0.0, 0.0),
            BjtRegion::Active | BjtRegion::Saturation => {
                let ib = (vbe - self.vbe_threshold) / BASE_RESISTANCE;
                (ib, (self.gain * ib).min(self.max_collector_current))
            }
        };
        let ie = ib + ic;
        let power = vce * ic + vbe * ib;

        let sign = match self.polarity {
            BjtPolarity::Npn => 1.0,
            BjtPolarity::Pnp => -1.0,
        };
        StateDelta::new()
            .voltage("collector", vc)
            .voltage("base", vb)
            .voltage("emitter", ve)
            .current("collector", sign * ic)
            .current("base", sign * ib)
            .current("emitter", sign * ie)
            .scalar(keys::POWER, power)
            .label(keys::REGION, region.as_str())
    }
}

// ===========================================================================
// Tests
// ===========================================================================
