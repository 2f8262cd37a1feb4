//! The closed set of device variants.
//!
//! Each variant carries its static properties and implements the same
//! three operations: declare its terminals, produce a default state, and
//! calculate a [`StateDelta`] from a [`DeviceContext`]. Dispatch is a plain
//! enum match (no trait objects), keeping devices `Clone` and serializable.

mod passive;
mod semiconductor;
mod sources;
mod switch;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::component::{ComponentState, StateDelta};
use crate::view::DeviceContext;

pub use passive::{Capacitor, Ground, Inductor, Resistor};
pub use semiconductor::{Bjt, BjtPolarity, BjtRegion, Diode, Led};
pub use sources::{AcVoltageSource, DcCurrentSource, DcVoltageSource};
pub use switch::Switch;

/// A named terminal and its offset from the component origin, in grid
/// units, before rotation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerminalSpec {
    pub name: &'static str,
    pub offset: (f64, f64),
}

impl TerminalSpec {
    pub const fn new(name: &'static str, dx: f64, dy: f64) -> Self {
        Self {
            name,
            offset: (dx, dy),
        }
    }
}

/// Clamp `value` to `[-limit, limit]`. A negative limit disables clamping.
pub(crate) fn limit_magnitude(value: f64, limit: f64) -> f64 {
    if limit >= 0.0 {
        value.clamp(-limit, limit)
    } else {
        value
    }
}

// ---------------------------------------------------------------------------
// Device
// ---------------------------------------------------------------------------

/// A device and its static properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Device {
    Resistor(Resistor),
    Capacitor(Capacitor),
    Inductor(Inductor),
    Ground(Ground),
    DcVoltageSource(DcVoltageSource),
    AcVoltageSource(AcVoltageSource),
    DcCurrentSource(DcCurrentSource),
    Diode(Diode),
    Led(Led),
    Bjt(Bjt),
    Switch(Switch),
}

/// Declared type of a device, without its properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DeviceKind {
    Resistor,
    Capacitor,
    Inductor,
    Ground,
    DcVoltageSource,
    AcVoltageSource,
    DcCurrentSource,
    Diode,
    Led,
    Bjt,
    Switch,
}

impl DeviceKind {
    pub const ALL: [DeviceKind; 11] = [
        DeviceKind::Resistor,
        DeviceKind::Capacitor,
        DeviceKind::Inductor,
        DeviceKind::Ground,
        DeviceKind::DcVoltageSource,
        DeviceKind::AcVoltageSource,
        DeviceKind::DcCurrentSource,
        DeviceKind::Diode,
        DeviceKind::Led,
        DeviceKind::Bjt,
        DeviceKind::Switch,
    ];

    /// A device of this kind with default properties.
    pub fn default_device(self) -> Device {
        match self {
            DeviceKind::Resistor => Resistor::default().into(),
            DeviceKind::Capacitor => Capacitor::default().into(),
            DeviceKind::Inductor => Inductor::default().into(),
            DeviceKind::Ground => Ground::default().into(),
            DeviceKind::DcVoltageSource => DcVoltageSource::default().into(),
            DeviceKind::AcVoltageSource => AcVoltageSource::default().into(),
            DeviceKind::DcCurrentSource => DcCurrentSource::default().into(),
            DeviceKind::Diode => Diode::default().into(),
            DeviceKind::Led => Led::default().into(),
            DeviceKind::Bjt => Bjt::default().into(),
            DeviceKind::Switch => Switch::default().into(),
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceKind::Resistor => "Resistor",
            DeviceKind::Capacitor => "Capacitor",
            DeviceKind::Inductor => "Inductor",
            DeviceKind::Ground => "Ground",
            DeviceKind::DcVoltageSource => "DC Voltage Source",
            DeviceKind::AcVoltageSource => "AC Voltage Source",
            DeviceKind::DcCurrentSource => "DC Current Source",
            DeviceKind::Diode => "Diode",
            DeviceKind::Led => "LED",
            DeviceKind::Bjt => "BJT",
            DeviceKind::Switch => "Switch",
        };
        f.write_str(name)
    }
}

macro_rules! impl_from_variant {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Device {
                fn from(d: $variant) -> Self {
                    Device::$variant(d)
                }
            }
        )*
    };
}

impl_from_variant!(
    Resistor,
    Capacitor,
    Inductor,
    Ground,
    DcVoltageSource,
    AcVoltageSource,
    DcCurrentSource,
    Diode,
    Led,
    Bjt,
    Switch,
);

impl Device {
    pub fn kind(&self) -> DeviceKind {
        match self {
            Device::Resistor(_) => DeviceKind::Resistor,
            Device::Capacitor(_) => DeviceKind::Capacitor,
            Device::Inductor(_) => DeviceKind::Inductor,
            Device::Ground(_) => DeviceKind::Ground,
            Device::DcVoltageSource(_) => DeviceKind::DcVoltageSource,
            Device::AcVoltageSource(_) => DeviceKind::AcVoltageSource,
            Device::DcCurrentSource(_) => DeviceKind::DcCurrentSource,
            Device::Diode(_) => DeviceKind::Diode,
            Device::Led(_) => DeviceKind::Led,
            Device::Bjt(_) => DeviceKind::Bjt,
            Device::Switch(_) => DeviceKind::Switch,
        }
    }

    /// Terminal declarations, in declaration order.
    pub fn terminals(&self) -> &'static [TerminalSpec] {
        match self {
            Device::Resistor(_) => Resistor::TERMINALS,
            Device::Capacitor(_) => Capacitor::TERMINALS,
            Device::Inductor(_) => Inductor::TERMINALS,
            Device::Ground(_) => Ground::TERMINALS,
            Device::DcVoltageSource(_) => DcVoltageSource::TERMINALS,
            Device::AcVoltageSource(_) => AcVoltageSource::TERMINALS,
            Device::DcCurrentSource(_) => DcCurrentSource::TERMINALS,
            Device::Diode(_) => Diode::TERMINALS,
            Device::Led(_) => Led::TERMINALS,
            Device::Bjt(_) => Bjt::TERMINALS,
            Device::Switch(_) => Switch::TERMINALS,
        }
    }

    pub fn terminal_names(&self) -> impl Iterator<Item = &'static str> + use<> {
        self.terminals().iter().map(|spec| spec.name)
    }

    pub fn default_state(&self) -> ComponentState {
        match self {
            Device::Resistor(d) => d.default_state(),
            Device::Capacitor(d) => d.default_state(),
            Device::Inductor(d) => d.default_state(),
            Device::Ground(d) => d.default_state(),
            Device::DcVoltageSource(d) => d.default_state(),
            Device::AcVoltageSource(d) => d.default_state(),
            Device::DcCurrentSource(d) => d.default_state(),
            Device::Diode(d) => d.default_state(),
            Device::Led(d) => d.default_state(),
            Device::Bjt(d) => d.default_state(),
            Device::Switch(d) => d.default_state(),
        }
    }

    pub fn calculate(&self, ctx: &DeviceContext<'_>) -> StateDelta {
        match self {
            Device::Resistor(d) => d.calculate(ctx),
            Device::Capacitor(d) => d.calculate(ctx),
            Device::Inductor(d) => d.calculate(ctx),
            Device::Ground(d) => d.calculate(ctx),
            Device::DcVoltageSource(d) => d.calculate(ctx),
            Device::AcVoltageSource(d) => d.calculate(ctx),
            Device::DcCurrentSource(d) => d.calculate(ctx),
            Device::Diode(d) => d.calculate(ctx),
            Device::Led(d) => d.calculate(ctx),
            Device::Bjt(d) => d.calculate(ctx),
            Device::Switch(d) => d.calculate(ctx),
        }
    }

    pub fn is_ground(&self) -> bool {
        matches!(self, Device::Ground(_))
    }

    /// The terminal a voltage source holds at 0 V, used as a ground
    /// fallback when the circuit has no ground device.
    pub fn reference_terminal(&self) -> Option<&'static str> {
        match self {
            Device::DcVoltageSource(_) | Device::AcVoltageSource(_) => Some("neg"),
            _ => None,
        }
    }
}
