//! Placed components: geometry, terminal links, and the two-phase state
//! contract.
//!
//! A [`Component`] wraps a [`Device`] with a grid position, a rotation, the
//! links from each of its terminals to peer terminals, and its committed
//! [`ComponentState`]. During a step the simulator calls
//! [`Component::calculate`] on every component against a read-only view,
//! then feeds each returned [`StateDelta`] back through [`Component::apply`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::device::{Device, DeviceKind};
use crate::id::{ComponentId, TerminalRef};
use crate::view::{CircuitView, DeviceContext};

/// Well-known state category names.
pub mod keys {
    pub const VOLTAGES: &str = "voltages";
    pub const CURRENTS: &str = "currents";
    pub const POWER: &str = "power";
    pub const TEMPERATURE: &str = "temperature";
    pub const CHARGE: &str = "charge";
    pub const ENERGY: &str = "energy";
    pub const FLUX: &str = "flux";
    pub const INSTANTANEOUS_VOLTAGE: &str = "instantaneous_voltage";
    pub const TIME: &str = "time";
    pub const NUM_POS_CONNECTIONS: &str = "num_pos_connections";
    pub const NUM_NEG_CONNECTIONS: &str = "num_neg_connections";
    pub const CONDUCTING: &str = "conducting";
    pub const BRIGHTNESS: &str = "brightness";
    pub const COLOR: &str = "color";
    pub const REGION: &str = "region";
    pub const CLOSED: &str = "closed";
}

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// A point on the schematic grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct GridPos {
    pub x: i32,
    pub y: i32,
}

impl GridPos {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Offset by a fractional amount, rounding to the nearest grid point
    /// (ties to even).
    fn offset_by(self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx.round_ties_even() as i32,
            y: self.y + dy.round_ties_even() as i32,
        }
    }
}

/// Quarter-turn orientation of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    R0,
    R90,
    R180,
    R270,
}

impl Rotation {
    pub fn degrees(self) -> u16 {
        match self {
            Rotation::R0 => 0,
            Rotation::R90 => 90,
            Rotation::R180 => 180,
            Rotation::R270 => 270,
        }
    }

    /// Snap an arbitrary angle to the nearest quarter turn.
    pub fn from_degrees(degrees: i32) -> Self {
        match ((degrees.rem_euclid(360) + 45) / 90) % 4 {
            0 => Rotation::R0,
            1 => Rotation::R90,
            2 => Rotation::R180,
            _ => Rotation::R270,
        }
    }

    /// The next orientation, 90 degrees counter-clockwise.
    pub fn turned(self) -> Self {
        match self {
            Rotation::R0 => Rotation::R90,
            Rotation::R90 => Rotation::R180,
            Rotation::R180 => Rotation::R270,
            Rotation::R270 => Rotation::R0,
        }
    }

    fn apply(self, dx: f64, dy: f64) -> (f64, f64) {
        match self {
            Rotation::R0 => (dx, dy),
            Rotation::R90 => (-dy, dx),
            Rotation::R180 => (-dx, -dy),
            Rotation::R270 => (dy, -dx),
        }
    }
}

// ---------------------------------------------------------------------------
// State values
// ---------------------------------------------------------------------------

/// One state category: a number, a flag, a label, or a per-key mapping
/// (e.g. `voltages` keyed by terminal name).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StateValue {
    Scalar(f64),
    Flag(bool),
    Label(String),
    Nested(BTreeMap<String, f64>),
}

impl StateValue {
    /// Numeric reading of a scalar or flag. Flags read as 1.0 / 0.0.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            StateValue::Scalar(v) => Some(*v),
            StateValue::Flag(b) => Some(if *b { 1.0 } else { 0.0 }),
            StateValue::Label(_) | StateValue::Nested(_) => None,
        }
    }
}

/// Committed state of a component, keyed by category name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentState {
    categories: BTreeMap<String, StateValue>,
}

impl ComponentState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed `voltages` and `currents` with a zero entry per terminal.
    pub fn with_terminals(mut self, terminals: &[&str]) -> Self {
        let zeroes: BTreeMap<String, f64> = terminals.iter().map(|t| (t.to_string(), 0.0)).collect();
        self.categories
            .insert(keys::VOLTAGES.to_string(), StateValue::Nested(zeroes.clone()));
        self.categories
            .insert(keys::CURRENTS.to_string(), StateValue::Nested(zeroes));
        self
    }

    pub fn with(mut self, category: &str, value: StateValue) -> Self {
        self.categories.insert(category.to_string(), value);
        self
    }

    pub fn with_scalar(self, category: &str, value: f64) -> Self {
        self.with(category, StateValue::Scalar(value))
    }

    pub fn get(&self, category: &str) -> Option<&StateValue> {
        self.categories.get(category)
    }

    pub fn contains(&self, category: &str) -> bool {
        self.categories.contains_key(category)
    }

    pub fn scalar(&self, category: &str) -> Option<f64> {
        self.get(category).and_then(StateValue::as_number)
    }

    pub fn flag(&self, category: &str) -> Option<bool> {
        match self.get(category)? {
            StateValue::Flag(b) => Some(*b),
            _ => None,
        }
    }

    pub fn label(&self, category: &str) -> Option<&str> {
        match self.get(category)? {
            StateValue::Label(s) => Some(s),
            _ => None,
        }
    }

    pub fn nested(&self, category: &str, key: &str) -> Option<f64> {
        match self.get(category)? {
            StateValue::Nested(map) => map.get(key).copied(),
            _ => None,
        }
    }

    /// Last committed voltage reported for `terminal`.
    pub fn voltage(&self, terminal: &str) -> Option<f64> {
        self.nested(keys::VOLTAGES, terminal)
    }

    /// Last committed current reported for `terminal`.
    pub fn current(&self, terminal: &str) -> Option<f64> {
        self.nested(keys::CURRENTS, terminal)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StateValue)> {
        self.categories.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Merge updates category by category. Nested maps merge key by key;
    /// everything else overwrites. Categories the state does not already
    /// declare are ignored.
    fn merge(&mut self, owner: ComponentId, updates: BTreeMap<String, StateValue>) {
        for (category, value) in updates {
            let Some(slot) = self.categories.get_mut(&category) else {
                debug!(component = %owner, category = %category, "ignoring undeclared state category");
                continue;
            };
            match (slot, value) {
                (StateValue::Nested(current), StateValue::Nested(incoming)) => {
                    for (key, v) in incoming {
                        match current.get_mut(&key) {
                            Some(entry) => *entry = v,
                            None => {
                                debug!(component = %owner, category = %category, key = %key, "ignoring undeclared state key")
                            }
                        }
                    }
                }
                (slot, value) => *slot = value,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// StateDelta
// ---------------------------------------------------------------------------

/// A node voltage that a source wants to impose, applied at commit time.
#[derive(Debug, Clone, PartialEq)]
pub struct Drive {
    pub terminal: &'static str,
    pub volts: f64,
}

/// The output of [`Component::calculate`]: state updates plus node drives.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateDelta {
    updates: BTreeMap<String, StateValue>,
    drives: Vec<Drive>,
}

impl StateDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, category: &str, value: StateValue) -> Self {
        self.updates.insert(category.to_string(), value);
        self
    }

    pub fn scalar(self, category: &str, value: f64) -> Self {
        self.set(category, StateValue::Scalar(value))
    }

    pub fn flag(self, category: &str, value: bool) -> Self {
        self.set(category, StateValue::Flag(value))
    }

    pub fn label(self, category: &str, value: impl Into<String>) -> Self {
        self.set(category, StateValue::Label(value.into()))
    }

    pub fn nested(mut self, category: &str, key: &str, value: f64) -> Self {
        let entry = self
            .updates
            .entry(category.to_string())
            .or_insert_with(|| StateValue::Nested(BTreeMap::new()));
        match entry {
            StateValue::Nested(map) => {
                map.insert(key.to_string(), value);
            }
            other => {
                *other = StateValue::Nested(BTreeMap::from([(key.to_string(), value)]));
            }
        }
        self
    }

    pub fn voltage(self, terminal: &str, value: f64) -> Self {
        self.nested(keys::VOLTAGES, terminal, value)
    }

    pub fn current(self, terminal: &str, value: f64) -> Self {
        self.nested(keys::CURRENTS, terminal, value)
    }

    /// Impose `volts` on the node attached to `terminal` at commit time.
    pub fn drive(mut self, terminal: &'static str, volts: f64) -> Self {
        self.drives.push(Drive { terminal, volts });
        self
    }

    pub fn get(&self, category: &str) -> Option<&StateValue> {
        self.updates.get(category)
    }

    pub fn updates(&self) -> impl Iterator<Item = (&str, &StateValue)> {
        self.updates.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn drives(&self) -> &[Drive] {
        &self.drives
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.drives.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

/// A device placed in the circuit.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    id: ComponentId,
    device: Device,
    position: GridPos,
    rotation: Rotation,
    connected_to: BTreeMap<String, Vec<TerminalRef>>,
    state: ComponentState,
}

impl Component {
    pub fn new(id: ComponentId, device: impl Into<Device>) -> Self {
        let device = device.into();
        let connected_to = device
            .terminal_names()
            .map(|t| (t.to_string(), Vec::new()))
            .collect();
        let state = device.default_state();
        Self {
            id,
            device,
            position: GridPos::default(),
            rotation: Rotation::default(),
            connected_to,
            state,
        }
    }

    pub fn at(mut self, position: GridPos) -> Self {
        self.position = position;
        self
    }

    pub fn rotated(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn kind(&self) -> DeviceKind {
        self.device.kind()
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Device properties are static during a step but may be edited
    /// between steps.
    pub fn device_mut(&mut self) -> &mut Device {
        &mut self.device
    }

    pub fn position(&self) -> GridPos {
        self.position
    }

    pub fn set_position(&mut self, position: GridPos) {
        self.position = position;
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn set_rotation(&mut self, rotation: Rotation) {
        self.rotation = rotation;
    }

    /// Turn the component (and all its terminals) by 90 degrees.
    pub fn rotate(&mut self) {
        self.rotation = self.rotation.turned();
    }

    pub fn terminal_names(&self) -> impl Iterator<Item = &'static str> + use<> {
        self.device.terminal_names()
    }

    pub fn has_terminal(&self, terminal: &str) -> bool {
        self.device.terminal_names().any(|t| t == terminal)
    }

    /// Grid position of every terminal, in declaration order.
    pub fn connection_points(&self) -> Vec<(&'static str, GridPos)> {
        self.device
            .terminals()
            .iter()
            .map(|spec| {
                let (dx, dy) = self.rotation.apply(spec.offset.0, spec.offset.1);
                (spec.name, self.position.offset_by(dx, dy))
            })
            .collect()
    }

    /// The terminal located at `pos`, if any.
    pub fn terminal_at(&self, pos: GridPos) -> Option<&'static str> {
        self.connection_points()
            .into_iter()
            .find(|(_, p)| *p == pos)
            .map(|(name, _)| name)
    }

    pub fn connected_to(&self) -> &BTreeMap<String, Vec<TerminalRef>> {
        &self.connected_to
    }

    pub fn links(&self, terminal: &str) -> &[TerminalRef] {
        self.connected_to
            .get(terminal)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_connected(&self, terminal: &str) -> bool {
        !self.links(terminal).is_empty()
    }

    pub fn state(&self) -> &ComponentState {
        &self.state
    }

    /// Replace committed state, e.g. when restoring a snapshot.
    pub fn set_state(&mut self, state: ComponentState) {
        self.state = state;
    }

    /// Reinitialize state to the device's defaults.
    pub fn reset_state(&mut self) {
        self.state = self.device.default_state();
    }

    /// Record a link from `terminal` to `peer`. Returns `false` if the
    /// terminal is unknown or the link already exists.
    pub(crate) fn link(&mut self, terminal: &str, peer: TerminalRef) -> bool {
        let Some(links) = self.connected_to.get_mut(terminal) else {
            return false;
        };
        if links.contains(&peer) {
            return false;
        }
        links.push(peer);
        true
    }

    /// Remove a link. Returns `false` if it did not exist.
    pub(crate) fn unlink(&mut self, terminal: &str, peer: &TerminalRef) -> bool {
        let Some(links) = self.connected_to.get_mut(terminal) else {
            return false;
        };
        let before = links.len();
        links.retain(|l| l != peer);
        links.len() != before
    }

    /// Drop every link pointing at any terminal of `peer`.
    pub(crate) fn unlink_component(&mut self, peer: ComponentId) {
        for links in self.connected_to.values_mut() {
            links.retain(|l| l.component != peer);
        }
    }

    // -----------------------------------------------------------------------
    // Two-phase contract
    // -----------------------------------------------------------------------

    /// Compute this step's delta from committed state and node voltages.
    /// Never mutates anything.
    pub fn calculate(&self, view: &CircuitView<'_>, dt: f64) -> StateDelta {
        let ctx = DeviceContext::new(self, view, dt);
        self.device.calculate(&ctx)
    }

    /// Merge a delta into committed state. Drives are handled by the
    /// simulator and ignored here.
    pub fn apply(&mut self, delta: StateDelta) {
        self.state.merge(self.id, delta.updates);
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Bjt, Ground, Resistor};

    fn resistor() -> Component {
        Component::new(ComponentId(1), Resistor::default())
    }

    #[test]
    fn new_component_has_default_state_and_empty_links() {
        let r = resistor();
        assert_eq!(r.kind(), DeviceKind::Resistor);
        assert_eq!(r.state().voltage("p1"), Some(0.0));
        assert_eq!(r.state().current("p2"), Some(0.0));
        assert!(!r.is_connected("p1"));
        assert_eq!(r.connected_to().len(), 2);
    }

    #[test]
    fn connection_points_follow_rotation() {
        let mut r = resistor().at(GridPos::new(10, 10));
        assert_eq!(
            r.connection_points(),
            vec![("p1", GridPos::new(8, 10)), ("p2", GridPos::new(12, 10))]
        );
        r.rotate();
        assert_eq!(
            r.connection_points(),
            vec![("p1", GridPos::new(10, 8)), ("p2", GridPos::new(10, 12))]
        );
        assert_eq!(r.terminal_at(GridPos::new(10, 12)), Some("p2"));
        assert_eq!(r.terminal_at(GridPos::new(0, 0)), None);
    }

    #[test]
    fn rotation_snaps_and_wraps() {
        assert_eq!(Rotation::from_degrees(0), Rotation::R0);
        assert_eq!(Rotation::from_degrees(80), Rotation::R90);
        assert_eq!(Rotation::from_degrees(-90), Rotation::R270);
        assert_eq!(Rotation::from_degrees(450), Rotation::R90);
        assert_eq!(Rotation::R270.turned(), Rotation::R0);
        assert_eq!(Rotation::R180.degrees(), 180);
    }

    #[test]
    fn ground_terminal_sits_below_origin() {
        let g = Component::new(ComponentId(2), Ground::default()).at(GridPos::new(3, 3));
        assert_eq!(g.connection_points(), vec![("gnd", GridPos::new(3, 3))]);
    }

    #[test]
    fn link_rejects_duplicates_and_unknown_terminals() {
        let mut r = resistor();
        let peer = TerminalRef::new(ComponentId(2), "gnd");
        assert!(r.link("p1", peer.clone()));
        assert!(!r.link("p1", peer.clone()));
        assert!(!r.link("p9", peer.clone()));
        assert!(r.is_connected("p1"));
        assert!(r.unlink("p1", &peer));
        assert!(!r.unlink("p1", &peer));
        assert!(!r.is_connected("p1"));
    }

    #[test]
    fn unlink_component_drops_all_links_to_peer() {
        let mut r = resistor();
        r.link("p1", TerminalRef::new(ComponentId(5), "p1"));
        r.link("p2", TerminalRef::new(ComponentId(5), "p2"));
        r.link("p2", TerminalRef::new(ComponentId(6), "gnd"));
        r.unlink_component(ComponentId(5));
        assert!(!r.is_connected("p1"));
        assert_eq!(r.links("p2"), &[TerminalRef::new(ComponentId(6), "gnd")]);
    }

    #[test]
    fn apply_merges_nested_and_overwrites_scalars() {
        let mut r = resistor();
        let delta = StateDelta::new()
            .current("p1", 0.005)
            .voltage("p1", 5.0)
            .scalar(keys::POWER, 0.025);
        r.apply(delta);
        assert_eq!(r.state().current("p1"), Some(0.005));
        // untouched sibling keys survive the nested merge
        assert_eq!(r.state().current("p2"), Some(0.0));
        assert_eq!(r.state().voltage("p1"), Some(5.0));
        assert_eq!(r.state().scalar(keys::POWER), Some(0.025));
    }

    #[test]
    fn apply_ignores_undeclared_categories_and_keys() {
        let mut r = resistor();
        let before = r.state().len();
        r.apply(StateDelta::new().scalar("bogus", 1.0).current("p7", 3.0));
        assert_eq!(r.state().len(), before);
        assert_eq!(r.state().current("p7"), None);
    }

    #[test]
    fn apply_overwrites_labels() {
        let mut q = Component::new(ComponentId(3), Bjt::default());
        assert_eq!(q.state().label(keys::REGION), Some("cutoff"));
        q.apply(StateDelta::new().label(keys::REGION, "active"));
        assert_eq!(q.state().label(keys::REGION), Some("active"));
    }

    #[test]
    fn reset_state_restores_defaults() {
        let mut r = resistor();
        r.apply(StateDelta::new().scalar(keys::POWER, 9.0));
        r.reset_state();
        assert_eq!(r.state().scalar(keys::POWER), Some(0.0));
    }

    #[test]
    fn delta_records_drives() {
        let delta = StateDelta::new().drive("pos", 5.0).drive("neg", 0.0);
        assert_eq!(delta.drives().len(), 2);
        assert_eq!(delta.drives()[0], Drive { terminal: "pos", volts: 5.0 });
        assert!(!delta.is_empty());
    }
}
