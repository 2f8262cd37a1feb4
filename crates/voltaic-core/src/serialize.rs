//! Circuit snapshots and the versioned binary encoding.
//!
//! A [`CircuitSnapshot`] is the plain-data form of a circuit: every
//! component as a [`ComponentRecord`], the time fields, and the ground node.
//! It serializes with any serde format (the data crate writes RON, TOML
//! and JSON). [`Simulator::serialize`] wraps a snapshot in a
//! [`SnapshotHeader`] and encodes it with `bitcode`.
//!
//! Restoring goes through a [`ComponentFactory`], so callers can remap or
//! reject records; [`StandardFactory`] rebuilds every record as saved.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::component::{Component, ComponentState, GridPos, Rotation};
use crate::config::SimConfig;
use crate::device::{Device, DeviceKind};
use crate::id::{ComponentId, NodeId, TerminalRef};
use crate::simulator::Simulator;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic number identifying a Voltaic circuit snapshot.
pub const SNAPSHOT_MAGIC: u32 = 0x7017_0001;

/// Current format version. Increment when breaking the wire format.
pub const FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur during serialization.
#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
}

/// Errors that can occur during deserialization.
#[derive(Debug, thiserror::Error)]
pub enum DeserializeError {
    #[error("invalid magic number: expected 0x{:08X}, got 0x{:08X}", SNAPSHOT_MAGIC, .0)]
    InvalidMagic(u32),
    #[error("unsupported format version: expected {}, got {}", FORMAT_VERSION, .0)]
    UnsupportedVersion(u32),
    #[error("snapshot from future version {0} (this build supports up to {FORMAT_VERSION})")]
    FutureVersion(u32),
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
}

// ---------------------------------------------------------------------------
// Snapshot header
// ---------------------------------------------------------------------------

/// Header prepended to every binary snapshot, checked before the circuit
/// is restored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub magic: u32,
    pub version: u32,
    /// Simulated time when the snapshot was taken.
    pub simulation_time: f64,
}

impl SnapshotHeader {
    pub fn new(simulation_time: f64) -> Self {
        Self {
            magic: SNAPSHOT_MAGIC,
            version: FORMAT_VERSION,
            simulation_time,
        }
    }

    pub fn validate(&self) -> Result<(), DeserializeError> {
        if self.magic != SNAPSHOT_MAGIC {
            return Err(DeserializeError::InvalidMagic(self.magic));
        }
        if self.version > FORMAT_VERSION {
            return Err(DeserializeError::FutureVersion(self.version));
        }
        if self.version < FORMAT_VERSION {
            return Err(DeserializeError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Snapshot data
// ---------------------------------------------------------------------------

/// Everything needed to recreate one component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentRecord {
    pub id: ComponentId,
    pub device: Device,
    #[serde(default)]
    pub position: GridPos,
    #[serde(default)]
    pub rotation: Rotation,
    #[serde(default)]
    pub connected_to: BTreeMap<String, Vec<TerminalRef>>,
    #[serde(default)]
    pub state: ComponentState,
}

impl ComponentRecord {
    pub fn from_component(component: &Component) -> Self {
        Self {
            id: component.id(),
            device: component.device().clone(),
            position: component.position(),
            rotation: component.rotation(),
            connected_to: component.connected_to().clone(),
            state: component.state().clone(),
        }
    }

    /// The declared device type.
    pub fn kind(&self) -> DeviceKind {
        self.device.kind()
    }

    /// Rebuild the component. Links from terminals the device does not
    /// have are dropped. An empty saved state falls back to the device
    /// defaults.
    pub fn to_component(&self) -> Component {
        let mut component = Component::new(self.id, self.device.clone())
            .at(self.position)
            .rotated(self.rotation);
        for (terminal, peers) in &self.connected_to {
            if !component.has_terminal(terminal) {
                warn!(component = %self.id, terminal = %terminal, "dropping links from unknown terminal");
                continue;
            }
            for peer in peers {
                component.link(terminal, peer.clone());
            }
        }
        if !self.state.is_empty() {
            component.set_state(self.state.clone());
        }
        component
    }
}

/// A whole circuit as plain data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitSnapshot {
    /// Components in id order.
    pub components: Vec<ComponentRecord>,
    #[serde(default)]
    pub simulation_time: f64,
    #[serde(default = "default_time_step")]
    pub time_step: f64,
    /// Ground node id in a fresh build of the saved components.
    #[serde(default)]
    pub ground_node_id: Option<NodeId>,
    /// A terminal inside the ground node. Takes precedence over
    /// `ground_node_id` when restoring.
    #[serde(default)]
    pub ground_terminal: Option<TerminalRef>,
}

fn default_time_step() -> f64 {
    crate::config::DEFAULT_TIME_STEP
}

// ---------------------------------------------------------------------------
// Component factories
// ---------------------------------------------------------------------------

/// Creates components from saved records. Returning `None` skips the
/// record.
pub trait ComponentFactory {
    fn create(&self, record: &ComponentRecord) -> Option<Component>;
}

impl<F> ComponentFactory for F
where
    F: Fn(&ComponentRecord) -> Option<Component>,
{
    fn create(&self, record: &ComponentRecord) -> Option<Component> {
        self(record)
    }
}

/// Recreates every record exactly as saved.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardFactory;

impl ComponentFactory for StandardFactory {
    fn create(&self, record: &ComponentRecord) -> Option<Component> {
        Some(record.to_component())
    }
}

// ---------------------------------------------------------------------------
// Binary encoding
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct BinarySnapshot {
    header: SnapshotHeader,
    circuit: CircuitSnapshot,
}

impl Simulator {
    /// Encode the circuit with a versioned header.
    pub fn serialize(&self) -> Result<Vec<u8>, SerializeError> {
        let snapshot = BinarySnapshot {
            header: SnapshotHeader::new(self.simulation_time()),
            circuit: self.to_snapshot(),
        };
        bitcode::serialize(&snapshot).map_err(|e| SerializeError::Encode(e.to_string()))
    }

    /// Decode a circuit produced by [`serialize`](Self::serialize) into a
    /// new, stopped simulator.
    pub fn deserialize(data: &[u8], config: SimConfig) -> Result<Self, DeserializeError> {
        let snapshot: BinarySnapshot =
            bitcode::deserialize(data).map_err(|e| DeserializeError::Decode(e.to_string()))?;
        snapshot.header.validate()?;
        let mut sim = Simulator::new(config);
        sim.load_snapshot(&snapshot.circuit, &StandardFactory);
        Ok(sim)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
