use std::fmt;

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Identifies an electrical node. Node ids are re-derived on every
    /// rebuild and must not be held across topology changes.
    pub struct NodeId;
}

/// Identifies a component. Chosen by the caller and stable across rebuilds
/// and snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentId(pub u32);

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{}", self.0)
    }
}

/// Handle returned when registering an event listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(pub u64);

/// One terminal of one component: a vertex of the connection graph.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TerminalRef {
    pub component: ComponentId,
    pub terminal: String,
}

impl TerminalRef {
    pub fn new(component: ComponentId, terminal: impl Into<String>) -> Self {
        Self {
            component,
            terminal: terminal.into(),
        }
    }
}

impl fmt::Display for TerminalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.component, self.terminal)
    }
}
