use std::collections::BTreeSet;
use std::fmt;

use crate::id::{NodeId, TerminalRef};

/// An electrical junction: every terminal that is transitively linked to
/// every other.
///
/// A node never computes its own voltage. Sources drive it, external
/// callers may hold it, and ground pins it to zero. `current_sum` is a
/// diagnostic recomputed by the simulator each step.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    id: NodeId,
    members: BTreeSet<TerminalRef>,
    voltage: f64,
    current_sum: f64,
}

impl Node {
    pub(crate) fn new(id: NodeId) -> Self {
        Self {
            id,
            members: BTreeSet::new(),
            voltage: 0.0,
            current_sum: 0.0,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Add a terminal. Returns `false` if it was already a member.
    pub fn add_member(&mut self, terminal: TerminalRef) -> bool {
        self.members.insert(terminal)
    }

    /// Remove a terminal. Returns `false` if it was not a member.
    pub fn remove_member(&mut self, terminal: &TerminalRef) -> bool {
        self.members.remove(terminal)
    }

    pub fn contains(&self, terminal: &TerminalRef) -> bool {
        self.members.contains(terminal)
    }

    pub fn members(&self) -> impl Iterator<Item = &TerminalRef> {
        self.members.iter()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn voltage(&self) -> f64 {
        self.voltage
    }

    pub fn set_voltage(&mut self, voltage: f64) {
        self.voltage = voltage;
    }

    pub fn current_sum(&self) -> f64 {
        self.current_sum
    }

    pub(crate) fn set_current_sum(&mut self, sum: f64) {
        self.current_sum = sum;
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node(")?;
        for (i, member) in self.members.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{member}")?;
        }
        write!(f, ") @ {:.3} V", self.voltage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::ComponentId;
    use slotmap::SlotMap;

    fn node() -> Node {
        let mut keys: SlotMap<NodeId, ()> = SlotMap::with_key();
        Node::new(keys.insert(()))
    }

    #[test]
    fn members_are_unique() {
        let mut n = node();
        let t = TerminalRef::new(ComponentId(1), "p1");
        assert!(n.add_member(t.clone()));
        assert!(!n.add_member(t.clone()));
        assert_eq!(n.len(), 1);
        assert!(n.remove_member(&t));
        assert!(!n.remove_member(&t));
        assert!(n.is_empty());
    }

    #[test]
    fn display_lists_members_and_voltage() {
        let mut n = node();
        n.add_member(TerminalRef::new(ComponentId(2), "gnd"));
        n.add_member(TerminalRef::new(ComponentId(1), "p2"));
        n.set_voltage(1.5);
        assert_eq!(n.to_string(), "Node(C1.p2, C2.gnd) @ 1.500 V");
    }
}
