//! Connection-graph builder: turns terminal links into electrical nodes and
//! resolves which node is ground.
//!
//! Every `(component, terminal)` pair is a vertex and every link an edge.
//! Vertices are grouped by merging the smaller group into the larger as
//! edges are processed; unlinked terminals become singleton groups. Each
//! final group becomes one [`Node`]. The build is a pure function of the
//! component set, so rebuilding an unchanged circuit yields the same
//! membership (node ids may differ).

use std::collections::{BTreeMap, BTreeSet, HashMap};

use slotmap::SlotMap;
use tracing::{debug, warn};

use crate::component::Component;
use crate::id::{ComponentId, NodeId, TerminalRef};
use crate::node::Node;

// ---------------------------------------------------------------------------
// Ground resolution
// ---------------------------------------------------------------------------

/// How the ground node of a topology was chosen, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroundSource {
    /// The node of a ground device.
    GroundDevice(ComponentId),
    /// The reference (negative) terminal node of a voltage source.
    SourceReference(ComponentId),
    /// No ground device or source; the first node built.
    FirstNode,
    /// The circuit has no nodes at all; a memberless node was synthesized.
    Placeholder,
    /// Restored from a snapshot.
    Restored,
}

// ---------------------------------------------------------------------------
// Grouping
// ---------------------------------------------------------------------------

type GroupId = usize;

/// Vertex -> group and group -> members, merged smaller-into-larger.
#[derive(Debug, Default)]
struct Grouping {
    group_of: HashMap<TerminalRef, GroupId>,
    groups: BTreeMap<GroupId, Vec<TerminalRef>>,
    next_group: GroupId,
}

impl Grouping {
    fn allocate(&mut self, members: Vec<TerminalRef>) -> GroupId {
        let group = self.next_group;
        self.next_group += 1;
        for member in &members {
            self.group_of.insert(member.clone(), group);
        }
        self.groups.insert(group, members);
        group
    }

    fn join(&mut self, group: GroupId, vertex: TerminalRef) {
        self.group_of.insert(vertex.clone(), group);
        self.groups.entry(group).or_default().push(vertex);
    }

    fn link(&mut self, a: TerminalRef, b: TerminalRef) {
        let ga = self.group_of.get(&a).copied();
        let gb = self.group_of.get(&b).copied();
        match (ga, gb) {
            (None, None) if a == b => {
                self.allocate(vec![a]);
            }
            (None, None) => {
                self.allocate(vec![a, b]);
            }
            (Some(g), None) => self.join(g, b),
            (None, Some(g)) => self.join(g, a),
            (Some(ga), Some(gb)) if ga == gb => {}
            (Some(ga), Some(gb)) => self.merge(ga, gb),
        }
    }

    fn merge(&mut self, ga: GroupId, gb: GroupId) {
        let len = |g: GroupId| self.groups.get(&g).map_or(0, Vec::len);
        let (keep, absorb) = if len(ga) >= len(gb) { (ga, gb) } else { (gb, ga) };
        let moved = self.groups.remove(&absorb).unwrap_or_default();
        for vertex in &moved {
            self.group_of.insert(vertex.clone(), keep);
        }
        self.groups.entry(keep).or_default().extend(moved);
    }

    fn ensure(&mut self, vertex: TerminalRef) {
        if !self.group_of.contains_key(&vertex) {
            self.allocate(vec![vertex]);
        }
    }

    fn into_groups(self) -> impl Iterator<Item = Vec<TerminalRef>> {
        self.groups.into_values()
    }
}

// ---------------------------------------------------------------------------
// Topology
// ---------------------------------------------------------------------------

/// The node set derived from a component set, plus its ground node.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    nodes: SlotMap<NodeId, Node>,
    index: HashMap<ComponentId, HashMap<String, NodeId>>,
    ground: Option<NodeId>,
    ground_source: Option<GroundSource>,
}

impl Topology {
    /// Derive nodes from the components' terminal links and resolve ground.
    ///
    /// Links to components or terminals that do not exist are skipped.
    pub fn build(components: &BTreeMap<ComponentId, Component>) -> Self {
        let mut grouping = Grouping::default();

        for (&id, component) in components {
            for (terminal, peers) in component.connected_to() {
                let here = TerminalRef::new(id, terminal.as_str());
                for peer in peers {
                    let live = components
                        .get(&peer.component)
                        .is_some_and(|c| c.has_terminal(&peer.terminal));
                    if !live {
                        warn!(from = %here, to = %peer, "skipping link to missing terminal");
                        continue;
                    }
                    grouping.link(here.clone(), peer.clone());
                }
            }
        }
        for (&id, component) in components {
            for terminal in component.terminal_names() {
                grouping.ensure(TerminalRef::new(id, terminal));
            }
        }

        let mut topology = Topology::default();
        for members in grouping.into_groups() {
            topology.insert_node(members);
        }
        topology.resolve_ground(components);
        debug!(
            nodes = topology.len(),
            ground = ?topology.ground_source,
            "derived circuit topology"
        );
        topology
    }

    fn insert_node(&mut self, members: Vec<TerminalRef>) -> NodeId {
        let id = self.nodes.insert_with_key(Node::new);
        for member in members {
            self.index
                .entry(member.component)
                .or_default()
                .insert(member.terminal.clone(), id);
            self.nodes[id].add_member(member);
        }
        id
    }

    fn resolve_ground(&mut self, components: &BTreeMap<ComponentId, Component>) {
        let device_ground = components.values().find_map(|c| {
            if !c.device().is_ground() {
                return None;
            }
            let node = c.terminal_names().find_map(|t| self.node_id_for(c.id(), t))?;
            Some((node, GroundSource::GroundDevice(c.id())))
        });
        let source_reference = || {
            components.values().find_map(|c| {
                let terminal = c.device().reference_terminal()?;
                let node = self.node_id_for(c.id(), terminal)?;
                Some((node, GroundSource::SourceReference(c.id())))
            })
        };
        let first_node = || {
            self.nodes
                .keys()
                .next()
                .map(|node| (node, GroundSource::FirstNode))
        };

        let found = device_ground.or_else(source_reference).or_else(first_node);
        let (node, source) = match found {
            Some(found) => found,
            None => {
                let placeholder = self.nodes.insert_with_key(Node::new);
                (placeholder, GroundSource::Placeholder)
            }
        };
        self.ground = Some(node);
        self.ground_source = Some(source);
        self.pin_ground();
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Look up a node by id. Ids from an earlier build may be stale.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Nodes in build order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub(crate) fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.values_mut()
    }

    /// Number of nodes, including the ground node.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The node a terminal belongs to, or `None` if the terminal was
    /// unknown at build time or has since been detached.
    pub fn node_id_for(&self, component: ComponentId, terminal: &str) -> Option<NodeId> {
        self.index.get(&component)?.get(terminal).copied()
    }

    pub fn node_for(&self, component: ComponentId, terminal: &str) -> Option<&Node> {
        self.node_id_for(component, terminal)
            .and_then(|id| self.nodes.get(id))
    }

    pub(crate) fn node_for_mut(
        &mut self,
        component: ComponentId,
        terminal: &str,
    ) -> Option<&mut Node> {
        let id = self.node_id_for(component, terminal)?;
        self.nodes.get_mut(id)
    }

    /// The ground node's id. Always `Some` after a build.
    pub fn ground(&self) -> Option<NodeId> {
        self.ground
    }

    pub fn ground_node(&self) -> Option<&Node> {
        self.ground.and_then(|id| self.nodes.get(id))
    }

    /// How the ground node was chosen.
    pub fn ground_source(&self) -> Option<GroundSource> {
        self.ground_source
    }

    pub fn is_ground(&self, id: NodeId) -> bool {
        self.ground == Some(id)
    }

    /// Membership as a set of sets, independent of node ids.
    pub fn partition(&self) -> BTreeSet<BTreeSet<TerminalRef>> {
        self.nodes
            .values()
            .filter(|n| !n.is_empty())
            .map(|n| n.members().cloned().collect())
            .collect()
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Make `id` the ground node. Returns `false` if it does not exist.
    pub(crate) fn set_ground(&mut self, id: NodeId, source: GroundSource) -> bool {
        if !self.nodes.contains_key(id) {
            return false;
        }
        self.ground = Some(id);
        self.ground_source = Some(source);
        self.pin_ground();
        true
    }

    /// Force the ground node back to 0 V.
    pub(crate) fn pin_ground(&mut self) {
        if let Some(node) = self.ground.and_then(|id| self.nodes.get_mut(id)) {
            node.set_voltage(0.0);
        }
    }

    /// Carry node voltages over from a previous build. Each new node takes
    /// the voltage of the first old node that shared one of its terminals.
    pub(crate) fn inherit_voltages(&mut self, previous: &Topology) {
        for node in self.nodes.values_mut() {
            let carried = node
                .members()
                .find_map(|t| previous.node_for(t.component, &t.terminal))
                .map(Node::voltage);
            if let Some(voltage) = carried {
                node.set_voltage(voltage);
            }
        }
        self.pin_ground();
    }

    /// Remove one terminal from its node, dropping the node if it becomes
    /// empty. Returns `true` if a node was dropped.
    pub(crate) fn detach_terminal(&mut self, terminal: &TerminalRef) -> bool {
        let Some(id) = self
            .index
            .get_mut(&terminal.component)
            .and_then(|terminals| terminals.remove(&terminal.terminal))
        else {
            return false;
        };
        let Some(node) = self.nodes.get_mut(id) else {
            return false;
        };
        node.remove_member(terminal);
        if !node.is_empty() {
            return false;
        }
        self.nodes.remove(id);
        if self.ground == Some(id) {
            self.ground = None;
            self.ground_source = None;
        }
        true
    }

    /// Remove every terminal of a component. Returns the number of nodes
    /// dropped.
    pub(crate) fn detach_component(&mut self, component: ComponentId) -> usize {
        let terminals: Vec<String> = self
            .index
            .get(&component)
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default();
        let dropped = terminals
            .into_iter()
            .filter(|t| self.detach_terminal(&TerminalRef::new(component, t.as_str())))
            .count();
        self.index.remove(&component);
        dropped
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DcVoltageSource, Ground, Resistor};
    use crate::test_utils::*;

    fn components(list: Vec<Component>) -> BTreeMap<ComponentId, Component> {
        list.into_iter().map(|c| (c.id(), c)).collect()
    }

    fn tr(id: u32, terminal: &str) -> TerminalRef {
        TerminalRef::new(ComponentId(id), terminal)
    }

    #[test]
    fn unlinked_terminals_get_singleton_nodes() {
        let set = components(vec![Component::new(ComponentId(1), Resistor::default())]);
        let topology = Topology::build(&set);
        assert_eq!(topology.len(), 2);
        assert_ne!(
            topology.node_id_for(ComponentId(1), "p1"),
            topology.node_id_for(ComponentId(1), "p2")
        );
    }

    #[test]
    fn linked_terminals_share_a_node() {
        let mut set = components(vec![
            Component::new(ComponentId(1), Resistor::default()),
            Component::new(ComponentId(2), Resistor::default()),
        ]);
        link_pair(&mut set, tr(1, "p2"), tr(2, "p1"));
        let topology = Topology::build(&set);
        assert_eq!(topology.len(), 3);
        assert_eq!(
            topology.node_id_for(ComponentId(1), "p2"),
            topology.node_id_for(ComponentId(2), "p1")
        );
    }

    #[test]
    fn groups_merge_transitively() {
        // a chain built from both ends forces a merge of two groups
        let mut set = components((1..=4).map(|i| Component::new(ComponentId(i), Resistor::default())).collect());
        link_pair(&mut set, tr(1, "p1"), tr(2, "p1"));
        link_pair(&mut set, tr(3, "p1"), tr(4, "p1"));
        link_pair(&mut set, tr(2, "p1"), tr(3, "p1"));
        let topology = Topology::build(&set);
        let node = topology.node_for(ComponentId(1), "p1").unwrap();
        assert_eq!(node.len(), 4);
        for i in 1..=4 {
            assert!(node.contains(&tr(i, "p1")));
        }
        // four shared p1 terminals plus four singleton p2 terminals
        assert_eq!(topology.len(), 5);
    }

    #[test]
    fn every_terminal_in_exactly_one_node() {
        let mut set = components((1..=3).map(|i| Component::new(ComponentId(i), Resistor::default())).collect());
        link_pair(&mut set, tr(1, "p2"), tr(2, "p1"));
        link_pair(&mut set, tr(2, "p2"), tr(3, "p1"));
        link_pair(&mut set, tr(3, "p2"), tr(1, "p1"));
        let topology = Topology::build(&set);
        let total: usize = topology.nodes().map(Node::len).sum();
        assert_eq!(total, 6);
        assert_eq!(topology.len(), 3);
    }

    #[test]
    fn links_to_missing_components_are_skipped() {
        let mut set = components(vec![Component::new(ComponentId(1), Resistor::default())]);
        set.get_mut(&ComponentId(1))
            .unwrap()
            .link("p1", tr(99, "p1"));
        let topology = Topology::build(&set);
        assert_eq!(topology.len(), 2);
        assert_eq!(topology.node_for(ComponentId(1), "p1").unwrap().len(), 1);
    }

    #[test]
    fn rebuild_is_idempotent_in_membership() {
        let mut set = components((1..=3).map(|i| Component::new(ComponentId(i), Resistor::default())).collect());
        link_pair(&mut set, tr(1, "p2"), tr(2, "p1"));
        link_pair(&mut set, tr(2, "p2"), tr(3, "p1"));
        let first = Topology::build(&set);
        let second = Topology::build(&set);
        assert_eq!(first.partition(), second.partition());
    }

    #[test]
    fn ground_device_wins() {
        let mut set = components(vec![
            Component::new(ComponentId(1), DcVoltageSource::new(5.0)),
            Component::new(ComponentId(2), Resistor::default()),
            Component::new(ComponentId(3), Ground::default()),
        ]);
        link_pair(&mut set, tr(1, "pos"), tr(2, "p1"));
        link_pair(&mut set, tr(2, "p2"), tr(3, "gnd"));
        let topology = Topology::build(&set);
        assert_eq!(topology.ground_source(), Some(GroundSource::GroundDevice(ComponentId(3))));
        assert_eq!(topology.ground(), topology.node_id_for(ComponentId(3), "gnd"));
        assert_eq!(topology.ground_node().unwrap().voltage(), 0.0);
    }

    #[test]
    fn source_reference_is_second_choice() {
        let mut set = components(vec![
            Component::new(ComponentId(1), Resistor::default()),
            Component::new(ComponentId(2), DcVoltageSource::new(5.0)),
        ]);
        link_pair(&mut set, tr(2, "neg"), tr(1, "p2"));
        let topology = Topology::build(&set);
        assert_eq!(
            topology.ground_source(),
            Some(GroundSource::SourceReference(ComponentId(2)))
        );
        assert_eq!(topology.ground(), topology.node_id_for(ComponentId(1), "p2"));
    }

    #[test]
    fn first_node_is_third_choice() {
        let set = components(vec![Component::new(ComponentId(1), Resistor::default())]);
        let topology = Topology::build(&set);
        assert_eq!(topology.ground_source(), Some(GroundSource::FirstNode));
        assert_eq!(topology.ground(), topology.nodes().next().map(Node::id));
    }

    #[test]
    fn empty_circuit_gets_placeholder_ground() {
        let topology = Topology::build(&BTreeMap::new());
        assert_eq!(topology.ground_source(), Some(GroundSource::Placeholder));
        assert_eq!(topology.len(), 1);
        let ground = topology.ground_node().unwrap();
        assert!(ground.is_empty());
        assert_eq!(ground.voltage(), 0.0);
        assert!(topology.partition().is_empty());
    }

    #[test]
    fn inherited_voltages_follow_terminals() {
        let mut set = components(vec![
            Component::new(ComponentId(1), Ground::default()),
            Component::new(ComponentId(2), Resistor::default()),
        ]);
        let mut first = Topology::build(&set);
        first.node_for_mut(ComponentId(2), "p1").unwrap().set_voltage(3.0);

        link_pair(&mut set, tr(2, "p2"), tr(1, "gnd"));
        let mut second = Topology::build(&set);
        second.inherit_voltages(&first);
        assert_eq!(second.node_for(ComponentId(2), "p1").unwrap().voltage(), 3.0);
        assert_eq!(second.ground_node().unwrap().voltage(), 0.0);
    }

    #[test]
    fn detaching_last_terminal_drops_node() {
        let set = components(vec![
            Component::new(ComponentId(1), Ground::default()),
            Component::new(ComponentId(2), Resistor::default()),
        ]);
        let mut topology = Topology::build(&set);
        assert_eq!(topology.len(), 3);
        assert!(topology.detach_terminal(&tr(2, "p1")));
        assert_eq!(topology.len(), 2);
        assert!(topology.node_for(ComponentId(2), "p1").is_none());
        assert!(!topology.detach_terminal(&tr(2, "p1")));
    }

    #[test]
    fn detaching_ground_clears_ground() {
        let set = components(vec![Component::new(ComponentId(1), Ground::default())]);
        let mut topology = Topology::build(&set);
        assert_eq!(topology.detach_component(ComponentId(1)), 1);
        assert!(topology.ground().is_none());
        assert!(topology.is_empty());
    }
}
