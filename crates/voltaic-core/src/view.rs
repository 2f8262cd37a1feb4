//! Read-only views handed to components during the compute phase.

use std::collections::BTreeMap;

use crate::component::{Component, ComponentState};
use crate::graph::Topology;
use crate::id::ComponentId;
use crate::node::Node;

/// Last-step-committed circuit state: node voltages, component state, and
/// the simulated time at the start of the step.
#[derive(Debug, Clone, Copy)]
pub struct CircuitView<'a> {
    components: &'a BTreeMap<ComponentId, Component>,
    topology: &'a Topology,
    simulation_time: f64,
}

impl<'a> CircuitView<'a> {
    pub fn new(
        components: &'a BTreeMap<ComponentId, Component>,
        topology: &'a Topology,
        simulation_time: f64,
    ) -> Self {
        Self {
            components,
            topology,
            simulation_time,
        }
    }

    pub fn simulation_time(&self) -> f64 {
        self.simulation_time
    }

    pub fn node_for(&self, component: ComponentId, terminal: &str) -> Option<&'a Node> {
        self.topology.node_for(component, terminal)
    }

    pub fn voltage(&self, component: ComponentId, terminal: &str) -> Option<f64> {
        self.node_for(component, terminal).map(Node::voltage)
    }

    pub fn committed_current(&self, component: ComponentId, terminal: &str) -> Option<f64> {
        self.components.get(&component)?.state().current(terminal)
    }

    /// Sum of the committed currents of every other component's terminals
    /// sharing a node with `terminal`.
    pub fn peer_current(&self, component: ComponentId, terminal: &str) -> f64 {
        let Some(node) = self.node_for(component, terminal) else {
            return 0.0;
        };
        node.members()
            .filter(|m| m.component != component)
            .filter_map(|m| self.committed_current(m.component, &m.terminal))
            .sum()
    }
}

/// What a device sees while calculating: its own component, the circuit
/// view, and the step size.
#[derive(Debug, Clone, Copy)]
pub struct DeviceContext<'a> {
    component: &'a Component,
    view: &'a CircuitView<'a>,
    dt: f64,
}

impl<'a> DeviceContext<'a> {
    pub fn new(component: &'a Component, view: &'a CircuitView<'a>, dt: f64) -> Self {
        Self {
            component,
            view,
            dt,
        }
    }

    pub fn id(&self) -> ComponentId {
        self.component.id()
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn simulation_time(&self) -> f64 {
        self.view.simulation_time()
    }

    /// Own committed state.
    pub fn state(&self) -> &'a ComponentState {
        self.component.state()
    }

    /// Voltage of the node attached to `terminal`, or 0.0 if unattached.
    pub fn voltage(&self, terminal: &str) -> f64 {
        self.view.voltage(self.id(), terminal).unwrap_or(0.0)
    }

    pub fn peer_current(&self, terminal: &str) -> f64 {
        self.view.peer_current(self.id(), terminal)
    }

    pub fn link_count(&self, terminal: &str) -> usize {
        self.component.links(terminal).len()
    }
}
