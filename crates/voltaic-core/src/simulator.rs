//! The simulator: owns the component set, the derived nodes, history, and
//! the event bus, and orchestrates the step pipeline.
//!
//! # Architecture
//!
//! The `Simulator` owns:
//! - A map of [`Component`]s keyed by [`ComponentId`] (iterated in id order)
//! - A [`Topology`] derived from the components' terminal links
//! - A [`HistoryStore`] with one bounded ring per numeric state entry
//! - An [`EventBus`] for lifecycle and topology events
//! - A [`DirtyTracker`] recording topology and component changes
//!
//! Nothing in this module returns an error. Operations on unknown
//! components or terminals return `false` (or a zero value) and log a
//! warning.

use std::collections::BTreeMap;
use std::time::Instant;

use tracing::{debug, info, trace, warn};

use crate::component::{Component, StateDelta};
use crate::config::SimConfig;
use crate::device::Device;
use crate::dirty::DirtyTracker;
use crate::event::{Event, EventBus, Listener};
use crate::graph::{GroundSource, Topology};
use crate::history::{HistorySample, HistoryStore};
use crate::id::{ComponentId, ListenerId, NodeId, TerminalRef};
use crate::node::Node;
use crate::profiling::{NodeDiagnostic, StepProfile};
use crate::serialize::{CircuitSnapshot, ComponentFactory, ComponentRecord};
use crate::sim::{FpsMeter, RunState, StateHash, StepStats};
use crate::view::CircuitView;

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

/// A lumped circuit simulator.
#[derive(Debug)]
pub struct Simulator {
    config: SimConfig,
    components: BTreeMap<ComponentId, Component>,
    topology: Topology,
    dirty: DirtyTracker,
    history: HistoryStore,
    events: EventBus,
    run_state: RunState,
    simulation_time: f64,
    time_step: f64,
    iteration: u64,
    fps: FpsMeter,
    last_update: Option<Instant>,
    last_stats: StepStats,
}

impl Simulator {
    /// Create an empty, stopped simulator. The configuration is taken as
    /// given; use [`SimConfig::validate`] first when it comes from a file.
    pub fn new(config: SimConfig) -> Self {
        let mut dirty = DirtyTracker::new();
        dirty.mark_topology();
        Self {
            history: HistoryStore::new(config.history_length),
            events: EventBus::new(config.event_log_capacity),
            time_step: config.time_step,
            config,
            components: BTreeMap::new(),
            topology: Topology::default(),
            dirty,
            run_state: RunState::Stopped,
            simulation_time: 0.0,
            iteration: 0,
            fps: FpsMeter::default(),
            last_update: None,
            last_stats: StepStats::default(),
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Components
    // -----------------------------------------------------------------------

    /// Add a component. Returns `false` if the id is already taken.
    pub fn add_component(&mut self, component: Component) -> bool {
        let id = component.id();
        if self.components.contains_key(&id) {
            warn!(component = %id, "component id already in use");
            return false;
        }
        self.history.register(id, component.state());
        self.components.insert(id, component);
        self.dirty.mark_topology();
        debug!(component = %id, "component added");
        self.events.notify(Event::ComponentAdded { component: id });
        true
    }

    /// Remove a component and every link to or from it. Nodes left without
    /// members are dropped immediately.
    pub fn remove_component(&mut self, id: ComponentId) -> bool {
        if self.components.remove(&id).is_none() {
            warn!(component = %id, "cannot remove unknown component");
            return false;
        }
        for other in self.components.values_mut() {
            other.unlink_component(id);
        }
        let dropped = self.topology.detach_component(id);
        self.history.unregister(id);
        self.dirty.mark_topology();
        debug!(component = %id, dropped_nodes = dropped, "component removed");
        self.events.notify(Event::ComponentRemoved { component: id });
        true
    }

    pub fn component(&self, id: ComponentId) -> Option<&Component> {
        self.components.get(&id)
    }

    /// Components in id order.
    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.components.values()
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Edit a component's device properties between steps.
    pub fn device_mut(&mut self, id: ComponentId) -> Option<&mut Device> {
        let component = self.components.get_mut(&id)?;
        self.dirty.mark_component(id);
        Some(component.device_mut())
    }

    /// One past the highest id in use.
    pub fn next_component_id(&self) -> ComponentId {
        self.components
            .keys()
            .next_back()
            .map_or(ComponentId(0), |id| ComponentId(id.0 + 1))
    }

    /// Drop every component, node, and history ring. Simulated time and the
    /// run state are left alone.
    pub fn clear(&mut self) {
        self.components.clear();
        self.topology = Topology::default();
        self.history.clear();
        self.dirty.mark_clean();
        self.dirty.mark_topology();
        info!("circuit cleared");
    }

    // -----------------------------------------------------------------------
    // Connections
    // -----------------------------------------------------------------------

    /// Link `a.ta` to `b.tb` in both directions.
    ///
    /// Returns `false` if either component or terminal is unknown, if both
    /// ends are the same terminal, or if the link already exists.
    pub fn connect(&mut self, a: ComponentId, ta: &str, b: ComponentId, tb: &str) -> bool {
        if !self.check_terminal(a, ta) || !self.check_terminal(b, tb) {
            return false;
        }
        let from = TerminalRef::new(a, ta);
        let to = TerminalRef::new(b, tb);
        if from == to {
            warn!(terminal = %from, "cannot connect a terminal to itself");
            return false;
        }
        let linked = self
            .components
            .get_mut(&a)
            .is_some_and(|c| c.link(ta, to.clone()));
        if !linked {
            warn!(from = %from, to = %to, "terminals already connected");
            return false;
        }
        if let Some(c) = self.components.get_mut(&b) {
            c.link(tb, from.clone());
        }
        self.dirty.mark_topology();
        debug!(from = %from, to = %to, "connected");
        self.events.notify(Event::ConnectionAdded { from, to });
        true
    }

    /// Remove the link between `a.ta` and `b.tb`. A terminal left with no
    /// links leaves its node; a node left empty is dropped.
    pub fn disconnect(&mut self, a: ComponentId, ta: &str, b: ComponentId, tb: &str) -> bool {
        if !self.check_terminal(a, ta) || !self.check_terminal(b, tb) {
            return false;
        }
        let from = TerminalRef::new(a, ta);
        let to = TerminalRef::new(b, tb);
        let unlinked = self
            .components
            .get_mut(&a)
            .is_some_and(|c| c.unlink(ta, &to));
        if !unlinked {
            warn!(from = %from, to = %to, "terminals are not connected");
            return false;
        }
        if let Some(c) = self.components.get_mut(&b) {
            c.unlink(tb, &from);
        }
        for end in [&from, &to] {
            let orphaned = self
                .components
                .get(&end.component)
                .is_some_and(|c| !c.is_connected(&end.terminal));
            if orphaned {
                self.topology.detach_terminal(end);
            }
        }
        self.dirty.mark_topology();
        debug!(from = %from, to = %to, "disconnected");
        self.events.notify(Event::ConnectionRemoved { from, to });
        true
    }

    fn check_terminal(&self, id: ComponentId, terminal: &str) -> bool {
        match self.components.get(&id) {
            None => {
                warn!(component = %id, "unknown component");
                false
            }
            Some(c) if !c.has_terminal(terminal) => {
                warn!(component = %id, terminal, "unknown terminal");
                false
            }
            Some(_) => true,
        }
    }

    // -----------------------------------------------------------------------
    // Nodes
    // -----------------------------------------------------------------------

    /// Rebuild nodes from the current links and resolve ground. Returns the
    /// number of nodes.
    pub fn build_circuit(&mut self) -> usize {
        self.rebuild();
        self.notify_built();
        self.topology.len()
    }

    /// Swap in a fresh topology. Announcing it is left to the caller so a
    /// step can hold the event until its phases finish.
    fn rebuild(&mut self) {
        let mut topology = Topology::build(&self.components);
        topology.inherit_voltages(&self.topology);
        self.topology = topology;
        self.dirty.clear_topology();
        info!(
            nodes = self.topology.len(),
            components = self.components.len(),
            ground = ?self.topology.ground_source(),
            "circuit built"
        );
    }

    fn notify_built(&mut self) {
        self.events.notify(Event::CircuitBuilt {
            nodes: self.topology.len(),
            components: self.components.len(),
            ground: self.topology.ground(),
        });
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.topology.nodes()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.topology.node(id)
    }

    pub fn node_count(&self) -> usize {
        self.topology.len()
    }

    pub fn node_for_terminal(&self, id: ComponentId, terminal: &str) -> Option<&Node> {
        self.topology.node_for(id, terminal)
    }

    pub fn ground_node(&self) -> Option<&Node> {
        self.topology.ground_node()
    }

    pub fn ground_source(&self) -> Option<GroundSource> {
        self.topology.ground_source()
    }

    /// Hold the node a terminal belongs to at `volts` until something else
    /// writes it. The ground node stays at 0 V.
    pub fn set_terminal_voltage(&mut self, id: ComponentId, terminal: &str, volts: f64) -> bool {
        let Some(node) = self.topology.node_for_mut(id, terminal) else {
            warn!(component = %id, terminal, "no node for terminal");
            return false;
        };
        node.set_voltage(volts);
        self.topology.pin_ground();
        true
    }

    /// Voltage of the node attached to a terminal; 0.0 if unknown.
    pub fn voltage_at(&self, id: ComponentId, terminal: &str) -> f64 {
        self.topology
            .node_for(id, terminal)
            .map_or(0.0, Node::voltage)
    }

    /// Committed current through a terminal; 0.0 if unknown.
    pub fn current_at(&self, id: ComponentId, terminal: &str) -> f64 {
        self.components
            .get(&id)
            .and_then(|c| c.state().current(terminal))
            .unwrap_or(0.0)
    }

    /// The terminal voltage a component last recorded in its own state.
    pub fn terminal_voltage_from_state(&self, id: ComponentId, terminal: &str) -> Option<f64> {
        self.components.get(&id)?.state().voltage(terminal)
    }

    // -----------------------------------------------------------------------
    // History
    // -----------------------------------------------------------------------

    /// Recorded samples for one series, oldest first.
    pub fn history(
        &self,
        id: ComponentId,
        category: &str,
        sub_key: Option<&str>,
    ) -> Vec<HistorySample> {
        self.history.get(id, category, sub_key)
    }

    pub fn history_store(&self) -> &HistoryStore {
        &self.history
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    pub fn add_event_listener(&mut self, listener: Listener) -> ListenerId {
        self.events.subscribe(listener)
    }

    pub fn remove_event_listener(&mut self, id: ListenerId) -> bool {
        self.events.unsubscribe(id)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Start stepping. Simulated time continues from where it was; use
    /// [`reset`](Self::reset) to return to zero.
    pub fn start(&mut self) {
        if self.run_state != RunState::Stopped {
            return;
        }
        self.run_state = RunState::Running;
        self.last_update = None;
        info!(time = self.simulation_time, "simulation started");
        self.events.notify(Event::SimulationStarted {
            time: self.simulation_time,
        });
    }

    pub fn stop(&mut self) {
        if self.run_state == RunState::Stopped {
            return;
        }
        self.run_state = RunState::Stopped;
        info!(time = self.simulation_time, "simulation stopped");
        self.events.notify(Event::SimulationStopped {
            time: self.simulation_time,
        });
    }

    /// Only a running simulation can be paused.
    pub fn pause(&mut self) {
        if self.run_state != RunState::Running {
            return;
        }
        self.run_state = RunState::Paused;
        info!(time = self.simulation_time, "simulation paused");
        self.events.notify(Event::SimulationPaused {
            time: self.simulation_time,
        });
    }

    pub fn resume(&mut self) {
        if self.run_state != RunState::Paused {
            return;
        }
        self.run_state = RunState::Running;
        self.last_update = None;
        info!(time = self.simulation_time, "simulation resumed");
        self.events.notify(Event::SimulationResumed {
            time: self.simulation_time,
        });
    }

    /// Return to a stopped state at time zero with every component's state
    /// reinitialized, empty history, and ground to be resolved again.
    pub fn reset(&mut self) {
        self.run_state = RunState::Stopped;
        self.simulation_time = 0.0;
        self.iteration = 0;
        self.fps.reset();
        self.last_update = None;
        self.last_stats = StepStats::default();
        self.history.clear();
        for component in self.components.values_mut() {
            component.reset_state();
            self.history.register(component.id(), component.state());
        }
        self.topology = Topology::default();
        self.dirty.mark_topology();
        info!("simulation reset");
        self.events.notify(Event::SimulationReset);
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    pub fn is_running(&self) -> bool {
        self.run_state == RunState::Running
    }

    pub fn is_paused(&self) -> bool {
        self.run_state == RunState::Paused
    }

    pub fn simulation_time(&self) -> f64 {
        self.simulation_time
    }

    pub fn time_step(&self) -> f64 {
        self.time_step
    }

    /// Returns `false` (and keeps the old value) for a non-positive or
    /// non-finite step.
    pub fn set_time_step(&mut self, dt: f64) -> bool {
        if !(dt.is_finite() && dt > 0.0) {
            warn!(dt, "rejected time step");
            return false;
        }
        self.time_step = dt;
        true
    }

    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    // -----------------------------------------------------------------------
    // Stepping
    // -----------------------------------------------------------------------

    /// Advance one step.
    ///
    /// With `elapsed` the step covers that much simulated time; without it
    /// the configured time step is used. Returns the previous stats
    /// unchanged when not running or when the circuit is empty.
    pub fn update(&mut self, elapsed: Option<f64>) -> StepStats {
        if self.run_state != RunState::Running || self.components.is_empty() {
            return self.last_stats.clone();
        }
        let step_start = Instant::now();

        let dt = match elapsed {
            Some(e) if e.is_finite() && e > 0.0 => e,
            Some(e) => {
                warn!(elapsed = e, "ignoring invalid elapsed time");
                self.time_step
            }
            None => self.time_step,
        };
        let interval = match elapsed {
            Some(e) => Some(e),
            None => self
                .last_update
                .map(|last| step_start.duration_since(last).as_secs_f64()),
        };
        if let Some(interval) = interval {
            self.fps.record(interval, self.config.fps_smoothing);
        }
        self.last_update = Some(step_start);

        // Phase 1: Build -- rebuild nodes if the topology changed.
        let phase_start = Instant::now();
        let rebuilt = self.dirty.is_topology_dirty() || self.topology.ground().is_none();
        if rebuilt {
            self.rebuild();
        }
        let build = phase_start.elapsed();

        // Phase 2: Compute -- every component reads last-committed state.
        let phase_start = Instant::now();
        let deltas = self.phase_compute(dt);
        let compute = phase_start.elapsed();

        // Phase 3: Commit -- merge deltas, record history, apply drives.
        let phase_start = Instant::now();
        self.phase_commit(deltas);
        let commit = phase_start.elapsed();

        // Phase 4: Diagnostics -- per-node current sums.
        let phase_start = Instant::now();
        let unbalanced_nodes = self.phase_diagnostics();
        let diagnostics = phase_start.elapsed();

        // Phase 5: Bookkeeping.
        self.simulation_time += dt;
        self.iteration += 1;
        let stats = StepStats {
            iteration: self.iteration,
            dt,
            simulation_time: self.simulation_time,
            fps: self.fps.fps(),
            unbalanced_nodes,
            profile: StepProfile {
                build,
                compute,
                commit,
                diagnostics,
                total: step_start.elapsed(),
            },
        };
        trace!(
            iteration = stats.iteration,
            time = stats.simulation_time,
            unbalanced = unbalanced_nodes,
            "step complete"
        );
        self.last_stats = stats.clone();
        // listeners only hear about the step once it is fully committed
        if rebuilt {
            self.notify_built();
        }
        self.events.notify(Event::SimulationUpdated(stats.clone()));
        stats
    }

    fn phase_compute(&self, dt: f64) -> Vec<(ComponentId, StateDelta)> {
        let view = CircuitView::new(&self.components, &self.topology, self.simulation_time);
        self.components
            .values()
            .map(|c| (c.id(), c.calculate(&view, dt)))
            .collect()
    }

    fn phase_commit(&mut self, deltas: Vec<(ComponentId, StateDelta)>) {
        let mut drives = Vec::new();
        for (id, delta) in deltas {
            self.history.record(id, &delta, self.simulation_time);
            drives.extend(delta.drives().iter().map(|d| (id, d.terminal, d.volts)));
            if let Some(component) = self.components.get_mut(&id) {
                component.apply(delta);
                self.dirty.mark_component(id);
            }
        }
        for (id, terminal, volts) in drives {
            if let Some(node) = self.topology.node_for_mut(id, terminal) {
                node.set_voltage(volts);
            }
        }
        self.topology.pin_ground();
    }

    fn phase_diagnostics(&mut self) -> usize {
        let epsilon = self.config.current_epsilon;
        let components = &self.components;
        let mut unbalanced = 0;
        for node in self.topology.nodes_mut() {
            let sum: f64 = node
                .members()
                .filter_map(|m| components.get(&m.component)?.state().current(&m.terminal))
                .sum();
            node.set_current_sum(sum);
            if sum.abs() > epsilon {
                unbalanced += 1;
                debug!(node = ?node.id(), current_sum = sum, "current not conserved at node");
            }
        }
        unbalanced
    }

    /// Stats of the most recent step.
    pub fn last_stats(&self) -> &StepStats {
        &self.last_stats
    }

    /// Run one component's compute phase against the current committed
    /// state without committing anything.
    pub fn calculate_component(&self, id: ComponentId, dt: f64) -> Option<StateDelta> {
        let component = self.components.get(&id)?;
        let view = CircuitView::new(&self.components, &self.topology, self.simulation_time);
        Some(component.calculate(&view, dt))
    }

    // -----------------------------------------------------------------------
    // Diagnostics
    // -----------------------------------------------------------------------

    /// Break a node's current sum down by member terminal.
    pub fn diagnose_node(&self, id: NodeId) -> Option<NodeDiagnostic> {
        let node = self.topology.node(id)?;
        let contributions: Vec<(TerminalRef, f64)> = node
            .members()
            .map(|m| (m.clone(), self.current_at(m.component, &m.terminal)))
            .collect();
        let current_sum = contributions.iter().map(|(_, i)| i).sum::<f64>();
        Some(NodeDiagnostic {
            node: id,
            voltage: node.voltage(),
            is_ground: self.topology.is_ground(id),
            contributions,
            current_sum,
            balanced: current_sum.abs() <= self.config.current_epsilon,
        })
    }

    pub fn dirty_tracker(&self) -> &DirtyTracker {
        &self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty.mark_clean();
    }

    /// FNV hash over simulated time, node voltages, and committed state,
    /// for comparing two runs.
    pub fn state_hash(&self) -> u64 {
        let mut hasher = StateHash::new();
        hasher.write_f64(self.simulation_time);
        hasher.write_u64(self.iteration);
        for component in self.components.values() {
            hasher.write_u32(component.id().0);
            for terminal in component.terminal_names() {
                hasher.write_str(terminal);
                hasher.write_f64(self.voltage_at(component.id(), terminal));
            }
            for (category, value) in component.state().iter() {
                hasher.write_str(category);
                hasher.write_state_value(value);
            }
        }
        hasher.finish()
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    /// Capture the circuit: every component, the time fields, and the
    /// ground node.
    ///
    /// Ground is taken from the nodes a build of the current links would
    /// produce, so links edited since the last build are reflected.
    pub fn to_snapshot(&self) -> CircuitSnapshot {
        let fresh;
        let topology = if self.dirty.is_topology_dirty() {
            fresh = Topology::build(&self.components);
            &fresh
        } else {
            &self.topology
        };
        CircuitSnapshot {
            components: self
                .components
                .values()
                .map(ComponentRecord::from_component)
                .collect(),
            simulation_time: self.simulation_time,
            time_step: self.time_step,
            ground_node_id: topology.ground(),
            ground_terminal: topology
                .ground_node()
                .and_then(|node| node.members().next().cloned()),
        }
    }

    /// Replace the circuit with one restored from a snapshot. Components
    /// are created through `factory`; records it declines are skipped.
    /// Returns the number of components loaded.
    pub fn load_snapshot(
        &mut self,
        snapshot: &CircuitSnapshot,
        factory: &dyn ComponentFactory,
    ) -> usize {
        self.clear();
        self.simulation_time = snapshot.simulation_time;
        if !self.set_time_step(snapshot.time_step) {
            self.time_step = self.config.time_step;
        }

        let mut loaded = 0;
        for record in &snapshot.components {
            match factory.create(record) {
                Some(component) => {
                    if self.add_component(component) {
                        loaded += 1;
                    }
                }
                None => warn!(component = %record.id, kind = %record.kind(), "factory declined record"),
            }
        }

        self.rebuild();
        let ground = match &snapshot.ground_terminal {
            Some(member) => self.topology.node_id_for(member.component, &member.terminal),
            None => snapshot.ground_node_id,
        };
        if let Some(ground) = ground {
            if self.topology.set_ground(ground, GroundSource::Restored) {
                debug!(node = ?ground, "restored ground node");
            }
        }
        info!(
            components = loaded,
            nodes = self.topology.len(),
            "circuit loaded"
        );
        self.notify_built();
        loaded
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

// ===========================================================================
// Tests
// ===========================================================================
