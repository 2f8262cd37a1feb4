//! Voltaic Core -- the simulation engine for lumped electronic circuits.
//!
//! This crate provides the component model, the connection-graph builder
//! that turns linked terminals into electrical nodes, the two-phase
//! simulation loop, bounded per-component history, the event notifier, and
//! snapshot support.
//!
//! # Step Pipeline
//!
//! Each call to [`simulator::Simulator::update`] advances simulated time by
//! one step through the following phases:
//!
//! 1. **Build** -- Rebuild nodes and resolve ground if the topology changed.
//! 2. **Compute** -- Every component calculates a [`component::StateDelta`]
//!    from a read-only [`view::CircuitView`]. No state is written.
//! 3. **Commit** -- Deltas are merged into component state and recorded in
//!    history; source drives are written to their nodes; ground is re-pinned.
//! 4. **Diagnostics** -- Per-node current sums are recomputed and checked.
//! 5. **Bookkeeping** -- Advance simulated time and emit an update event.
//!
//! Because every component reads only last-step-committed values, the
//! result of a step does not depend on component iteration order.
//!
//! # Key Types
//!
//! - [`simulator::Simulator`] -- Owns components, nodes, history, and events.
//! - [`component::Component`] -- A placed device with terminals and state.
//! - [`device::Device`] -- The closed set of device variants.
//! - [`graph::Topology`] -- Nodes derived from terminal links, plus ground.
//! - [`event::EventBus`] -- Ordered listener registry with a recent-event log.
//! - [`serialize`] -- Circuit snapshots and versioned binary encoding.

pub mod circuits;
pub mod component;
pub mod config;
pub mod device;
pub mod dirty;
pub mod event;
pub mod graph;
pub mod history;
pub mod id;
pub mod node;
pub mod profiling;
pub mod serialize;
pub mod sim;
pub mod simulator;
pub mod view;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
