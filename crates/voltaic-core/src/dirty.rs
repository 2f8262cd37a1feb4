use std::collections::BTreeSet;

use crate::id::ComponentId;

/// Tracks what changed since the last clean point.
///
/// The simulator consults the topology flag to decide whether nodes must
/// be rebuilt before a step; the component set lets a front end redraw only
/// what changed. Call [`mark_clean`](DirtyTracker::mark_clean) after
/// consuming the changes.
#[derive(Debug, Clone, Default)]
pub struct DirtyTracker {
    dirty_components: BTreeSet<ComponentId>,
    topology_dirty: bool,
}

impl DirtyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a component's state or properties as changed.
    pub fn mark_component(&mut self, id: ComponentId) {
        self.dirty_components.insert(id);
    }

    /// Mark the terminal-link topology as changed (component or link added
    /// or removed).
    pub fn mark_topology(&mut self) {
        self.topology_dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.topology_dirty || !self.dirty_components.is_empty()
    }

    pub fn is_component_dirty(&self, id: ComponentId) -> bool {
        self.dirty_components.contains(&id)
    }

    pub fn is_topology_dirty(&self) -> bool {
        self.topology_dirty
    }

    pub fn dirty_components(&self) -> &BTreeSet<ComponentId> {
        &self.dirty_components
    }

    /// Clear only the topology flag, after a rebuild.
    pub(crate) fn clear_topology(&mut self) {
        self.topology_dirty = false;
    }

    /// Clear the component set. The topology flag is owned by the
    /// simulator and survives until the next rebuild.
    pub fn mark_clean(&mut self) {
        self.dirty_components.clear();
    }
}
