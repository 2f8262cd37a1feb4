//! Bounded per-component history of committed state values.
//!
//! Rings are created explicitly when a component is registered (one per
//! numeric state entry: scalar, flag, or nested sub-key) and recreated on
//! reset. Writes to entries without a ring are dropped, so the set of
//! tracked series is fixed by the device's default state.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::component::{ComponentState, StateDelta, StateValue};
use crate::id::ComponentId;

// ---------------------------------------------------------------------------
// RingBuffer
// ---------------------------------------------------------------------------

/// A fixed-capacity ring buffer. When full, the oldest entry is
/// overwritten. Iterates oldest-to-newest.
///
/// Backs both the per-series history and the event bus's recent-event log.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    slots: Vec<Option<T>>,
    /// Next write position; once full it also holds the oldest entry.
    head: usize,
    len: usize,
}

impl<T> RingBuffer<T> {
    /// Create a new ring buffer with the given capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "RingBuffer capacity must be > 0");
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            head: 0,
            len: 0,
        }
    }

    /// Push a value, overwriting the oldest entry if at capacity. Returns
    /// `true` if an entry was overwritten.
    pub fn push(&mut self, value: T) -> bool {
        let overwrote = self.slots[self.head].replace(value).is_some();
        self.head = (self.head + 1) % self.capacity();
        if self.len < self.capacity() {
            self.len += 1;
        }
        overwrote
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Maximum number of entries held before the oldest is overwritten.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// The most recently pushed value, if any.
    pub fn latest(&self) -> Option<&T> {
        let idx = (self.head + self.capacity() - 1) % self.capacity();
        self.slots[idx].as_ref()
    }

    /// Iterate values from oldest to newest.
    pub fn iter(&self) -> RingBufferIter<'_, T> {
        let start = if self.len < self.capacity() {
            0
        } else {
            self.head
        };
        RingBufferIter {
            buffer: self,
            index: start,
            remaining: self.len,
        }
    }

    /// Drop every entry, keeping the capacity.
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.head = 0;
        self.len = 0;
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Copy the entries out, oldest first.
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}

/// Iterator over [`RingBuffer`] values, oldest to newest.
pub struct RingBufferIter<'a, T> {
    buffer: &'a RingBuffer<T>,
    index: usize,
    remaining: usize,
}

impl<'a, T> Iterator for RingBufferIter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let value = self.buffer.slots[self.index].as_ref();
        self.index = (self.index + 1) % self.buffer.capacity();
        self.remaining -= 1;
        value
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> ExactSizeIterator for RingBufferIter<'_, T> {}

// ---------------------------------------------------------------------------
// Keys and samples
// ---------------------------------------------------------------------------

/// One recorded value at a point in simulated time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HistorySample {
    pub time: f64,
    pub value: f64,
}

/// Identifies one series: a state category and, for nested categories, a
/// sub-key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HistoryKey {
    pub category: String,
    pub sub_key: Option<String>,
}

impl HistoryKey {
    pub fn new(category: &str, sub_key: Option<&str>) -> Self {
        Self {
            category: category.to_string(),
            sub_key: sub_key.map(str::to_string),
        }
    }
}

impl fmt::Display for HistoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sub_key {
            Some(sub) => write!(f, "{}.{}", self.category, sub),
            None => f.write_str(&self.category),
        }
    }
}

/// Every numeric series a state value contributes. Labels contribute none.
fn numeric_entries<'a>(
    category: &'a str,
    value: &'a StateValue,
) -> Box<dyn Iterator<Item = (HistoryKey, f64)> + 'a> {
    match value {
        StateValue::Nested(map) => Box::new(
            map.iter()
                .map(move |(k, v)| (HistoryKey::new(category, Some(k)), *v)),
        ),
        other => Box::new(
            other
                .as_number()
                .map(|v| (HistoryKey::new(category, None), v))
                .into_iter(),
        ),
    }
}

// ---------------------------------------------------------------------------
// HistoryStore
// ---------------------------------------------------------------------------

type Series = BTreeMap<HistoryKey, RingBuffer<HistorySample>>;

/// History rings for every registered component.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    capacity: usize,
    series: HashMap<ComponentId, Series>,
}

impl HistoryStore {
    /// A zero capacity is clamped to 1.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            series: HashMap::new(),
        }
    }

    /// Samples kept per series.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Create empty rings for every numeric entry of `state`, replacing any
    /// the component already had.
    pub fn register(&mut self, id: ComponentId, state: &ComponentState) {
        let rings = state
            .iter()
            .flat_map(|(category, value)| numeric_entries(category, value))
            .map(|(key, _)| (key, RingBuffer::new(self.capacity)))
            .collect();
        self.series.insert(id, rings);
    }

    /// Drop a component's rings along with their samples.
    pub fn unregister(&mut self, id: ComponentId) {
        self.series.remove(&id);
    }

    /// Drop every component's rings.
    pub fn clear(&mut self) {
        self.series.clear();
    }

    pub fn is_registered(&self, id: ComponentId) -> bool {
        self.series.contains_key(&id)
    }

    /// Append every numeric value a delta writes, stamped with `time`.
    /// Values without a ring are dropped.
    pub fn record(&mut self, id: ComponentId, delta: &StateDelta, time: f64) {
        let Some(rings) = self.series.get_mut(&id) else {
            return;
        };
        for (category, value) in delta.updates() {
            for (key, v) in numeric_entries(category, value) {
                if let Some(ring) = rings.get_mut(&key) {
                    ring.push(HistorySample { time, value: v });
                }
            }
        }
    }

    /// The ring backing one series, if it is tracked.
    pub fn ring(
        &self,
        id: ComponentId,
        key: &HistoryKey,
    ) -> Option<&RingBuffer<HistorySample>> {
        self.series.get(&id)?.get(key)
    }

    /// Samples for one series, oldest first. Empty if unknown.
    pub fn get(
        &self,
        id: ComponentId,
        category: &str,
        sub_key: Option<&str>,
    ) -> Vec<HistorySample> {
        self.ring(id, &HistoryKey::new(category, sub_key))
            .map(RingBuffer::to_vec)
            .unwrap_or_default()
    }

    /// Every series tracked for a component.
    pub fn keys(&self, id: ComponentId) -> impl Iterator<Item = &HistoryKey> {
        self.series.get(&id).into_iter().flat_map(|s| s.keys())
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::keys;
    use crate::device::{Device, Led, Resistor};

    #[test]
    fn ring_overwrites_oldest() {
        let mut ring = RingBuffer::<u32>::new(3);
        for i in 1..=5 {
            ring.push(i);
        }
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.to_vec(), vec![3, 4, 5]);
        assert_eq!(ring.latest(), Some(&5));
        assert_eq!(ring.iter().len(), 3);
    }

    #[test]
    fn ring_partial_fill_and_clear() {
        let mut ring = RingBuffer::<u32>::new(4);
        assert!(!ring.push(7));
        ring.push(8);
        assert_eq!(ring.to_vec(), vec![7, 8]);
        assert_eq!(ring.latest(), Some(&8));
        ring.clear();
        assert!(ring.is_empty());
        assert_eq!(ring.latest(), None);
        assert_eq!(ring.capacity(), 4);
    }

    #[test]
    fn ring_holds_values_without_default() {
        let mut ring = RingBuffer::new(2);
        ring.push("a".to_string());
        ring.push("b".to_string());
        assert!(ring.push("c".to_string()));
        let held: Vec<&str> = ring.iter().map(String::as_str).collect();
        assert_eq!(held, ["b", "c"]);
    }

    #[test]
    #[should_panic(expected = "capacity must be > 0")]
    fn ring_rejects_zero_capacity() {
        RingBuffer::<u32>::new(0);
    }

    #[test]
    fn register_creates_series_for_numeric_entries_only() {
        let mut store = HistoryStore::new(10);
        let led = Device::from(Led::default());
        store.register(ComponentId(1), &led.default_state());
        let keys: Vec<String> = store.keys(ComponentId(1)).map(|k| k.to_string()).collect();
        assert!(keys.contains(&"currents.anode".to_string()));
        assert!(keys.contains(&"conducting".to_string()));
        assert!(keys.contains(&"brightness".to_string()));
        assert!(!keys.iter().any(|k| k == "color"));
    }

    #[test]
    fn record_appends_with_timestamp() {
        let mut store = HistoryStore::new(10);
        let r = Device::from(Resistor::default());
        store.register(ComponentId(1), &r.default_state());
        let delta = StateDelta::new().current("p1", 0.5).scalar(keys::POWER, 2.0);
        store.record(ComponentId(1), &delta, 0.25);
        assert_eq!(
            store.get(ComponentId(1), keys::CURRENTS, Some("p1")),
            vec![HistorySample { time: 0.25, value: 0.5 }]
        );
        assert_eq!(store.get(ComponentId(1), keys::POWER, None).len(), 1);
        assert!(store.get(ComponentId(1), keys::CURRENTS, Some("p2")).is_empty());
    }

    #[test]
    fn record_drops_untracked_series() {
        let mut store = HistoryStore::new(10);
        let r = Device::from(Resistor::default());
        store.register(ComponentId(1), &r.default_state());
        store.record(ComponentId(1), &StateDelta::new().scalar("bogus", 1.0), 0.0);
        assert!(store.get(ComponentId(1), "bogus", None).is_empty());
        // unregistered components are ignored entirely
        store.record(ComponentId(2), &StateDelta::new().scalar(keys::POWER, 1.0), 0.0);
        assert!(!store.is_registered(ComponentId(2)));
    }

    #[test]
    fn history_is_bounded_fifo() {
        let mut store = HistoryStore::new(3);
        let r = Device::from(Resistor::default());
        store.register(ComponentId(1), &r.default_state());
        for step in 0..5 {
            let delta = StateDelta::new().scalar(keys::POWER, step as f64);
            store.record(ComponentId(1), &delta, step as f64 * 0.1);
        }
        let values: Vec<f64> = store
            .get(ComponentId(1), keys::POWER, None)
            .iter()
            .map(|s| s.value)
            .collect();
        assert_eq!(values, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn reregistering_empties_rings() {
        let mut store = HistoryStore::new(3);
        let state = Device::from(Resistor::default()).default_state();
        store.register(ComponentId(1), &state);
        store.record(ComponentId(1), &StateDelta::new().scalar(keys::POWER, 1.0), 0.0);
        store.register(ComponentId(1), &state);
        assert!(store.get(ComponentId(1), keys::POWER, None).is_empty());
    }
}
