//! An [AccessOrderedIndex] is a map which remembers the order in which its keys were last touched.
//!
//! This is implemented as a vec-backed doubly linked list, plus an auxiliary hash-based index from key to slot.  Freed
//! slots are threaded onto a free list and reused, so a cache at steady state doesn't allocate.
//!
//! Each slot also remembers the cost its entry was inserted with, and the index keeps the running total.  Keeping the
//! two together is what lets the caches built on top promise that the total is always exactly the sum of the live
//! entries.
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use ahash::RandomState;

struct OccupiedSlot<K, V> {
    key: Arc<K>,
    value: V,
    /// Towards the most recently used end.
    newer: Option<usize>,
    /// Towards the least recently used end.
    older: Option<usize>,
    cost: u64,
}

struct EmptySlot {
    next_empty: Option<usize>,
}

enum Slot<K, V> {
    /// This slot is empty, possibly with a pointer at the next empty slot.
    Empty(EmptySlot),
    /// This slot is occupied, and doubly linked to its neighbours in access order.
    Occupied(OccupiedSlot<K, V>),
}

impl<K, V> Slot<K, V> {
    fn as_occupied_mut(&mut self) -> &mut OccupiedSlot<K, V> {
        match self {
            Self::Occupied(ref mut x) => x,
            _ => panic!("Slot should be occupied"),
        }
    }

    fn as_occupied(&self) -> &OccupiedSlot<K, V> {
        match self {
            Self::Occupied(ref x) => x,
            _ => panic!("Slot should be occupied"),
        }
    }

    fn as_empty_mut(&mut self) -> &mut EmptySlot {
        match self {
            Slot::Empty(ref mut x) => x,
            _ => panic!("Slot should be empty"),
        }
    }
}

pub struct AccessOrderedIndex<K: Hash + Eq, V> {
    slots: Vec<Slot<K, V>>,
    /// Points at the slot of the key.
    index: HashMap<Arc<K>, usize, RandomState>,
    most_recent: Option<usize>,
    least_recent: Option<usize>,
    empty_head: Option<usize>,
    /// Sum of the costs of the occupied slots.
    total_cost: u64,
}

impl<K: Hash + Eq, V> Default for AccessOrderedIndex<K, V> {
    fn default() -> Self {
        AccessOrderedIndex::new()
    }
}

impl<K: Hash + Eq, V> AccessOrderedIndex<K, V> {
    pub fn new() -> AccessOrderedIndex<K, V> {
        AccessOrderedIndex {
            slots: Default::default(),
            index: Default::default(),
            most_recent: None,
            least_recent: None,
            empty_head: None,
            total_cost: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn total_cost(&self) -> u64 {
        self.total_cost
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Entirely unlink an occupied slot from the list.
    fn unlink(&mut self, slot: usize) {
        let (newer, older) = {
            let s = self.slots[slot].as_occupied_mut();
            let links = (s.newer, s.older);
            s.newer = None;
            s.older = None;
            links
        };

        match newer {
            Some(n) => self.slots[n].as_occupied_mut().older = older,
            None => self.most_recent = older,
        }

        match older {
            Some(o) => self.slots[o].as_occupied_mut().newer = newer,
            None => self.least_recent = newer,
        }
    }

    /// Link an unlinked occupied slot in as the most recently used.
    fn link_most_recent(&mut self, slot: usize) {
        let old_head = self.most_recent;
        {
            let s = self.slots[slot].as_occupied_mut();
            s.older = old_head;
            s.newer = None;
        }

        if let Some(h) = old_head {
            self.slots[h].as_occupied_mut().newer = Some(slot);
        }
        self.most_recent = Some(slot);

        // If this is the only entry, it's also the tail.
        if self.least_recent.is_none() {
            self.least_recent = Some(slot);
        }
    }

    fn touch(&mut self, slot: usize) {
        if self.most_recent != Some(slot) {
            self.unlink(slot);
            self.link_most_recent(slot);
        }
    }

    /// Look up a value, making it the most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let slot = *self.index.get(key)?;
        self.touch(slot);
        Some(&self.slots[slot].as_occupied().value)
    }

    /// The cost an entry was inserted with.
    pub fn cost_of(&self, key: &K) -> Option<u64> {
        let slot = *self.index.get(key)?;
        Some(self.slots[slot].as_occupied().cost)
    }

    /// Look up a value without changing the access order.
    pub fn peek(&self, key: &K) -> Option<&V> {
        let slot = *self.index.get(key)?;
        Some(&self.slots[slot].as_occupied().value)
    }

    /// Find an available empty slot, or make one if necessary.
    fn find_empty(&mut self) -> usize {
        if let Some(e) = self.empty_head {
            self.empty_head = self.slots[e].as_empty_mut().next_empty;
            return e;
        }

        self.slots.push(Slot::Empty(EmptySlot { next_empty: None }));
        self.slots.len() - 1
    }

    /// Make a specific slot become empty, returning what was in it.
    fn become_empty(&mut self, slot: usize) -> (Arc<K>, V) {
        self.unlink(slot);
        let old = std::mem::replace(
            &mut self.slots[slot],
            Slot::Empty(EmptySlot {
                next_empty: self.empty_head,
            }),
        );
        self.empty_head = Some(slot);
        match old {
            Slot::Occupied(OccupiedSlot { key, value, cost, .. }) => {
                self.index.remove(&key);
                self.total_cost -= cost;
                (key, value)
            }
            _ => panic!("Should have been occupied"),
        }
    }

    /// Insert or replace an entry, making it the most recently used.  Returns the previous value for this key.
    ///
    /// A replacement keeps the key already in the index and swaps the cost along with the value.
    pub fn insert(&mut self, key: Arc<K>, value: V, cost: u64) -> Option<V> {
        if let Some(&slot) = self.index.get(&key) {
            let old = {
                let s = self.slots[slot].as_occupied_mut();
                let old_cost = std::mem::replace(&mut s.cost, cost);
                let old = std::mem::replace(&mut s.value, value);
                self.total_cost = self.total_cost - old_cost + cost;
                old
            };
            self.touch(slot);
            return Some(old);
        }

        let slot = self.find_empty();
        self.slots[slot] = Slot::Occupied(OccupiedSlot {
            key: key.clone(),
            value,
            newer: None,
            older: None,
            cost,
        });
        self.index.insert(key, slot);
        self.total_cost += cost;
        self.link_most_recent(slot);
        None
    }

    /// Remove an entry, returning the key as stored in the index along with the value.
    pub fn remove(&mut self, key: &K) -> Option<(Arc<K>, V)> {
        let slot = *self.index.get(key)?;
        Some(self.become_empty(slot))
    }

    /// Remove and return the least recently used entry.
    pub fn pop_least_recent(&mut self) -> Option<(Arc<K>, V)> {
        let slot = self.least_recent?;
        Some(self.become_empty(slot))
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.index.clear();
        self.most_recent = None;
        self.least_recent = None;
        self.empty_head = None;
        self.total_cost = 0;
    }

    /// Iterator visiting entries in least-recently-used order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        let mut ind = self.least_recent;
        std::iter::from_fn(move || {
            let next = ind?;
            let ret = self.slots[next].as_occupied();
            ind = ret.newer;
            Some((&*ret.key, &ret.value))
        })
    }
}
