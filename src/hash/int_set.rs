//! Open-addressing integer hash set
//!
//! Unique fixed-width key set with expected O(1) insert, probe and remove.
//! Removal repairs probe chains by relocating displaced keys (backward
//! shift) instead of writing tombstones, so every occupied slot stays
//! reachable from its ideal home by a contiguous linear probe.

use crate::error::{AggError, Result};

const MIN_INITIAL_CAPACITY: usize = 16;
const DEFAULT_NO_ENTRY_KEY: i32 = -1;

/// Open-addressing set of 32-bit integer keys.
///
/// The backing array length is always a power of two and occupancy stays
/// strictly below it, which guarantees probe termination.
pub struct IntHashSet {
    keys: Vec<i32>,
    mask: usize,
    capacity: usize,
    free: usize,
    load_factor: f64,
    no_entry_key: i32,
}

impl IntHashSet {
    /// Create a set sized for `initial_capacity` keys.
    ///
    /// `load_factor` must lie strictly in (0, 1).
    pub fn new(initial_capacity: usize, load_factor: f64) -> Result<Self> {
        Self::with_no_entry_key(initial_capacity, load_factor, DEFAULT_NO_ENTRY_KEY)
    }

    /// Create a set with a custom empty-slot sentinel.
    ///
    /// The sentinel value itself cannot be stored as a key.
    pub fn with_no_entry_key(
        initial_capacity: usize,
        load_factor: f64,
        no_entry_key: i32,
    ) -> Result<Self> {
        if load_factor <= 0.0 || load_factor >= 1.0 {
            return Err(AggError::InvalidArgument(
                "load factor must be in (0, 1)".to_string(),
            ));
        }
        let capacity = initial_capacity.max(MIN_INITIAL_CAPACITY);
        let len = ((capacity as f64 / load_factor) as usize).next_power_of_two();
        Ok(Self {
            keys: vec![no_entry_key; len],
            mask: len - 1,
            capacity,
            free: capacity,
            load_factor,
            no_entry_key,
        })
    }

    /// Number of keys currently in the set.
    pub fn size(&self) -> usize {
        self.capacity - self.free
    }

    /// Remove every key, keeping the current backing array.
    pub fn clear(&mut self) {
        self.keys.fill(self.no_entry_key);
        self.free = self.capacity;
    }

    /// Probe for `key`.
    ///
    /// Returns a non-negative slot index when the key is absent (its
    /// insertion point) or `-(slot + 1)` when it is present. Probing starts
    /// at `key & mask` and scans forward with wraparound.
    pub fn key_index(&self, key: i32) -> isize {
        let index = (key as u32 as usize) & self.mask;

        if self.keys[index] == self.no_entry_key {
            return index as isize;
        }
        if self.keys[index] == key {
            return -(index as isize) - 1;
        }
        self.probe(key, index)
    }

    fn probe(&self, key: i32, from: usize) -> isize {
        let mut index = from;
        loop {
            index = (index + 1) & self.mask;
            if self.keys[index] == self.no_entry_key {
                return index as isize;
            }
            if self.keys[index] == key {
                return -(index as isize) - 1;
            }
        }
    }

    /// True when `key` is in the set.
    pub fn contains(&self, key: i32) -> bool {
        self.key_index(key) < 0
    }

    /// Insert `key`; returns false when it was already present.
    pub fn add(&mut self, key: i32) -> bool {
        let index = self.key_index(key);
        if index < 0 {
            return false;
        }
        self.add_at(index as usize, key);
        true
    }

    /// Insert `key` at a slot previously returned by [`key_index`].
    ///
    /// [`key_index`]: IntHashSet::key_index
    pub fn add_at(&mut self, index: usize, key: i32) {
        debug_assert_ne!(key, self.no_entry_key);
        self.keys[index] = key;
        self.free -= 1;
        if self.free == 0 {
            self.rehash();
        }
    }

    /// Remove `key`; returns false when it was not present.
    pub fn remove(&mut self, key: i32) -> bool {
        let index = self.key_index(key);
        if index < 0 {
            self.remove_at(index);
            return true;
        }
        false
    }

    /// Remove the key at an occupied probe result (`index < 0`).
    ///
    /// After erasing the slot, keys below it are rehomed: a key sitting
    /// away from its ideal slot may only be reachable through the slot
    /// just freed, so it is moved toward its ideal home until an empty
    /// slot terminates the chain. The load-factor invariant guarantees
    /// such a slot exists.
    pub fn remove_at(&mut self, index: isize) {
        if index >= 0 {
            return;
        }
        let slot = (-index - 1) as usize;
        self.keys[slot] = self.no_entry_key;
        self.free += 1;

        let mut from = (slot + 1) & self.mask;
        while self.keys[from] != self.no_entry_key {
            let key = self.keys[from];
            let ideal = (key as u32 as usize) & self.mask;
            if ideal != from {
                let to = if self.keys[ideal] != self.no_entry_key {
                    self.probe(key, ideal)
                } else {
                    ideal as isize
                };
                if to >= 0 {
                    self.keys[to as usize] = key;
                    self.keys[from] = self.no_entry_key;
                }
            }
            from = (from + 1) & self.mask;
        }
    }

    /// Iterate the live keys in slot order.
    pub fn iter(&self) -> impl Iterator<Item = i32> + '_ {
        let no_entry = self.no_entry_key;
        self.keys.iter().copied().filter(move |&k| k != no_entry)
    }

    /// Double capacity and reinsert every live key.
    fn rehash(&mut self) {
        let size = self.size();
        self.capacity *= 2;
        let len = ((self.capacity as f64 / self.load_factor) as usize).next_power_of_two();
        let old = std::mem::replace(&mut self.keys, vec![self.no_entry_key; len]);
        self.mask = len - 1;
        self.free = self.capacity - size;

        for key in old {
            if key != self.no_entry_key {
                let index = self.key_index(key);
                debug_assert!(index >= 0);
                self.keys[index as usize] = key;
            }
        }
    }
}
