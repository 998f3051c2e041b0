//! Keyed hash table with value rows
//!
//! Extends the integer-set probing scheme with a fixed-size row of 8-byte
//! value slots per key. Rows are created lazily on first occurrence of a
//! key and seeded from a template row holding each aggregate operation's
//! identity element. One table instance is a single worker's shard; the
//! merge step folds shards into one table after all workers finish.

use crate::error::{AggError, Result};
use crate::schema::RowSchema;

const MIN_INITIAL_CAPACITY: usize = 16;

/// Reserved empty-slot sentinel; the engine's int null never occurs as a
/// grouping key (key derivation emits raw non-null ints or 0-23 buckets).
pub const NO_ENTRY_KEY: i32 = i32::MIN;

/// Open-addressing table mapping a 32-bit key to a row of value slots.
pub struct KeyedTable {
    keys: Vec<i32>,
    rows: Vec<u64>,
    template: Vec<u64>,
    slot_count: usize,
    mask: usize,
    capacity: usize,
    free: usize,
    load_factor: f64,
}

impl KeyedTable {
    /// Create a table whose rows follow `schema`, sized for
    /// `initial_capacity` keys. `load_factor` must lie strictly in (0, 1).
    pub fn new(schema: &RowSchema, initial_capacity: usize, load_factor: f64) -> Result<Self> {
        if load_factor <= 0.0 || load_factor >= 1.0 {
            return Err(AggError::InvalidArgument(
                "load factor must be in (0, 1)".to_string(),
            ));
        }
        let capacity = initial_capacity.max(MIN_INITIAL_CAPACITY);
        let len = ((capacity as f64 / load_factor) as usize).next_power_of_two();
        let slot_count = schema.slot_count();
        Ok(Self {
            keys: vec![NO_ENTRY_KEY; len],
            rows: vec![0; len * slot_count],
            template: vec![0; slot_count],
            slot_count,
            mask: len - 1,
            capacity,
            free: capacity,
            load_factor,
        })
    }

    /// Number of distinct keys in the table.
    pub fn size(&self) -> usize {
        self.capacity - self.free
    }

    /// Slots per row.
    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    /// Remove every key, keeping the current backing arrays and template.
    pub fn clear(&mut self) {
        self.keys.fill(NO_ENTRY_KEY);
        self.free = self.capacity;
    }

    /// Write an identity element into the template row slot at `offset`.
    /// Freshly inserted keys copy the template.
    pub fn init_slot(&mut self, offset: usize, bits: u64) {
        self.template[offset] = bits;
    }

    /// Write a double identity element into the template row.
    pub fn init_slot_f64(&mut self, offset: usize, value: f64) {
        self.template[offset] = value.to_bits();
    }

    /// Probe for `key`: non-negative insertion slot when absent,
    /// `-(slot + 1)` when present.
    pub fn key_index(&self, key: i32) -> isize {
        let mut index = (key as u32 as usize) & self.mask;
        loop {
            if self.keys[index] == NO_ENTRY_KEY {
                return index as isize;
            }
            if self.keys[index] == key {
                return -(index as isize) - 1;
            }
            index = (index + 1) & self.mask;
        }
    }

    /// Insert-if-absent; returns the slot of the key's row.
    ///
    /// A new row is seeded from the template. Growth may relocate every
    /// entry, so the slot is only valid until the next insert.
    pub fn upsert(&mut self, key: i32) -> usize {
        let index = self.key_index(key);
        if index < 0 {
            return (-index - 1) as usize;
        }
        let slot = index as usize;
        self.keys[slot] = key;
        let base = slot * self.slot_count;
        self.rows[base..base + self.slot_count].copy_from_slice(&self.template);
        self.free -= 1;
        if self.free == 0 {
            self.rehash();
            let index = self.key_index(key);
            debug_assert!(index < 0);
            return (-index - 1) as usize;
        }
        slot
    }

    /// Register every key with an identity row, inserting the ones not yet
    /// present. Used when a chunk carries grouping keys but no measurable
    /// values, so all-null groups still appear in the final result.
    pub fn ensure_distinct(&mut self, keys: impl IntoIterator<Item = i32>) {
        for key in keys {
            self.upsert(key);
        }
    }

    /// Row of value slots at `slot`.
    pub fn row(&self, slot: usize) -> &[u64] {
        let base = slot * self.slot_count;
        &self.rows[base..base + self.slot_count]
    }

    /// Mutable row of value slots at `slot`.
    pub fn row_mut(&mut self, slot: usize) -> &mut [u64] {
        let base = slot * self.slot_count;
        &mut self.rows[base..base + self.slot_count]
    }

    /// Row for `key`, if present.
    pub fn get(&self, key: i32) -> Option<&[u64]> {
        let index = self.key_index(key);
        if index < 0 {
            Some(self.row((-index - 1) as usize))
        } else {
            None
        }
    }

    /// Iterate `(key, row)` over every occupied slot.
    pub fn entries(&self) -> impl Iterator<Item = (i32, &[u64])> + '_ {
        self.keys
            .iter()
            .enumerate()
            .filter(|(_, &k)| k != NO_ENTRY_KEY)
            .map(move |(slot, &k)| (k, self.row(slot)))
    }

    /// Fold every entry of `src` into this table: insert-if-absent, then
    /// combine the two rows with the caller's merge rule. The rule must be
    /// associative and commutative; shard merge order never affects the
    /// result. Works across shards with differing capacity histories.
    pub fn merge_from<F>(&mut self, src: &KeyedTable, mut combine: F) -> Result<()>
    where
        F: FnMut(&mut [u64], &[u64]),
    {
        if src.slot_count != self.slot_count {
            return Err(AggError::Merge(format!(
                "row schemas differ: {} vs {} slots",
                self.slot_count, src.slot_count
            )));
        }
        for (key, src_row) in src.entries() {
            let slot = self.upsert(key);
            let base = slot * self.slot_count;
            combine(&mut self.rows[base..base + self.slot_count], src_row);
        }
        Ok(())
    }

    /// Single final pass converting every row's raw accumulated state into
    /// its externally visible value.
    pub fn wrap_up_with<F>(&mut self, mut finalize: F)
    where
        F: FnMut(&mut [u64]),
    {
        for slot in 0..self.keys.len() {
            if self.keys[slot] != NO_ENTRY_KEY {
                let base = slot * self.slot_count;
                finalize(&mut self.rows[base..base + self.slot_count]);
            }
        }
    }

    /// Double capacity and reinsert every live entry, rows included.
    fn rehash(&mut self) {
        let size = self.size();
        self.capacity *= 2;
        let len = ((self.capacity as f64 / self.load_factor) as usize).next_power_of_two();
        let old_keys = std::mem::replace(&mut self.keys, vec![NO_ENTRY_KEY; len]);
        let old_rows = std::mem::replace(&mut self.rows, vec![0; len * self.slot_count]);
        self.mask = len - 1;
        self.free = self.capacity - size;

        for (slot, key) in old_keys.into_iter().enumerate() {
            if key != NO_ENTRY_KEY {
                let index = self.key_index(key);
                debug_assert!(index >= 0);
                let new_slot = index as usize;
                self.keys[new_slot] = key;
                let src = slot * self.slot_count;
                let dst = new_slot * self.slot_count;
                self.rows[dst..dst + self.slot_count]
                    .copy_from_slice(&old_rows[src..src + self.slot_count]);
            }
        }
    }
}

/// Read a double slot from a row.
#[inline(always)]
pub fn slot_f64(row: &[u64], offset: usize) -> f64 {
    f64::from_bits(row[offset])
}

/// Write a double slot in a row.
#[inline(always)]
pub fn set_slot_f64(row: &mut [u64], offset: usize, value: f64) {
    row[offset] = value.to_bits();
}

/// Read a signed long slot from a row.
#[inline(always)]
pub fn slot_i64(row: &[u64], offset: usize) -> i64 {
    row[offset] as i64
}

/// Write a signed long slot in a row.
#[inline(always)]
pub fn set_slot_i64(row: &mut [u64], offset: usize, value: i64) {
    row[offset] = value as u64;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SlotType;

    fn two_slot_schema() -> RowSchema {
        let mut schema = RowSchema::new();
        schema.register(&[SlotType::Double, SlotType::Long]);
        schema
    }

    #[test]
    fn test_invalid_load_factor() {
        let schema = two_slot_schema();
        assert!(KeyedTable::new(&schema, 16, 1.0).is_err());
        assert!(KeyedTable::new(&schema, 16, 0.0).is_err());
    }

    #[test]
    fn test_upsert_seeds_from_template() {
        let schema = two_slot_schema();
        let mut table = KeyedTable::new(&schema, 16, 0.5).unwrap();
        table.init_slot_f64(0, 0.0);
        table.init_slot(1, 0);

        let slot = table.upsert(7);
        assert_eq!(table.size(), 1);
        assert_eq!(slot_f64(table.row(slot), 0), 0.0);
        assert_eq!(table.row(slot)[1], 0);

        // second upsert of the same key keeps the row
        set_slot_f64(table.row_mut(slot), 0, 5.5);
        let again = table.upsert(7);
        assert_eq!(again, slot);
        assert_eq!(slot_f64(table.row(again), 0), 5.5);
        assert_eq!(table.size(), 1);
    }

    #[test]
    fn test_ensure_distinct() {
        let schema = two_slot_schema();
        let mut table = KeyedTable::new(&schema, 16, 0.5).unwrap();
        table.init_slot_f64(0, f64::NAN);
        table.ensure_distinct([3, 1, 3, 2]);
        assert_eq!(table.size(), 3);
        assert!(slot_f64(table.get(1).unwrap(), 0).is_nan());
    }

    #[test]
    fn test_growth_moves_rows() {
        let schema = two_slot_schema();
        let mut table = KeyedTable::new(&schema, 16, 0.5).unwrap();
        for key in 0..5_000 {
            let slot = table.upsert(key);
            set_slot_f64(table.row_mut(slot), 0, key as f64 * 2.0);
        }
        assert_eq!(table.size(), 5_000);
        for key in 0..5_000 {
            let row = table.get(key).expect("key lost during growth");
            assert_eq!(slot_f64(row, 0), key as f64 * 2.0);
        }
    }

    #[test]
    fn test_merge_from_differing_capacities() {
        let schema = two_slot_schema();
        let mut dst = KeyedTable::new(&schema, 16, 0.5).unwrap();
        let mut src = KeyedTable::new(&schema, 16, 0.5).unwrap();

        // grow only the source shard
        for key in 0..2_000 {
            let slot = src.upsert(key);
            set_slot_f64(src.row_mut(slot), 0, 1.0);
            src.row_mut(slot)[1] = 1;
        }
        let slot = dst.upsert(100);
        set_slot_f64(dst.row_mut(slot), 0, 2.5);
        dst.row_mut(slot)[1] = 3;

        dst.merge_from(&src, |d, s| {
            set_slot_f64(d, 0, slot_f64(d, 0) + slot_f64(s, 0));
            d[1] += s[1];
        })
        .unwrap();

        assert_eq!(dst.size(), 2_000);
        let merged = dst.get(100).unwrap();
        assert_eq!(slot_f64(merged, 0), 3.5);
        assert_eq!(merged[1], 4);
        let untouched = dst.get(0).unwrap();
        assert_eq!(slot_f64(untouched, 0), 1.0);
    }

    #[test]
    fn test_merge_schema_mismatch() {
        let mut narrow = RowSchema::new();
        narrow.register(&[SlotType::Long]);
        let mut dst = KeyedTable::new(&two_slot_schema(), 16, 0.5).unwrap();
        let src = KeyedTable::new(&narrow, 16, 0.5).unwrap();
        assert!(dst.merge_from(&src, |_, _| {}).is_err());
    }

    #[test]
    fn test_wrap_up_visits_every_row() {
        let schema = two_slot_schema();
        let mut table = KeyedTable::new(&schema, 16, 0.5).unwrap();
        for key in 0..40 {
            let slot = table.upsert(key);
            set_slot_f64(table.row_mut(slot), 0, 10.0);
            table.row_mut(slot)[1] = 4;
        }
        table.wrap_up_with(|row| {
            let avg = slot_f64(row, 0) / row[1] as f64;
            set_slot_f64(row, 0, avg);
        });
        for key in 0..40 {
            assert_eq!(slot_f64(table.get(key).unwrap(), 0), 2.5);
        }
    }
}
