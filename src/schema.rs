//! Shared value-row schema
//!
//! All aggregate functions in one query share a single row layout: each
//! function reserves a contiguous run of 8-byte slots once, before any
//! aggregation, and remembers its base offset for the whole execution.

/// Type of one 8-byte value slot in a keyed-table row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotType {
    Double,
    Long,
}

/// Ordered slot layout shared by all aggregate functions in a query.
#[derive(Clone, Debug, Default)]
pub struct RowSchema {
    slots: Vec<SlotType>,
}

impl RowSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a function's slots and return its base offset.
    ///
    /// A multi-slot aggregate reserves its whole run in one call so the
    /// slots stay contiguous.
    pub fn register(&mut self, slots: &[SlotType]) -> usize {
        let offset = self.slots.len();
        self.slots.extend_from_slice(slots);
        offset
    }

    /// Number of slots in one row.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Type of the slot at `offset`.
    pub fn slot_type(&self, offset: usize) -> SlotType {
        self.slots[offset]
    }
}
