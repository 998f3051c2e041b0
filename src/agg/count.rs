//! Vectorized COUNT over double and long columns
//!
//! Counts non-null elements. A group registered through the distinct pass
//! finalizes to 0, not null; a count is always defined.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use super::{check_offset, check_worker_count, AggValue, KeyKind, VectorAggregate};
use crate::buffer::ColumnChunk;
use crate::error::Result;
use crate::hash::KeyedTable;
use crate::schema::{RowSchema, SlotType};
use crate::vect;

/// COUNT of non-NaN 64-bit floats. Rows carry {count: Long}.
pub struct CountDouble {
    key_kind: KeyKind,
    column_index: usize,
    value_offset: usize,
    count: AtomicU64,
    finalized: AtomicBool,
}

impl CountDouble {
    pub fn new(key_kind: KeyKind, column_index: usize, worker_count: usize) -> Result<Self> {
        check_worker_count(worker_count)?;
        Ok(Self {
            key_kind,
            column_index,
            value_offset: 0,
            count: AtomicU64::new(0),
            finalized: AtomicBool::new(false),
        })
    }
}

impl VectorAggregate for CountDouble {
    fn aggregate_ungrouped(&self, chunk: ColumnChunk<'_>, _size_hint: usize, _worker_id: usize) {
        if chunk.is_absent() {
            return;
        }
        self.count
            .fetch_add(vect::count_double(chunk.as_f64s()), Ordering::Relaxed);
    }

    fn aggregate_grouped(
        &self,
        table: &mut KeyedTable,
        keys: ColumnChunk<'_>,
        values: ColumnChunk<'_>,
        key_width_shift: u32,
        _worker_id: usize,
    ) -> Result<()> {
        let keys = self.key_kind.decode(&keys, key_width_shift)?;
        if values.is_absent() {
            table.ensure_distinct(keys);
            return Ok(());
        }
        let offset = self.value_offset;
        for (key, &value) in keys.zip(values.as_f64s()) {
            let slot = table.upsert(key);
            if !value.is_nan() {
                table.row_mut(slot)[offset] += 1;
            }
        }
        Ok(())
    }

    fn register_schema(&mut self, schema: &mut RowSchema) {
        self.value_offset = schema.register(&[SlotType::Long]);
    }

    fn init_row(&self, table: &mut KeyedTable) {
        table.init_slot(self.value_offset, 0);
    }

    fn merge(&self, dst: &mut KeyedTable, src: &KeyedTable) -> Result<()> {
        check_offset(dst, self.value_offset, 1, "merge")?;
        let offset = self.value_offset;
        dst.merge_from(src, |d, s| d[offset] += s[offset])
    }

    fn wrap_up(&self, table: &mut KeyedTable) -> Result<()> {
        // counts are already externally visible
        check_offset(table, self.value_offset, 1, "wrap-up")
    }

    fn column_index(&self) -> usize {
        self.column_index
    }

    fn value_offset(&self) -> usize {
        self.value_offset
    }

    fn reset(&self) {
        self.count.store(0, Ordering::Relaxed);
        self.finalized.store(false, Ordering::Release);
    }

    fn release(&mut self) {}

    fn set_finalized(&self, finalized: bool) {
        self.finalized.store(finalized, Ordering::Release);
    }

    fn is_finalized_read_safe(&self) -> bool {
        self.finalized.load(Ordering::Acquire)
    }

    fn long_value(&self) -> i64 {
        self.count.load(Ordering::Relaxed) as i64
    }

    fn finalized_value(&self) -> AggValue {
        AggValue::Long(self.long_value())
    }

    fn name(&self) -> &'static str {
        "count"
    }
}

/// COUNT of non-null 64-bit integers. Rows carry {count: Long}.
pub struct CountLong {
    key_kind: KeyKind,
    column_index: usize,
    value_offset: usize,
    count: AtomicU64,
    finalized: AtomicBool,
}

impl CountLong {
    pub fn new(key_kind: KeyKind, column_index: usize, worker_count: usize) -> Result<Self> {
        check_worker_count(worker_count)?;
        Ok(Self {
            key_kind,
            column_index,
            value_offset: 0,
            count: AtomicU64::new(0),
            finalized: AtomicBool::new(false),
        })
    }
}

impl VectorAggregate for CountLong {
    fn aggregate_ungrouped(&self, chunk: ColumnChunk<'_>, _size_hint: usize, _worker_id: usize) {
        if chunk.is_absent() {
            return;
        }
        self.count
            .fetch_add(vect::count_long(chunk.as_i64s()), Ordering::Relaxed);
    }

    fn aggregate_grouped(
        &self,
        table: &mut KeyedTable,
        keys: ColumnChunk<'_>,
        values: ColumnChunk<'_>,
        key_width_shift: u32,
        _worker_id: usize,
    ) -> Result<()> {
        let keys = self.key_kind.decode(&keys, key_width_shift)?;
        if values.is_absent() {
            table.ensure_distinct(keys);
            return Ok(());
        }
        let offset = self.value_offset;
        for (key, &value) in keys.zip(values.as_i64s()) {
            let slot = table.upsert(key);
            if value != vect::NULL_LONG {
                table.row_mut(slot)[offset] += 1;
            }
        }
        Ok(())
    }

    fn register_schema(&mut self, schema: &mut RowSchema) {
        self.value_offset = schema.register(&[SlotType::Long]);
    }

    fn init_row(&self, table: &mut KeyedTable) {
        table.init_slot(self.value_offset, 0);
    }

    fn merge(&self, dst: &mut KeyedTable, src: &KeyedTable) -> Result<()> {
        check_offset(dst, self.value_offset, 1, "merge")?;
        let offset = self.value_offset;
        dst.merge_from(src, |d, s| d[offset] += s[offset])
    }

    fn wrap_up(&self, table: &mut KeyedTable) -> Result<()> {
        check_offset(table, self.value_offset, 1, "wrap-up")
    }

    fn column_index(&self) -> usize {
        self.column_index
    }

    fn value_offset(&self) -> usize {
        self.value_offset
    }

    fn reset(&self) {
        self.count.store(0, Ordering::Relaxed);
        self.finalized.store(false, Ordering::Release);
    }

    fn release(&mut self) {}

    fn set_finalized(&self, finalized: bool) {
        self.finalized.store(finalized, Ordering::Release);
    }

    fn is_finalized_read_safe(&self) -> bool {
        self.finalized.load(Ordering::Acquire)
    }

    fn long_value(&self) -> i64 {
        self.count.load(Ordering::Relaxed) as i64
    }

    fn finalized_value(&self) -> AggValue {
        AggValue::Long(self.long_value())
    }

    fn name(&self) -> &'static str {
        "count"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_double_excludes_nan() {
        let count = CountDouble::new(KeyKind::RawInt, 0, 1).unwrap();
        let values = [1.0, f64::NAN, 3.0];
        count.aggregate_ungrouped(ColumnChunk::from_f64s(&values), 8, 0);
        assert_eq!(count.long_value(), 2);
    }

    #[test]
    fn test_count_long_excludes_null() {
        let count = CountLong::new(KeyKind::RawInt, 0, 1).unwrap();
        let values = [1i64, vect::NULL_LONG, 3];
        count.aggregate_ungrouped(ColumnChunk::from_i64s(&values), 8, 0);
        assert_eq!(count.long_value(), 2);
    }

    #[test]
    fn test_grouped_count_distinct_pass_shows_zero() {
        let mut count = CountDouble::new(KeyKind::RawInt, 0, 1).unwrap();
        let mut schema = RowSchema::new();
        count.register_schema(&mut schema);
        let mut shard = KeyedTable::new(&schema, 16, 0.5).unwrap();
        count.init_row(&mut shard);

        let keys = [7i32];
        count
            .aggregate_grouped(
                &mut shard,
                ColumnChunk::from_i32s(&keys),
                ColumnChunk::absent(),
                2,
                0,
            )
            .unwrap();
        count.wrap_up(&mut shard).unwrap();
        assert_eq!(shard.get(7).unwrap()[0], 0);
    }

    #[test]
    fn test_grouped_count_hour_keys() {
        let mut count = CountDouble::new(KeyKind::HourBucket, 0, 1).unwrap();
        let mut schema = RowSchema::new();
        count.register_schema(&mut schema);
        let mut shard = KeyedTable::new(&schema, 16, 0.5).unwrap();
        count.init_row(&mut shard);

        let hour = 3_600_000_000i64;
        let stamps = [0, hour / 2, hour, 25 * hour];
        let values = [1.0, 2.0, 3.0, 4.0];
        count
            .aggregate_grouped(
                &mut shard,
                ColumnChunk::from_i64s(&stamps),
                ColumnChunk::from_f64s(&values),
                3,
                0,
            )
            .unwrap();

        assert_eq!(shard.get(0).unwrap()[0], 2);
        assert_eq!(shard.get(1).unwrap()[0], 2);
    }
}
