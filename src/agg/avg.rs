//! Vectorized AVG over a double column

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use super::atomic::AtomicF64;
use super::scratch::ScratchArena;
use super::{check_offset, AggValue, KeyKind, VectorAggregate};
use crate::buffer::ColumnChunk;
use crate::error::Result;
use crate::hash::keyed_table::{set_slot_f64, slot_f64};
use crate::hash::KeyedTable;
use crate::schema::{RowSchema, SlotType};
use crate::vect;

/// AVG over 64-bit floats. Grouped rows carry {sum: Double, count: Long};
/// the ungrouped path keeps shared lock-free sum/count accumulators.
pub struct AvgDouble {
    key_kind: KeyKind,
    column_index: usize,
    value_offset: usize,
    sum: AtomicF64,
    count: AtomicU64,
    /// Per-worker scratch returning each chunk's non-null count.
    counts: ScratchArena,
    finalized: AtomicBool,
}

impl AvgDouble {
    pub fn new(key_kind: KeyKind, column_index: usize, worker_count: usize) -> Result<Self> {
        Ok(Self {
            key_kind,
            column_index,
            value_offset: 0,
            sum: AtomicF64::new(0.0),
            count: AtomicU64::new(0),
            counts: ScratchArena::new(worker_count)?,
            finalized: AtomicBool::new(false),
        })
    }
}

impl VectorAggregate for AvgDouble {
    fn aggregate_ungrouped(&self, chunk: ColumnChunk<'_>, _size_hint: usize, worker_id: usize) {
        if chunk.is_absent() {
            return;
        }
        let slot = self.counts.slot(worker_id);
        let value = vect::avg_double_acc(chunk.as_f64s(), slot);
        if !value.is_nan() {
            let count = slot.load(Ordering::Relaxed);
            // the chunk average carries the weight of its element count,
            // otherwise unequal chunks would bias the global result
            self.sum.add(value * count as f64);
            self.count.fetch_add(count, Ordering::Relaxed);
        }
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
                let row = table.row_mut(slot);
                set_slot_f64(row, offset, slot_f64(row, offset) + value);
                row[offset + 1] += 1;
            }
        }
        Ok(())
    }

    fn register_schema(&mut self, schema: &mut RowSchema) {
        self.value_offset = schema.register(&[SlotType::Double, SlotType::Long]);
    }

    fn init_row(&self, table: &mut KeyedTable) {
        table.init_slot_f64(self.value_offset, 0.0);
        table.init_slot(self.value_offset + 1, 0);
    }

    fn merge(&self, dst: &mut KeyedTable, src: &KeyedTable) -> Result<()> {
        check_offset(dst, self.value_offset, 2, "merge")?;
        let offset = self.value_offset;
        dst.merge_from(src, |d, s| {
            set_slot_f64(d, offset, slot_f64(d, offset) + slot_f64(s, offset));
            d[offset + 1] += s[offset + 1];
        })
    }

    fn wrap_up(&self, table: &mut KeyedTable) -> Result<()> {
        check_offset(table, self.value_offset, 2, "wrap-up")?;
        let offset = self.value_offset;
        table.wrap_up_with(|row| {
            let count = row[offset + 1];
            let avg = if count > 0 {
                slot_f64(row, offset) / count as f64
            } else {
                f64::NAN
            };
            set_slot_f64(row, offset, avg);
        });
        Ok(())
    }

    fn column_index(&self) -> usize {
        self.column_index
    }

    fn value_offset(&self) -> usize {
        self.value_offset
    }

    fn reset(&self) {
        self.sum.store(0.0);
        self.count.store(0, Ordering::Relaxed);
        self.counts.reset();
        self.finalized.store(false, Ordering::Release);
    }

    fn release(&mut self) {
        self.counts.release();
    }

    fn set_finalized(&self, finalized: bool) {
        self.finalized.store(finalized, Ordering::Release);
    }

    fn is_finalized_read_safe(&self) -> bool {
        self.finalized.load(Ordering::Acquire)
    }

    fn double_value(&self) -> f64 {
        let count = self.count.load(Ordering::Relaxed);
        if count > 0 {
            self.sum.load() / count as f64
        } else {
            f64::NAN
        }
    }

    fn finalized_value(&self) -> AggValue {
        AggValue::Double(self.double_value())
    }

    fn name(&self) -> &'static str {
        "avg"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weighted_average_across_chunks() {
        let avg = AvgDouble::new(KeyKind::RawInt, 0, 2).unwrap();
        // [1, 2] and [NaN, 4]: the NaN is excluded from sum and count
        let a = [1.0, 2.0];
        let b = [f64::NAN, 4.0];
        avg.aggregate_ungrouped(ColumnChunk::from_f64s(&a), 8, 0);
        avg.aggregate_ungrouped(ColumnChunk::from_f64s(&b), 8, 1);
        assert!((avg.double_value() - 7.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_absent_chunk_is_noop() {
        let avg = AvgDouble::new(KeyKind::RawInt, 0, 1).unwrap();
        avg.aggregate_ungrouped(ColumnChunk::absent(), 8, 0);
        assert!(avg.double_value().is_nan());
    }

    #[test]
    fn test_grouped_avg_two_shards() {
        let mut avg = AvgDouble::new(KeyKind::RawInt, 0, 2).unwrap();
        let mut schema = RowSchema::new();
        avg.register_schema(&mut schema);

        let mut shard_a = KeyedTable::new(&schema, 16, 0.5).unwrap();
        let mut shard_b = KeyedTable::new(&schema, 16, 0.5).unwrap();
        avg.init_row(&mut shard_a);
        avg.init_row(&mut shard_b);

        // keys [A, A], values [10, 20] on one shard; [B] with NaN on the other
        let keys_a = [1i32, 1];
        let vals_a = [10.0, 20.0];
        let keys_b = [2i32];
        let vals_b = [f64::NAN];
        avg.aggregate_grouped(
            &mut shard_a,
            ColumnChunk::from_i32s(&keys_a),
            ColumnChunk::from_f64s(&vals_a),
            2,
            0,
        )
        .unwrap();
        avg.aggregate_grouped(
            &mut shard_b,
            ColumnChunk::from_i32s(&keys_b),
            ColumnChunk::from_f64s(&vals_b),
            2,
            1,
        )
        .unwrap();

        avg.merge(&mut shard_a, &shard_b).unwrap();
        avg.wrap_up(&mut shard_a).unwrap();

        assert_eq!(slot_f64(shard_a.get(1).unwrap(), 0), 15.0);
        assert!(slot_f64(shard_a.get(2).unwrap(), 0).is_nan());
    }

    #[test]
    fn test_distinct_pass_preserves_keys() {
        let mut avg = AvgDouble::new(KeyKind::RawInt, 0, 1).unwrap();
        let mut schema = RowSchema::new();
        avg.register_schema(&mut schema);
        let mut shard = KeyedTable::new(&schema, 16, 0.5).unwrap();
        avg.init_row(&mut shard);

        let keys = [9i32, 9, 4];
        avg.aggregate_grouped(
            &mut shard,
            ColumnChunk::from_i32s(&keys),
            ColumnChunk::absent(),
            2,
            0,
        )
        .unwrap();
        avg.wrap_up(&mut shard).unwrap();

        assert_eq!(shard.size(), 2);
        assert!(slot_f64(shard.get(9).unwrap(), 0).is_nan());
        assert!(slot_f64(shard.get(4).unwrap(), 0).is_nan());
    }

    #[test]
    fn test_reset_and_double_release() {
        let mut avg = AvgDouble::new(KeyKind::RawInt, 0, 1).unwrap();
        let values = [2.0, 4.0];
        avg.aggregate_ungrouped(ColumnChunk::from_f64s(&values), 8, 0);
        assert_eq!(avg.double_value(), 3.0);

        avg.reset();
        assert!(avg.double_value().is_nan());
        assert!(!avg.is_finalized_read_safe());

        avg.release();
        avg.release(); // must not double-free
    }
}
