//! Vectorized MIN/MAX over a double column
//!
//! A NaN slot means "no value yet": it is both the identity element and
//! the final value of an all-null group, so no separate wrap-up rewrite is
//! needed.

use std::sync::atomic::{AtomicBool, Ordering};

use super::atomic::AtomicF64;
use super::{check_offset, check_worker_count, AggValue, KeyKind, VectorAggregate};
use crate::buffer::ColumnChunk;
use crate::error::Result;
use crate::hash::keyed_table::{set_slot_f64, slot_f64};
use crate::hash::KeyedTable;
use crate::schema::{RowSchema, SlotType};
use crate::vect;

macro_rules! extreme_double {
    ($name:ident, $fn_name:literal, $chunk_kernel:path, $atomic_fold:ident, $better:expr) => {
        pub struct $name {
            key_kind: KeyKind,
            column_index: usize,
            value_offset: usize,
            value: AtomicF64,
            finalized: AtomicBool,
        }

        impl $name {
            pub fn new(
                key_kind: KeyKind,
                column_index: usize,
                worker_count: usize,
            ) -> Result<Self> {
                check_worker_count(worker_count)?;
                Ok(Self {
                    key_kind,
                    column_index,
                    value_offset: 0,
                    value: AtomicF64::new(f64::NAN),
                    finalized: AtomicBool::new(false),
                })
            }

            fn fold(current: f64, value: f64) -> f64 {
                let better: fn(f64, f64) -> bool = $better;
                if value.is_nan() {
                    current
                } else if current.is_nan() || better(value, current) {
                    value
                } else {
                    current
                }
            }
        }

        impl VectorAggregate for $name {
            fn aggregate_ungrouped(
                &self,
                chunk: ColumnChunk<'_>,
                _size_hint: usize,
                _worker_id: usize,
            ) {
                if chunk.is_absent() {
                    return;
                }
                self.value.$atomic_fold($chunk_kernel(chunk.as_f64s()));
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
                    let row = table.row_mut(slot);
                    set_slot_f64(row, offset, Self::fold(slot_f64(row, offset), value));
                }
                Ok(())
            }

            fn register_schema(&mut self, schema: &mut RowSchema) {
                self.value_offset = schema.register(&[SlotType::Double]);
            }

            fn init_row(&self, table: &mut KeyedTable) {
                table.init_slot_f64(self.value_offset, f64::NAN);
            }

            fn merge(&self, dst: &mut KeyedTable, src: &KeyedTable) -> Result<()> {
                check_offset(dst, self.value_offset, 1, "merge")?;
                let offset = self.value_offset;
                dst.merge_from(src, |d, s| {
                    set_slot_f64(d, offset, Self::fold(slot_f64(d, offset), slot_f64(s, offset)));
                })
            }

            fn wrap_up(&self, table: &mut KeyedTable) -> Result<()> {
                // NaN already encodes the all-null group
                check_offset(table, self.value_offset, 1, "wrap-up")
            }

            fn column_index(&self) -> usize {
                self.column_index
            }

            fn value_offset(&self) -> usize {
                self.value_offset
            }

            fn reset(&self) {
                self.value.store(f64::NAN);
                self.finalized.store(false, Ordering::Release);
            }

            fn release(&mut self) {}

            fn set_finalized(&self, finalized: bool) {
                self.finalized.store(finalized, Ordering::Release);
            }

            fn is_finalized_read_safe(&self) -> bool {
                self.finalized.load(Ordering::Acquire)
            }

            fn double_value(&self) -> f64 {
                self.value.load()
            }

            fn finalized_value(&self) -> AggValue {
                AggValue::Double(self.double_value())
            }

            fn name(&self) -> &'static str {
                $fn_name
            }
        }
    };
}

extreme_double!(MinDouble, "min", vect::min_double, min, |v, cur| v < cur);
extreme_double!(MaxDouble, "max", vect::max_double, max, |v, cur| v > cur);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ungrouped_min_max() {
        let min = MinDouble::new(KeyKind::RawInt, 0, 2).unwrap();
        let max = MaxDouble::new(KeyKind::RawInt, 0, 2).unwrap();
        let a = [3.0, f64::NAN, -2.0];
        let b = [7.0];
        for chunk in [ColumnChunk::from_f64s(&a), ColumnChunk::from_f64s(&b)] {
            min.aggregate_ungrouped(chunk, 8, 0);
            max.aggregate_ungrouped(chunk, 8, 1);
        }
        assert_eq!(min.double_value(), -2.0);
        assert_eq!(max.double_value(), 7.0);
    }

    #[test]
    fn test_all_null_is_nan() {
        let min = MinDouble::new(KeyKind::RawInt, 0, 1).unwrap();
        let values = [f64::NAN];
        min.aggregate_ungrouped(ColumnChunk::from_f64s(&values), 8, 0);
        assert!(min.double_value().is_nan());
    }

    #[test]
    fn test_grouped_min_merge() {
        let mut min = MinDouble::new(KeyKind::RawInt, 0, 2).unwrap();
        let mut schema = RowSchema::new();
        min.register_schema(&mut schema);
        let mut shard_a = KeyedTable::new(&schema, 16, 0.5).unwrap();
        let mut shard_b = KeyedTable::new(&schema, 16, 0.5).unwrap();
        min.init_row(&mut shard_a);
        min.init_row(&mut shard_b);

        let keys_a = [1i32, 2];
        let vals_a = [5.0, f64::NAN];
        let keys_b = [1i32, 2];
        let vals_b = [3.0, f64::NAN];
        min.aggregate_grouped(
            &mut shard_a,
            ColumnChunk::from_i32s(&keys_a),
            ColumnChunk::from_f64s(&vals_a),
            2,
            0,
        )
        .unwrap();
        min.aggregate_grouped(
            &mut shard_b,
            ColumnChunk::from_i32s(&keys_b),
            ColumnChunk::from_f64s(&vals_b),
            2,
            1,
        )
        .unwrap();

        min.merge(&mut shard_a, &shard_b).unwrap();
        min.wrap_up(&mut shard_a).unwrap();

        assert_eq!(slot_f64(shard_a.get(1).unwrap(), 0), 3.0);
        assert!(slot_f64(shard_a.get(2).unwrap(), 0).is_nan());
    }
}
