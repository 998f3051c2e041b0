//! Vectorized SUM over double and long columns

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

use super::atomic::AtomicF64;
use super::{check_offset, AggValue, KeyKind, VectorAggregate};
use crate::buffer::ColumnChunk;
use crate::error::Result;
use crate::hash::keyed_table::{set_slot_f64, set_slot_i64, slot_f64, slot_i64};
use crate::hash::KeyedTable;
use crate::schema::{RowSchema, SlotType};
use crate::vect;

/// SUM over 64-bit floats. Rows carry {sum: Double, count: Long}; the
/// count distinguishes a zero sum from an all-null group, which finalizes
/// to NaN.
pub struct SumDouble {
    key_kind: KeyKind,
    column_index: usize,
    value_offset: usize,
    sum: AtomicF64,
    count: AtomicU64,
    finalized: AtomicBool,
}

impl SumDouble {
    pub fn new(key_kind: KeyKind, column_index: usize, worker_count: usize) -> Result<Self> {
        super::check_worker_count(worker_count)?;
        Ok(Self {
            key_kind,
            column_index,
            value_offset: 0,
            sum: AtomicF64::new(0.0),
            count: AtomicU64::new(0),
            finalized: AtomicBool::new(false),
        })
    }
}

impl VectorAggregate for SumDouble {
    fn aggregate_ungrouped(&self, chunk: ColumnChunk<'_>, _size_hint: usize, _worker_id: usize) {
        if chunk.is_absent() {
            return;
        }
        let (sum, count) = vect::sum_double(chunk.as_f64s());
        if count > 0 {
            self.sum.add(sum);
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
            if row[offset + 1] == 0 {
                set_slot_f64(row, offset, f64::NAN);
            }
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
        if self.count.load(Ordering::Relaxed) > 0 {
            self.sum.load()
        } else {
            f64::NAN
        }
    }

    fn finalized_value(&self) -> AggValue {
        AggValue::Double(self.double_value())
    }

    fn name(&self) -> &'static str {
        "sum"
    }
}

/// SUM over 64-bit integers. Rows carry {sum: Long, count: Long};
/// [`vect::NULL_LONG`] input elements are excluded, and an all-null group
/// finalizes to `NULL_LONG`.
pub struct SumLong {
    key_kind: KeyKind,
    column_index: usize,
    value_offset: usize,
    sum: AtomicI64,
    count: AtomicU64,
    finalized: AtomicBool,
}

impl SumLong {
    pub fn new(key_kind: KeyKind, column_index: usize, worker_count: usize) -> Result<Self> {
        super::check_worker_count(worker_count)?;
        Ok(Self {
            key_kind,
            column_index,
            value_offset: 0,
            sum: AtomicI64::new(0),
            count: AtomicU64::new(0),
            finalized: AtomicBool::new(false),
        })
    }
}

impl VectorAggregate for SumLong {
    fn aggregate_ungrouped(&self, chunk: ColumnChunk<'_>, _size_hint: usize, _worker_id: usize) {
        if chunk.is_absent() {
            return;
        }
        let (sum, count) = vect::sum_long(chunk.as_i64s());
        if count > 0 {
            self.sum.fetch_add(sum, Ordering::Relaxed);
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
        for (key, &value) in keys.zip(values.as_i64s()) {
            let slot = table.upsert(key);
            if value != vect::NULL_LONG {
                let row = table.row_mut(slot);
                set_slot_i64(row, offset, slot_i64(row, offset).wrapping_add(value));
                row[offset + 1] += 1;
            }
        }
        Ok(())
    }

    fn register_schema(&mut self, schema: &mut RowSchema) {
        self.value_offset = schema.register(&[SlotType::Long, SlotType::Long]);
    }

    fn init_row(&self, table: &mut KeyedTable) {
        table.init_slot(self.value_offset, 0);
        table.init_slot(self.value_offset + 1, 0);
    }

    fn merge(&self, dst: &mut KeyedTable, src: &KeyedTable) -> Result<()> {
        check_offset(dst, self.value_offset, 2, "merge")?;
        let offset = self.value_offset;
        dst.merge_from(src, |d, s| {
            set_slot_i64(d, offset, slot_i64(d, offset).wrapping_add(slot_i64(s, offset)));
            d[offset + 1] += s[offset + 1];
        })
    }

    fn wrap_up(&self, table: &mut KeyedTable) -> Result<()> {
        check_offset(table, self.value_offset, 2, "wrap-up")?;
        let offset = self.value_offset;
        table.wrap_up_with(|row| {
            if row[offset + 1] == 0 {
                set_slot_i64(row, offset, vect::NULL_LONG);
            }
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
        self.sum.store(0, Ordering::Relaxed);
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
        if self.count.load(Ordering::Relaxed) > 0 {
            self.sum.load(Ordering::Relaxed)
        } else {
            vect::NULL_LONG
        }
    }

    fn finalized_value(&self) -> AggValue {
        AggValue::Long(self.long_value())
    }

    fn name(&self) -> &'static str {
        "sum"
    }
}
