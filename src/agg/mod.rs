//! Vector aggregate functions
//!
//! One function instance per (operation, input type) pair in a query.
//! Workers call the function once per assigned buffer chunk with no
//! cross-worker synchronization; the orchestrator merges per-worker shards
//! and runs wrap-up before any result is read.

mod atomic;
mod avg;
mod count;
mod minmax;
pub mod scratch;
mod sum;

pub use avg::AvgDouble;
pub use count::{CountDouble, CountLong};
pub use minmax::{MaxDouble, MinDouble};
pub use sum::{SumDouble, SumLong};

use crate::buffer::ColumnChunk;
use crate::error::{AggError, Result};
use crate::hash::KeyedTable;
use crate::schema::RowSchema;
use crate::vect;

/// Strategy deriving a grouping key from the key column, selected once at
/// function construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyKind {
    /// Key column holds raw 32-bit integer grouping values.
    RawInt,
    /// Key column holds epoch-microsecond timestamps, bucketed into
    /// hour-of-day (0-23).
    HourBucket,
}

impl KeyKind {
    /// log2 of the key element width in bytes.
    pub fn key_width_shift(&self) -> u32 {
        match self {
            KeyKind::RawInt => 2,
            KeyKind::HourBucket => 3,
        }
    }

    /// Decode a key chunk into grouping keys, validating the caller's
    /// element-width shift against this kind.
    pub(crate) fn decode<'a>(
        &self,
        keys: &ColumnChunk<'a>,
        key_width_shift: u32,
    ) -> Result<KeyIter<'a>> {
        if key_width_shift != self.key_width_shift() {
            return Err(AggError::InvalidArgument(format!(
                "key width shift {} does not match key kind {:?}",
                key_width_shift, self
            )));
        }
        Ok(match self {
            KeyKind::RawInt => KeyIter::RawInt(keys.as_i32s().iter()),
            KeyKind::HourBucket => KeyIter::Hour(keys.as_i64s().iter()),
        })
    }
}

/// Iterator over decoded grouping keys for one chunk.
pub(crate) enum KeyIter<'a> {
    RawInt(std::slice::Iter<'a, i32>),
    Hour(std::slice::Iter<'a, i64>),
}

impl Iterator for KeyIter<'_> {
    type Item = i32;

    fn next(&mut self) -> Option<i32> {
        match self {
            KeyIter::RawInt(it) => it.next().copied(),
            KeyIter::Hour(it) => it.next().map(|&t| vect::hour_of_day(t)),
        }
    }
}

/// Finalized aggregate value as seen by the result materializer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AggValue {
    Double(f64),
    Long(i64),
}

/// Aggregate operation over one input column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggOp {
    AvgDouble,
    SumDouble,
    CountDouble,
    MinDouble,
    MaxDouble,
    SumLong,
    CountLong,
}

/// Contract between the scheduler, the merge orchestrator and one
/// aggregate function.
///
/// `aggregate_*` calls run concurrently, one worker per call, with no
/// synchronization beyond each worker's private scratch slot; everything
/// else runs single-threaded on the orchestrator after the worker barrier.
pub trait VectorAggregate: Send + Sync {
    /// Fold one worker's chunk into the shared scalar accumulators.
    ///
    /// An absent chunk is a no-op. `worker_id` selects only the private
    /// scratch slot, never a separate logical accumulator. `size_hint` is
    /// the scan pipeline's element-width hint and is unused by the scalar
    /// kernels.
    fn aggregate_ungrouped(&self, chunk: ColumnChunk<'_>, size_hint: usize, worker_id: usize);

    /// Fold one worker's chunk into its table shard.
    ///
    /// An absent value chunk registers the keys with identity rows
    /// (distinct pass) so all-null groups still reach the final result.
    fn aggregate_grouped(
        &self,
        table: &mut KeyedTable,
        keys: ColumnChunk<'_>,
        values: ColumnChunk<'_>,
        key_width_shift: u32,
        worker_id: usize,
    ) -> Result<()>;

    /// Reserve this function's slots in the shared row schema and record
    /// the returned base offset. Called once, before any aggregation, in
    /// one fixed order shared by all functions in the query.
    fn register_schema(&mut self, schema: &mut RowSchema);

    /// Seed this function's slots in the table's template row with the
    /// operation's identity element.
    fn init_row(&self, table: &mut KeyedTable);

    /// Fold `src` into `dst` at this function's offset. The rule is
    /// associative and commutative; shard merge order never affects the
    /// result.
    fn merge(&self, dst: &mut KeyedTable, src: &KeyedTable) -> Result<()>;

    /// Final pass converting raw accumulated state into the externally
    /// visible value. Runs exactly once, after merge.
    fn wrap_up(&self, table: &mut KeyedTable) -> Result<()>;

    /// Index of this function's input column in the chunk's value list.
    fn column_index(&self) -> usize;

    /// Base offset of this function's slots in the shared row.
    fn value_offset(&self) -> usize;

    /// Reset accumulators for reuse within a session. Idempotent.
    fn reset(&self);

    /// Permanently free owned scratch memory. Idempotent, safe after a
    /// partially failed construction.
    fn release(&mut self);

    /// Orchestrator-owned flag: set once all workers finished and
    /// merge + wrap-up completed.
    fn set_finalized(&self, finalized: bool);

    /// False while workers may still be mutating shared or partial state.
    fn is_finalized_read_safe(&self) -> bool;

    /// Finalized ungrouped result as a double.
    fn double_value(&self) -> f64 {
        f64::NAN
    }

    /// Finalized ungrouped result as a long.
    fn long_value(&self) -> i64 {
        vect::NULL_LONG
    }

    /// Finalized ungrouped result in its natural type.
    fn finalized_value(&self) -> AggValue;

    fn name(&self) -> &'static str;
}

/// Construct an aggregate function for `op` reading `column_index`, with
/// the key derivation strategy and worker count fixed for its lifetime.
pub fn new_aggregate(
    op: AggOp,
    key_kind: KeyKind,
    column_index: usize,
    worker_count: usize,
) -> Result<Box<dyn VectorAggregate>> {
    Ok(match op {
        AggOp::AvgDouble => Box::new(AvgDouble::new(key_kind, column_index, worker_count)?),
        AggOp::SumDouble => Box::new(SumDouble::new(key_kind, column_index, worker_count)?),
        AggOp::CountDouble => Box::new(CountDouble::new(key_kind, column_index, worker_count)?),
        AggOp::MinDouble => Box::new(MinDouble::new(key_kind, column_index, worker_count)?),
        AggOp::MaxDouble => Box::new(MaxDouble::new(key_kind, column_index, worker_count)?),
        AggOp::SumLong => Box::new(SumLong::new(key_kind, column_index, worker_count)?),
        AggOp::CountLong => Box::new(CountLong::new(key_kind, column_index, worker_count)?),
    })
}

/// The worker pool size is fixed at construction; zero workers is invalid.
fn check_worker_count(worker_count: usize) -> Result<()> {
    if worker_count == 0 {
        return Err(AggError::InvalidArgument(
            "worker count must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Bounds check shared by merge and wrap-up: the function's slots must lie
/// inside the table's row.
fn check_offset(table: &KeyedTable, offset: usize, width: usize, what: &str) -> Result<()> {
    if offset + width > table.slot_count() {
        return Err(match what {
            "merge" => AggError::Merge(format!(
                "value offset {offset}+{width} outside row of {} slots",
                table.slot_count()
            )),
            _ => AggError::WrapUp(format!(
                "value offset {offset}+{width} outside row of {} slots",
                table.slot_count()
            )),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_kind_shift() {
        assert_eq!(KeyKind::RawInt.key_width_shift(), 2);
        assert_eq!(KeyKind::HourBucket.key_width_shift(), 3);
    }

    #[test]
    fn test_decode_raw_int_keys() {
        let keys = [5i32, -7, 5];
        let chunk = ColumnChunk::from_i32s(&keys);
        let decoded: Vec<i32> = KeyKind::RawInt.decode(&chunk, 2).unwrap().collect();
        assert_eq!(decoded, vec![5, -7, 5]);
    }

    #[test]
    fn test_decode_hour_keys() {
        let hour = 3_600_000_000i64;
        let stamps = [0, hour, 25 * hour, -1];
        let chunk = ColumnChunk::from_i64s(&stamps);
        let decoded: Vec<i32> = KeyKind::HourBucket.decode(&chunk, 3).unwrap().collect();
        assert_eq!(decoded, vec![0, 1, 1, 23]);
    }

    #[test]
    fn test_decode_rejects_mismatched_shift() {
        let keys = [1i32];
        let chunk = ColumnChunk::from_i32s(&keys);
        assert!(KeyKind::RawInt.decode(&chunk, 3).is_err());
        assert!(KeyKind::HourBucket.decode(&chunk, 2).is_err());
    }
}
