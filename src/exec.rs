//! Merge & wrap-up orchestration
//!
//! Drives one query's aggregation: workers fold their assigned chunks into
//! per-worker state in parallel with no cross-worker synchronization, then
//! the orchestrator folds the per-worker shards into one table (a hard
//! barrier), runs wrap-up exactly once, and only then allows result reads.

use rayon::prelude::*;
use tracing::{debug, trace};

use crate::agg::{AggValue, VectorAggregate};
use crate::buffer::ColumnChunk;
use crate::error::{AggError, Result};
use crate::hash::keyed_table::slot_f64;
use crate::hash::KeyedTable;
use crate::schema::{RowSchema, SlotType};

/// Default sizing for per-worker table shards.
const SHARD_CAPACITY: usize = 64;
const SHARD_LOAD_FACTOR: f64 = 0.5;

/// One worker-sized slice of the scan output for the grouped path: a key
/// chunk plus one value chunk per source column.
pub struct GroupedChunk<'a> {
    pub keys: ColumnChunk<'a>,
    pub key_width_shift: u32,
    pub values: Vec<ColumnChunk<'a>>,
}

/// One worker-sized slice of the scan output for the ungrouped path.
pub struct UngroupedChunk<'a> {
    pub values: Vec<ColumnChunk<'a>>,
    /// Element-width hint passed through from the scan pipeline.
    pub size_hint: usize,
}

/// Orchestrates a fixed set of aggregate functions over a fixed worker
/// pool for one query at a time.
pub struct GroupByExecutor {
    funcs: Vec<Box<dyn VectorAggregate>>,
    schema: RowSchema,
    worker_count: usize,
    result: Option<KeyedTable>,
    finalized: bool,
}

impl GroupByExecutor {
    /// Build an executor over `funcs`, registering each function's slots
    /// in the shared row schema in construction order. Offsets stay stable
    /// for the whole execution.
    pub fn new(mut funcs: Vec<Box<dyn VectorAggregate>>, worker_count: usize) -> Result<Self> {
        if worker_count == 0 {
            return Err(AggError::InvalidArgument(
                "worker count must be at least 1".to_string(),
            ));
        }
        if funcs.is_empty() {
            return Err(AggError::InvalidArgument(
                "at least one aggregate function is required".to_string(),
            ));
        }
        let mut schema = RowSchema::new();
        for func in &mut funcs {
            func.register_schema(&mut schema);
        }
        Ok(Self {
            funcs,
            schema,
            worker_count,
            result: None,
            finalized: false,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn functions(&self) -> &[Box<dyn VectorAggregate>] {
        &self.funcs
    }

    /// Run the grouped path over the scheduler's chunk list: parallel
    /// accumulation into per-worker shards, sequential shard merge,
    /// wrap-up, finalize.
    pub fn run_grouped(&mut self, chunks: &[GroupedChunk<'_>]) -> Result<()> {
        self.check_not_finalized()?;
        debug!(
            chunks = chunks.len(),
            workers = self.worker_count,
            funcs = self.funcs.len(),
            "grouped aggregation start"
        );

        let mut shards: Vec<KeyedTable> = (0..self.worker_count)
            .map(|_| KeyedTable::new(&self.schema, SHARD_CAPACITY, SHARD_LOAD_FACTOR))
            .collect::<Result<_>>()?;
        for shard in &mut shards {
            for func in &self.funcs {
                func.init_row(shard);
            }
        }

        // each worker is the only writer of its shard
        let funcs = &self.funcs;
        let worker_count = self.worker_count;
        shards
            .par_iter_mut()
            .enumerate()
            .try_for_each(|(worker_id, shard)| {
                for chunk in chunks.iter().skip(worker_id).step_by(worker_count) {
                    for func in funcs {
                        let values = column_chunk(&chunk.values, func.column_index())?;
                        func.aggregate_grouped(
                            shard,
                            chunk.keys,
                            values,
                            chunk.key_width_shift,
                            worker_id,
                        )?;
                    }
                }
                Ok::<(), AggError>(())
            })?;

        // all workers are done: fold the shards, destroying each source
        // shard as soon as it has been merged
        let mut shards = shards.into_iter();
        let mut merged = shards
            .next()
            .ok_or_else(|| AggError::Merge("no worker shards".to_string()))?;
        for src in shards {
            trace!(src_groups = src.size(), "merging shard");
            for func in &self.funcs {
                func.merge(&mut merged, &src)?;
            }
        }

        for func in &self.funcs {
            func.wrap_up(&mut merged)?;
        }
        debug!(groups = merged.size(), "grouped aggregation finalized");

        self.result = Some(merged);
        self.finish();
        Ok(())
    }

    /// Run the ungrouped path: workers fold chunks straight into the
    /// functions' shared scalar accumulators, then finalize.
    pub fn run_ungrouped(&mut self, chunks: &[UngroupedChunk<'_>]) -> Result<()> {
        self.check_not_finalized()?;
        debug!(
            chunks = chunks.len(),
            workers = self.worker_count,
            funcs = self.funcs.len(),
            "ungrouped aggregation start"
        );

        let funcs = &self.funcs;
        let worker_count = self.worker_count;
        (0..worker_count)
            .into_par_iter()
            .try_for_each(|worker_id| {
                for chunk in chunks.iter().skip(worker_id).step_by(worker_count) {
                    for func in funcs {
                        let values = column_chunk(&chunk.values, func.column_index())?;
                        func.aggregate_ungrouped(values, chunk.size_hint, worker_id);
                    }
                }
                Ok::<(), AggError>(())
            })?;

        self.finish();
        Ok(())
    }

    /// Merged, wrapped-up table of the grouped run.
    pub fn result_table(&self) -> Result<&KeyedTable> {
        if !self.finalized {
            return Err(AggError::Execution(
                "result read before finalization".to_string(),
            ));
        }
        self.result
            .as_ref()
            .ok_or_else(|| AggError::Execution("no grouped result".to_string()))
    }

    /// Finalized value of function `func_index` for `key`, or `None` when
    /// the group does not exist.
    pub fn group_value(&self, key: i32, func_index: usize) -> Result<Option<AggValue>> {
        let table = self.result_table()?;
        let offset = self.funcs[func_index].value_offset();
        Ok(table.get(key).map(|row| match self.schema.slot_type(offset) {
            SlotType::Double => AggValue::Double(slot_f64(row, offset)),
            SlotType::Long => AggValue::Long(row[offset] as i64),
        }))
    }

    /// Finalized ungrouped value of function `func_index`.
    pub fn ungrouped_value(&self, func_index: usize) -> Result<AggValue> {
        if !self.finalized {
            return Err(AggError::Execution(
                "result read before finalization".to_string(),
            ));
        }
        Ok(self.funcs[func_index].finalized_value())
    }

    /// Reset all functions and drop the previous result for reuse within
    /// a session.
    pub fn reset(&mut self) {
        for func in &self.funcs {
            func.reset();
        }
        self.result = None;
        self.finalized = false;
    }

    /// Permanently free scratch memory owned by the functions. Idempotent.
    pub fn release(&mut self) {
        for func in &mut self.funcs {
            func.release();
        }
    }

    fn check_not_finalized(&self) -> Result<()> {
        if self.finalized {
            return Err(AggError::Execution(
                "executor already finalized; reset before reuse".to_string(),
            ));
        }
        Ok(())
    }

    fn finish(&mut self) {
        for func in &self.funcs {
            func.set_finalized(true);
        }
        self.finalized = true;
    }
}

fn column_chunk<'a>(values: &[ColumnChunk<'a>], index: usize) -> Result<ColumnChunk<'a>> {
    values.get(index).copied().ok_or_else(|| {
        AggError::Execution(format!(
            "chunk carries {} value columns, function reads column {}",
            values.len(),
            index
        ))
    })
}
