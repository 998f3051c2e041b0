//! Vectorized GROUP BY aggregation kernel
//!
//! The aggregation core of a columnar time-series engine: aggregate
//! functions (avg, count, sum, min, max) over raw column buffers,
//! optionally grouped by a 32-bit key derived from the data, executed by a
//! fixed pool of worker threads over disjoint row ranges and merged into a
//! single finalized result.

pub mod agg;
pub mod buffer;
pub mod error;
pub mod exec;
pub mod hash;
pub mod schema;
pub mod vect;

// Re-export main types
pub use agg::{new_aggregate, AggOp, AggValue, KeyKind, VectorAggregate};
pub use buffer::ColumnChunk;
pub use error::{AggError, Result};
pub use exec::{GroupByExecutor, GroupedChunk, UngroupedChunk};
pub use hash::{IntHashSet, KeyedTable};
pub use schema::{RowSchema, SlotType};
