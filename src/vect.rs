//! Scalar column primitives
//!
//! Straight-line kernels over one worker's chunk of a column buffer. Each
//! runs on a single thread over a contiguous run of values; the aggregate
//! functions fold their results into shared or per-shard state.
//!
//! Null conventions: a `f64` null is NaN; an `i64` null is [`NULL_LONG`].
//! Nulls are excluded from sums and counts.

use std::sync::atomic::{AtomicU64, Ordering};

/// Sentinel encoding a null 64-bit integer value.
pub const NULL_LONG: i64 = i64::MIN;

/// Microseconds in one hour.
const HOUR_MICROS: i64 = 3_600_000_000;

/// Average of the non-NaN values in a chunk.
///
/// The non-NaN element count is stored into `count_slot`, the calling
/// worker's private cache-line scratch slot, so the caller can re-weight
/// the chunk average without a second pass. Returns NaN for an empty or
/// all-NaN chunk.
pub fn avg_double_acc(values: &[f64], count_slot: &AtomicU64) -> f64 {
    let mut sum = 0.0;
    let mut count = 0u64;
    for &v in values {
        if !v.is_nan() {
            sum += v;
            count += 1;
        }
    }
    count_slot.store(count, Ordering::Relaxed);
    if count > 0 {
        sum / count as f64
    } else {
        f64::NAN
    }
}

/// Sum and non-NaN count of a chunk of doubles.
pub fn sum_double(values: &[f64]) -> (f64, u64) {
    let mut sum = 0.0;
    let mut count = 0u64;
    for &v in values {
        if !v.is_nan() {
            sum += v;
            count += 1;
        }
    }
    (sum, count)
}

/// Number of non-NaN values in a chunk of doubles.
pub fn count_double(values: &[f64]) -> u64 {
    values.iter().filter(|v| !v.is_nan()).count() as u64
}

/// Minimum non-NaN value in a chunk, NaN when there is none.
pub fn min_double(values: &[f64]) -> f64 {
    let mut min = f64::NAN;
    for &v in values {
        if !v.is_nan() && !(v >= min) {
            min = v;
        }
    }
    min
}

/// Maximum non-NaN value in a chunk, NaN when there is none.
pub fn max_double(values: &[f64]) -> f64 {
    let mut max = f64::NAN;
    for &v in values {
        if !v.is_nan() && !(v <= max) {
            max = v;
        }
    }
    max
}

/// Sum and non-null count of a chunk of longs.
pub fn sum_long(values: &[i64]) -> (i64, u64) {
    let mut sum = 0i64;
    let mut count = 0u64;
    for &v in values {
        if v != NULL_LONG {
            sum = sum.wrapping_add(v);
            count += 1;
        }
    }
    (sum, count)
}

/// Number of non-null values in a chunk of longs.
pub fn count_long(values: &[i64]) -> u64 {
    values.iter().filter(|&&v| v != NULL_LONG).count() as u64
}

/// Hour-of-day bucket (0-23) for an epoch-microsecond timestamp.
///
/// Floor semantics for pre-epoch timestamps: -1us falls in hour 23 of the
/// previous day.
pub fn hour_of_day(epoch_micros: i64) -> i32 {
    if epoch_micros > -1 {
        ((epoch_micros / HOUR_MICROS) % 24) as i32
    } else {
        (23 + ((epoch_micros + 1) / HOUR_MICROS) % 24) as i32
    }
}
