//! Lock-free scalar accumulators
//!
//! The ungrouped path folds every worker's partial result into shared
//! accumulators. Adds are associative, so a compare-exchange loop over the
//! bit pattern is enough; no locking, no per-worker logical state.

use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free `f64` accumulator over an atomic bit pattern.
pub struct AtomicF64 {
    bits: AtomicU64,
}

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self {
            bits: AtomicU64::new(value.to_bits()),
        }
    }

    pub fn load(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    pub fn store(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Release);
    }

    /// Atomically add `value`.
    pub fn add(&self, value: f64) {
        self.fetch_update(|current| current + value);
    }

    /// Atomically fold `value` in with min. NaN operands are ignored; a
    /// NaN accumulator means "no value yet" and is replaced.
    pub fn min(&self, value: f64) {
        if value.is_nan() {
            return;
        }
        self.fetch_update(|current| {
            if current.is_nan() || value < current {
                value
            } else {
                current
            }
        });
    }

    /// Atomically fold `value` in with max. NaN operands are ignored; a
    /// NaN accumulator means "no value yet" and is replaced.
    pub fn max(&self, value: f64) {
        if value.is_nan() {
            return;
        }
        self.fetch_update(|current| {
            if current.is_nan() || value > current {
                value
            } else {
                current
            }
        });
    }

    fn fetch_update(&self, f: impl Fn(f64) -> f64) {
        let mut current = self.bits.load(Ordering::Relaxed);
        loop {
            let next = f(f64::from_bits(current)).to_bits();
            match self
                .bits
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }
}
