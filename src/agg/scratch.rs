//! Per-worker scratch arena
//!
//! Some chunk primitives return an auxiliary per-call count alongside
//! their main result. Each worker writes it into a private cache-line
//! sized slot so concurrent workers never share a line. The arena is
//! allocated once at function construction (worker count is fixed) and
//! released exactly once on close.

use crate::error::{AggError, Result};
use crossbeam::utils::CachePadded;
use std::sync::atomic::{AtomicU64, Ordering};

/// One cache-line slot per worker, owned by a single aggregate function.
pub struct ScratchArena {
    slots: Vec<CachePadded<AtomicU64>>,
}

impl ScratchArena {
    /// Allocate one slot per worker. Zero workers is invalid.
    pub fn new(worker_count: usize) -> Result<Self> {
        if worker_count == 0 {
            return Err(AggError::InvalidArgument(
                "worker count must be at least 1".to_string(),
            ));
        }
        let slots = (0..worker_count)
            .map(|_| CachePadded::new(AtomicU64::new(0)))
            .collect();
        Ok(Self { slots })
    }

    /// Number of worker slots; zero after release.
    pub fn worker_count(&self) -> usize {
        self.slots.len()
    }

    /// The calling worker's private slot.
    pub fn slot(&self, worker_id: usize) -> &AtomicU64 {
        &self.slots[worker_id]
    }

    /// Value last stored in a worker's slot.
    pub fn get(&self, worker_id: usize) -> u64 {
        self.slots[worker_id].load(Ordering::Relaxed)
    }

    /// Zero every slot for session reuse.
    pub fn reset(&self) {
        for slot in &self.slots {
            slot.store(0, Ordering::Relaxed);
        }
    }

    /// Free the arena. Idempotent; safe after partial construction.
    pub fn release(&mut self) {
        self.slots = Vec::new();
    }
}
