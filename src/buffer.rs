//! Column chunk descriptors
//!
//! The scan pipeline hands each worker a (base address, byte size) pair per
//! column per row range. A null address or zero size denotes an absent
//! chunk; every kernel treats it as a no-op.

use std::marker::PhantomData;

/// Borrowed view over one worker's slice of a raw column buffer.
///
/// The lifetime ties the descriptor to the storage that backs it, so chunks
/// built from slices stay safe while still round-tripping through the
/// address/size form the scan pipeline uses.
#[derive(Clone, Copy, Debug)]
pub struct ColumnChunk<'a> {
    addr: *const u8,
    size: usize,
    _storage: PhantomData<&'a [u8]>,
}

// The descriptor is a read-only view; workers only ever read disjoint chunks.
unsafe impl Send for ColumnChunk<'_> {}
unsafe impl Sync for ColumnChunk<'_> {}

impl<'a> ColumnChunk<'a> {
    /// Descriptor for a chunk that carries no data.
    pub fn absent() -> Self {
        Self {
            addr: std::ptr::null(),
            size: 0,
            _storage: PhantomData,
        }
    }

    /// View over a buffer of 64-bit floats.
    pub fn from_f64s(values: &'a [f64]) -> Self {
        Self {
            addr: values.as_ptr().cast(),
            size: std::mem::size_of_val(values),
            _storage: PhantomData,
        }
    }

    /// View over a buffer of 64-bit integers.
    pub fn from_i64s(values: &'a [i64]) -> Self {
        Self {
            addr: values.as_ptr().cast(),
            size: std::mem::size_of_val(values),
            _storage: PhantomData,
        }
    }

    /// View over a buffer of 32-bit integers.
    pub fn from_i32s(values: &'a [i32]) -> Self {
        Self {
            addr: values.as_ptr().cast(),
            size: std::mem::size_of_val(values),
            _storage: PhantomData,
        }
    }

    /// Rebuild a descriptor from the raw form used by the scan pipeline.
    ///
    /// # Safety
    ///
    /// `addr` must point to `size` readable bytes, properly aligned for the
    /// element type the chunk will be viewed as, and live for `'a`. A null
    /// `addr` with any size produces an absent chunk.
    pub unsafe fn from_raw_parts(addr: *const u8, size: usize) -> Self {
        Self {
            addr,
            size,
            _storage: PhantomData,
        }
    }

    /// True when the chunk carries no data (null address or zero size).
    pub fn is_absent(&self) -> bool {
        self.addr.is_null() || self.size == 0
    }

    /// Byte size of the chunk.
    pub fn byte_size(&self) -> usize {
        self.size
    }

    /// View the chunk as 64-bit floats. Empty for an absent chunk.
    pub fn as_f64s(&self) -> &'a [f64] {
        if self.is_absent() {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(self.addr.cast::<f64>(), self.size / 8) }
    }

    /// View the chunk as 64-bit integers. Empty for an absent chunk.
    pub fn as_i64s(&self) -> &'a [i64] {
        if self.is_absent() {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(self.addr.cast::<i64>(), self.size / 8) }
    }

    /// View the chunk as 32-bit integers. Empty for an absent chunk.
    pub fn as_i32s(&self) -> &'a [i32] {
        if self.is_absent() {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(self.addr.cast::<i32>(), self.size / 4) }
    }
}
