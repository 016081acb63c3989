//! Dense thread-index allocator
//!
//! Every live thread owns one small integer in `[0, MAX_THREADS)` used as
//! its bit position in every object's permission bitmap. Keeping the index
//! space dense keeps the bitmaps small and the permission test O(1).
//!
//! This module only recycles indices. The permission-bitmap scrub that must
//! accompany allocation/release (so a recycled index never inherits grants
//! from its previous owner) is performed by [`crate::ObjectBroker`], which
//! owns the registries and does the scrub under its lock at both ends of
//! the reuse cycle.

use crate::bitset::PermBits;
use crate::config::MAX_THREADS;
use crate::ObjectError;

/// Dense per-thread index, unique among currently-live threads.
///
/// Used as a bit position in permission bitmaps. Obtained from
/// [`crate::ObjectBroker::allocate_thread_index`]; constructing one
/// directly is reserved for boot code that lays out the initial threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadIndex(u16);

impl ThreadIndex {
    /// Create a thread index from its raw value.
    ///
    /// Boot-time use only; the value must have been (or be about to be)
    /// reserved in the allocator for the owning thread.
    #[inline]
    pub const fn new(raw: u16) -> Self {
        debug_assert!((raw as usize) < MAX_THREADS);
        Self(raw)
    }

    /// Raw value, i.e. the bit position in permission bitmaps.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Free-map-backed allocator for thread indices.
///
/// Allocation hands out the lowest free index; release marks it free.
/// Both are O(words) bit scans, bounded and lock-free in themselves (the
/// broker serializes callers).
#[derive(Debug)]
pub struct ThreadIndexTable {
    used: PermBits,
}

impl ThreadIndexTable {
    /// Create a table with every index free.
    pub const fn new() -> Self {
        Self {
            used: PermBits::new(),
        }
    }

    /// Reserve the lowest free index.
    ///
    /// Fails with [`ObjectError::Exhausted`] when all `MAX_THREADS`
    /// indices are live; failure does not change allocator state.
    pub fn allocate(&mut self) -> Result<ThreadIndex, ObjectError> {
        let pos = self.used.first_clear().ok_or(ObjectError::Exhausted)?;
        self.used.set(pos);
        Ok(ThreadIndex(pos as u16))
    }

    /// Release an index back to the free pool.
    ///
    /// Returns true if the index was live (false makes the call a no-op,
    /// which keeps double-release harmless).
    pub fn release(&mut self, idx: ThreadIndex) -> bool {
        let was_live = self.used.test(idx.as_usize());
        self.used.clear(idx.as_usize());
        was_live
    }

    /// Whether `idx` is currently live.
    #[inline]
    pub fn is_allocated(&self, idx: ThreadIndex) -> bool {
        self.used.test(idx.as_usize())
    }

    /// Number of live indices.
    #[inline]
    pub fn live_count(&self) -> usize {
        self.used.count_set()
    }
}

impl Default for ThreadIndexTable {
    fn default() -> Self {
        Self::new()
    }
}
