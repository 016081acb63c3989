//! Build-time configuration
//!
//! Compile-time constants that size the broker's data structures. These
//! mirror what a board/application configuration would generate for a
//! production build.

use static_assertions::const_assert;

/// Maximum number of concurrently live threads supported by this build.
///
/// This sizes:
/// - the thread-index free map in [`crate::ThreadIndexTable`]
/// - the permission bitmap carried by every [`crate::ObjectDescriptor`]
///
/// A thread index is a dense integer in `[0, MAX_THREADS)` used as a bit
/// position in permission bitmaps. Raising this grows every descriptor by
/// one bit per thread (rounded up to whole words).
pub const MAX_THREADS: usize = 64;

// Sanity: the index space must be non-empty and must fit the u16 raw
// representation of ThreadIndex.
const_assert!(MAX_THREADS > 0);
const_assert!(MAX_THREADS <= u16::MAX as usize);
