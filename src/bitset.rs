//! Fixed-capacity permission bitset
//!
//! One bit per possible thread index, packed into machine words. This is
//! pure bit algebra: it knows nothing about index recycling, descriptors,
//! or locking. The index-recycling policy lives in [`crate::thread_index`]
//! and the two are tested independently.
//!
//! ## Layout
//!
//! `MAX_THREADS` positions packed little-endian into `[usize; WORDS]`:
//! position `i` is bit `i % usize::BITS` of word `i / usize::BITS`.

use core::fmt;

use crate::config::MAX_THREADS;

const WORD_BITS: usize = usize::BITS as usize;

/// Number of words needed to cover `MAX_THREADS` positions.
pub(crate) const WORDS: usize = (MAX_THREADS + WORD_BITS - 1) / WORD_BITS;

/// Fixed-size bitset over `[0, MAX_THREADS)` positions.
///
/// Used both as the per-object permission bitmap and as the thread-index
/// free map. Out-of-range positions are a caller bug (debug assertion).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PermBits {
    words: [usize; WORDS],
}

impl PermBits {
    /// Create an empty bitset (all positions clear).
    pub const fn new() -> Self {
        Self { words: [0; WORDS] }
    }

    #[inline]
    fn locate(pos: usize) -> (usize, usize) {
        debug_assert!(pos < MAX_THREADS, "bit position out of range");
        (pos / WORD_BITS, 1usize << (pos % WORD_BITS))
    }

    /// Set the bit at `pos`. Idempotent.
    #[inline]
    pub fn set(&mut self, pos: usize) {
        let (word, mask) = Self::locate(pos);
        self.words[word] |= mask;
    }

    /// Clear the bit at `pos`. Idempotent.
    #[inline]
    pub fn clear(&mut self, pos: usize) {
        let (word, mask) = Self::locate(pos);
        self.words[word] &= !mask;
    }

    /// Test the bit at `pos`.
    #[inline]
    pub fn test(&self, pos: usize) -> bool {
        let (word, mask) = Self::locate(pos);
        self.words[word] & mask != 0
    }

    /// True if any position is set.
    #[inline]
    pub fn any_set(&self) -> bool {
        let mut word = 0;
        while word < WORDS {
            if self.words[word] != 0 {
                return true;
            }
            word += 1;
        }
        false
    }

    /// Clear every position.
    #[inline]
    pub fn clear_all(&mut self) {
        self.words = [0; WORDS];
    }

    /// Lowest clear position, or `None` if all `MAX_THREADS` are set.
    ///
    /// This is the allocation scan for the thread-index free map.
    pub fn first_clear(&self) -> Option<usize> {
        for (i, &word) in self.words.iter().enumerate() {
            if word != usize::MAX {
                let pos = i * WORD_BITS + word.trailing_ones() as usize;
                // The last word may have tail bits past MAX_THREADS.
                if pos < MAX_THREADS {
                    return Some(pos);
                }
            }
        }
        None
    }

    /// Number of set positions.
    pub fn count_set(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }
}

impl Default for PermBits {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PermBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut set = f.debug_set();
        for pos in 0..MAX_THREADS {
            if self.test(pos) {
                set.entry(&pos);
            }
        }
        set.finish()
    }
}
