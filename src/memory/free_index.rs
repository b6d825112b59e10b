//! Size-ordered index over a page's free blocks.

use std::collections::BTreeSet;

/// Free blocks ordered by `(size, offset)`.
///
/// `best_fit` is a single range query: the first entry at or above
/// `(size, 0)` is the smallest block that fits, lowest offset first among
/// equal sizes.
#[derive(Debug, Default, Clone)]
pub struct FreeSpaceIndex {
    entries: BTreeSet<(u64, u64)>,
    free_bytes: u64,
}

impl FreeSpaceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a free block. Zero-size blocks are never indexed.
    pub fn insert(&mut self, offset: u64, size: u64) -> bool {
        if size == 0 {
            return false;
        }
        let inserted = self.entries.insert((size, offset));
        if inserted {
            self.free_bytes += size;
        }
        inserted
    }

    pub fn remove(&mut self, offset: u64, size: u64) -> bool {
        let removed = self.entries.remove(&(size, offset));
        if removed {
            self.free_bytes -= size;
        }
        removed
    }

    /// Smallest free block with at least `size` bytes, as `(offset, size)`.
    pub fn best_fit(&self, size: u64) -> Option<(u64, u64)> {
        self.entries
            .range((size, 0)..)
            .next()
            .map(|&(size, offset)| (offset, size))
    }

    /// Largest free block, as `(offset, size)`.
    pub fn largest(&self) -> Option<(u64, u64)> {
        self.entries.iter().next_back().map(|&(size, offset)| (offset, size))
    }

    pub fn free_bytes(&self) -> u64 {
        self.free_bytes
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Free block sizes, ascending.
    pub fn sizes(&self) -> impl Iterator<Item = u64> + '_ {
        self.entries.iter().map(|&(size, _)| size)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.free_bytes = 0;
    }
}
