//! A page: one device-memory reservation split into blocks.
//!
//! Each page keeps two block tables (used and free, both keyed by offset) and
//! a size-ordered index over the free table. Frees are lazy: they only flip
//! the state of a used block. [`Page::coalesce`] moves flagged blocks back to
//! the free side and merges them with free neighbors on both sides.

use super::block::{Block, BlockState, BlockTable};
use super::free_index::FreeSpaceIndex;
use super::pool_types::{CleanSummary, PoolError};

/// One fixed-size reservation and its block bookkeeping.
#[derive(Debug)]
pub struct Page<M> {
    index: usize,
    size: u64,
    memory: Option<M>,
    used: BlockTable,
    free: BlockTable,
    free_index: FreeSpaceIndex,
}

impl<M> Page<M> {
    /// Wrap a reservation of `size` bytes as a single free block.
    pub fn new(index: usize, size: u64, memory: M) -> Self {
        let mut page = Self {
            index,
            size,
            memory: Some(memory),
            used: BlockTable::new(),
            free: BlockTable::new(),
            free_index: FreeSpaceIndex::new(),
        };
        page.reset_blocks();
        page
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn memory(&self) -> Option<&M> {
        self.memory.as_ref()
    }

    /// Detach the reservation so it can be handed back to the device.
    pub fn take_memory(&mut self) -> Option<M> {
        self.memory.take()
    }

    pub(crate) fn used_table(&self) -> &BlockTable {
        &self.used
    }

    pub(crate) fn free_table(&self) -> &BlockTable {
        &self.free
    }

    /// Smallest free block that can hold `size` bytes, as `(offset, size)`.
    pub fn best_fit(&self, size: u64) -> Option<(u64, u64)> {
        self.free_index.best_fit(size)
    }

    pub fn largest_free(&self) -> Option<(u64, u64)> {
        self.free_index.largest()
    }

    /// Carve `aligned_size` bytes off the front of the free block at `offset`.
    ///
    /// The used piece keeps `offset`; the remainder, if any, moves to
    /// `offset + aligned_size`. An exact fit leaves no remainder behind.
    pub fn split(&mut self, offset: u64, aligned_size: u64) -> Result<Block, PoolError> {
        let free = *self
            .free
            .get(offset)
            .ok_or_else(|| self.corrupt(offset, "free index entry has no free block"))?;
        if free.size < aligned_size {
            return Err(self.corrupt(offset, "free block smaller than request"));
        }
        if self.used.contains(offset) {
            return Err(self.corrupt(offset, "used block aliases free block"));
        }
        if !self.free_index.remove(free.offset, free.size) {
            return Err(self.corrupt(offset, "free block missing from size index"));
        }
        self.free.remove(offset);

        let used = Block::used(offset, aligned_size);
        if self.used.insert(used).is_none() {
            return Err(self.corrupt(offset, "used table rejected split block"));
        }

        let remainder = free.size - aligned_size;
        if remainder > 0 {
            let rest = Block::free(offset + aligned_size, remainder);
            if self.free.insert(rest).is_none() {
                return Err(self.corrupt(rest.offset, "remainder aliases a free block"));
            }
            self.free_index.insert(rest.offset, rest.size);
        }
        Ok(used)
    }

    /// Flag the used block at `offset` as free. Indices are left untouched.
    pub fn mark_free(&mut self, offset: u64) -> Result<Block, PoolError> {
        let page = self.index;
        let block = self
            .used
            .get_mut(offset)
            .ok_or(PoolError::InvalidRef { page, offset })?;
        if block.is_free() {
            return Err(PoolError::AlreadyFreed { page, offset });
        }
        block.state = BlockState::Free;
        Ok(*block)
    }

    /// Return every flagged block to the free side, merging neighbors.
    pub fn coalesce(&mut self) -> Result<CleanSummary, PoolError> {
        let pending: Vec<u64> = self
            .used
            .iter()
            .filter(|b| b.is_free())
            .map(|b| b.offset)
            .collect();

        let mut summary = CleanSummary::default();
        for offset in pending {
            let block = self
                .used
                .remove(offset)
                .ok_or_else(|| self.corrupt(offset, "flagged block vanished from used table"))?;
            summary.reclaimed += 1;
            summary.reclaimed_bytes += block.size;
            summary.merged += self.insert_free(block)?;
        }
        Ok(summary)
    }

    /// Insert a released block, absorbing free blocks that touch it.
    fn insert_free(&mut self, block: Block) -> Result<usize, PoolError> {
        let mut start = block.offset;
        let mut end = block.end();
        let mut merged = 0;

        if let Some(prev) = self.free.predecessor(start).copied() {
            if prev.end() > start {
                return Err(self.corrupt(prev.offset, "free block overlaps released block"));
            }
            if prev.end() == start {
                self.detach_free(prev)?;
                start = prev.offset;
                merged += 1;
                tracing::trace!(page = self.index, offset = prev.offset, size = prev.size, "merged free predecessor");
            }
        }

        while let Some(next) = self.free.get(end).copied() {
            self.detach_free(next)?;
            end = next.end();
            merged += 1;
            tracing::trace!(page = self.index, offset = next.offset, size = next.size, "merged free successor");
        }

        let merged_block = Block::free(start, end - start);
        if self.free.insert(merged_block).is_none() {
            return Err(self.corrupt(start, "merged block aliases a free block"));
        }
        self.free_index.insert(start, merged_block.size);
        Ok(merged)
    }

    fn detach_free(&mut self, block: Block) -> Result<(), PoolError> {
        self.free.remove(block.offset);
        if !self.free_index.remove(block.offset, block.size) {
            return Err(self.corrupt(block.offset, "free block missing from size index"));
        }
        Ok(())
    }

    /// Drop every block and go back to one free block spanning the page.
    pub fn reset_blocks(&mut self) {
        self.used.clear();
        self.free.clear();
        self.free_index.clear();
        if self.size > 0 {
            self.free.insert(Block::free(0, self.size));
            self.free_index.insert(0, self.size);
        }
    }

    /// Drop all bookkeeping. Used once the reservation has been released.
    pub fn clear(&mut self) {
        self.used.clear();
        self.free.clear();
        self.free_index.clear();
    }

    /// Used-table blocks in offset order, including lazily freed ones.
    pub fn used_blocks(&self) -> impl Iterator<Item = &Block> + '_ {
        self.used.iter()
    }

    /// Free-table blocks in offset order.
    pub fn free_blocks(&self) -> impl Iterator<Item = &Block> + '_ {
        self.free.iter()
    }

    pub fn free_sizes(&self) -> impl Iterator<Item = u64> + '_ {
        self.free_index.sizes()
    }

    pub fn used_bytes(&self) -> u64 {
        self.used.iter().map(|b| b.size).sum()
    }

    pub fn free_bytes(&self) -> u64 {
        self.free_index.free_bytes()
    }

    /// Lazily freed blocks waiting for a clean pass.
    pub fn pending_frees(&self) -> usize {
        self.used.iter().filter(|b| b.is_free()).count()
    }

    /// Check that used and free blocks tile `[0, size)` exactly and that the
    /// free table and size index agree.
    pub fn verify(&self) -> Result<(), PoolError> {
        if self.free.len() != self.free_index.len() {
            return Err(self.corrupt(0, "free table and size index disagree"));
        }

        let mut blocks: Vec<(Block, bool)> = self
            .used
            .iter()
            .map(|b| (*b, false))
            .chain(self.free.iter().map(|b| (*b, true)))
            .collect();
        blocks.sort_by_key(|(b, _)| b.offset);

        let mut cursor = 0u64;
        let mut prev_indexed_free = false;
        for (block, indexed_free) in blocks {
            if block.size == 0 {
                return Err(self.corrupt(block.offset, "zero-size block"));
            }
            if block.offset != cursor {
                let detail = if block.offset < cursor { "overlapping blocks" } else { "gap between blocks" };
                return Err(self.corrupt(block.offset, detail));
            }
            if indexed_free && prev_indexed_free {
                return Err(self.corrupt(block.offset, "adjacent free blocks not coalesced"));
            }
            cursor = block.end();
            prev_indexed_free = indexed_free;
        }
        if cursor != self.size {
            return Err(self.corrupt(cursor, "blocks do not cover the page"));
        }
        Ok(())
    }

    fn corrupt(&self, offset: u64, detail: &'static str) -> PoolError {
        PoolError::CorruptIndex {
            page: self.index,
            offset,
            detail,
        }
    }
}

#[cfg(test)]
#[path = "page_tests.rs"]
mod tests;
