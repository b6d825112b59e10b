//! Block ledger.
//!
//! Blocks live in a per-table slot arena. Vacated slots are reused and their
//! generation bumped, so a stale [`BlockId`] never resolves to whatever was
//! stored in the slot afterwards. Lookups go through an ordered offset map.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Allocation state of a block.
///
/// A block sitting in a page's used table with state `Free` has been lazily
/// freed and is waiting for the next clean pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockState {
    Free,
    Used,
}

/// A contiguous byte range within a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Block {
    pub offset: u64,
    pub size: u64,
    pub state: BlockState,
}

impl Block {
    pub fn free(offset: u64, size: u64) -> Self {
        Self { offset, size, state: BlockState::Free }
    }

    pub fn used(offset: u64, size: u64) -> Self {
        Self { offset, size, state: BlockState::Used }
    }

    /// One past the last byte of the block.
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }

    pub fn is_free(&self) -> bool {
        self.state == BlockState::Free
    }
}

/// Arena slot of a block, tagged with the slot generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId {
    slot: u32,
    generation: u32,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    block: Option<Block>,
}

/// Blocks of one kind (used or free) for one page, keyed by offset.
#[derive(Debug, Default)]
pub struct BlockTable {
    slots: Vec<Slot>,
    vacant: Vec<u32>,
    by_offset: BTreeMap<u64, BlockId>,
}

impl BlockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a block. Returns `None` if its offset is already taken.
    pub fn insert(&mut self, block: Block) -> Option<BlockId> {
        if self.by_offset.contains_key(&block.offset) {
            return None;
        }
        let id = match self.vacant.pop() {
            Some(slot) => {
                let entry = &mut self.slots[slot as usize];
                entry.block = Some(block);
                BlockId { slot, generation: entry.generation }
            }
            None => {
                let slot = u32::try_from(self.slots.len()).ok()?;
                self.slots.push(Slot { generation: 0, block: Some(block) });
                BlockId { slot, generation: 0 }
            }
        };
        self.by_offset.insert(block.offset, id);
        Some(id)
    }

    /// Remove the block starting at `offset`.
    pub fn remove(&mut self, offset: u64) -> Option<Block> {
        let id = self.by_offset.remove(&offset)?;
        let entry = self.slots.get_mut(id.slot as usize)?;
        let block = entry.block.take();
        entry.generation = entry.generation.wrapping_add(1);
        self.vacant.push(id.slot);
        block
    }

    pub fn id_of(&self, offset: u64) -> Option<BlockId> {
        self.by_offset.get(&offset).copied()
    }

    pub fn get(&self, offset: u64) -> Option<&Block> {
        self.id_of(offset).and_then(|id| self.resolve(id))
    }

    pub fn get_mut(&mut self, offset: u64) -> Option<&mut Block> {
        let id = self.id_of(offset)?;
        let entry = self.slots.get_mut(id.slot as usize)?;
        if entry.generation != id.generation {
            return None;
        }
        entry.block.as_mut()
    }

    /// Resolve an id. Fails once the slot has been vacated.
    pub fn resolve(&self, id: BlockId) -> Option<&Block> {
        let entry = self.slots.get(id.slot as usize)?;
        if entry.generation != id.generation {
            return None;
        }
        entry.block.as_ref()
    }

    /// Nearest block starting strictly below `offset`.
    pub fn predecessor(&self, offset: u64) -> Option<&Block> {
        self.by_offset
            .range(..offset)
            .next_back()
            .and_then(|(_, id)| self.resolve(*id))
    }

    pub fn contains(&self, offset: u64) -> bool {
        self.by_offset.contains_key(&offset)
    }

    pub fn len(&self) -> usize {
        self.by_offset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_offset.is_empty()
    }

    /// Blocks in ascending offset order.
    pub fn iter(&self) -> impl Iterator<Item = &Block> + '_ {
        self.by_offset.values().filter_map(|id| self.resolve(*id))
    }

    /// Number of arena slots, occupied or not.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.vacant.clear();
        self.by_offset.clear();
    }
}
