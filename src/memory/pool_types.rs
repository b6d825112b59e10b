//! Pool handles, counters and error definitions.

use serde::{Deserialize, Serialize};

use super::block::BlockId;
use crate::device::DeviceError;

/// Which page table a reference points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RefKind {
    Used,
    Free,
}

/// Caller-facing handle of an allocation.
///
/// `key` is the starting offset of the block within its page. A `MemRef` is a
/// lookup key, not a pointer: it is valid until the next structural change of
/// its page (split, coalesce, reset).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemRef {
    key: u64,
    page: usize,
    kind: RefKind,
}

impl MemRef {
    pub fn new(key: u64, page: usize, kind: RefKind) -> Self {
        Self { key, page, kind }
    }

    /// Block offset within the page.
    pub fn key(&self) -> u64 {
        self.key
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn kind(&self) -> RefKind {
        self.kind
    }
}

/// Weak reference to a block slot of a page.
///
/// Obtained fresh from [`MemPool::block_ref`](super::MemPool::block_ref);
/// resolving it after its slot was vacated fails with `CorruptIndex`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockRef {
    pub page: usize,
    pub block: BlockId,
    pub kind: RefKind,
}

/// Heap accounting for the pool's memory type.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeapInfo {
    /// Heap size reported by the device.
    pub size: u64,
    /// Bytes reserved by the pool's pages.
    pub budget: u64,
    /// Bytes held by used blocks, including lazily freed ones.
    pub usage: u64,
}

impl HeapInfo {
    pub fn utilization(&self) -> f64 {
        if self.budget == 0 {
            return 0.0;
        }
        self.usage as f64 / self.budget as f64
    }
}

/// Outcome of a clean pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanSummary {
    /// Lazily freed blocks returned to the free index.
    pub reclaimed: usize,
    /// Free neighbors absorbed while merging.
    pub merged: usize,
    /// Bytes returned to the free index.
    pub reclaimed_bytes: u64,
}

impl CleanSummary {
    pub(crate) fn absorb(&mut self, other: CleanSummary) {
        self.reclaimed += other.reclaimed;
        self.merged += other.merged;
        self.reclaimed_bytes += other.reclaimed_bytes;
    }
}

/// Errors for pool operations.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Out of pool memory: no page has a free block of {requested} bytes")]
    OutOfPoolMemory { requested: u64 },

    #[error("Bind failed: {0}")]
    BindFailed(#[source] DeviceError),

    #[error("Map failed: {0}")]
    MapFailed(#[source] DeviceError),

    #[error("Pool construction failed: {0}")]
    ConstructionFailed(String),

    #[error("Corrupt block index on page {page} at offset {offset}: {detail}")]
    CorruptIndex {
        page: usize,
        offset: u64,
        detail: &'static str,
    },

    #[error("No live allocation on page {page} at offset {offset}")]
    InvalidRef { page: usize, offset: u64 },

    #[error("Block on page {page} at offset {offset} already freed")]
    AlreadyFreed { page: usize, offset: u64 },

    #[error("Failed to spawn clean worker: {0}")]
    WorkerSpawnFailed(String),
}

impl PoolError {
    /// True for capacity failures a caller can recover from by cleaning.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::OutOfPoolMemory { .. })
    }
}
