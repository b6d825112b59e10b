//! Paged device memory sub-allocation.
//!
//! - `block` — block records and the per-page slot arena
//! - `free_index` — size-ordered free block index (best-fit)
//! - `page` — one reservation: split, lazy free, coalescing
//! - `pool` — the `MemPool` manager
//! - `coherency` — pending-free tracking
//! - `clean_worker` — background clean thread
//! - `report` — usage and fragmentation reports

pub mod block;
pub mod clean_worker;
pub mod coherency;
pub mod free_index;
pub mod page;
pub mod pool;
mod pool_core;
mod pool_ops;
mod pool_types;
pub mod report;

pub use block::{Block, BlockId, BlockState, BlockTable};
pub use clean_worker::{shared, CleanWorker, CleanWorkerConfig, SharedPool};
pub use coherency::{CoherencyMonitor, CoherencyStatus};
pub use free_index::FreeSpaceIndex;
pub use page::Page;
pub use pool::{
    aligned_size, effective_alignment, BlockRef, CleanSummary, HeapInfo, MemPool, MemRef, PoolError,
    RefKind,
};
pub use report::{BlockExtent, FragmentationStats, PageReport, UsageReport};
