//! Device memory pool.
//!
//! A [`MemPool`] reserves a fixed number of equally sized pages from a
//! [`MemoryDevice`](crate::device::MemoryDevice) at construction and serves
//! aligned sub-allocations out of them with best-fit placement. Frees are
//! lazy; [`MemPool::clean`] reclaims them and coalesces free space.
//!
//! - `pool_core`: construction, allocate, free, bind
//! - `pool_ops`: clean, reset, destroy, reports and queries

pub use super::pool_core::{aligned_size, effective_alignment, MemPool};
pub use super::pool_types::{BlockRef, CleanSummary, HeapInfo, MemRef, PoolError, RefKind};

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
