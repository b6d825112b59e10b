//! Usage and fragmentation reports.

use std::fmt;

use serde::Serialize;

use super::block::{Block, BlockState};
use super::coherency::CoherencyStatus;
use super::pool_types::HeapInfo;

/// A block as it appears in a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockExtent {
    pub offset: u64,
    pub size: u64,
    pub state: BlockState,
}

impl From<Block> for BlockExtent {
    fn from(block: Block) -> Self {
        Self {
            offset: block.offset,
            size: block.size,
            state: block.state,
        }
    }
}

/// Free-space distribution over one or more pages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FragmentationStats {
    /// Number of free blocks.
    pub free_blocks: usize,
    /// Mean free-block size in bytes.
    pub mean_fragment: f64,
    /// Population variance of free-block sizes.
    pub fragment_variance: f64,
    /// Mean fraction of page bytes that are free.
    pub mean_free: f64,
    /// Largest free block in bytes.
    pub max_free: u64,
    /// Mean fraction of page bytes that are used.
    pub mean_usage: f64,
}

impl FragmentationStats {
    /// Build stats from `(page_size, used_bytes, free_sizes)` samples.
    pub fn from_pages<I>(pages: I) -> Self
    where
        I: IntoIterator<Item = (u64, u64, Vec<u64>)>,
    {
        let mut sizes: Vec<u64> = Vec::new();
        let mut free_ratio_sum = 0.0;
        let mut usage_ratio_sum = 0.0;
        let mut page_count = 0usize;

        for (page_size, used_bytes, free_sizes) in pages {
            page_count += 1;
            if page_size > 0 {
                let free_bytes: u64 = free_sizes.iter().sum();
                free_ratio_sum += free_bytes as f64 / page_size as f64;
                usage_ratio_sum += used_bytes as f64 / page_size as f64;
            }
            sizes.extend(free_sizes);
        }

        let free_blocks = sizes.len();
        let (mean_fragment, fragment_variance) = if free_blocks == 0 {
            (0.0, 0.0)
        } else {
            let n = free_blocks as f64;
            let mean = sizes.iter().map(|&s| s as f64).sum::<f64>() / n;
            let var = sizes.iter().map(|&s| (s as f64 - mean).powi(2)).sum::<f64>() / n;
            (mean, var)
        };
        let pages = page_count.max(1) as f64;

        Self {
            free_blocks,
            mean_fragment,
            fragment_variance,
            mean_free: free_ratio_sum / pages,
            max_free: sizes.iter().copied().max().unwrap_or(0),
            mean_usage: usage_ratio_sum / pages,
        }
    }
}

/// Blocks of one page in offset order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageReport {
    pub index: usize,
    pub size: u64,
    /// Used-table blocks, including lazily freed ones.
    pub used: Vec<BlockExtent>,
    pub free: Vec<BlockExtent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fragmentation: Option<FragmentationStats>,
}

impl PageReport {
    pub fn new(index: usize, size: u64, used: Vec<Block>, free: Vec<Block>) -> Self {
        Self {
            index,
            size,
            used: used.into_iter().map(BlockExtent::from).collect(),
            free: free.into_iter().map(BlockExtent::from).collect(),
            fragmentation: None,
        }
    }

    pub fn used_bytes(&self) -> u64 {
        self.used.iter().map(|b| b.size).sum()
    }

    pub fn free_bytes(&self) -> u64 {
        self.free.iter().map(|b| b.size).sum()
    }
}

/// Snapshot of a pool.
///
/// Fragmentation is only reported while the pool is coherent; with frees
/// pending the free lists do not reflect the reclaimable space.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageReport {
    pub status: CoherencyStatus,
    pub heap: HeapInfo,
    pub pending_frees: usize,
    pub pages: Vec<PageReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fragmentation: Option<FragmentationStats>,
}

impl UsageReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn state_label(state: BlockState) -> &'static str {
    match state {
        BlockState::Used => "used",
        BlockState::Free => "free",
    }
}

fn write_stats(f: &mut fmt::Formatter<'_>, indent: &str, stats: &FragmentationStats) -> fmt::Result {
    writeln!(
        f,
        "{}free blocks: {}  max free: {}  mean fragment: {:.1}  variance: {:.1}",
        indent, stats.free_blocks, stats.max_free, stats.mean_fragment, stats.fragment_variance
    )?;
    writeln!(
        f,
        "{}mean free: {:.1}%  mean usage: {:.1}%",
        indent,
        stats.mean_free * 100.0,
        stats.mean_usage * 100.0
    )
}

impl fmt::Display for UsageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "pool: {}  pages: {}  usage: {} / {} bytes  heap: {} bytes",
            self.status,
            self.pages.len(),
            self.heap.usage,
            self.heap.budget,
            self.heap.size
        )?;
        if self.pending_frees > 0 {
            writeln!(f, "pending frees: {}", self.pending_frees)?;
        }
        for page in &self.pages {
            writeln!(
                f,
                "page {} ({} bytes, {} used, {} free)",
                page.index,
                page.size,
                page.used_bytes(),
                page.free_bytes()
            )?;
            for block in &page.used {
                writeln!(f, "  used-table  @{:<10} {:>10}  {}", block.offset, block.size, state_label(block.state))?;
            }
            for block in &page.free {
                writeln!(f, "  free-table  @{:<10} {:>10}  {}", block.offset, block.size, state_label(block.state))?;
            }
            if let Some(stats) = &page.fragmentation {
                write_stats(f, "  ", stats)?;
            }
        }
        match &self.fragmentation {
            Some(stats) => {
                writeln!(f, "fragmentation:")?;
                write_stats(f, "  ", stats)
            }
            None => writeln!(f, "fragmentation: unavailable until next clean"),
        }
    }
}
