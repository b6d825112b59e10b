//! Pool maintenance and query operations.

use super::block::Block;
use super::pool_core::MemPool;
use super::pool_types::{BlockRef, CleanSummary, MemRef, PoolError, RefKind};
use super::report::{FragmentationStats, PageReport, UsageReport};
use crate::device::MemoryDevice;

impl<D: MemoryDevice> MemPool<D> {
    /// Reclaim every lazily freed block and coalesce free neighbors.
    ///
    /// All pages are processed even if one of them reports corruption; the
    /// first error is returned and the pool stays incoherent in that case.
    pub fn clean(&mut self) -> Result<CleanSummary, PoolError> {
        let mut summary = CleanSummary::default();
        let mut first_err = None;

        for page in &mut self.pages {
            match page.coalesce() {
                Ok(page_summary) => summary.absorb(page_summary),
                Err(e) => {
                    tracing::error!(page = page.index(), error = %e, "coalescing failed");
                    first_err.get_or_insert(e);
                }
            }
        }

        self.heap.usage = self.heap.usage.saturating_sub(summary.reclaimed_bytes);
        metrics::counter!("gg_devmem_clean_passes_total").increment(1);
        metrics::counter!("gg_devmem_blocks_reclaimed_total").increment(summary.reclaimed as u64);
        metrics::gauge!("gg_devmem_used_bytes").set(self.heap.usage as f64);

        if let Some(e) = first_err {
            return Err(e);
        }
        self.coherency.mark_coherent();

        tracing::debug!(
            reclaimed = summary.reclaimed,
            merged = summary.merged,
            bytes = summary.reclaimed_bytes,
            "clean pass complete"
        );
        Ok(summary)
    }

    /// Clean only if frees are pending.
    pub fn run(&mut self) -> Result<Option<CleanSummary>, PoolError> {
        if self.coherency.is_coherent() {
            return Ok(None);
        }
        self.clean().map(Some)
    }

    /// Return every page to a single free block, keeping its reservation.
    ///
    /// All outstanding [`MemRef`]s become invalid.
    pub fn reset(&mut self) {
        for page in &mut self.pages {
            page.reset_blocks();
        }
        self.heap.usage = 0;
        self.coherency.reset();
        metrics::gauge!("gg_devmem_used_bytes").set(0.0);
        tracing::info!(pages = self.pages.len(), "device memory pool reset");
    }

    /// Release every page's device memory.
    ///
    /// Resources bound to pool memory must no longer be in use. Calling this
    /// twice is a no-op.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        let mut released = 0usize;
        for page in &mut self.pages {
            if let Some(memory) = page.take_memory() {
                self.device.release_device_memory(memory);
                released += 1;
            }
            page.clear();
        }
        self.pages.clear();
        self.heap.usage = 0;
        self.coherency.reset();
        self.destroyed = true;
        tracing::info!(released, "device memory pool destroyed");
    }

    /// Largest free block across all pages as `(page, offset, size)`.
    ///
    /// Lazily freed blocks are not counted until the next clean.
    pub fn largest_free_block(&self) -> Option<(usize, u64, u64)> {
        self.pages
            .iter()
            .filter_map(|p| p.largest_free().map(|(offset, size)| (p.index(), offset, size)))
            .max_by(|a, b| a.2.cmp(&b.2).then(b.0.cmp(&a.0)))
    }

    /// Pool-wide fragmentation, available only while coherent.
    pub fn fragmentation(&self) -> Option<FragmentationStats> {
        if !self.coherency.is_coherent() {
            return None;
        }
        Some(FragmentationStats::from_pages(self.pages.iter().map(|p| {
            (p.size(), p.used_bytes(), p.free_sizes().collect::<Vec<_>>())
        })))
    }

    /// Blocks of every page plus fragmentation stats when coherent.
    pub fn usage_report(&self) -> UsageReport {
        let coherent = self.coherency.is_coherent();
        let pages = self
            .pages
            .iter()
            .map(|page| {
                let mut report = PageReport::new(
                    page.index(),
                    page.size(),
                    page.used_blocks().copied().collect(),
                    page.free_blocks().copied().collect(),
                );
                if coherent {
                    report.fragmentation = Some(FragmentationStats::from_pages(std::iter::once((
                        page.size(),
                        page.used_bytes(),
                        page.free_sizes().collect::<Vec<_>>(),
                    ))));
                }
                report
            })
            .collect();

        UsageReport {
            status: self.coherency.status(),
            heap: self.heap,
            pending_frees: self.pages.iter().map(|p| p.pending_frees()).sum(),
            pages,
            fragmentation: self.fragmentation(),
        }
    }

    /// Weak reference to the block named by `mem_ref`.
    pub fn block_ref(&self, mem_ref: &MemRef) -> Option<BlockRef> {
        let page = self.pages.get(mem_ref.page())?;
        let table = match mem_ref.kind() {
            RefKind::Used => page.used_table(),
            RefKind::Free => page.free_table(),
        };
        table.id_of(mem_ref.key()).map(|block| BlockRef {
            page: mem_ref.page(),
            block,
            kind: mem_ref.kind(),
        })
    }

    /// Resolve a weak reference. A vacated slot is reported as corruption.
    pub fn resolve(&self, block_ref: BlockRef) -> Result<Block, PoolError> {
        let stale = PoolError::CorruptIndex {
            page: block_ref.page,
            offset: 0,
            detail: "stale block reference",
        };
        let page = self.pages.get(block_ref.page).ok_or(PoolError::InvalidRef {
            page: block_ref.page,
            offset: 0,
        })?;
        let table = match block_ref.kind {
            RefKind::Used => page.used_table(),
            RefKind::Free => page.free_table(),
        };
        table.resolve(block_ref.block).copied().ok_or(stale)
    }

    /// Current block named by `mem_ref`, if any.
    pub fn block(&self, mem_ref: &MemRef) -> Option<Block> {
        let page = self.pages.get(mem_ref.page())?;
        let table = match mem_ref.kind() {
            RefKind::Used => page.used_table(),
            RefKind::Free => page.free_table(),
        };
        table.get(mem_ref.key()).copied()
    }

    /// Check block tiling and index agreement on every page.
    pub fn verify(&self) -> Result<(), PoolError> {
        self.pages.iter().try_for_each(|page| page.verify())
    }
}
