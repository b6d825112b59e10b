// Copyright 2024-2026 GG-CORE Contributors
// Licensed under the Apache License, Version 2.0

//! Pool construction, allocation, lazy free and bind.

use super::coherency::{CoherencyMonitor, CoherencyStatus};
use super::page::Page;
use super::pool_types::{HeapInfo, MemRef, PoolError, RefKind};
use crate::config::PoolConfig;
use crate::device::{DeviceError, HostData, MemoryDevice};

/// Smallest alignment that satisfies both `min_align` and the pool granularity.
pub fn effective_alignment(min_align: u64, granularity: u64) -> Option<u64> {
    let a = min_align.max(1);
    let g = granularity.max(1);
    (a / gcd(a, g)).checked_mul(g)
}

/// Round `size` up to a multiple of `align`. Requests smaller than `align`
/// get exactly `align` bytes.
pub fn aligned_size(size: u64, align: u64) -> Option<u64> {
    let align = align.max(1);
    if size < align {
        return Some(align);
    }
    size.div_ceil(align).checked_mul(align)
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Fixed-capacity pool of device memory pages.
///
/// All operations are synchronous and take `&mut self`: a pool has a single
/// writer. Share it behind a [`SharedPool`](super::SharedPool) to run clean
/// passes from a background worker.
pub struct MemPool<D: MemoryDevice> {
    pub(super) device: D,
    pub(super) memory_type: u32,
    pub(super) pages: Vec<Page<D::Memory>>,
    pub(super) alignment: u64,
    pub(super) page_size: u64,
    pub(super) heap: HeapInfo,
    pub(super) coherency: CoherencyMonitor,
    pub(super) destroyed: bool,
}

impl<D: MemoryDevice> MemPool<D> {
    /// Reserve every page of the pool up front.
    ///
    /// Fails with `ConstructionFailed` if the configuration is invalid, no
    /// memory type matches, the pool does not fit in the heap, or any page
    /// reservation fails. Pages reserved before a failure are released.
    pub fn new(device: D, config: &PoolConfig) -> Result<Self, PoolError> {
        config
            .validate()
            .map_err(|e| PoolError::ConstructionFailed(e.to_string()))?;

        let memory_type = device
            .query_memory_type(config.memory_properties)
            .map_err(|e| PoolError::ConstructionFailed(format!("memory type selection: {}", e)))?;
        let heap_size = device
            .query_heap_size(memory_type)
            .map_err(|e| PoolError::ConstructionFailed(format!("heap query: {}", e)))?;

        if config.pool_size > heap_size {
            return Err(PoolError::ConstructionFailed(format!(
                "requested pool size {} exceeds heap size {}",
                config.pool_size, heap_size
            )));
        }

        let page_size = config.page_size();
        let alignment = config
            .alignment
            .unwrap_or_else(|| device.buffer_image_granularity())
            .max(1);

        let mut pages: Vec<Page<D::Memory>> = Vec::with_capacity(config.page_count);
        for index in 0..config.page_count {
            match device.reserve_device_memory(page_size, memory_type) {
                Ok(memory) => pages.push(Page::new(index, page_size, memory)),
                Err(e) => {
                    tracing::warn!(
                        page = index,
                        error = %e,
                        reserved = pages.len(),
                        "page reservation failed, releasing reserved pages"
                    );
                    for page in &mut pages {
                        if let Some(memory) = page.take_memory() {
                            device.release_device_memory(memory);
                        }
                    }
                    return Err(PoolError::ConstructionFailed(format!(
                        "page {} reservation failed: {}",
                        index, e
                    )));
                }
            }
        }

        tracing::info!(
            memory_type,
            pages = config.page_count,
            page_size,
            alignment,
            heap_size,
            "device memory pool created"
        );

        Ok(Self {
            device,
            memory_type,
            pages,
            alignment,
            page_size,
            heap: HeapInfo {
                size: heap_size,
                budget: page_size * config.page_count as u64,
                usage: 0,
            },
            coherency: CoherencyMonitor::new(),
            destroyed: false,
        })
    }

    /// Allocate `size` bytes aligned to `min_align`.
    ///
    /// Pages are scanned in index order; the first page whose free index has
    /// a fitting block wins, and within it the smallest fitting block is used.
    pub fn allocate(&mut self, size: u64, min_align: u64) -> Result<MemRef, PoolError> {
        let aligned = effective_alignment(min_align, self.alignment)
            .and_then(|align| aligned_size(size, align))
            .ok_or(PoolError::OutOfPoolMemory { requested: size })?;

        let hit = self
            .pages
            .iter()
            .find_map(|page| page.best_fit(aligned).map(|(offset, _)| (page.index(), offset)));

        let Some((page_index, offset)) = hit else {
            tracing::warn!(size, aligned, status = %self.coherency.status(), "allocation failed: out of pool memory");
            metrics::counter!("gg_devmem_allocation_failures_total").increment(1);
            return Err(PoolError::OutOfPoolMemory { requested: aligned });
        };

        let block = self
            .pages
            .get_mut(page_index)
            .ok_or(PoolError::CorruptIndex {
                page: page_index,
                offset,
                detail: "page vanished during allocation",
            })?
            .split(offset, aligned)?;
        self.heap.usage += block.size;

        tracing::debug!(page = page_index, offset = block.offset, size, aligned, "allocated block");
        metrics::counter!("gg_devmem_allocations_total").increment(1);
        metrics::gauge!("gg_devmem_used_bytes").set(self.heap.usage as f64);

        Ok(MemRef::new(block.offset, page_index, RefKind::Used))
    }

    /// Lazily free an allocation.
    ///
    /// Only flips the block's state; the bytes return to the free index on
    /// the next [`clean`](Self::clean). The pool becomes incoherent.
    pub fn free(&mut self, mem_ref: MemRef) -> Result<(), PoolError> {
        let invalid = PoolError::InvalidRef {
            page: mem_ref.page(),
            offset: mem_ref.key(),
        };
        if mem_ref.kind() != RefKind::Used {
            return Err(invalid);
        }
        let page = self.pages.get_mut(mem_ref.page()).ok_or(invalid)?;
        let block = page.mark_free(mem_ref.key())?;
        self.coherency.note_free();

        tracing::debug!(page = mem_ref.page(), offset = block.offset, size = block.size, "block marked free");
        metrics::counter!("gg_devmem_frees_total").increment(1);
        Ok(())
    }

    /// Bind `resource` to the allocation and copy `data` into it.
    ///
    /// Does not touch the block indices.
    pub fn bind(&self, mem_ref: MemRef, resource: &D::Resource, data: HostData<'_>) -> Result<(), PoolError> {
        let invalid = PoolError::InvalidRef {
            page: mem_ref.page(),
            offset: mem_ref.key(),
        };
        if mem_ref.kind() != RefKind::Used {
            return Err(invalid);
        }
        let page = self.pages.get(mem_ref.page()).ok_or(PoolError::InvalidRef {
            page: mem_ref.page(),
            offset: mem_ref.key(),
        })?;
        let block = match page.used_table().get(mem_ref.key()) {
            Some(block) if !block.is_free() => *block,
            _ => return Err(invalid),
        };
        let memory = page.memory().ok_or(invalid)?;

        let bytes = data.to_bytes();
        let len = bytes.len() as u64;
        if len > block.size {
            return Err(PoolError::MapFailed(DeviceError::RegionOutOfBounds {
                offset: block.offset,
                size: len,
                memory_size: block.size,
            }));
        }

        self.device
            .bind_resource(resource, memory, block.offset)
            .map_err(|e| {
                tracing::warn!(page = mem_ref.page(), offset = block.offset, error = %e, "resource bind failed");
                PoolError::BindFailed(e)
            })?;
        self.device
            .map_copy_unmap(memory, block.offset, block.size, &bytes)
            .map_err(|e| {
                tracing::warn!(page = mem_ref.page(), offset = block.offset, error = %e, "memory map failed");
                PoolError::MapFailed(e)
            })?;

        tracing::debug!(
            page = mem_ref.page(),
            offset = block.offset,
            bytes = len,
            kind = %data.kind(),
            "bound host data"
        );
        Ok(())
    }

    pub fn status(&self) -> CoherencyStatus {
        self.coherency.status()
    }

    pub fn coherency(&self) -> &CoherencyMonitor {
        &self.coherency
    }

    pub fn heap(&self) -> HeapInfo {
        self.heap
    }

    pub fn alignment(&self) -> u64 {
        self.alignment
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn memory_type(&self) -> u32 {
        self.memory_type
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Device memory backing `page`.
    pub fn page_memory(&self, page: usize) -> Option<&D::Memory> {
        self.pages.get(page).and_then(|p| p.memory())
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

impl<D: MemoryDevice> Drop for MemPool<D> {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl<D: MemoryDevice> std::fmt::Debug for MemPool<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemPool")
            .field("memory_type", &self.memory_type)
            .field("pages", &self.pages.len())
            .field("page_size", &self.page_size)
            .field("alignment", &self.alignment)
            .field("heap", &self.heap)
            .field("status", &self.coherency.status())
            .field("destroyed", &self.destroyed)
            .finish()
    }
}
