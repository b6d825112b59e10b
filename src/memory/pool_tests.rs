//! Tests for the device memory pool.

use super::*;
use crate::config::PoolConfig;
use crate::device::{DeviceError, HostData, HostMemoryDevice, HostResource, MemoryProperties};
use crate::memory::CoherencyStatus;

fn config(pool_size: u64, page_count: usize) -> PoolConfig {
    PoolConfig {
        pool_size,
        page_count,
        ..Default::default()
    }
}

fn pool(device: &HostMemoryDevice, pool_size: u64, page_count: usize) -> MemPool<&HostMemoryDevice> {
    MemPool::new(device, &config(pool_size, page_count)).unwrap()
}

fn free_extents<D: crate::device::MemoryDevice>(pool: &MemPool<D>, page: usize) -> Vec<(u64, u64)> {
    pool.usage_report().pages[page]
        .free
        .iter()
        .map(|b| (b.offset, b.size))
        .collect()
}

#[test]
fn test_alignment_helpers() {
    assert_eq!(effective_alignment(6, 4), Some(12));
    assert_eq!(effective_alignment(0, 16), Some(16));
    assert_eq!(effective_alignment(64, 16), Some(64));
    assert_eq!(aligned_size(0, 8), Some(8));
    assert_eq!(aligned_size(17, 8), Some(24));
    assert_eq!(aligned_size(24, 8), Some(24));
    assert_eq!(aligned_size(u64::MAX, 2), None);
}

#[test]
fn test_new_pool_layout() {
    let device = HostMemoryDevice::new(1 << 20, 16);
    let pool = pool(&device, 4096, 4);

    assert_eq!(pool.page_count(), 4);
    assert_eq!(pool.page_size(), 1024);
    assert_eq!(pool.alignment(), 16);
    assert_eq!(pool.status(), CoherencyStatus::Coherent);
    assert_eq!(pool.heap(), HeapInfo { size: 1 << 20, budget: 4096, usage: 0 });
    assert_eq!(device.live_reservations(), 4);
    pool.verify().unwrap();
}

#[test]
fn test_alignment_override() {
    let device = HostMemoryDevice::new(1 << 20, 16);
    let cfg = PoolConfig { alignment: Some(256), ..config(4096, 1) };
    let mut pool = MemPool::new(&device, &cfg).unwrap();

    let r = pool.allocate(1, 1).unwrap();
    assert_eq!(pool.block(&r).unwrap().size, 256);
}

#[test]
fn test_best_fit_picks_smallest_sufficient_block() {
    let device = HostMemoryDevice::new(1 << 20, 1);
    let mut pool = pool(&device, 2048, 1);

    let refs: Vec<MemRef> = [64, 8, 256, 8, 1024, 688]
        .iter()
        .map(|&size| pool.allocate(size, 1).unwrap())
        .collect();
    for i in [0, 2, 4] {
        pool.free(refs[i]).unwrap();
    }
    pool.clean().unwrap();
    assert_eq!(free_extents(&pool, 0), vec![(0, 64), (72, 256), (336, 1024)]);

    let r = pool.allocate(100, 1).unwrap();
    assert_eq!(r.key(), 72);
    assert_eq!(free_extents(&pool, 0), vec![(0, 64), (172, 156), (336, 1024)]);
    pool.verify().unwrap();
}

#[test]
fn test_alignment_grid() {
    let device = HostMemoryDevice::new(1 << 20, 1);
    let mut pool = pool(&device, 1 << 20, 1);

    for size in [1u64, 7, 64, 100, 255] {
        for align in [1u64, 4, 16, 64, 256] {
            let r = pool.allocate(size, align).unwrap();
            let block = pool.block(&r).unwrap();
            assert!(block.size >= size, "size {} align {}", size, align);
            assert!(block.size >= align, "size {} align {}", size, align);
            assert_eq!(block.size % align, 0, "size {} align {}", size, align);
        }
    }
    pool.verify().unwrap();
}

#[test]
fn test_coalescing_adjacent_frees() {
    let device = HostMemoryDevice::new(1 << 20, 1);
    let mut pool = pool(&device, 1024, 1);

    let a = pool.allocate(100, 1).unwrap();
    let b = pool.allocate(150, 1).unwrap();
    let _c = pool.allocate(50, 1).unwrap();
    assert_eq!((a.key(), b.key()), (0, 100));

    pool.free(a).unwrap();
    pool.free(b).unwrap();
    assert_eq!(pool.status(), CoherencyStatus::Incoherent);

    let summary = pool.clean().unwrap();
    assert_eq!(summary.reclaimed, 2);
    assert_eq!(free_extents(&pool, 0), vec![(0, 250), (300, 724)]);
    assert_eq!(pool.status(), CoherencyStatus::Coherent);
    pool.verify().unwrap();
}

#[test]
fn test_exhaustion_is_clean_failure() {
    let device = HostMemoryDevice::new(1 << 20, 1);
    let mut pool = pool(&device, 1024, 1);

    pool.allocate(1024, 1).unwrap();
    let err = pool.allocate(1, 1).unwrap_err();
    assert!(matches!(err, PoolError::OutOfPoolMemory { requested: 1 }));
    assert!(err.is_recoverable());
    assert_eq!(pool.heap().usage, 1024);
    pool.verify().unwrap();
}

#[test]
fn test_lazy_free_needs_clean_before_reuse() {
    let device = HostMemoryDevice::new(1 << 20, 1);
    let mut pool = pool(&device, 512, 1);

    let r = pool.allocate(512, 1).unwrap();
    pool.free(r).unwrap();
    assert!(matches!(pool.allocate(512, 1), Err(PoolError::OutOfPoolMemory { .. })));
    assert_eq!(pool.heap().usage, 512);

    pool.clean().unwrap();
    assert_eq!(pool.heap().usage, 0);
    pool.allocate(512, 1).unwrap();
}

#[test]
fn test_oversized_request_overflow() {
    let device = HostMemoryDevice::new(1 << 20, 2);
    let mut pool = pool(&device, 1024, 1);
    assert!(matches!(
        pool.allocate(u64::MAX, 1),
        Err(PoolError::OutOfPoolMemory { requested: u64::MAX })
    ));
}

#[test]
fn test_pages_fill_in_index_order() {
    let device = HostMemoryDevice::new(1 << 20, 1);
    let mut pool = pool(&device, 1024, 2);

    let first = pool.allocate(512, 1).unwrap();
    let second = pool.allocate(100, 1).unwrap();
    assert_eq!(first.page(), 0);
    assert_eq!(second.page(), 1);
    assert_eq!(pool.largest_free_block(), Some((1, 100, 412)));
}

#[test]
fn test_clean_is_idempotent() {
    let device = HostMemoryDevice::new(1 << 20, 8);
    let mut pool = pool(&device, 4096, 2);

    let refs: Vec<MemRef> = (1..=6).map(|i| pool.allocate(i * 40, 1).unwrap()).collect();
    pool.free(refs[1]).unwrap();
    pool.free(refs[4]).unwrap();

    pool.clean().unwrap();
    let first = pool.usage_report();
    let summary = pool.clean().unwrap();
    assert_eq!(summary, CleanSummary::default());
    assert_eq!(pool.usage_report(), first);
}

#[test]
fn test_run_only_cleans_when_incoherent() {
    let device = HostMemoryDevice::new(1 << 20, 1);
    let mut pool = pool(&device, 1024, 1);

    assert_eq!(pool.run().unwrap(), None);
    let r = pool.allocate(64, 1).unwrap();
    pool.free(r).unwrap();
    let summary = pool.run().unwrap().unwrap();
    assert_eq!(summary.reclaimed, 1);
    assert_eq!(pool.coherency().passes(), 1);
    assert_eq!(pool.run().unwrap(), None);
}

#[test]
fn test_free_errors() {
    let device = HostMemoryDevice::new(1 << 20, 1);
    let mut pool = pool(&device, 1024, 1);
    let r = pool.allocate(64, 1).unwrap();

    let free_kind = MemRef::new(r.key(), r.page(), RefKind::Free);
    assert!(matches!(pool.free(free_kind), Err(PoolError::InvalidRef { .. })));
    assert!(matches!(
        pool.free(MemRef::new(0, 9, RefKind::Used)),
        Err(PoolError::InvalidRef { page: 9, .. })
    ));

    pool.free(r).unwrap();
    assert!(matches!(pool.free(r), Err(PoolError::AlreadyFreed { offset: 0, .. })));
}

#[test]
fn test_construction_failure_releases_pages() {
    let device = HostMemoryDevice::new(1 << 20, 1);
    device.fail_reservation_at(2);

    let err = MemPool::new(&device, &config(4096, 4)).unwrap_err();
    assert!(matches!(err, PoolError::ConstructionFailed(_)));
    assert_eq!(device.live_reservations(), 0);
}

#[test]
fn test_construction_rejects_small_heap() {
    let device = HostMemoryDevice::new(4096, 1);
    let err = MemPool::new(&device, &config(8192, 2)).unwrap_err();
    assert!(matches!(err, PoolError::ConstructionFailed(_)));
    assert_eq!(device.live_reservations(), 0);
}

#[test]
fn test_construction_without_matching_memory_type() {
    let device = HostMemoryDevice::new(1 << 20, 1);
    let cfg = PoolConfig {
        memory_properties: MemoryProperties::DEVICE_LOCAL,
        ..config(4096, 1)
    };
    assert!(matches!(MemPool::new(&device, &cfg), Err(PoolError::ConstructionFailed(_))));
}

#[test]
fn test_construction_rejects_invalid_config() {
    let device = HostMemoryDevice::new(1 << 20, 1);
    assert!(matches!(MemPool::new(&device, &config(4096, 0)), Err(PoolError::ConstructionFailed(_))));
}

#[test]
fn test_bind_copies_bytes_at_block_offset() {
    let device = HostMemoryDevice::new(1 << 20, 4);
    let mut pool = pool(&device, 1024, 1);

    pool.allocate(10, 1).unwrap();
    let r = pool.allocate(8, 1).unwrap();
    assert_eq!(r.key(), 12);

    let payload = [1u8, 2, 3, 4, 5, 6, 7, 8];
    pool.bind(r, &HostResource(7), HostData::Bytes(&payload)).unwrap();

    let memory = pool.page_memory(0).unwrap();
    assert_eq!(device.read(memory, 12, 8).unwrap(), payload.to_vec());
    assert_eq!(device.binding(HostResource(7)), Some((memory.id(), 12)));
}

#[test]
fn test_bind_float_payload() {
    let device = HostMemoryDevice::new(1 << 20, 4);
    let mut pool = pool(&device, 1024, 1);
    let r = pool.allocate(8, 1).unwrap();

    pool.bind(r, &HostResource(1), HostData::Float32(&[1.5, -2.0])).unwrap();

    let mut expected = 1.5f32.to_ne_bytes().to_vec();
    expected.extend_from_slice(&(-2.0f32).to_ne_bytes());
    let memory = pool.page_memory(0).unwrap();
    assert_eq!(device.read(memory, 0, 8).unwrap(), expected);
}

#[test]
fn test_bind_failures() {
    let device = HostMemoryDevice::new(1 << 20, 4);
    let mut pool = pool(&device, 1024, 1);
    let r = pool.allocate(8, 1).unwrap();
    let data = [0u8; 8];

    device.fail_next_bind();
    assert!(matches!(
        pool.bind(r, &HostResource(1), HostData::Bytes(&data)),
        Err(PoolError::BindFailed(DeviceError::BindRejected(_)))
    ));

    device.fail_next_map();
    assert!(matches!(
        pool.bind(r, &HostResource(1), HostData::Bytes(&data)),
        Err(PoolError::MapFailed(DeviceError::MapRejected(_)))
    ));

    let too_big = [0u8; 16];
    assert!(matches!(
        pool.bind(r, &HostResource(1), HostData::Bytes(&too_big)),
        Err(PoolError::MapFailed(DeviceError::RegionOutOfBounds { .. }))
    ));

    // Failed binds leave the indices alone.
    pool.verify().unwrap();
    assert_eq!(pool.block(&r).unwrap().size, 8);
}

#[test]
fn test_bind_freed_block_is_invalid() {
    let device = HostMemoryDevice::new(1 << 20, 1);
    let mut pool = pool(&device, 1024, 1);
    let r = pool.allocate(8, 1).unwrap();
    pool.free(r).unwrap();

    assert!(matches!(
        pool.bind(r, &HostResource(1), HostData::Int32(&[1, 2])),
        Err(PoolError::InvalidRef { .. })
    ));
}

#[test]
fn test_destroy_is_idempotent() {
    let device = HostMemoryDevice::new(1 << 20, 1);
    let mut pool = pool(&device, 4096, 4);
    pool.allocate(64, 1).unwrap();

    pool.destroy();
    assert!(pool.is_destroyed());
    assert_eq!(device.live_reservations(), 0);
    pool.destroy();
    assert_eq!(device.live_reservations(), 0);

    assert!(matches!(pool.allocate(1, 1), Err(PoolError::OutOfPoolMemory { .. })));
}

#[test]
fn test_drop_releases_pages() {
    let device = HostMemoryDevice::new(1 << 20, 1);
    {
        let _pool = pool(&device, 4096, 2);
        assert_eq!(device.live_reservations(), 2);
    }
    assert_eq!(device.live_reservations(), 0);
}

#[test]
fn test_reset_restores_single_free_block() {
    let device = HostMemoryDevice::new(1 << 20, 1);
    let mut pool = pool(&device, 2048, 2);
    for _ in 0..5 {
        pool.allocate(100, 1).unwrap();
    }
    let r = pool.allocate(100, 1).unwrap();
    pool.free(r).unwrap();

    pool.reset();
    assert_eq!(pool.status(), CoherencyStatus::Coherent);
    assert_eq!(pool.heap().usage, 0);
    assert_eq!(free_extents(&pool, 0), vec![(0, 1024)]);
    assert_eq!(free_extents(&pool, 1), vec![(0, 1024)]);
    assert_eq!(device.live_reservations(), 2);
    assert!(pool.block(&r).is_none());
}

#[test]
fn test_stale_block_ref() {
    let device = HostMemoryDevice::new(1 << 20, 1);
    let mut pool = pool(&device, 1024, 1);
    let r = pool.allocate(64, 1).unwrap();

    let block_ref = pool.block_ref(&r).unwrap();
    assert_eq!(pool.resolve(block_ref).unwrap().size, 64);

    pool.free(r).unwrap();
    pool.clean().unwrap();
    assert!(matches!(
        pool.resolve(block_ref),
        Err(PoolError::CorruptIndex { detail: "stale block reference", .. })
    ));
}

#[test]
fn test_usage_report_fragmentation_only_when_coherent() {
    let device = HostMemoryDevice::new(1 << 20, 1);
    let mut pool = pool(&device, 1000, 1);
    let a = pool.allocate(100, 1).unwrap();
    pool.allocate(100, 1).unwrap();

    pool.free(a).unwrap();
    let report = pool.usage_report();
    assert_eq!(report.status, CoherencyStatus::Incoherent);
    assert_eq!(report.pending_frees, 1);
    assert!(report.fragmentation.is_none());
    assert!(report.pages[0].fragmentation.is_none());
    assert!(pool.fragmentation().is_none());

    pool.clean().unwrap();
    let report = pool.usage_report();
    let stats = report.fragmentation.unwrap();
    assert_eq!(stats.free_blocks, 2);
    assert_eq!(stats.max_free, 800);
    assert!((stats.mean_free - 0.9).abs() < 1e-9);
    assert!((stats.mean_usage - 0.1).abs() < 1e-9);
    assert_eq!(report.pages[0].fragmentation, Some(stats));
}
