//! Tests for the background clean worker.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::*;
use crate::device::HostMemoryDevice;
use crate::memory::CoherencyStatus;

fn shared_pool() -> SharedPool<Arc<HostMemoryDevice>> {
    let device = Arc::new(HostMemoryDevice::new(1 << 20, 1));
    let config = PoolConfig {
        pool_size: 4096,
        page_count: 1,
        ..Default::default()
    };
    shared(MemPool::new(device, &config).unwrap())
}

fn wait_for(mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

fn slow_worker_config() -> CleanWorkerConfig {
    CleanWorkerConfig {
        interval: Duration::from_secs(3600),
        thread_name: "clean-test".to_string(),
    }
}

#[test]
fn test_trigger_reclaims_lazy_frees() {
    let pool = shared_pool();
    let worker = CleanWorker::spawn(pool.clone(), slow_worker_config()).unwrap();

    {
        let mut p = pool.lock();
        let a = p.allocate(1024, 1).unwrap();
        let b = p.allocate(1024, 1).unwrap();
        p.free(a).unwrap();
        p.free(b).unwrap();
        assert_eq!(p.status(), CoherencyStatus::Incoherent);
    }

    worker.trigger();
    assert!(wait_for(|| worker.passes() == 1));

    let p = pool.lock();
    assert_eq!(p.status(), CoherencyStatus::Coherent);
    assert_eq!(p.largest_free_block(), Some((0, 0, 4096)));
    p.verify().unwrap();
}

#[test]
fn test_interval_pass_without_trigger() {
    let pool = shared_pool();
    {
        let mut p = pool.lock();
        let r = p.allocate(64, 1).unwrap();
        p.free(r).unwrap();
    }

    let config = CleanWorkerConfig {
        interval: Duration::from_millis(10),
        ..Default::default()
    };
    let worker = CleanWorker::spawn(pool.clone(), config).unwrap();
    assert!(wait_for(|| pool.lock().status() == CoherencyStatus::Coherent));
    worker.shutdown();
}

#[test]
fn test_coherent_pool_does_not_count_passes() {
    let pool = shared_pool();
    let worker = CleanWorker::spawn(pool.clone(), slow_worker_config()).unwrap();

    worker.trigger();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(worker.passes(), 0);
    assert_eq!(pool.lock().coherency().passes(), 0);
}

#[test]
fn test_shutdown_joins_thread() {
    let pool = shared_pool();
    let worker = CleanWorker::spawn(pool.clone(), slow_worker_config()).unwrap();
    assert!(worker.is_running());

    worker.shutdown();
    // The worker no longer holds a pool handle.
    assert!(wait_for(|| Arc::strong_count(&pool) == 1));
}

#[test]
fn test_config_from_pool_config() {
    let config = PoolConfig {
        clean_interval_ms: 40,
        ..Default::default()
    };
    let worker_config = CleanWorkerConfig::from_pool_config(&config);
    assert_eq!(worker_config.interval, Duration::from_millis(40));
    assert_eq!(worker_config.thread_name, "gg-devmem-clean");
}
