// Copyright 2024-2026 GG-CORE Contributors
// Licensed under the Apache License, Version 2.0

//! Background clean worker.
//!
//! Runs [`MemPool::run`] on a named thread, either every `interval` or as
//! soon as [`CleanWorker::trigger`] is called. A pass holds the pool lock for
//! its whole duration and is never interrupted.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use super::pool_core::MemPool;
use super::pool_types::PoolError;
use crate::config::PoolConfig;
use crate::device::MemoryDevice;

/// A pool shared between its owner and a clean worker.
pub type SharedPool<D> = Arc<Mutex<MemPool<D>>>;

/// Wrap a pool for sharing with a [`CleanWorker`].
pub fn shared<D: MemoryDevice>(pool: MemPool<D>) -> SharedPool<D> {
    Arc::new(Mutex::new(pool))
}

/// Clean worker settings.
#[derive(Debug, Clone)]
pub struct CleanWorkerConfig {
    /// Time between passes when nothing triggers one.
    pub interval: Duration,
    pub thread_name: String,
}

impl Default for CleanWorkerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(250),
            thread_name: "gg-devmem-clean".to_string(),
        }
    }
}

impl CleanWorkerConfig {
    pub fn from_pool_config(config: &PoolConfig) -> Self {
        Self {
            interval: config.clean_interval(),
            ..Default::default()
        }
    }
}

struct Signal {
    triggered: Mutex<bool>,
    cvar: Condvar,
}

impl Signal {
    fn notify(&self) {
        let mut triggered = self.triggered.lock();
        *triggered = true;
        self.cvar.notify_all();
    }
}

/// Handle of the background clean thread. Dropping it stops the thread.
pub struct CleanWorker {
    signal: Arc<Signal>,
    shutdown: Arc<AtomicBool>,
    passes: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl CleanWorker {
    pub fn spawn<D>(pool: SharedPool<D>, config: CleanWorkerConfig) -> Result<Self, PoolError>
    where
        D: MemoryDevice + Send + 'static,
        D::Memory: Send,
    {
        let signal = Arc::new(Signal {
            triggered: Mutex::new(false),
            cvar: Condvar::new(),
        });
        let shutdown = Arc::new(AtomicBool::new(false));
        let passes = Arc::new(AtomicU64::new(0));

        let args = WorkerArgs {
            pool,
            signal: signal.clone(),
            shutdown: shutdown.clone(),
            passes: passes.clone(),
            interval: config.interval,
        };
        let handle = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || worker_loop(args))
            .map_err(|e| PoolError::WorkerSpawnFailed(e.to_string()))?;

        tracing::debug!(thread = %config.thread_name, interval_ms = config.interval.as_millis() as u64, "clean worker started");
        Ok(Self {
            signal,
            shutdown,
            passes,
            handle: Some(handle),
        })
    }

    /// Wake the worker for an immediate pass.
    pub fn trigger(&self) {
        self.signal.notify();
    }

    /// Passes that reclaimed at least one block.
    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the worker and wait for the current pass to finish.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.signal.notify();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("clean worker panicked");
            }
        }
    }
}

impl Drop for CleanWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

struct WorkerArgs<D: MemoryDevice> {
    pool: SharedPool<D>,
    signal: Arc<Signal>,
    shutdown: Arc<AtomicBool>,
    passes: Arc<AtomicU64>,
    interval: Duration,
}

fn worker_loop<D: MemoryDevice>(args: WorkerArgs<D>) {
    while !args.shutdown.load(Ordering::SeqCst) {
        {
            let mut triggered = args.signal.triggered.lock();
            if !*triggered {
                let _ = args.signal.cvar.wait_for(&mut triggered, args.interval);
            }
            *triggered = false;
        }
        if args.shutdown.load(Ordering::SeqCst) {
            break;
        }

        match args.pool.lock().run() {
            Ok(Some(summary)) if summary.reclaimed > 0 => {
                args.passes.fetch_add(1, Ordering::SeqCst);
                tracing::debug!(reclaimed = summary.reclaimed, merged = summary.merged, "background clean pass");
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "background clean pass failed"),
        }
    }
    tracing::debug!("clean worker stopped");
}

#[cfg(test)]
#[path = "clean_worker_tests.rs"]
mod tests;
