// Copyright 2024-2026 GG-CORE Contributors
// Licensed under the Apache License, Version 2.0

//! GG-DEVMEM: paged device memory sub-allocator.
//!
//! A [`MemPool`] reserves a fixed set of equally sized pages from a
//! [`MemoryDevice`] and hands out aligned blocks with best-fit placement.
//! Frees are lazy and reclaimed by an explicit clean pass, which can also
//! run on a background [`CleanWorker`](memory::CleanWorker).
//!
//! The library emits `tracing` events and `metrics` counters but never
//! installs a subscriber or recorder.

pub mod cli;
pub mod config;
pub mod device;
pub mod memory;

pub use config::{ConfigError, PoolConfig};
pub use device::{DeviceError, HostData, HostMemoryDevice, MemoryDevice, MemoryProperties};
pub use memory::{CoherencyStatus, HeapInfo, MemPool, MemRef, PoolError, UsageReport};
