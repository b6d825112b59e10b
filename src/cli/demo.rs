// Copyright 2024-2026 GG-CORE Contributors
// Licensed under the Apache License, Version 2.0

//! `demo` command: exercise a pool on the host device and print reports.

use serde::Serialize;

use super::report_format::{render_clean_summary, render_report};
use crate::config::PoolConfig;
use crate::device::{HostData, HostMemoryDevice, HostResource};
use crate::memory::{CleanSummary, MemPool, PoolError, UsageReport};

/// Allocation sizes used when none are given.
pub const DEFAULT_SIZES: &[u64] = &[256, 1000, 4096, 64, 70_000, 512, 3000, 128];

/// Host device granularity used by the demo.
pub const DEMO_GRANULARITY: u64 = 256;

/// Reports captured around the clean pass.
#[derive(Debug, Clone, Serialize)]
pub struct DemoOutcome {
    pub allocated: usize,
    pub freed: usize,
    pub before: UsageReport,
    pub clean: CleanSummary,
    pub after: UsageReport,
}

/// Parse a comma separated size list such as `64,1024,4096`.
pub fn parse_sizes(text: &str) -> Result<Vec<u64>, String> {
    let sizes: Vec<u64> = text
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<u64>().map_err(|_| format!("invalid size: {:?}", s)))
        .collect::<Result<_, _>>()?;
    if sizes.is_empty() {
        return Err("size list is empty".to_string());
    }
    Ok(sizes)
}

/// Allocate `sizes`, bind a payload to each block, free every other block,
/// then clean.
pub fn run_scenario(config: &PoolConfig, sizes: &[u64]) -> Result<DemoOutcome, PoolError> {
    let device = HostMemoryDevice::new(config.pool_size, DEMO_GRANULARITY);
    let mut pool = MemPool::new(device, config)?;

    let mut refs = Vec::with_capacity(sizes.len());
    for (i, &size) in sizes.iter().enumerate() {
        let mem_ref = pool.allocate(size, 1)?;
        let payload = vec![(i % 251) as u8; size.min(64) as usize];
        pool.bind(mem_ref, &HostResource(i as u64), HostData::Bytes(&payload))?;
        refs.push(mem_ref);
    }

    let mut freed = 0;
    for mem_ref in refs.iter().step_by(2) {
        pool.free(*mem_ref)?;
        freed += 1;
    }

    let before = pool.usage_report();
    let clean = pool.clean()?;
    let after = pool.usage_report();
    pool.verify()?;

    Ok(DemoOutcome {
        allocated: refs.len(),
        freed,
        before,
        clean,
        after,
    })
}

/// Run the demo and print its reports. Returns the process exit code.
pub fn run_demo(config: &PoolConfig, sizes: &[u64], json: bool) -> i32 {
    let outcome = match run_scenario(config, sizes) {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("Demo failed: {}", e);
            return 1;
        }
    };

    if json {
        match serde_json::to_string_pretty(&outcome) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Failed to serialize report: {}", e);
                return 1;
            }
        }
    } else {
        println!("Allocated {} blocks, freed {}", outcome.allocated, outcome.freed);
        println!();
        print!("{}", render_report("GG-DEVMEM Pool (before clean)", &outcome.before));
        println!();
        println!("{}", render_clean_summary(&outcome.clean));
        println!();
        print!("{}", render_report("GG-DEVMEM Pool (after clean)", &outcome.after));
    }
    0
}
