// Copyright 2024-2026 GG-CORE Contributors
// Licensed under the Apache License, Version 2.0

//! Host-memory device.
//!
//! A [`MemoryDevice`] backed by plain host RAM. Used when no native device is
//! available (tests, benches, the diagnostics CLI). Reservations are byte
//! vectors, bindings are recorded so callers can check where a resource
//! landed, and reservation/bind/map failures can be injected.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::memory_device::{
    find_memory_type, DeviceError, MemoryDevice, MemoryProperties, MemoryType,
};

/// Handle of one host reservation.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct HostMemory {
    id: u64,
    size: u64,
}

impl HostMemory {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

/// Caller-owned resource handle for the host device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostResource(pub u64);

#[derive(Debug, Default)]
struct HostState {
    next_id: u64,
    reservations: usize,
    allocations: HashMap<u64, Vec<u8>>,
    bindings: HashMap<HostResource, (u64, u64)>,
    fail_reservation_at: Option<usize>,
    fail_next_bind: bool,
    fail_next_map: bool,
}

/// Host RAM pretending to be a device.
#[derive(Debug)]
pub struct HostMemoryDevice {
    memory_types: Vec<MemoryType>,
    heaps: Vec<u64>,
    granularity: u64,
    state: Mutex<HostState>,
}

impl HostMemoryDevice {
    /// Create a device with one heap of `heap_size` bytes and a single
    /// host-visible, host-coherent memory type.
    pub fn new(heap_size: u64, granularity: u64) -> Self {
        Self::with_memory_types(
            vec![MemoryType {
                properties: MemoryProperties::HOST_VISIBLE | MemoryProperties::HOST_COHERENT,
                heap_index: 0,
            }],
            vec![heap_size],
            granularity,
        )
    }

    /// Create a device with an explicit memory type table and heaps.
    pub fn with_memory_types(memory_types: Vec<MemoryType>, heaps: Vec<u64>, granularity: u64) -> Self {
        Self {
            memory_types,
            heaps,
            granularity: granularity.max(1),
            state: Mutex::new(HostState::default()),
        }
    }

    /// Make the `n`-th reservation from now (0-based) fail.
    pub fn fail_reservation_at(&self, n: usize) {
        let mut state = self.state.lock();
        state.fail_reservation_at = Some(state.reservations + n);
    }

    /// Make the next bind call fail.
    pub fn fail_next_bind(&self) {
        self.state.lock().fail_next_bind = true;
    }

    /// Make the next map call fail.
    pub fn fail_next_map(&self) {
        self.state.lock().fail_next_map = true;
    }

    /// Number of reservations not yet released.
    pub fn live_reservations(&self) -> usize {
        self.state.lock().allocations.len()
    }

    /// Memory id and offset a resource was bound to.
    pub fn binding(&self, resource: HostResource) -> Option<(u64, u64)> {
        self.state.lock().bindings.get(&resource).copied()
    }

    /// Copy `len` bytes out of a reservation.
    pub fn read(&self, memory: &HostMemory, offset: u64, len: u64) -> Option<Vec<u8>> {
        let state = self.state.lock();
        let bytes = state.allocations.get(&memory.id)?;
        let start = usize::try_from(offset).ok()?;
        let end = start.checked_add(usize::try_from(len).ok()?)?;
        bytes.get(start..end).map(<[u8]>::to_vec)
    }

    fn check_region(memory: &HostMemory, offset: u64, size: u64) -> Result<(), DeviceError> {
        match offset.checked_add(size) {
            Some(end) if end <= memory.size => Ok(()),
            _ => Err(DeviceError::RegionOutOfBounds {
                offset,
                size,
                memory_size: memory.size,
            }),
        }
    }
}

impl MemoryDevice for HostMemoryDevice {
    type Memory = HostMemory;
    type Resource = HostResource;

    fn query_memory_type(&self, required: MemoryProperties) -> Result<u32, DeviceError> {
        find_memory_type(&self.memory_types, required)
            .ok_or(DeviceError::NoSuitableMemoryType { required })
    }

    fn query_heap_size(&self, memory_type: u32) -> Result<u64, DeviceError> {
        let ty = self
            .memory_types
            .get(memory_type as usize)
            .ok_or(DeviceError::UnknownMemoryType(memory_type))?;
        self.heaps
            .get(ty.heap_index as usize)
            .copied()
            .ok_or(DeviceError::UnknownMemoryType(memory_type))
    }

    fn buffer_image_granularity(&self) -> u64 {
        self.granularity
    }

    fn reserve_device_memory(&self, size: u64, memory_type: u32) -> Result<HostMemory, DeviceError> {
        let heap_size = self.query_heap_size(memory_type)?;
        let mut state = self.state.lock();
        let attempt = state.reservations;
        state.reservations += 1;
        if state.fail_reservation_at == Some(attempt) {
            state.fail_reservation_at = None;
            return Err(DeviceError::OutOfDeviceMemory { requested: size });
        }

        let in_use: u64 = state.allocations.values().map(|b| b.len() as u64).sum();
        if in_use.saturating_add(size) > heap_size {
            return Err(DeviceError::OutOfDeviceMemory { requested: size });
        }
        let len = usize::try_from(size).map_err(|_| DeviceError::OutOfDeviceMemory { requested: size })?;

        let id = state.next_id;
        state.next_id += 1;
        state.allocations.insert(id, vec![0u8; len]);
        Ok(HostMemory { id, size })
    }

    fn bind_resource(
        &self,
        resource: &HostResource,
        memory: &HostMemory,
        offset: u64,
    ) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        if std::mem::take(&mut state.fail_next_bind) {
            return Err(DeviceError::BindRejected(format!("injected failure for {:?}", resource)));
        }
        if !state.allocations.contains_key(&memory.id) {
            return Err(DeviceError::UnknownMemory);
        }
        Self::check_region(memory, offset, 0)?;
        state.bindings.insert(*resource, (memory.id, offset));
        Ok(())
    }

    fn map_copy_unmap(
        &self,
        memory: &HostMemory,
        offset: u64,
        size: u64,
        bytes: &[u8],
    ) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        if std::mem::take(&mut state.fail_next_map) {
            return Err(DeviceError::MapRejected("injected failure".to_string()));
        }
        Self::check_region(memory, offset, size)?;
        if bytes.len() as u64 > size {
            return Err(DeviceError::RegionOutOfBounds {
                offset,
                size: bytes.len() as u64,
                memory_size: size,
            });
        }
        let target = state
            .allocations
            .get_mut(&memory.id)
            .ok_or(DeviceError::UnknownMemory)?;
        let start = offset as usize;
        if let Some(dst) = target.get_mut(start..start + bytes.len()) {
            dst.copy_from_slice(bytes);
        }
        Ok(())
    }

    fn release_device_memory(&self, memory: HostMemory) {
        let mut state = self.state.lock();
        state.allocations.remove(&memory.id);
        state.bindings.retain(|_, (id, _)| *id != memory.id);
    }
}
