// Copyright 2024-2026 GG-CORE Contributors
// Licensed under the Apache License, Version 2.0

//! Device collaborator interface consumed by the page allocator.
//!
//! The pool never talks to a graphics API directly. Everything it needs from
//! the native layer goes through [`MemoryDevice`]: picking a memory type,
//! reserving page-sized chunks of device memory, binding resources to
//! sub-regions and copying host data into them.

use serde::{Deserialize, Serialize};

bitflags::bitflags! {
    /// Memory property flags a memory type must satisfy.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct MemoryProperties: u32 {
        /// Memory is device-local (VRAM)
        const DEVICE_LOCAL = 1 << 0;
        /// Memory is host-visible
        const HOST_VISIBLE = 1 << 1;
        /// Memory is host-coherent
        const HOST_COHERENT = 1 << 2;
        /// Memory is host-cached
        const HOST_CACHED = 1 << 3;
        /// Memory is lazily allocated
        const LAZILY_ALLOCATED = 1 << 4;
        /// Memory is protected
        const PROTECTED = 1 << 5;
    }
}

impl Default for MemoryProperties {
    fn default() -> Self {
        Self::HOST_VISIBLE | Self::HOST_COHERENT
    }
}

/// One entry of a device's memory type table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryType {
    /// Properties of this memory type.
    pub properties: MemoryProperties,
    /// Heap this memory type allocates from.
    pub heap_index: u32,
}

/// Return the index of the first memory type whose flags contain `required`.
pub fn find_memory_type(types: &[MemoryType], required: MemoryProperties) -> Option<u32> {
    types
        .iter()
        .position(|t| t.properties.contains(required))
        .and_then(|i| u32::try_from(i).ok())
}

/// Errors reported by the native device layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    #[error("No memory type satisfies {required:?}")]
    NoSuitableMemoryType { required: MemoryProperties },

    #[error("Unknown memory type index: {0}")]
    UnknownMemoryType(u32),

    #[error("Out of device memory: requested {requested} bytes")]
    OutOfDeviceMemory { requested: u64 },

    #[error("Unknown device memory handle")]
    UnknownMemory,

    #[error("Resource bind rejected: {0}")]
    BindRejected(String),

    #[error("Memory map rejected: {0}")]
    MapRejected(String),

    #[error("Region {offset}+{size} exceeds memory object of {memory_size} bytes")]
    RegionOutOfBounds {
        offset: u64,
        size: u64,
        memory_size: u64,
    },
}

/// Native device operations used by the page allocator.
///
/// Implementations wrap a logical device. `Memory` is the handle of one
/// device-memory reservation (one per page) and `Resource` is a caller-owned
/// buffer or image that gets bound to a region of that memory.
pub trait MemoryDevice {
    /// Handle of a device-memory reservation.
    type Memory;
    /// Caller-owned resource (buffer or image) handle.
    type Resource;

    /// Select a memory type whose property flags contain `required`.
    fn query_memory_type(&self, required: MemoryProperties) -> Result<u32, DeviceError>;

    /// Size in bytes of the heap backing `memory_type`.
    fn query_heap_size(&self, memory_type: u32) -> Result<u64, DeviceError>;

    /// Platform buffer/image granularity every allocation is rounded up to.
    fn buffer_image_granularity(&self) -> u64;

    /// Reserve `size` bytes of device memory of the given type.
    fn reserve_device_memory(&self, size: u64, memory_type: u32)
        -> Result<Self::Memory, DeviceError>;

    /// Bind `resource` to `memory` at `offset`.
    fn bind_resource(
        &self,
        resource: &Self::Resource,
        memory: &Self::Memory,
        offset: u64,
    ) -> Result<(), DeviceError>;

    /// Map `size` bytes of `memory` at `offset`, copy `bytes` in and unmap.
    fn map_copy_unmap(
        &self,
        memory: &Self::Memory,
        offset: u64,
        size: u64,
        bytes: &[u8],
    ) -> Result<(), DeviceError>;

    /// Give a reservation back to the device.
    fn release_device_memory(&self, memory: Self::Memory);
}

// Lets a pool borrow or share a device the caller keeps inspecting.
macro_rules! forward_memory_device {
    ($($ptr:ty),*) => {$(
        impl<T: MemoryDevice + ?Sized> MemoryDevice for $ptr {
            type Memory = T::Memory;
            type Resource = T::Resource;

            fn query_memory_type(&self, required: MemoryProperties) -> Result<u32, DeviceError> {
                (**self).query_memory_type(required)
            }

            fn query_heap_size(&self, memory_type: u32) -> Result<u64, DeviceError> {
                (**self).query_heap_size(memory_type)
            }

            fn buffer_image_granularity(&self) -> u64 {
                (**self).buffer_image_granularity()
            }

            fn reserve_device_memory(&self, size: u64, memory_type: u32) -> Result<Self::Memory, DeviceError> {
                (**self).reserve_device_memory(size, memory_type)
            }

            fn bind_resource(&self, resource: &Self::Resource, memory: &Self::Memory, offset: u64) -> Result<(), DeviceError> {
                (**self).bind_resource(resource, memory, offset)
            }

            fn map_copy_unmap(&self, memory: &Self::Memory, offset: u64, size: u64, bytes: &[u8]) -> Result<(), DeviceError> {
                (**self).map_copy_unmap(memory, offset, size, bytes)
            }

            fn release_device_memory(&self, memory: Self::Memory) {
                (**self).release_device_memory(memory)
            }
        }
    )*};
}

forward_memory_device!(&T, std::sync::Arc<T>);
