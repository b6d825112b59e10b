//! Device layer consumed by the allocator.
//!
//! - `memory_device` — the `MemoryDevice` trait, memory property flags, errors
//! - `host_data` — host payloads copied into bound regions
//! - `host` — host-RAM device for tests and diagnostics

pub mod host;
pub mod host_data;
pub mod memory_device;

pub use host::{HostMemory, HostMemoryDevice, HostResource};
pub use host_data::{DataKind, HostData};
pub use memory_device::{find_memory_type, DeviceError, MemoryDevice, MemoryProperties, MemoryType};
