//! Host payloads copied into device memory on bind.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Element type of a host payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataKind {
    Float32,
    Int32,
    Bytes,
}

impl std::fmt::Display for DataKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Float32 => write!(f, "f32"),
            Self::Int32 => write!(f, "i32"),
            Self::Bytes => write!(f, "bytes"),
        }
    }
}

/// Host data to copy into a bound region.
///
/// Numeric payloads are written in native byte order, which is what a
/// host-visible mapping of the same memory reads back.
#[derive(Debug, Clone, Copy)]
pub enum HostData<'a> {
    Float32(&'a [f32]),
    Int32(&'a [i32]),
    Bytes(&'a [u8]),
}

impl<'a> HostData<'a> {
    /// Element type of this payload.
    pub fn kind(&self) -> DataKind {
        match self {
            Self::Float32(_) => DataKind::Float32,
            Self::Int32(_) => DataKind::Int32,
            Self::Bytes(_) => DataKind::Bytes,
        }
    }

    /// Payload length in bytes.
    pub fn byte_len(&self) -> u64 {
        let len = match self {
            Self::Float32(v) => std::mem::size_of_val(*v),
            Self::Int32(v) => std::mem::size_of_val(*v),
            Self::Bytes(v) => v.len(),
        };
        len as u64
    }

    pub fn is_empty(&self) -> bool {
        self.byte_len() == 0
    }

    /// Raw bytes of the payload. Borrowed for byte payloads.
    pub fn to_bytes(&self) -> Cow<'a, [u8]> {
        match *self {
            Self::Bytes(v) => Cow::Borrowed(v),
            Self::Float32(v) => Cow::Owned(v.iter().flat_map(|x| x.to_ne_bytes()).collect()),
            Self::Int32(v) => Cow::Owned(v.iter().flat_map(|x| x.to_ne_bytes()).collect()),
        }
    }
}
