//! Storage type / memory layout vocabulary and per-node memory metadata.

use serde::{Deserialize, Serialize};

/// Physical realization of a tensor on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StorageType {
    /// Flat addressable buffer.
    Buffer,
    /// 3-D image resource.
    Texture3d,
    /// 2-D image resource.
    Texture2d,
}

impl StorageType {
    /// The universal storage set, used when an operator has no registered
    /// capability entry.
    pub fn all() -> [StorageType; 3] {
        [
            StorageType::Buffer,
            StorageType::Texture3d,
            StorageType::Texture2d,
        ]
    }
}

/// Which logical tensor axis is packed contiguously along texels.
///
/// Only meaningful relative to a [`StorageType`]; the set of layouts an
/// operator supports depends on the storage type in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MemoryLayout {
    WidthPacked,
    HeightPacked,
    ChannelsPacked,
}

impl MemoryLayout {
    /// The universal layout set.
    pub fn all() -> [MemoryLayout; 3] {
        [
            MemoryLayout::WidthPacked,
            MemoryLayout::HeightPacked,
            MemoryLayout::ChannelsPacked,
        ]
    }
}

/// Metadata value that is either shared by every output of a node or
/// reported per output by a multi-output producer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetaValue<T> {
    Single(T),
    PerOutput(Vec<T>),
}

impl<T: Copy> MetaValue<T> {
    /// The first element is authoritative when a producer reports per-output
    /// values; propagation never looks past it.
    pub fn first(&self) -> Option<T> {
        match self {
            MetaValue::Single(value) => Some(*value),
            MetaValue::PerOutput(values) => values.first().copied(),
        }
    }
}

/// Memory metadata slots attached to every node, initially unset and written
/// exactly once by the tag-memory pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryMeta {
    pub storage: Option<MetaValue<StorageType>>,
    pub layout: Option<MetaValue<MemoryLayout>>,
}

impl MemoryMeta {
    /// Returns `true` once both slots have been written.
    pub fn is_annotated(&self) -> bool {
        self.storage.is_some() && self.layout.is_some()
    }
}
