//! Operator capability registry.
//!
//! Each registered operator reports the (storage type, memory layout)
//! combinations its device implementation supports, and optionally a single
//! preferred storage type and a preferred layout per storage type. The
//! registry is an explicit object constructed once per pass invocation and
//! passed by reference into the resolvers; there is no process-wide
//! registration.
//!
//! Absence of an entry is the normal case for operators without a custom
//! implementation; resolvers then fall back to the universal storage and
//! layout sets.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::graph::OpKind;
use crate::memory::{MemoryLayout, StorageType};

/// Capability record for a single operator.
#[derive(Debug, Clone, Default)]
pub struct OpFeatures {
    supported: BTreeMap<StorageType, BTreeSet<MemoryLayout>>,
    preferred_storage: Option<StorageType>,
    preferred_layouts: BTreeMap<StorageType, MemoryLayout>,
}

impl OpFeatures {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares support for `storage` under the given layouts.
    pub fn support(
        mut self,
        storage: StorageType,
        layouts: impl IntoIterator<Item = MemoryLayout>,
    ) -> Self {
        self.supported
            .entry(storage)
            .or_default()
            .extend(layouts);
        self
    }

    /// Declares the single storage type the implementation performs best
    /// with.
    pub fn prefer_storage(mut self, storage: StorageType) -> Self {
        self.preferred_storage = Some(storage);
        self
    }

    /// Declares the preferred layout for one storage type.
    pub fn prefer_layout(mut self, storage: StorageType, layout: MemoryLayout) -> Self {
        self.preferred_layouts.insert(storage, layout);
        self
    }

    /// Storage types the implementation supports.
    pub fn supported_storage_types(&self) -> BTreeSet<StorageType> {
        self.supported.keys().copied().collect()
    }

    /// Layouts supported for the given storage type.
    pub fn supported_layouts(&self, storage: StorageType) -> BTreeSet<MemoryLayout> {
        self.supported.get(&storage).cloned().unwrap_or_default()
    }

    /// The storage type resolution should use outright, when the operator is
    /// opinionated: an explicit preference, or the only supported storage.
    pub fn preferred_storage(&self) -> Option<StorageType> {
        if self.preferred_storage.is_some() {
            return self.preferred_storage;
        }
        if self.supported.len() == 1 {
            return self.supported.keys().next().copied();
        }
        None
    }

    /// The layout resolution should use outright for the given storage, when
    /// the operator is opinionated at the layout level.
    pub fn preferred_layout(&self, storage: StorageType) -> Option<MemoryLayout> {
        if let Some(layout) = self.preferred_layouts.get(&storage) {
            return Some(*layout);
        }
        let layouts = self.supported.get(&storage)?;
        if layouts.len() == 1 {
            return layouts.iter().next().copied();
        }
        None
    }
}

/// Per-invocation registry mapping operator identity to its capabilities.
#[derive(Debug, Clone, Default)]
pub struct FeatureRegistry {
    features: HashMap<OpKind, OpFeatures>,
}

impl FeatureRegistry {
    /// An empty registry; every operator falls back to universal sets.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry populated with the stock operator library.
    pub fn with_default_ops() -> Self {
        let mut registry = Self::new();

        let texture_any = || {
            OpFeatures::new()
                .support(StorageType::Texture3d, MemoryLayout::all())
                .support(StorageType::Buffer, MemoryLayout::all())
        };

        // Convolutions read spatially and want channels along texels. Every
        // entry keeps a buffer fallback: the limit oracle can force buffer
        // storage on any operator whose tensors outgrow the texture limits.
        for op in [OpKind::Conv2d, OpKind::DepthwiseConv2d] {
            registry.register(
                op,
                OpFeatures::new()
                    .support(StorageType::Texture3d, [MemoryLayout::ChannelsPacked])
                    .support(StorageType::Buffer, [MemoryLayout::ChannelsPacked])
                    .prefer_storage(StorageType::Texture3d),
            );
        }

        for op in [OpKind::Linear, OpKind::MatMul] {
            registry.register(
                op,
                texture_any().prefer_layout(StorageType::Texture3d, MemoryLayout::WidthPacked),
            );
        }

        // Elementwise ops run anywhere and inherit whatever their inputs use.
        for op in [
            OpKind::Add,
            OpKind::Sub,
            OpKind::Mul,
            OpKind::Div,
            OpKind::Relu,
            OpKind::Gelu,
            OpKind::Sigmoid,
            OpKind::Tanh,
            OpKind::Clone,
        ] {
            registry.register(op, texture_any());
        }

        registry.register(
            OpKind::Softmax,
            OpFeatures::new()
                .support(StorageType::Texture3d, [MemoryLayout::WidthPacked])
                .support(StorageType::Buffer, [MemoryLayout::WidthPacked])
                .prefer_storage(StorageType::Texture3d),
        );

        for op in [OpKind::BatchNorm, OpKind::MaxPool2d, OpKind::AvgPool2d, OpKind::Upsample] {
            registry.register(
                op,
                OpFeatures::new()
                    .support(StorageType::Texture3d, [MemoryLayout::ChannelsPacked])
                    .support(StorageType::Buffer, [MemoryLayout::ChannelsPacked])
                    .prefer_storage(StorageType::Texture3d),
            );
        }

        registry.register(
            OpKind::LayerNorm,
            OpFeatures::new()
                .support(StorageType::Texture3d, [MemoryLayout::WidthPacked])
                .support(StorageType::Buffer, [MemoryLayout::WidthPacked]),
        );

        for op in [
            OpKind::Cat,
            OpKind::Split,
            OpKind::Slice,
            OpKind::Mean,
            OpKind::Sum,
        ] {
            registry.register(op, texture_any());
        }

        // Data movement is cheapest over linear memory.
        for op in [OpKind::Reshape, OpKind::Permute] {
            registry.register(
                op,
                OpFeatures::new()
                    .support(StorageType::Buffer, MemoryLayout::all())
                    .prefer_storage(StorageType::Buffer),
            );
        }

        registry.register(
            OpKind::Embedding,
            OpFeatures::new().support(StorageType::Buffer, [MemoryLayout::WidthPacked]),
        );

        registry
    }

    /// Registers (or replaces) the capability record for an operator.
    pub fn register(&mut self, op: OpKind, features: OpFeatures) {
        self.features.insert(op, features);
    }

    /// Whether a custom implementation exists for the operator.
    pub fn has_impl(&self, op: OpKind) -> bool {
        self.features.contains_key(&op)
    }

    /// Capability record for the operator, when registered.
    pub fn features(&self, op: OpKind) -> Option<&OpFeatures> {
        self.features.get(&op)
    }
}
