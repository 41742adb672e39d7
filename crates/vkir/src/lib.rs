//! Tensor graph IR and memory planning for a Vulkan-style GPU delegate.
//!
//! Tensors on the device can be realized either as flat buffers or as
//! image-like texture resources, and within a texture resource one logical
//! axis is packed contiguously along texels. Which combination an operator
//! implementation supports (and which it prefers) varies per operator, and
//! some tensors are simply too large for a texture at all.
//!
//! This crate provides:
//!
//! - [`graph`] — a dataflow graph over tensor operations with structural
//!   indices, a mutable rewriter, and topology validation;
//! - [`memory`] — the storage type / memory layout vocabulary and the
//!   per-node metadata slots the planning pass fills in;
//! - [`registry`] — the per-operator capability registry consulted during
//!   planning;
//! - [`limits`] — the hardware texture-capacity oracle;
//! - [`passes`] — the pass infrastructure and [`passes::TagMemoryPass`],
//!   which assigns every eligible node a (storage, layout) pair and inserts
//!   explicit transition nodes wherever connected operations disagree.

pub mod graph;
pub mod limits;
pub mod memory;
pub mod passes;
pub mod registry;

pub use graph::{Argument, DType, Graph, Node, NodeId, OpKind, ScalarAttr, TensorSpec};
pub use limits::TextureLimits;
pub use memory::{MemoryLayout, MetaValue, StorageType};
pub use passes::{GraphPass, PassContext, PassError, PassResult, TagMemoryPass};
pub use registry::{FeatureRegistry, OpFeatures};
