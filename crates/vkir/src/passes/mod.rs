//! Pass infrastructure for graph transformations.

mod tag_memory;

pub use tag_memory::TagMemoryPass;

use thiserror::Error;

use crate::graph::{Graph, GraphIndexError, NodeId, OpKind, TopologyError};
use crate::memory::StorageType;
use crate::registry::FeatureRegistry;

/// Result returned by a [`GraphPass`] after it runs.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassResult {
    /// Whether the pass changed the graph (metadata or topology).
    pub changed: bool,
    /// Nodes whose memory metadata was resolved by this run.
    pub nodes_annotated: usize,
    /// Transition nodes inserted by this run.
    pub transitions_inserted: usize,
}

impl PassResult {
    /// Merges two run results, accumulating statistics.
    pub fn merge(self, other: PassResult) -> PassResult {
        PassResult {
            changed: self.changed || other.changed,
            nodes_annotated: self.nodes_annotated + other.nodes_annotated,
            transitions_inserted: self.transitions_inserted + other.transitions_inserted,
        }
    }
}

/// Per-invocation collaborators shared by passes.
pub struct PassContext<'a> {
    registry: &'a FeatureRegistry,
}

impl<'a> PassContext<'a> {
    pub fn new(registry: &'a FeatureRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &'a FeatureRegistry {
        self.registry
    }
}

/// Canonical interface implemented by passes that operate on a whole graph.
pub trait GraphPass {
    fn name(&self) -> &'static str;
    fn run(&self, graph: &mut Graph, cx: &mut PassContext<'_>) -> Result<PassResult, PassError>;
}

/// Fatal errors surfaced by graph passes.
#[derive(Debug, Error)]
pub enum PassError {
    /// The visited-set guard tripped during recursive resolution; the graph
    /// contains a data-dependency cycle.
    #[error("cyclic data dependency detected while resolving node {node:?}")]
    Cycle { node: NodeId },
    /// Registry data left no storage type to pick from.
    #[error("operator {op:?} supports no storage types")]
    EmptyStorageSet { op: OpKind },
    /// Registry data left no memory layout to pick from for the resolved
    /// storage type.
    #[error("operator {op:?} supports no memory layouts under {storage:?}")]
    EmptyLayoutSet { op: OpKind, storage: StorageType },
    #[error("graph topology invalid: {0}")]
    Topology(TopologyError),
    #[error(transparent)]
    Index(#[from] GraphIndexError),
}
