//! Dataflow graph representation for the delegate's tensor programs.
//!
//! Nodes live in program order inside a [`Graph`]; arguments are resolved to
//! a tagged union at construction time (a node reference, a list of node
//! references, or a non-tensor scalar attribute) so that passes never need
//! runtime shape inspection on the argument kind. Structural queries go
//! through [`GraphIndices`] and mutation through [`GraphRewriter`].

mod index;
mod rewriter;
mod topology;

pub use index::{GraphIndexError, GraphIndices};
pub use rewriter::GraphRewriter;
pub use topology::{validate_graph_topology, TopologyError};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::memory::{MemoryLayout, MemoryMeta, MetaValue, StorageType};

/// Enumerates scalar element types carried by tensor specs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    I1,
    Si8,
    Ui8,
    Si32,
    F16,
    F32,
}

/// Tensor metadata coupling dtype and static shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorSpec {
    pub dtype: DType,
    pub dims: Vec<usize>,
}

impl TensorSpec {
    pub fn new(dtype: DType, dims: impl Into<Vec<usize>>) -> Self {
        Self {
            dtype,
            dims: dims.into(),
        }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }
}

/// Unique identifier for nodes in a graph.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct NodeId(pub u32);

/// Non-tensor literal argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalarAttr {
    Bool(bool),
    Int(i64),
    Float(f64),
    IntList(Vec<i64>),
}

/// Argument of a node, with its kind resolved at graph construction time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Argument {
    Node(NodeId),
    NodeList(Vec<NodeId>),
    Scalar(ScalarAttr),
}

impl Argument {
    /// All node references carried by the argument, in declaration order.
    pub fn node_refs(&self) -> &[NodeId] {
        match self {
            Argument::Node(id) => std::slice::from_ref(id),
            Argument::NodeList(ids) => ids.as_slice(),
            Argument::Scalar(_) => &[],
        }
    }
}

/// Operator identity of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpKind {
    /// Graph input placeholder.
    Input,
    /// Output marker; its arguments are the graph results. Never annotated
    /// itself.
    Output,
    /// Weight prepacking. Memory metadata is resolved as late as possible,
    /// so the tag-memory pass skips these and lets consumers assign them.
    Prepack,
    /// Identity copy converting a tensor between memory settings; inserted
    /// by the tag-memory pass, never present in source graphs.
    Clone,
    Conv2d,
    DepthwiseConv2d,
    Linear,
    MatMul,
    Add,
    Sub,
    Mul,
    Div,
    Relu,
    Gelu,
    Sigmoid,
    Tanh,
    Softmax,
    BatchNorm,
    LayerNorm,
    MaxPool2d,
    AvgPool2d,
    Upsample,
    Cat,
    Split,
    Reshape,
    Permute,
    Slice,
    Embedding,
    Mean,
    Sum,
}

/// A single operation instance in the dataflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub op: OpKind,
    pub args: Vec<Argument>,
    /// One spec per output tensor; empty for the output marker.
    pub outputs: Vec<TensorSpec>,
    pub meta: MemoryMeta,
}

impl Node {
    /// Returns `true` when the node produces at least one tensor value.
    pub fn is_tensor(&self) -> bool {
        self.op != OpKind::Output && !self.outputs.is_empty()
    }

    /// Resolved storage type, taking the first element when the producer
    /// reports per-output values.
    pub fn storage(&self) -> Option<StorageType> {
        self.meta.storage.as_ref().and_then(MetaValue::first)
    }

    /// Resolved memory layout, taking the first element when the producer
    /// reports per-output values.
    pub fn layout(&self) -> Option<MemoryLayout> {
        self.meta.layout.as_ref().and_then(MetaValue::first)
    }
}

/// Errors surfaced when saving or loading a graph snapshot.
#[derive(Debug, Error)]
pub enum GraphSerdeError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Dataflow graph: nodes stored in program order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    nodes: Vec<Node>,
    next_id: u32,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nodes in program order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Looks up a node by id.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.iter().find(|node| node.id == id)
    }

    /// Mutable lookup by id.
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|node| node.id == id)
    }

    /// Appends a node with the given operator, arguments, and output specs.
    pub fn add_node(
        &mut self,
        op: OpKind,
        args: Vec<Argument>,
        outputs: Vec<TensorSpec>,
    ) -> NodeId {
        let id = self.allocate_id();
        self.nodes.push(Node {
            id,
            op,
            args,
            outputs,
            meta: MemoryMeta::default(),
        });
        id
    }

    /// Appends an input placeholder producing a single tensor.
    pub fn add_input(&mut self, spec: TensorSpec) -> NodeId {
        self.add_node(OpKind::Input, Vec::new(), vec![spec])
    }

    /// Appends an operation whose arguments are all plain tensor references.
    pub fn add_op(&mut self, op: OpKind, inputs: &[NodeId], output: TensorSpec) -> NodeId {
        let args = inputs.iter().copied().map(Argument::Node).collect();
        self.add_node(op, args, vec![output])
    }

    /// Appends the output marker referencing the graph results.
    pub fn mark_output(&mut self, results: &[NodeId]) -> NodeId {
        let args = results.iter().copied().map(Argument::Node).collect();
        self.add_node(OpKind::Output, args, Vec::new())
    }

    /// Writes the storage metadata slot for a node.
    ///
    /// The tag-memory pass treats the slot as write-once; callers priming a
    /// graph for the pass (e.g. earlier stages reporting per-output
    /// storages) use this directly.
    pub fn set_storage(&mut self, id: NodeId, storage: MetaValue<StorageType>) {
        let node = self.node_mut(id).expect("node id must be valid");
        node.meta.storage = Some(storage);
    }

    /// Writes the layout metadata slot for a node.
    pub fn set_layout(&mut self, id: NodeId, layout: MetaValue<MemoryLayout>) {
        let node = self.node_mut(id).expect("node id must be valid");
        node.meta.layout = Some(layout);
    }

    /// Serializes the graph to JSON, for debugging and test fixtures.
    pub fn to_json(&self) -> Result<String, GraphSerdeError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserializes a graph from its JSON snapshot form.
    pub fn from_json(text: &str) -> Result<Self, GraphSerdeError> {
        Ok(serde_json::from_str(text)?)
    }

    pub(crate) fn allocate_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    pub(crate) fn insert_node_at(&mut self, pos: usize, node: Node) {
        self.nodes.insert(pos, node);
    }
}
