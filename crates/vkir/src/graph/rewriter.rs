use crate::graph::{
    index::{GraphIndexError, GraphIndices},
    Argument, Graph, Node, NodeId, OpKind, TensorSpec,
};
use crate::memory::{MemoryLayout, MetaValue, StorageType};

/// Mutable graph editor with stable node identifiers and user accounting.
///
/// Passes read structure and metadata through the rewriter and mutate
/// exclusively through it, so the indices stay consistent with the node
/// list across insertions and rewirings.
#[derive(Debug)]
pub struct GraphRewriter<'a> {
    graph: &'a mut Graph,
    indices: GraphIndices,
}

impl<'a> GraphRewriter<'a> {
    /// Creates a rewriter for the provided graph, indexing its nodes.
    pub fn new(graph: &'a mut Graph) -> Result<Self, GraphIndexError> {
        let indices = GraphIndices::build(graph)?;
        Ok(Self { graph, indices })
    }

    /// Returns the node for the given id.
    pub fn node(&self, id: NodeId) -> &Node {
        let pos = self.indices.position(id).expect("node id must be valid");
        &self.graph.nodes()[pos]
    }

    /// Returns the consumers recorded for a node, in program order.
    pub fn users_of(&self, id: NodeId) -> &[NodeId] {
        self.indices.users_of(id)
    }

    /// Snapshot of node ids in program order at the time of the call.
    ///
    /// Drivers iterate this snapshot so that nodes inserted mid-pass are not
    /// themselves visited.
    pub fn nodes_in_order(&self) -> Vec<NodeId> {
        self.indices.ordered_ids()
    }

    /// Writes both memory metadata slots of a node.
    pub fn set_memory_metadata(
        &mut self,
        id: NodeId,
        storage: MetaValue<StorageType>,
        layout: MetaValue<MemoryLayout>,
    ) {
        self.graph.set_storage(id, storage);
        self.graph.set_layout(id, layout);
    }

    /// Writes the storage metadata slot of a node.
    pub fn set_storage(&mut self, id: NodeId, storage: MetaValue<StorageType>) {
        self.graph.set_storage(id, storage);
    }

    /// Writes the layout metadata slot of a node.
    pub fn set_layout(&mut self, id: NodeId, layout: MetaValue<MemoryLayout>) {
        self.graph.set_layout(id, layout);
    }

    /// Inserts a new node immediately before `at`, returning its id.
    pub fn insert_before(
        &mut self,
        at: NodeId,
        op: OpKind,
        args: Vec<Argument>,
        outputs: Vec<TensorSpec>,
    ) -> Result<NodeId, GraphIndexError> {
        let pos = self
            .indices
            .position(at)
            .expect("insertion point must exist");
        let id = self.graph.allocate_id();
        self.indices.insert_node(id, pos, &args)?;
        self.graph.insert_node_at(
            pos,
            Node {
                id,
                op,
                args,
                outputs,
                meta: Default::default(),
            },
        );
        Ok(id)
    }

    /// Rewires `consumer`'s references from `from` to `to`, leaving every
    /// other consumer of `from` untouched.
    pub fn replace_use_in(&mut self, consumer: NodeId, from: NodeId, to: NodeId) {
        if from == to {
            return;
        }
        let pos = self
            .indices
            .position(consumer)
            .expect("consumer id must be valid");
        let node = &mut self.graph.nodes[pos];
        let mut replaced = false;
        for arg in &mut node.args {
            match arg {
                Argument::Node(id) if *id == from => {
                    *id = to;
                    replaced = true;
                }
                Argument::NodeList(ids) => {
                    for id in ids.iter_mut() {
                        if *id == from {
                            *id = to;
                            replaced = true;
                        }
                    }
                }
                _ => {}
            }
        }
        if replaced {
            self.indices.update_use(consumer, from, to);
        }
    }
}
