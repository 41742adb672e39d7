//! Memory metadata tagging.
//!
//! Tensors can be represented on the device in several ways; the two main
//! descriptors are the storage type (buffer or texture) and the memory
//! layout (which axis is packed along texels). An operator implementation
//! may only support specific (storage type, memory layout) combinations,
//! and may prefer one of them for performance.
//!
//! [`TagMemoryPass`] walks the graph once in program order and, for every
//! eligible tensor node, resolves the storage type and memory layout that
//! should be used, then inserts transition (clone) nodes on edges whose
//! producer and consumer disagree. Resolution may look arbitrarily far
//! downstream: an unopinionated node inherits the settings of the first
//! opinionated consumer it can reach.

use std::collections::{BTreeSet, HashSet};

use crate::graph::{
    validate_graph_topology, Argument, Graph, GraphRewriter, NodeId, OpKind,
};
use crate::limits::{possible_node_layouts, TextureLimits};
use crate::memory::{MemoryLayout, MetaValue, StorageType};
use crate::passes::{GraphPass, PassContext, PassError, PassResult};

/// Assigns a storage type and memory layout to every eligible tensor node
/// and inserts transitions where producers and consumers disagree.
pub struct TagMemoryPass {
    texture_limits: TextureLimits,
    default_storage: StorageType,
    default_layout: MemoryLayout,
}

impl TagMemoryPass {
    pub fn new(texture_limits: TextureLimits) -> Self {
        Self {
            texture_limits,
            default_storage: StorageType::Texture3d,
            default_layout: MemoryLayout::WidthPacked,
        }
    }

    /// Overrides the storage type used when nothing else is opinionated.
    pub fn with_default_storage(mut self, storage: StorageType) -> Self {
        self.default_storage = storage;
        self
    }

    /// Overrides the layout used when nothing else is opinionated.
    pub fn with_default_layout(mut self, layout: MemoryLayout) -> Self {
        self.default_layout = layout;
        self
    }

    /// Determines the storage type that should be used for a node, or
    /// `None` for non-tensor nodes. Priorities, in order:
    ///
    /// 1. A tensor too large for any texture layout forces buffer storage,
    ///    regardless of operator preference.
    /// 2. An opinionated operator (explicit preference, or a single
    ///    supported storage type) decides outright.
    /// 3. The first already-annotated argument whose storage is valid for
    ///    this operator is inherited.
    /// 4. The first opinionated user decides, searched recursively.
    /// 5. The configured default, when valid; otherwise any valid member.
    ///
    /// `visited` tracks the recursion stack; re-entering a node means the
    /// graph is cyclic and is reported as an error rather than overflowing
    /// the stack.
    fn propose_node_storage(
        &self,
        rewriter: &GraphRewriter<'_>,
        cx: &PassContext<'_>,
        node: NodeId,
        visited: &mut HashSet<NodeId>,
    ) -> Result<Option<StorageType>, PassError> {
        if !rewriter.node(node).is_tensor() {
            return Ok(None);
        }
        if !visited.insert(node) {
            return Err(PassError::Cycle { node });
        }
        let proposal = self.storage_proposal(rewriter, cx, node, visited);
        visited.remove(&node);
        proposal
    }

    fn storage_proposal(
        &self,
        rewriter: &GraphRewriter<'_>,
        cx: &PassContext<'_>,
        node: NodeId,
        visited: &mut HashSet<NodeId>,
    ) -> Result<Option<StorageType>, PassError> {
        let current = rewriter.node(node);

        // A tensor that cannot be represented under any texture layout must
        // use buffer storage. Eligibility of buffer storage for the operator
        // was established when the node was partitioned to this delegate.
        if possible_node_layouts(current, &self.texture_limits).is_empty() {
            return Ok(Some(StorageType::Buffer));
        }

        let valid_storage_types: BTreeSet<StorageType> =
            if let Some(features) = cx.registry().features(current.op) {
                if let Some(storage) = features.preferred_storage() {
                    return Ok(Some(storage));
                }
                features.supported_storage_types()
            } else {
                StorageType::all().into_iter().collect()
            };

        for arg in &current.args {
            let Argument::Node(arg_id) = arg else {
                continue;
            };
            let arg_node = rewriter.node(*arg_id);
            if !arg_node.is_tensor() {
                continue;
            }
            // Multi-output producers may report one storage type per output;
            // the first element is authoritative.
            if let Some(storage) = arg_node.storage() {
                if valid_storage_types.contains(&storage) {
                    return Ok(Some(storage));
                }
            }
        }

        // No storage resolved yet: assume the setting of the first
        // opinionated user, searched recursively.
        for &user in rewriter.users_of(node) {
            if let Some(storage) = self.propose_node_storage(rewriter, cx, user, visited)? {
                return Ok(Some(storage));
            }
        }

        if valid_storage_types.contains(&self.default_storage) {
            return Ok(Some(self.default_storage));
        }
        match valid_storage_types.into_iter().next() {
            Some(storage) => Ok(Some(storage)),
            None => Err(PassError::EmptyStorageSet { op: current.op }),
        }
    }

    /// Performs the same steps as [`Self::propose_node_storage`] at the
    /// layout level, scoped to the layouts valid for the already-resolved
    /// storage type.
    fn propose_node_layout(
        &self,
        rewriter: &GraphRewriter<'_>,
        cx: &PassContext<'_>,
        node: NodeId,
        storage: StorageType,
        visited: &mut HashSet<NodeId>,
    ) -> Result<Option<MemoryLayout>, PassError> {
        if !rewriter.node(node).is_tensor() {
            return Ok(None);
        }
        if !visited.insert(node) {
            return Err(PassError::Cycle { node });
        }
        let proposal = self.layout_proposal(rewriter, cx, node, storage, visited);
        visited.remove(&node);
        proposal
    }

    fn layout_proposal(
        &self,
        rewriter: &GraphRewriter<'_>,
        cx: &PassContext<'_>,
        node: NodeId,
        storage: StorageType,
        visited: &mut HashSet<NodeId>,
    ) -> Result<Option<MemoryLayout>, PassError> {
        let current = rewriter.node(node);

        let valid_layouts: BTreeSet<MemoryLayout> =
            if let Some(features) = cx.registry().features(current.op) {
                if let Some(layout) = features.preferred_layout(storage) {
                    return Ok(Some(layout));
                }
                features.supported_layouts(storage)
            } else {
                MemoryLayout::all().into_iter().collect()
            };

        for arg in &current.args {
            let Argument::Node(arg_id) = arg else {
                continue;
            };
            let arg_node = rewriter.node(*arg_id);
            if !arg_node.is_tensor() {
                continue;
            }
            if let Some(layout) = arg_node.layout() {
                if valid_layouts.contains(&layout) {
                    return Ok(Some(layout));
                }
            }
        }

        for &user in rewriter.users_of(node) {
            if let Some(layout) =
                self.propose_node_layout(rewriter, cx, user, storage, visited)?
            {
                return Ok(Some(layout));
            }
        }

        if valid_layouts.contains(&self.default_layout) {
            return Ok(Some(self.default_layout));
        }
        match valid_layouts.into_iter().next() {
            Some(layout) => Ok(Some(layout)),
            None => Err(PassError::EmptyLayoutSet {
                op: current.op,
                storage,
            }),
        }
    }

    /// Brings one tensor argument in line with the consumer's resolved
    /// settings. An unannotated argument adopts them directly; a mismatched
    /// one gets a transition node inserted on the edge. Returns whether a
    /// transition was inserted.
    fn set_or_transition_arg_node(
        &self,
        rewriter: &mut GraphRewriter<'_>,
        node: NodeId,
        arg: NodeId,
        dirty: bool,
        result: &mut PassResult,
    ) -> Result<bool, PassError> {
        let storage = rewriter
            .node(node)
            .storage()
            .expect("node storage must be resolved before transitioning arguments");
        let layout = rewriter
            .node(node)
            .layout()
            .expect("node layout must be resolved before transitioning arguments");

        let mut arg_storage = rewriter.node(arg).storage();
        let mut arg_layout = rewriter.node(arg).layout();

        // An argument without settings has no other opinionated consumer
        // yet; it adopts this node's requirement and no copy is needed.
        if arg_storage.is_none() {
            rewriter.set_storage(arg, MetaValue::Single(storage));
            arg_storage = Some(storage);
        }
        if arg_layout.is_none() {
            rewriter.set_layout(arg, MetaValue::Single(layout));
            arg_layout = Some(layout);
        }

        if arg_storage == Some(storage) && arg_layout == Some(layout) {
            return Ok(false);
        }

        if !dirty {
            tracing::info!(node = node.0, "inserting memory transition(s)");
        }

        let spec = rewriter
            .node(arg)
            .outputs
            .first()
            .cloned()
            .expect("tensor argument must carry an output spec");
        let clone = rewriter.insert_before(node, OpKind::Clone, vec![Argument::Node(arg)], vec![spec])?;
        rewriter.set_memory_metadata(clone, MetaValue::Single(storage), MetaValue::Single(layout));
        rewriter.replace_use_in(node, arg, clone);
        result.transitions_inserted += 1;

        tracing::info!(
            producer = arg.0,
            consumer = node.0,
            transition = clone.0,
            from_storage = ?arg_storage,
            from_layout = ?arg_layout,
            to_storage = ?storage,
            to_layout = ?layout,
            "inserted transition"
        );

        Ok(true)
    }

    /// Whether an argument participates in annotation and transitioning:
    /// tensor node references (element-wise through lists), never scalar
    /// attributes.
    fn should_annotate_arg(rewriter: &GraphRewriter<'_>, arg: &Argument) -> bool {
        match arg {
            Argument::Node(id) => rewriter.node(*id).is_tensor(),
            Argument::NodeList(ids) => ids.iter().all(|id| rewriter.node(*id).is_tensor()),
            Argument::Scalar(_) => false,
        }
    }
}

impl GraphPass for TagMemoryPass {
    fn name(&self) -> &'static str {
        "tag-memory"
    }

    fn run(&self, graph: &mut Graph, cx: &mut PassContext<'_>) -> Result<PassResult, PassError> {
        validate_graph_topology(graph).map_err(PassError::Topology)?;
        let mut rewriter = GraphRewriter::new(graph)?;
        let mut result = PassResult::default();
        let mut visited: HashSet<NodeId> = HashSet::new();

        // Snapshot of the nodes existing at pass start; transition nodes
        // inserted below must not be revisited by the same traversal.
        for id in rewriter.nodes_in_order() {
            {
                let node = rewriter.node(id);
                // Output markers are annotated transitively through their
                // producers; prepack nodes stay unresolved until a consumer
                // assigns them, to minimize transitions.
                if !node.is_tensor()
                    || node.meta.is_annotated()
                    || node.op == OpKind::Prepack
                {
                    continue;
                }
            }

            visited.clear();
            let storage = self
                .propose_node_storage(&rewriter, cx, id, &mut visited)?
                .expect("tensor node must resolve a storage type");
            visited.clear();
            let layout = self
                .propose_node_layout(&rewriter, cx, id, storage, &mut visited)?
                .expect("tensor node must resolve a memory layout");

            rewriter.set_memory_metadata(id, MetaValue::Single(storage), MetaValue::Single(layout));
            result.nodes_annotated += 1;
            tracing::debug!(node = id.0, ?storage, ?layout, "resolved memory metadata");

            let args = rewriter.node(id).args.clone();
            let mut dirty = false;
            for arg in &args {
                if !Self::should_annotate_arg(&rewriter, arg) {
                    continue;
                }
                for &arg_id in arg.node_refs() {
                    dirty = self.set_or_transition_arg_node(&mut rewriter, id, arg_id, dirty, &mut result)?
                        || dirty;
                }
            }
        }

        result.changed = result.nodes_annotated > 0 || result.transitions_inserted > 0;
        Ok(result)
    }
}
