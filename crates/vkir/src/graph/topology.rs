use std::collections::HashSet;
use std::fmt;

use super::{Graph, NodeId};

/// Raised when a node references another node that has not been defined
/// earlier in program order, which also covers cyclic graphs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyError {
    pub missing_node: NodeId,
    pub consumer: NodeId,
}

impl fmt::Display for TopologyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "node {} is used by node {} before it is defined",
            self.missing_node.0, self.consumer.0
        )
    }
}

/// Validates that every argument reference points at an earlier node.
///
/// Passes that recurse along argument or user chains call this first so a
/// malformed (cyclic) graph fails with a clear error instead of unbounded
/// recursion.
pub fn validate_graph_topology(graph: &Graph) -> Result<(), TopologyError> {
    let mut available: HashSet<NodeId> = HashSet::new();

    for node in graph.nodes() {
        for arg in &node.args {
            for &referenced in arg.node_refs() {
                if !available.contains(&referenced) {
                    return Err(TopologyError {
                        missing_node: referenced,
                        consumer: node.id,
                    });
                }
            }
        }
        available.insert(node.id);
    }

    Ok(())
}
