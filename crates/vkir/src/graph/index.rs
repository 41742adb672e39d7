use std::collections::{HashMap, HashSet};

use smallvec::SmallVec;
use thiserror::Error;

use super::{Argument, Graph, NodeId};

/// Captures structural indices for a graph: node positions and user lists.
///
/// User lists record consumers in program order, which is the iteration
/// order the resolvers rely on when searching downstream.
#[derive(Debug, Clone)]
pub struct GraphIndices {
    pos_of: HashMap<NodeId, usize>,
    users: HashMap<NodeId, SmallVec<[NodeId; 4]>>,
}

impl GraphIndices {
    /// Builds indices for the provided graph and validates that every node
    /// id is defined exactly once and every argument reference resolves.
    pub fn build(graph: &Graph) -> Result<Self, GraphIndexError> {
        let mut seen: HashSet<NodeId> = HashSet::new();
        let mut pos_of = HashMap::with_capacity(graph.nodes().len());
        let mut users: HashMap<NodeId, SmallVec<[NodeId; 4]>> = HashMap::new();

        for node in graph.nodes() {
            if !seen.insert(node.id) {
                return Err(GraphIndexError::DuplicateNode { node: node.id });
            }
        }

        for (pos, node) in graph.nodes().iter().enumerate() {
            for arg in &node.args {
                for &referenced in arg.node_refs() {
                    if !seen.contains(&referenced) {
                        return Err(GraphIndexError::MissingNodeDefinition {
                            node: referenced,
                            user: node.id,
                        });
                    }
                    users.entry(referenced).or_default().push(node.id);
                }
            }
            pos_of.insert(node.id, pos);
        }

        Ok(GraphIndices { pos_of, users })
    }

    /// Returns the program-order position for the given node.
    pub fn position(&self, node: NodeId) -> Option<usize> {
        self.pos_of.get(&node).copied()
    }

    /// Returns the consumers recorded for a node, in program order.
    pub fn users_of(&self, node: NodeId) -> &[NodeId] {
        self.users
            .get(&node)
            .map(|list| list.as_slice())
            .unwrap_or(&[])
    }

    /// Node ids sorted by program-order position.
    pub fn ordered_ids(&self) -> Vec<NodeId> {
        let mut entries: Vec<_> = self.pos_of.iter().map(|(id, pos)| (*id, *pos)).collect();
        entries.sort_by_key(|&(_, pos)| pos);
        entries.into_iter().map(|(id, _)| id).collect()
    }

    pub(crate) fn insert_node(
        &mut self,
        id: NodeId,
        pos: usize,
        args: &[Argument],
    ) -> Result<(), GraphIndexError> {
        if self.pos_of.contains_key(&id) {
            return Err(GraphIndexError::DuplicateNode { node: id });
        }
        for arg in args {
            for &referenced in arg.node_refs() {
                if !self.pos_of.contains_key(&referenced) {
                    return Err(GraphIndexError::MissingNodeDefinition {
                        node: referenced,
                        user: id,
                    });
                }
            }
        }

        self.shift_positions_from(pos, 1);
        self.pos_of.insert(id, pos);
        for arg in args {
            for &referenced in arg.node_refs() {
                self.users.entry(referenced).or_default().push(id);
            }
        }
        Ok(())
    }

    /// Moves one consumer's use from `from` to `to` in the user lists.
    pub(crate) fn update_use(&mut self, consumer: NodeId, from: NodeId, to: NodeId) {
        if let Some(list) = self.users.get_mut(&from) {
            list.retain(|id| *id != consumer);
            if list.is_empty() {
                self.users.remove(&from);
            }
        }
        self.users.entry(to).or_default().push(consumer);
    }

    fn shift_positions_from(&mut self, start: usize, delta: usize) {
        for (_, pos) in self.pos_of.iter_mut() {
            if *pos >= start {
                *pos += delta;
            }
        }
    }
}

/// Errors surfaced when building structural indices for a graph.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphIndexError {
    #[error("duplicate definition for node {node:?}")]
    DuplicateNode { node: NodeId },
    #[error("node {node:?} is referenced by {user:?} but never defined")]
    MissingNodeDefinition { node: NodeId, user: NodeId },
}
