//! Kern datastructuren voor de VRML scene graph: velden, nodes, routes en events.

use std::fmt;

pub mod event;
pub mod node;
pub mod node_type;
pub mod route;
pub mod scope;
pub mod text;
pub mod value;

use node::{Node, NodeId};

/// Slot-arena met nodes. Een id wordt nooit hergebruikt, ook niet nadat de
/// node verwijderd is.
#[derive(Debug, Clone, Default)]
pub struct NodeArena {
    slots: Vec<Option<Node>>,
    live: usize,
}

impl NodeArena {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Voeg een node toe en geef het nieuwe id terug.
    pub fn insert(&mut self, mut node: Node) -> NodeId {
        let id = NodeId::new(self.slots.len());
        node.id = id;
        self.slots.push(Some(node));
        self.live += 1;
        id
    }

    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Haal een node uit de arena. Het slot blijft leeg achter.
    pub fn remove(&mut self, id: NodeId) -> Option<Node> {
        let removed = self.slots.get_mut(id.0).and_then(Option::take);
        if removed.is_some() {
            self.live -= 1;
        }
        removed
    }

    /// Het id dat de volgende `insert` krijgt.
    #[must_use]
    pub fn next_id(&self) -> NodeId {
        NodeId::new(self.slots.len())
    }

    /// Aantal levende nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.iter().map(|node| node.id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    /// Verhoog de referentieteller van een node.
    pub fn retain(&mut self, id: NodeId) -> Result<usize, GraphError> {
        let node = self.get_mut(id).ok_or(GraphError::UnknownNode(id))?;
        node.ref_count += 1;
        Ok(node.ref_count)
    }

    /// Verlaag de referentieteller. Geeft de nieuwe waarde terug; bij nul moet
    /// de aanroeper de node opruimen.
    pub fn release(&mut self, id: NodeId) -> Result<usize, GraphError> {
        let node = self.get_mut(id).ok_or(GraphError::UnknownNode(id))?;
        if node.ref_count == 0 {
            return Err(GraphError::NotReferenced(id));
        }
        node.ref_count -= 1;
        Ok(node.ref_count)
    }
}

/// Fouten bij het beheren van de node-arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    UnknownNode(NodeId),
    NotReferenced(NodeId),
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownNode(id) => write!(f, "node {id} niet gevonden in de scene"),
            Self::NotReferenced(id) => write!(f, "node {id} heeft geen referenties meer"),
        }
    }
}

impl std::error::Error for GraphError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node_type::{Declarations, NodeType};
    use crate::nodes::NodeClass;

    fn plain_node() -> Node {
        Node::new(NodeType::builtin(
            "WorldInfo",
            NodeClass::WorldInfo,
            Declarations::default(),
        ))
    }

    #[test]
    fn ids_are_never_reused() {
        let mut arena = NodeArena::new();
        let first = arena.insert(plain_node());
        let second = arena.insert(plain_node());
        assert!(arena.remove(first).is_some());
        let third = arena.insert(plain_node());

        assert_ne!(third, first);
        assert_ne!(third, second);
        assert_eq!(arena.len(), 2);
        assert!(!arena.contains(first));
        assert_eq!(arena.get(third).map(|node| node.id), Some(third));
    }

    #[test]
    fn reference_counting() {
        let mut arena = NodeArena::new();
        let id = arena.insert(plain_node());
        assert_eq!(arena.retain(id), Ok(1));
        assert_eq!(arena.retain(id), Ok(2));
        assert_eq!(arena.release(id), Ok(1));
        assert_eq!(arena.release(id), Ok(0));
        assert_eq!(arena.release(id), Err(GraphError::NotReferenced(id)));
        assert_eq!(
            arena.retain(NodeId::new(9)),
            Err(GraphError::UnknownNode(NodeId::new(9)))
        );
    }
}
