//! Arena that owns every node of one compile.
//!
//! The arena is the node table: nodes are addressed by [`NodeId`], parents
//! list their children in authored order, and the `indexKey -> NodeId` map is
//! the lookup structure every pass after indexing uses.

use std::collections::HashMap;

use serde_json::Value;

use crate::node::{Node, NodeId, NodeKind};

/// Separator used to join index keys. The root's key is the separator itself.
pub const KEY_SEPARATOR: &str = "/";

#[derive(Debug, Clone)]
pub struct NodeTree {
    nodes: Vec<Node>,
    index: HashMap<String, NodeId>,
    root: NodeId,
}

impl Default for NodeTree {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeTree {
    /// Create a tree holding only the synthetic forest root.
    pub fn new() -> Self {
        let root = Node::new(NodeKind::Root, "", Value::Null);
        Self {
            nodes: vec![root],
            index: HashMap::new(),
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        // The root is always present.
        false
    }

    pub fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    /// Iterate nodes in creation order (pre-order for authored nodes).
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + use<> {
        (0..self.nodes.len()).map(NodeId)
    }

    /// Append `node` as the last child of `parent` and return its id.
    pub fn add_child(&mut self, parent: NodeId, mut node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        node.parent = Some(parent);
        self.nodes.push(node);
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn child_at(&self, id: NodeId, index: usize) -> Option<NodeId> {
        self.nodes[id.0].children.get(index).copied()
    }

    /// Direct child of `id` whose name equals `name`.
    pub fn child_named(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .find(|c| self.nodes[c.0].name == name)
    }

    /// Walk from `id`'s parent up to the root.
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.parent(id),
        }
    }

    /// The flow root containing `id`, if any.
    pub fn flow_of(&self, id: NodeId) -> Option<NodeId> {
        if self.get(id).is_flow_root {
            return Some(id);
        }
        self.ancestors(id).find(|a| self.get(*a).is_flow_root)
    }

    /// Flow roots in document order.
    pub fn flows(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.children(self.root).iter().copied()
    }

    // -----------------------------------------------------------------------
    // Index
    // -----------------------------------------------------------------------

    /// Register `key -> id`. Returns the id already holding `key` on collision.
    pub fn register_key(&mut self, key: &str, id: NodeId) -> Result<(), NodeId> {
        if let Some(existing) = self.index.get(key) {
            if *existing != id {
                return Err(*existing);
            }
        }
        self.index.insert(key.to_string(), id);
        Ok(())
    }

    pub fn lookup(&self, key: &str) -> Option<NodeId> {
        self.index.get(key).copied()
    }

    pub fn index_len(&self) -> usize {
        self.index.len()
    }
}

/// Iterator over a node's ancestors, nearest first.
pub struct Ancestors<'a> {
    tree: &'a NodeTree,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.tree.parent(current);
        Some(current)
    }
}
