//! Assigns positional identity to every node.
//!
//! Pre-order walk from the root. For each node: sibling index, depth, the
//! slash-joined `index_key` (registered in the tree's lookup map), the
//! dot-joined `path_key`, its `_`-joined `code_key` twin, and a fresh random
//! `unique_id`. Synthetic nodes appended later are indexed the same way with
//! [`index_node`], using `#<sibling index>` as their key segment.

use stepflow_types::error::CompileError;
use stepflow_types::node::NodeId;
use stepflow_types::tree::{KEY_SEPARATOR, NodeTree};
use uuid::Uuid;

#[tracing::instrument(skip_all)]
pub fn index_tree(tree: &mut NodeTree) -> Result<(), CompileError> {
    let mut stack = vec![tree.root()];
    while let Some(id) = stack.pop() {
        index_node(tree, id)?;
        stack.extend(tree.children(id).iter().rev().copied());
    }
    tracing::debug!(keys = tree.index_len(), "Tree indexed");
    Ok(())
}

/// Index one node from its (already indexed) parent.
pub fn index_node(tree: &mut NodeTree, id: NodeId) -> Result<(), CompileError> {
    let (index_key, path_key, code_key, sibling_index, depth) = match tree.parent(id) {
        None => (KEY_SEPARATOR.to_string(), String::new(), String::new(), 0, 0),
        Some(parent) => {
            let sibling_index = tree
                .children(parent)
                .iter()
                .position(|c| *c == id)
                .unwrap_or_default();
            let node = tree.get(id);
            let segment = if node.is_virtual {
                format!("#{sibling_index}")
            } else {
                node.name.clone()
            };
            let p = tree.get(parent);
            if p.parent.is_none() {
                (
                    format!("{KEY_SEPARATOR}{segment}"),
                    sibling_index.to_string(),
                    sibling_index.to_string(),
                    sibling_index,
                    1,
                )
            } else {
                (
                    format!("{}{KEY_SEPARATOR}{segment}", p.index_key),
                    format!("{}.{sibling_index}", p.path_key),
                    format!("{}_{sibling_index}", p.code_key),
                    sibling_index,
                    p.depth + 1,
                )
            }
        }
    };

    tree.register_key(&index_key, id)
        .map_err(|_| CompileError::DuplicateIndexKey(index_key.clone()))?;

    let node = tree.get_mut(id);
    node.sibling_index = sibling_index;
    node.depth = depth;
    node.index_key = index_key;
    node.path_key = path_key;
    node.code_key = code_key;
    node.unique_id = Uuid::new_v4();
    Ok(())
}
