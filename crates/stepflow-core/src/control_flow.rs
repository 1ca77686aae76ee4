//! Successor resolution.
//!
//! Explicit `next` names win: terminal sentinels map to [`Terminal`], any
//! other name is searched among the direct children of each ancestor, nearest
//! first. Without `next`, the implicit successor is found by walking up from
//! the node and consulting each container's fallthrough policy:
//!
//! | policy            | behaviour                                           |
//! |-------------------|-----------------------------------------------------|
//! | none              | next sibling if any, else ascend                    |
//! | sealed (parallel) | stop, no successor                                  |
//! | bounded (loop)    | next sibling if any, never ascend                   |
//! | passthrough       | ascend without looking at siblings                  |
//!
//! Flow roots and module imports never receive an implicit successor, and
//! module imports are skipped when looking for the next sibling.

use stepflow_types::error::{CompileError, CompileWarning};
use stepflow_types::node::{FallthroughMode, FallthroughPolicy, NodeId, Successor, Terminal};
use stepflow_types::tree::NodeTree;
use tracing::warn;

/// Resolve the successor of every node. Returns the non-fatal warnings, or an
/// error for the first unresolved target when `strict` is set.
#[tracing::instrument(skip_all, fields(strict = strict))]
pub fn resolve_successors(
    tree: &mut NodeTree,
    strict: bool,
) -> Result<Vec<CompileWarning>, CompileError> {
    let mut warnings = Vec::new();
    let root = tree.root();

    for id in tree.ids() {
        if id == root || tree.get(id).is_virtual {
            continue;
        }
        let successor = successor_of(tree, id);
        if let Some(Successor::Unresolved(target)) = &successor {
            let index_key = tree.get(id).index_key.clone();
            if strict {
                return Err(CompileError::UnresolvedNamedTarget {
                    index_key,
                    target: target.clone(),
                });
            }
            warn!(step = %index_key, target = %target, "Unresolved next target");
            warnings.push(CompileWarning::UnresolvedNamedTarget {
                index_key,
                target: target.clone(),
            });
        }
        tree.get_mut(id).successor = successor;
    }

    Ok(warnings)
}

/// Successor of a single node; reads only the tree shape and `next` fields.
pub fn successor_of(tree: &NodeTree, id: NodeId) -> Option<Successor> {
    let node = tree.get(id);

    if let Some(next) = node.next_field() {
        if let Some(terminal) = Terminal::parse(next) {
            return Some(Successor::Terminal(terminal));
        }
        return Some(match find_named(tree, id, next) {
            Some(target) => Successor::Node(target),
            None => Successor::Unresolved(next.to_string()),
        });
    }

    if node.is_flow_root || node.is_module_import {
        return None;
    }
    implicit_successor(tree, id).map(Successor::Node)
}

/// Nearest ancestor child named `name`.
pub fn find_named(tree: &NodeTree, id: NodeId, name: &str) -> Option<NodeId> {
    tree.ancestors(id).find_map(|a| tree.child_named(a, name))
}

fn implicit_successor(tree: &NodeTree, id: NodeId) -> Option<NodeId> {
    let mut cursor = tree.parent(id)?;
    let mut want = tree.get(id).sibling_index + 1;

    // The forest root is never a fallthrough scope: flows do not chain.
    while let Some(above) = tree.parent(cursor) {
        let container = tree.get(cursor);
        match FallthroughPolicy::mode(container.fallthrough) {
            FallthroughMode::Sealed => return None,
            FallthroughMode::Bounded => return chainable_child(tree, cursor, want),
            FallthroughMode::Open => {
                if let Some(next) = chainable_child(tree, cursor, want) {
                    return Some(next);
                }
            }
            FallthroughMode::Passthrough => {}
        }
        want = container.sibling_index + 1;
        cursor = above;
    }
    None
}

/// First child of `parent` at or after `from` that can be chained to.
fn chainable_child(tree: &NodeTree, parent: NodeId, from: usize) -> Option<NodeId> {
    tree.children(parent)
        .iter()
        .skip(from)
        .copied()
        .find(|c| {
            let child = tree.get(*c);
            !child.is_module_import && !child.is_virtual
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::index_tree;
    use crate::registry::BlockRegistry;
    use crate::tree_builder::{TreeBuilder, parse_document};

    fn resolved(yaml: &str) -> (NodeTree, Vec<CompileWarning>) {
        let registry = BlockRegistry::default();
        let doc = parse_document(yaml).unwrap();
        let mut tree = TreeBuilder::new(&registry).build(&doc).unwrap();
        index_tree(&mut tree).unwrap();
        let warnings = resolve_successors(&mut tree, false).unwrap();
        (tree, warnings)
    }

    fn key(tree: &NodeTree, k: &str) -> NodeId {
        tree.lookup(k).unwrap_or_else(|| panic!("missing {k}"))
    }

    fn succ(tree: &NodeTree, k: &str) -> Option<Successor> {
        tree.get(key(tree, k)).successor.clone()
    }

    #[test]
    fn test_linear_chain() {
        let (tree, warnings) = resolved(
            "main:\n  - a: { assign: [] }\n  - b: { assign: [] }\n  - c: { assign: [] }\n",
        );
        assert!(warnings.is_empty());
        assert_eq!(succ(&tree, "/main/a"), Some(Successor::Node(key(&tree, "/main/b"))));
        assert_eq!(succ(&tree, "/main/b"), Some(Successor::Node(key(&tree, "/main/c"))));
        assert_eq!(succ(&tree, "/main/c"), None);
        assert_eq!(succ(&tree, "/main"), None);
    }

    #[test]
    fn test_branch_falls_through_to_parent_sibling() {
        let (tree, _) = resolved(
            r#"
main:
  - check:
      condition: "js:x > 1"
      steps:
        - inner: { assign: [] }
  - after: { assign: [] }
"#,
        );
        let after = key(&tree, "/main/after");
        assert_eq!(succ(&tree, "/main/check/inner"), Some(Successor::Node(after)));
        assert_eq!(succ(&tree, "/main/check"), Some(Successor::Node(after)));
    }

    #[test]
    fn test_try_and_handler_pass_through_to_step_after_try() {
        let (tree, warnings) = resolved(
            r#"
main:
  - guarded:
      try:
        - t1: { assign: [] }
      except:
        steps:
          - e1: { assign: [] }
  - after: { assign: [] }
"#,
        );
        assert!(warnings.is_empty());
        let after = key(&tree, "/main/after");
        assert_eq!(succ(&tree, "/main/guarded/try/t1"), Some(Successor::Node(after)));
        assert_eq!(succ(&tree, "/main/guarded/except/e1"), Some(Successor::Node(after)));
        assert_eq!(succ(&tree, "/main/guarded"), Some(Successor::Node(after)));
    }

    #[test]
    fn test_fallthrough_ascends_one_level_at_a_time() {
        let (tree, _) = resolved(
            r#"
main:
  - outer:
      steps:
        - inner:
            steps:
              - deep: { assign: [] }
  - after: { assign: [] }
"#,
        );
        let after = key(&tree, "/main/after");
        assert_eq!(succ(&tree, "/main/outer/inner/deep"), Some(Successor::Node(after)));
        assert_eq!(succ(&tree, "/main/outer/inner"), Some(Successor::Node(after)));

        // A sibling at an intermediate level is reached before the outer one.
        let (tree, _) = resolved(
            r#"
main:
  - outer:
      steps:
        - inner:
            steps:
              - deep: { assign: [] }
        - tail: { assign: [] }
  - after: { assign: [] }
"#,
        );
        assert_eq!(
            succ(&tree, "/main/outer/inner/deep"),
            Some(Successor::Node(key(&tree, "/main/outer/tail")))
        );
        assert_eq!(
            succ(&tree, "/main/outer/tail"),
            Some(Successor::Node(key(&tree, "/main/after")))
        );
    }

    #[test]
    fn test_loop_body_is_bounded() {
        let (tree, _) = resolved(
            r#"
main:
  - each:
      for: { in: "var:items", steps: [ { one: { assign: [] } }, { two: { assign: [] } } ] }
  - after: { assign: [] }
"#,
        );
        assert_eq!(
            succ(&tree, "/main/each/one"),
            Some(Successor::Node(key(&tree, "/main/each/two")))
        );
        assert_eq!(succ(&tree, "/main/each/two"), None);
        assert_eq!(
            succ(&tree, "/main/each"),
            Some(Successor::Node(key(&tree, "/main/after")))
        );
    }

    #[test]
    fn test_parallel_branches_are_sealed() {
        let (tree, _) = resolved(
            r#"
main:
  - fan:
      parallel:
        - left: { assign: [] }
        - right: { assign: [] }
  - join: { assign: [] }
"#,
        );
        assert_eq!(succ(&tree, "/main/fan/left"), None);
        assert_eq!(succ(&tree, "/main/fan/right"), None);
        assert_eq!(
            succ(&tree, "/main/fan"),
            Some(Successor::Node(key(&tree, "/main/join")))
        );
    }

    #[test]
    fn test_switch_cases_pass_through() {
        let (tree, _) = resolved(
            r#"
main:
  - route:
      switch:
        - name: big
          condition: "js:x > 10"
          steps:
            - s1: { assign: [] }
        - name: small
          condition: "js:x <= 10"
  - after: { assign: [] }
"#,
        );
        let after = key(&tree, "/main/after");
        // A case does not fall into the next case.
        assert_eq!(succ(&tree, "/main/route/big"), Some(Successor::Node(after)));
        assert_eq!(succ(&tree, "/main/route/big/s1"), Some(Successor::Node(after)));
    }

    #[test]
    fn test_module_imports_are_skipped() {
        let (tree, _) = resolved(
            r#"
main:
  - a: { assign: [] }
  - lib: { module: "npm:lodash" }
  - b: { assign: [] }
"#,
        );
        assert_eq!(succ(&tree, "/main/a"), Some(Successor::Node(key(&tree, "/main/b"))));
        assert_eq!(succ(&tree, "/main/lib"), None);
    }

    #[test]
    fn test_explicit_next_searches_ancestors() {
        let (tree, warnings) = resolved(
            r#"
main:
  - outer:
      steps:
        - jump_out: { next: done }
  - skipped: { assign: [] }
  - done: { next: end }
  - lost: { next: nowhere }
  - quiet: { next: none }
"#,
        );
        assert_eq!(
            succ(&tree, "/main/outer/jump_out"),
            Some(Successor::Node(key(&tree, "/main/done")))
        );
        assert_eq!(succ(&tree, "/main/done"), Some(Successor::Terminal(Terminal::End)));
        assert_eq!(succ(&tree, "/main/quiet"), Some(Successor::Terminal(Terminal::None)));
        assert_eq!(
            succ(&tree, "/main/lost"),
            Some(Successor::Unresolved("nowhere".to_string()))
        );
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_strict_mode_rejects_unresolved_target() {
        let registry = BlockRegistry::default();
        let doc = parse_document("main:\n  - a: { next: ghost }\n").unwrap();
        let mut tree = TreeBuilder::new(&registry).build(&doc).unwrap();
        index_tree(&mut tree).unwrap();
        let err = resolve_successors(&mut tree, true).unwrap_err();
        assert!(matches!(
            err,
            CompileError::UnresolvedNamedTarget { ref target, .. } if target == "ghost"
        ));
    }
}
