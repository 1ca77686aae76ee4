//! Builds the step tree from a parsed workflow document.
//!
//! The document is a mapping of flow name to either a sequence of steps or a
//! mapping carrying `steps` (plus optional `description` / `params`). Every
//! step is a single-key mapping `- name: body`; the body is classified through
//! the [`BlockRegistry`] and container kinds recurse into their children.

use serde_json::Value;
use stepflow_types::error::CompileError;
use stepflow_types::node::{Node, NodeId, NodeKind};
use stepflow_types::tree::{KEY_SEPARATOR, NodeTree};
use tracing::debug;

use crate::registry::BlockRegistry;

/// Parse YAML text into a generic document value.
pub fn parse_document(yaml: &str) -> Result<Value, CompileError> {
    serde_yaml_ng::from_str(yaml).map_err(|e| CompileError::Parse(e.to_string()))
}

pub struct TreeBuilder<'a> {
    registry: &'a BlockRegistry,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(registry: &'a BlockRegistry) -> Self {
        Self { registry }
    }

    /// Build the forest: one flow root per top-level key, in document order.
    #[tracing::instrument(skip_all)]
    pub fn build(&self, document: &Value) -> Result<NodeTree, CompileError> {
        let flows = document.as_object().ok_or_else(|| {
            CompileError::InvalidDocument("top level must map flow names to steps".to_string())
        })?;

        let mut tree = NodeTree::new();
        let root = tree.root();
        for (name, body) in flows {
            let steps = match body {
                Value::Array(_) => body,
                Value::Object(map) => map.get("steps").ok_or_else(|| {
                    CompileError::InvalidDocument(format!("flow '{name}' has no steps"))
                })?,
                _ => {
                    return Err(CompileError::InvalidDocument(format!(
                        "flow '{name}' must be a sequence of steps or a mapping with steps"
                    )));
                }
            };

            reject_reserved_name(name, &child_key(KEY_SEPARATOR, name))?;
            let mut node = Node::new(NodeKind::Flow, name.as_str(), body.clone());
            node.is_flow_root = true;
            let id = tree.add_child(root, node);
            let key = child_key(KEY_SEPARATOR, name);
            self.build_steps(&mut tree, id, steps, &key)?;
        }

        debug!(flows = flows.len(), nodes = tree.len(), "Step tree built");
        Ok(tree)
    }

    fn build_steps(
        &self,
        tree: &mut NodeTree,
        parent: NodeId,
        steps: &Value,
        parent_key: &str,
    ) -> Result<(), CompileError> {
        let items = steps.as_array().ok_or_else(|| {
            CompileError::InvalidDocument(format!("'{parent_key}': steps must be a sequence"))
        })?;
        for item in items {
            let (name, body) = single_entry(item, parent_key)?;
            self.build_step(tree, parent, name, body, parent_key)?;
        }
        Ok(())
    }

    fn build_step(
        &self,
        tree: &mut NodeTree,
        parent: NodeId,
        name: &str,
        body: &Value,
        parent_key: &str,
    ) -> Result<NodeId, CompileError> {
        let key = child_key(parent_key, name);
        reject_reserved_name(name, &key)?;
        let kind = self
            .registry
            .classify(body)
            .ok_or_else(|| CompileError::UnrecognizedBlockKind {
                index_key: key.clone(),
            })?;

        let mut node = Node::new(kind.node_kind(), name, body.clone());
        kind.classify(&mut node);
        let id = tree.add_child(parent, node);

        match tree.get(id).kind {
            NodeKind::Module => {
                // Inline module definition; a string is an import.
                if let Some(steps) = body.get("module").and_then(|m| m.get("steps")) {
                    self.build_steps(tree, id, steps, &key)?;
                }
            }
            NodeKind::Parallel => match &body["parallel"] {
                branches @ Value::Array(_) => self.build_steps(tree, id, branches, &key)?,
                Value::Object(map) if map.contains_key("branches") => {
                    self.build_steps(tree, id, &map["branches"], &key)?
                }
                _ => {
                    return Err(CompileError::InvalidDocument(format!(
                        "'{key}': parallel needs a sequence of branches"
                    )));
                }
            },
            NodeKind::Try => self.build_try(tree, id, body, &key)?,
            NodeKind::Loop => {
                let steps = body["for"].get("steps").or_else(|| body.get("steps"));
                if let Some(steps) = steps {
                    self.build_steps(tree, id, steps, &key)?;
                }
            }
            NodeKind::Switch => {
                let cases = body["switch"].as_array().ok_or_else(|| {
                    CompileError::InvalidDocument(format!("'{key}': switch needs a sequence of cases"))
                })?;
                for (i, case) in cases.iter().enumerate() {
                    let case_name = case
                        .get("name")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("case_{}", i + 1));
                    self.build_step(tree, id, &case_name, case, &key)?;
                }
            }
            NodeKind::Branch | NodeKind::Group => {
                if let Some(steps) = body.get("steps") {
                    self.build_steps(tree, id, steps, &key)?;
                }
            }
            _ => {}
        }

        Ok(id)
    }

    /// `try` becomes a group child named `try`; handlers become `except`
    /// (single mapping) or `except_0..` (sequence) children.
    fn build_try(
        &self,
        tree: &mut NodeTree,
        id: NodeId,
        body: &Value,
        key: &str,
    ) -> Result<(), CompileError> {
        let try_body = &body["try"];
        let group = tree.add_child(id, Node::new(NodeKind::Group, "try", try_body.clone()));
        let try_key = child_key(key, "try");
        match try_body {
            Value::Array(_) => self.build_steps(tree, group, try_body, &try_key)?,
            Value::Object(map) => {
                if let Some(steps) = map.get("steps") {
                    self.build_steps(tree, group, steps, &try_key)?;
                }
            }
            _ => {
                return Err(CompileError::InvalidDocument(format!(
                    "'{key}': try needs a sequence of steps"
                )));
            }
        }

        match body.get("except") {
            None | Some(Value::Null) => {}
            Some(handler @ Value::Object(_)) => self.build_except(tree, id, "except", handler, key)?,
            Some(Value::Array(handlers)) => {
                for (i, handler) in handlers.iter().enumerate() {
                    self.build_except(tree, id, &format!("except_{i}"), handler, key)?;
                }
            }
            Some(_) => {
                return Err(CompileError::InvalidDocument(format!(
                    "'{key}': except must be a mapping or a sequence of mappings"
                )));
            }
        }
        Ok(())
    }

    fn build_except(
        &self,
        tree: &mut NodeTree,
        parent: NodeId,
        name: &str,
        handler: &Value,
        key: &str,
    ) -> Result<(), CompileError> {
        let id = tree.add_child(parent, Node::new(NodeKind::Except, name, handler.clone()));
        if let Some(steps) = handler.get("steps") {
            self.build_steps(tree, id, steps, &child_key(key, name))?;
        }
        Ok(())
    }
}

fn child_key(parent_key: &str, name: &str) -> String {
    if parent_key == KEY_SEPARATOR {
        format!("{KEY_SEPARATOR}{name}")
    } else {
        format!("{parent_key}{KEY_SEPARATOR}{name}")
    }
}

/// `#` starts the key segment of synthetic diagram nodes.
fn reject_reserved_name(name: &str, key: &str) -> Result<(), CompileError> {
    if name.starts_with('#') {
        return Err(CompileError::InvalidDocument(format!(
            "'{key}': step names may not start with '#'"
        )));
    }
    Ok(())
}

fn single_entry<'v>(item: &'v Value, parent_key: &str) -> Result<(&'v str, &'v Value), CompileError> {
    match item.as_object() {
        Some(map) if map.len() == 1 => {
            let (name, body) = map.iter().next().ok_or_else(|| {
                CompileError::InvalidDocument(format!("'{parent_key}': empty step"))
            })?;
            Ok((name.as_str(), body))
        }
        _ => Err(CompileError::InvalidDocument(format!(
            "'{parent_key}': each step must be a single-key mapping `- name: body`"
        ))),
    }
}
