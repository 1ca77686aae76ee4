//! Turns resolved successors into per-scope diagram graphs.
//!
//! Runs on a working copy of the tree. Every container with children is a
//! scope; scopes are processed bottom-up so a parent sees what its nested
//! scopes leave behind. Within a scope, in order:
//!
//! 1. steps carrying an inline `return` get their own nameless end event
//! 2. successors become edges (inside the scope) or leaving targets (outside);
//!    `end` / `stop` become named end events; `raise` gets an error end
//! 3. category wiring: catch events in front of module imports, boundary
//!    events on the `try` child of a try scope, then the scope's entries
//!    (parallel fork/join, switch gateway, or a plain start event)
//! 4. leaving targets become end events named after the target
//! 5. any remaining node without an outgoing edge gets a nameless end
//! 6. nodes with more than one outgoing edge get an exclusive gateway
//!
//! The leaving targets of a scope, deduplicated, are returned to the parent.

use stepflow_types::config::LayoutConfig;
use stepflow_types::diagram::{DiagramMeta, ElementKind, StyleHint};
use stepflow_types::error::CompileError;
use stepflow_types::node::{Node, NodeId, NodeKind, RefTarget, Successor, Terminal};
use stepflow_types::tree::NodeTree;

use crate::indexer::index_node;

pub const USER_TASK_FILL: &str = "#e3f2fd";
pub const SERVICE_TASK_FILL: &str = "#fff8e1";
pub const ERROR_STROKE: &str = "#d32f2f";
pub const CATCH_STROKE: &str = "#1e88e5";

/// Label of the end event a switch routes to when no case matches and the
/// switch has no named successor.
pub const SWITCH_CONTINUE: &str = "continue";

/// True when `id` is laid out as its own scope.
pub fn is_scope(tree: &NodeTree, id: NodeId) -> bool {
    let node = tree.get(id);
    node.is_flow_root
        || (node.kind.is_container()
            && tree.children(id).iter().any(|c| !tree.get(*c).is_virtual))
}

pub struct Synthesizer<'a> {
    tree: &'a mut NodeTree,
    layout: &'a LayoutConfig,
}

impl<'a> Synthesizer<'a> {
    pub fn new(tree: &'a mut NodeTree, layout: &'a LayoutConfig) -> Self {
        Self { tree, layout }
    }

    /// Synthesize `scope` and everything nested in it. Returns the targets
    /// outside `scope` that its children leave to.
    pub fn synthesize(&mut self, scope: NodeId) -> Result<Vec<NodeId>, CompileError> {
        let authored: Vec<NodeId> = self
            .tree
            .children(scope)
            .iter()
            .copied()
            .filter(|c| !self.tree.get(*c).is_virtual)
            .collect();

        let mut nested_exits = Vec::with_capacity(authored.len());
        for &child in &authored {
            let exits = if is_scope(self.tree, child) {
                self.synthesize(child)?
            } else {
                Vec::new()
            };
            nested_exits.push(exits);
        }
        for &child in &authored {
            let meta = self.meta_for(child);
            self.tree.get_mut(child).diagram_meta = Some(meta);
        }

        let scope_kind = self.tree.get(scope).kind;
        let mut finished = vec![false; authored.len()];

        if scope_kind != NodeKind::Parallel {
            // 1. inline returns
            for (i, &child) in authored.iter().enumerate() {
                if self.tree.get(child).has_embedded_return() {
                    let end = self.add_virtual(scope, NodeKind::SyntheticEnd { error: false }, "")?;
                    self.connect(child, end);
                    finished[i] = true;
                }
            }

            // 2. successors
            for (i, &child) in authored.iter().enumerate() {
                if finished[i] {
                    continue;
                }
                let node = self.tree.get(child);
                if node.kind == NodeKind::Raise {
                    let label = raise_label(node);
                    let end = self.add_virtual(scope, NodeKind::SyntheticEnd { error: true }, &label)?;
                    self.connect(child, end);
                    finished[i] = true;
                    continue;
                }

                let mut targets = Vec::new();
                match &node.successor {
                    Some(Successor::Node(target)) => targets.push(Ok(*target)),
                    Some(Successor::Terminal(t @ (Terminal::End | Terminal::Stop))) => {
                        targets.push(Err(*t))
                    }
                    _ => {}
                }
                targets.extend(nested_exits[i].iter().copied().map(Ok));

                for target in targets {
                    match target {
                        Ok(t) if self.tree.parent(t) == Some(scope) => self.connect(child, t),
                        Ok(t) => {
                            if let Some(meta) = self.tree.get_mut(child).diagram_meta.as_mut() {
                                meta.add_leaving(t);
                            }
                        }
                        Err(terminal) => {
                            let end = self.add_virtual(
                                scope,
                                NodeKind::SyntheticEnd { error: false },
                                terminal.as_str(),
                            )?;
                            self.connect(child, end);
                        }
                    }
                }
            }
        }

        // 3. category wiring
        for &child in &authored {
            if self.tree.get(child).is_module_import {
                let name = self.tree.get(child).name.clone();
                let catch = self.add_virtual(scope, NodeKind::SyntheticCatch, &name)?;
                self.connect(catch, child);
            }
        }

        if scope_kind == NodeKind::Try {
            let host = authored
                .iter()
                .copied()
                .find(|c| self.tree.get(*c).name == "try" && self.tree.get(*c).kind == NodeKind::Group);
            if let Some(host) = host {
                for &handler in &authored {
                    if self.tree.get(handler).kind != NodeKind::Except {
                        continue;
                    }
                    let name = self.tree.get(handler).name.clone();
                    let boundary = self.add_virtual(scope, NodeKind::SyntheticBoundary, &name)?;
                    if let Some(meta) = self.tree.get_mut(boundary).diagram_meta.as_mut() {
                        meta.attached_to = Some(host);
                    }
                    self.connect(boundary, handler);
                }
            }
        }

        let eligible: Vec<NodeId> = authored
            .iter()
            .copied()
            .filter(|c| {
                let node = self.tree.get(*c);
                !node.is_module_import && node.kind != NodeKind::Except
            })
            .collect();

        match scope_kind {
            NodeKind::Parallel => self.wire_parallel(scope, &eligible)?,
            NodeKind::Switch => self.wire_switch(scope, &eligible)?,
            _ => {
                if let Some(&first) = eligible.first() {
                    let start = self.add_virtual(scope, NodeKind::SyntheticStart, "")?;
                    self.connect(start, first);
                }
            }
        }

        if scope_kind != NodeKind::Parallel {
            // 4. leaving targets become named end events
            for (i, &child) in authored.iter().enumerate() {
                if finished[i] {
                    continue;
                }
                let leaving = self
                    .tree
                    .get(child)
                    .diagram_meta
                    .as_ref()
                    .map(|m| m.leaving.clone())
                    .unwrap_or_default();
                for target in leaving {
                    let name = self.tree.get(target).name.clone();
                    let end = self.add_virtual(scope, NodeKind::SyntheticEnd { error: false }, &name)?;
                    self.connect(child, end);
                }
            }

            // 5. sinks
            for (i, &child) in authored.iter().enumerate() {
                if finished[i] || !self.edges(child).is_empty() {
                    continue;
                }
                let end = self.add_virtual(scope, NodeKind::SyntheticEnd { error: false }, "")?;
                self.connect(child, end);
            }
        }

        // 6. decision gateways
        for &child in &authored {
            let edges = self.edges(child);
            if edges.len() < 2 {
                continue;
            }
            let gateway = self.add_virtual(scope, NodeKind::SyntheticGateway { parallel: false }, "")?;
            if let Some(meta) = self.tree.get_mut(child).diagram_meta.as_mut() {
                meta.edges.clear();
            }
            self.connect(child, gateway);
            for target in edges {
                self.connect(gateway, target);
            }
        }

        let mut exits: Vec<NodeId> = Vec::new();
        for &child in &authored {
            if let Some(meta) = &self.tree.get(child).diagram_meta {
                for target in &meta.leaving {
                    if !exits.contains(target) {
                        exits.push(*target);
                    }
                }
            }
        }
        tracing::trace!(scope = %self.tree.get(scope).index_key, exits = exits.len(), "Scope synthesized");
        Ok(exits)
    }

    /// start -> fork -> every branch -> join -> end. Branch edges of their
    /// own are discarded and nothing leaves a parallel scope.
    fn wire_parallel(&mut self, scope: NodeId, branches: &[NodeId]) -> Result<(), CompileError> {
        let start = self.add_virtual(scope, NodeKind::SyntheticStart, "")?;
        let fork = self.add_virtual(scope, NodeKind::SyntheticGateway { parallel: true }, "")?;
        let join = self.add_virtual(scope, NodeKind::SyntheticGateway { parallel: true }, "")?;
        let end = self.add_virtual(scope, NodeKind::SyntheticEnd { error: false }, "")?;
        self.connect(start, fork);
        for &branch in branches {
            if let Some(meta) = self.tree.get_mut(branch).diagram_meta.as_mut() {
                meta.edges.clear();
                meta.leaving.clear();
            }
            self.connect(fork, branch);
            self.connect(branch, join);
        }
        self.connect(join, end);
        Ok(())
    }

    /// start -> gateway -> every case, plus a "continue" end for no match.
    fn wire_switch(&mut self, scope: NodeId, cases: &[NodeId]) -> Result<(), CompileError> {
        let label = match &self.tree.get(scope).successor {
            Some(Successor::Node(next)) => self.tree.get(*next).name.clone(),
            _ => SWITCH_CONTINUE.to_string(),
        };
        let start = self.add_virtual(scope, NodeKind::SyntheticStart, "")?;
        let gateway = self.add_virtual(scope, NodeKind::SyntheticGateway { parallel: false }, "")?;
        let fallback = self.add_virtual(scope, NodeKind::SyntheticEnd { error: false }, &label)?;
        self.connect(start, gateway);
        for &case in cases {
            self.connect(gateway, case);
        }
        self.connect(gateway, fallback);
        Ok(())
    }

    fn edges(&self, id: NodeId) -> Vec<NodeId> {
        self.tree
            .get(id)
            .diagram_meta
            .as_ref()
            .map(|m| m.edges.clone())
            .unwrap_or_default()
    }

    fn connect(&mut self, source: NodeId, target: NodeId) {
        if let Some(meta) = self.tree.get_mut(source).diagram_meta.as_mut() {
            meta.add_edge(target);
        }
    }

    fn add_virtual(&mut self, scope: NodeId, kind: NodeKind, name: &str) -> Result<NodeId, CompileError> {
        let id = self.tree.add_child(scope, Node::synthetic(kind, name));
        index_node(self.tree, id)?;
        let meta = self.meta_for(id);
        self.tree.get_mut(id).diagram_meta = Some(meta);
        Ok(id)
    }

    fn meta_for(&self, id: NodeId) -> DiagramMeta {
        let node = self.tree.get(id);
        let task = |element| DiagramMeta::new(element, self.layout.node_width, self.layout.node_height);
        let marker = |element| DiagramMeta::new(element, self.layout.marker_size, self.layout.marker_size);

        match node.kind {
            NodeKind::SyntheticStart => marker(ElementKind::StartEvent),
            NodeKind::SyntheticEnd { error } => marker(ElementKind::EndEvent { error })
                .with_style(error.then(|| StyleHint::stroke(ERROR_STROKE))),
            NodeKind::SyntheticGateway { parallel: true } => marker(ElementKind::ParallelGateway),
            NodeKind::SyntheticGateway { parallel: false } => marker(ElementKind::ExclusiveGateway),
            NodeKind::SyntheticBoundary => {
                marker(ElementKind::BoundaryEvent).with_style(Some(StyleHint::stroke(ERROR_STROKE)))
            }
            NodeKind::SyntheticCatch => marker(ElementKind::IntermediateCatchEvent)
                .with_style(Some(StyleHint::stroke(CATCH_STROKE))),
            _ if is_scope(self.tree, id) => task(ElementKind::SubProcess),
            NodeKind::Form => task(ElementKind::UserTask).with_style(Some(StyleHint::fill(USER_TASK_FILL))),
            NodeKind::Call | NodeKind::Module => match &node.target {
                Some(RefTarget::Local(target)) => task(ElementKind::CallActivity {
                    called_element: self.tree.get(*target).name.clone(),
                }),
                _ => task(ElementKind::ServiceTask)
                    .with_style(Some(StyleHint::fill(SERVICE_TASK_FILL))),
            },
            NodeKind::Integration => {
                task(ElementKind::ServiceTask).with_style(Some(StyleHint::fill(SERVICE_TASK_FILL)))
            }
            _ => task(ElementKind::Task),
        }
    }
}

fn raise_label(node: &Node) -> String {
    match node.field("raise") {
        Some(serde_json::Value::String(message)) => message.clone(),
        _ => node.name.clone(),
    }
}
