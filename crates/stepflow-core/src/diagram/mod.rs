//! Diagram generation: synthesis, layout, and projection into a
//! [`DiagramDocument`].
//!
//! Each request works on a clone of the compiled tree, so synthetic nodes
//! never leak into the compiled tree and repeated requests are identical.

pub mod layout;
pub mod serializer;
pub mod synthesizer;

use stepflow_types::config::LayoutConfig;
use stepflow_types::diagram::{
    Bounds, DiagramDocument, DiagramScope, ElementKind, FlowElement, ProcessDiagram, SequenceFlow,
};
use stepflow_types::error::CompileError;
use stepflow_types::node::{Node, NodeId};
use stepflow_types::tree::NodeTree;

use self::synthesizer::Synthesizer;

pub const DEFINITIONS_ID: &str = "Definitions_stepflow";

/// Synthesize, lay out and project `flows` into one document.
#[tracing::instrument(skip_all, fields(flows = flows.len()))]
pub fn build_document(
    tree: &NodeTree,
    flows: &[NodeId],
    config: &LayoutConfig,
) -> Result<DiagramDocument, CompileError> {
    let mut work = tree.clone();
    for &flow in flows {
        Synthesizer::new(&mut work, config).synthesize(flow)?;
    }

    let processes = flows
        .iter()
        .map(|&flow| project_process(&work, flow, config))
        .collect();
    Ok(DiagramDocument {
        id: DEFINITIONS_ID.to_string(),
        processes,
    })
}

pub fn process_id(node: &Node) -> String {
    format!("Process_{}", node.code_key)
}

pub fn element_id(node: &Node) -> String {
    let prefix = node
        .diagram_meta
        .as_ref()
        .map_or("Activity", |m| m.element.id_prefix());
    format!("{prefix}_{}", node.code_key)
}

pub fn flow_id(source: &Node, target: &Node) -> String {
    format!("Flow_{}_{}", source.code_key, target.code_key)
}

fn project_process(work: &NodeTree, flow: NodeId, config: &LayoutConfig) -> ProcessDiagram {
    let node = work.get(flow);
    let id = process_id(node);
    ProcessDiagram {
        name: node.name.clone(),
        documentation: documentation(work, flow),
        scope: project_scope(work, flow, &id, config),
        id,
    }
}

fn documentation(work: &NodeTree, flow: NodeId) -> String {
    let node = work.get(flow);
    if let Some(description) = node.field("description").and_then(|d| d.as_str()) {
        return description.to_string();
    }
    let steps = count_authored(work, flow);
    format!("Flow '{}' with {steps} step(s)", node.name)
}

fn count_authored(work: &NodeTree, id: NodeId) -> usize {
    work.children(id)
        .iter()
        .filter(|c| !work.get(**c).is_virtual)
        .map(|c| 1 + count_authored(work, *c))
        .sum()
}

fn project_scope(work: &NodeTree, scope: NodeId, scope_element: &str, config: &LayoutConfig) -> DiagramScope {
    let layout = layout::layout_scope(work, scope, config);

    let mut elements = Vec::new();
    let mut flows = Vec::new();
    let mut nested = Vec::new();

    let members: Vec<NodeId> = work
        .children(scope)
        .iter()
        .copied()
        .filter(|c| work.get(*c).diagram_meta.is_some())
        .collect();

    for &id in &members {
        let node = work.get(id);
        let Some(meta) = &node.diagram_meta else {
            continue;
        };
        let bounds = layout.bounds.get(&id).copied().unwrap_or(Bounds {
            x: config.margin,
            y: config.margin,
            width: meta.width,
            height: meta.height,
        });
        elements.push(FlowElement {
            id: element_id(node),
            name: node.name.clone(),
            kind: meta.element.clone(),
            index_key: node.index_key.clone(),
            bounds,
            style: meta.style.clone(),
            attached_to: meta.attached_to.map(|host| element_id(work.get(host))),
            incoming: Vec::new(),
            outgoing: Vec::new(),
        });
    }

    for &id in &members {
        let source = work.get(id);
        let Some(meta) = &source.diagram_meta else {
            continue;
        };
        for &target_id in &meta.edges {
            let target = work.get(target_id);
            let flow = SequenceFlow {
                id: flow_id(source, target),
                source: element_id(source),
                target: element_id(target),
                waypoints: layout
                    .waypoints
                    .get(&(id, target_id))
                    .cloned()
                    .unwrap_or_default(),
            };
            if let Some(e) = elements.iter_mut().find(|e| e.id == flow.source) {
                e.outgoing.push(flow.id.clone());
            }
            if let Some(e) = elements.iter_mut().find(|e| e.id == flow.target) {
                e.incoming.push(flow.id.clone());
            }
            flows.push(flow);
        }

        if meta.element == ElementKind::SubProcess {
            nested.push(project_scope(work, id, &element_id(source), config));
        }
    }

    DiagramScope {
        element_id: scope_element.to_string(),
        diagram_id: format!("BPMNDiagram_{scope_element}"),
        plane_id: format!("BPMNPlane_{scope_element}"),
        elements,
        flows,
        nested,
    }
}
