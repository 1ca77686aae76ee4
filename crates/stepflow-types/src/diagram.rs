//! Process diagram types.
//!
//! [`DiagramMeta`] is the per-node scratch data the synthesizer and layout
//! engine fill on a working copy of the tree. [`DiagramDocument`] is the
//! positioned, serializer-ready result: one process per flow, one nested
//! scope per sub-process.

use serde::{Deserialize, Serialize};

use crate::node::NodeId;

// ---------------------------------------------------------------------------
// Element categories
// ---------------------------------------------------------------------------

/// Category of a diagram element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ElementKind {
    Task,
    UserTask,
    ServiceTask,
    /// Call of a locally defined flow.
    #[serde(rename_all = "camelCase")]
    CallActivity { called_element: String },
    StartEvent,
    EndEvent { error: bool },
    ExclusiveGateway,
    ParallelGateway,
    BoundaryEvent,
    IntermediateCatchEvent,
    SubProcess,
}

impl ElementKind {
    /// Local element name in the BPMN model namespace.
    pub fn tag(&self) -> &'static str {
        match self {
            ElementKind::Task => "task",
            ElementKind::UserTask => "userTask",
            ElementKind::ServiceTask => "serviceTask",
            ElementKind::CallActivity { .. } => "callActivity",
            ElementKind::StartEvent => "startEvent",
            ElementKind::EndEvent { .. } => "endEvent",
            ElementKind::ExclusiveGateway => "exclusiveGateway",
            ElementKind::ParallelGateway => "parallelGateway",
            ElementKind::BoundaryEvent => "boundaryEvent",
            ElementKind::IntermediateCatchEvent => "intermediateCatchEvent",
            ElementKind::SubProcess => "subProcess",
        }
    }

    /// Prefix used when deriving element ids.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            ElementKind::StartEvent
            | ElementKind::EndEvent { .. }
            | ElementKind::BoundaryEvent
            | ElementKind::IntermediateCatchEvent => "Event",
            ElementKind::ExclusiveGateway | ElementKind::ParallelGateway => "Gateway",
            _ => "Activity",
        }
    }

    pub fn is_event(&self) -> bool {
        self.id_prefix() == "Event"
    }
}

/// Optional colour hints, emitted as `bioc:fill` / `bioc:stroke`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleHint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<String>,
}

impl StyleHint {
    pub fn fill(color: &str) -> Self {
        Self {
            fill: Some(color.to_string()),
            stroke: None,
        }
    }

    pub fn stroke(color: &str) -> Self {
        Self {
            fill: None,
            stroke: Some(color.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-node synthesis data
// ---------------------------------------------------------------------------

/// Diagram data attached to a node during synthesis.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagramMeta {
    pub element: ElementKind,
    pub width: f64,
    pub height: f64,
    /// Outgoing edges, deduplicated by target.
    pub edges: Vec<NodeId>,
    /// Targets outside the node's scope, deduplicated.
    pub leaving: Vec<NodeId>,
    pub style: Option<StyleHint>,
    /// Host activity of a boundary event.
    pub attached_to: Option<NodeId>,
}

impl DiagramMeta {
    pub fn new(element: ElementKind, width: f64, height: f64) -> Self {
        Self {
            element,
            width,
            height,
            edges: Vec::new(),
            leaving: Vec::new(),
            style: None,
            attached_to: None,
        }
    }

    pub fn with_style(mut self, style: Option<StyleHint>) -> Self {
        self.style = style;
        self
    }

    /// Add an outgoing edge; a second edge to the same target is dropped.
    pub fn add_edge(&mut self, target: NodeId) -> bool {
        if self.edges.contains(&target) {
            return false;
        }
        self.edges.push(target);
        true
    }

    pub fn add_leaving(&mut self, target: NodeId) -> bool {
        if self.leaving.contains(&target) {
            return false;
        }
        self.leaving.push(target);
        true
    }
}

// ---------------------------------------------------------------------------
// Positioned document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn center_y(&self) -> f64 {
        self.y + self.height / 2.0
    }

    pub fn center_x(&self) -> f64 {
        self.x + self.width / 2.0
    }

    pub fn overlaps(&self, other: &Bounds) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// A positioned flow element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowElement {
    pub id: String,
    pub name: String,
    pub kind: ElementKind,
    /// Index key of the node this element was built from.
    pub index_key: String,
    pub bounds: Bounds,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<StyleHint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attached_to: Option<String>,
    pub incoming: Vec<String>,
    pub outgoing: Vec<String>,
}

/// A sequence flow between two elements of the same scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceFlow {
    pub id: String,
    pub source: String,
    pub target: String,
    pub waypoints: Vec<Point>,
}

/// One diagram plane: a process, or the inside of one sub-process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagramScope {
    /// Process id or sub-process element id this plane renders.
    pub element_id: String,
    pub diagram_id: String,
    pub plane_id: String,
    pub elements: Vec<FlowElement>,
    pub flows: Vec<SequenceFlow>,
    /// Planes of sub-processes declared in `elements`.
    pub nested: Vec<DiagramScope>,
}

impl DiagramScope {
    pub fn element(&self, id: &str) -> Option<&FlowElement> {
        self.elements.iter().find(|e| e.id == id)
    }

    pub fn element_named(&self, name: &str) -> Option<&FlowElement> {
        self.elements.iter().find(|e| e.name == name)
    }

    pub fn elements_of<'a>(
        &'a self,
        pred: impl Fn(&ElementKind) -> bool + 'a,
    ) -> impl Iterator<Item = &'a FlowElement> + 'a {
        self.elements.iter().filter(move |e| pred(&e.kind))
    }

    pub fn flow_between(&self, source: &str, target: &str) -> Option<&SequenceFlow> {
        self.flows
            .iter()
            .find(|f| f.source == source && f.target == target)
    }

    pub fn nested_for(&self, element_id: &str) -> Option<&DiagramScope> {
        self.nested.iter().find(|s| s.element_id == element_id)
    }
}

/// One flow rendered as a process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessDiagram {
    pub id: String,
    pub name: String,
    pub documentation: String,
    pub scope: DiagramScope,
}

/// Top-level definitions container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramDocument {
    pub id: String,
    pub processes: Vec<ProcessDiagram>,
}

impl DiagramDocument {
    pub fn process(&self, name: &str) -> Option<&ProcessDiagram> {
        self.processes.iter().find(|p| p.name == name)
    }
}
