//! Wire formats for [`DiagramDocument`]: BPMN 2.0 XML and JSON.
//!
//! The XML has one `bpmn:process` per flow and one `BPMNDiagram`/`BPMNPlane`
//! pair per process plus one per sub-process. Sub-processes are drawn
//! collapsed in their parent's plane.

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use stepflow_types::diagram::{DiagramDocument, DiagramScope, ElementKind, FlowElement, SequenceFlow};
use stepflow_types::error::CompileError;

pub const BPMN_NS: &str = "http://www.omg.org/spec/BPMN/20100524/MODEL";
pub const BPMNDI_NS: &str = "http://www.omg.org/spec/BPMN/20100524/DI";
pub const DC_NS: &str = "http://www.omg.org/spec/DD/20100524/DC";
pub const DI_NS: &str = "http://www.omg.org/spec/DD/20100524/DI";
pub const BIOC_NS: &str = "http://bpmn.io/schema/bpmn/biocolor/1.0";
pub const TARGET_NS: &str = "http://bpmn.io/schema/bpmn";

/// JSON projection of the document.
pub fn to_json(document: &DiagramDocument) -> Result<String, CompileError> {
    serde_json::to_string_pretty(document).map_err(|e| CompileError::Serialize(e.to_string()))
}

/// BPMN 2.0 XML.
#[tracing::instrument(skip_all, fields(processes = document.processes.len()))]
pub fn to_bpmn_xml(document: &DiagramDocument) -> Result<String, CompileError> {
    let mut xml = XmlOut::new();
    xml.event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut definitions = BytesStart::new("bpmn:definitions");
    definitions.push_attribute(("xmlns:bpmn", BPMN_NS));
    definitions.push_attribute(("xmlns:bpmndi", BPMNDI_NS));
    definitions.push_attribute(("xmlns:dc", DC_NS));
    definitions.push_attribute(("xmlns:di", DI_NS));
    definitions.push_attribute(("xmlns:bioc", BIOC_NS));
    definitions.push_attribute(("id", document.id.as_str()));
    definitions.push_attribute(("targetNamespace", TARGET_NS));
    xml.event(Event::Start(definitions))?;

    for process in &document.processes {
        let mut start = BytesStart::new("bpmn:process");
        start.push_attribute(("id", process.id.as_str()));
        start.push_attribute(("name", process.name.as_str()));
        start.push_attribute(("isExecutable", "false"));
        xml.event(Event::Start(start))?;
        xml.text_element("bpmn:documentation", &process.documentation)?;
        write_semantic(&mut xml, &process.scope)?;
        xml.end("bpmn:process")?;
    }

    for process in &document.processes {
        write_planes(&mut xml, &process.scope)?;
    }

    xml.end("bpmn:definitions")?;
    xml.finish()
}

// ---------------------------------------------------------------------------
// Semantic model
// ---------------------------------------------------------------------------

fn write_semantic(xml: &mut XmlOut, scope: &DiagramScope) -> Result<(), CompileError> {
    for element in &scope.elements {
        write_element(xml, scope, element)?;
    }
    for flow in &scope.flows {
        let mut start = BytesStart::new("bpmn:sequenceFlow");
        start.push_attribute(("id", flow.id.as_str()));
        start.push_attribute(("sourceRef", flow.source.as_str()));
        start.push_attribute(("targetRef", flow.target.as_str()));
        xml.event(Event::Empty(start))?;
    }
    Ok(())
}

fn write_element(xml: &mut XmlOut, scope: &DiagramScope, element: &FlowElement) -> Result<(), CompileError> {
    let tag = format!("bpmn:{}", element.kind.tag());
    let mut start = BytesStart::new(tag.as_str());
    start.push_attribute(("id", element.id.as_str()));
    if !element.name.is_empty() {
        start.push_attribute(("name", element.name.as_str()));
    }
    if let ElementKind::CallActivity { called_element } = &element.kind {
        start.push_attribute(("calledElement", called_element.as_str()));
    }
    if let Some(host) = &element.attached_to {
        start.push_attribute(("attachedToRef", host.as_str()));
    }
    xml.event(Event::Start(start))?;

    for incoming in &element.incoming {
        xml.text_element("bpmn:incoming", incoming)?;
    }
    for outgoing in &element.outgoing {
        xml.text_element("bpmn:outgoing", outgoing)?;
    }

    let definition_id = format!("{}_def", element.id);
    match &element.kind {
        ElementKind::EndEvent { error: true } | ElementKind::BoundaryEvent => {
            xml.empty_with_id("bpmn:errorEventDefinition", &definition_id)?;
        }
        ElementKind::IntermediateCatchEvent => {
            xml.empty_with_id("bpmn:signalEventDefinition", &definition_id)?;
        }
        ElementKind::SubProcess => {
            if let Some(inner) = scope.nested_for(&element.id) {
                write_semantic(xml, inner)?;
            }
        }
        _ => {}
    }

    xml.end(&tag)
}

// ---------------------------------------------------------------------------
// Diagram interchange
// ---------------------------------------------------------------------------

fn write_planes(xml: &mut XmlOut, scope: &DiagramScope) -> Result<(), CompileError> {
    let mut diagram = BytesStart::new("bpmndi:BPMNDiagram");
    diagram.push_attribute(("id", scope.diagram_id.as_str()));
    xml.event(Event::Start(diagram))?;

    let mut plane = BytesStart::new("bpmndi:BPMNPlane");
    plane.push_attribute(("id", scope.plane_id.as_str()));
    plane.push_attribute(("bpmnElement", scope.element_id.as_str()));
    xml.event(Event::Start(plane))?;

    for element in &scope.elements {
        write_shape(xml, element)?;
    }
    for flow in &scope.flows {
        write_edge(xml, flow)?;
    }

    xml.end("bpmndi:BPMNPlane")?;
    xml.end("bpmndi:BPMNDiagram")?;

    for inner in &scope.nested {
        write_planes(xml, inner)?;
    }
    Ok(())
}

fn write_shape(xml: &mut XmlOut, element: &FlowElement) -> Result<(), CompileError> {
    let id = format!("{}_di", element.id);
    let mut shape = BytesStart::new("bpmndi:BPMNShape");
    shape.push_attribute(("id", id.as_str()));
    shape.push_attribute(("bpmnElement", element.id.as_str()));
    if element.kind == ElementKind::SubProcess {
        shape.push_attribute(("isExpanded", "false"));
    }
    if let Some(style) = &element.style {
        if let Some(fill) = &style.fill {
            shape.push_attribute(("bioc:fill", fill.as_str()));
        }
        if let Some(stroke) = &style.stroke {
            shape.push_attribute(("bioc:stroke", stroke.as_str()));
        }
    }
    xml.event(Event::Start(shape))?;

    let b = &element.bounds;
    let (x, y, width, height) = (b.x.to_string(), b.y.to_string(), b.width.to_string(), b.height.to_string());
    let mut bounds = BytesStart::new("dc:Bounds");
    bounds.push_attribute(("x", x.as_str()));
    bounds.push_attribute(("y", y.as_str()));
    bounds.push_attribute(("width", width.as_str()));
    bounds.push_attribute(("height", height.as_str()));
    xml.event(Event::Empty(bounds))?;

    xml.end("bpmndi:BPMNShape")
}

fn write_edge(xml: &mut XmlOut, flow: &SequenceFlow) -> Result<(), CompileError> {
    let id = format!("{}_di", flow.id);
    let mut edge = BytesStart::new("bpmndi:BPMNEdge");
    edge.push_attribute(("id", id.as_str()));
    edge.push_attribute(("bpmnElement", flow.id.as_str()));
    xml.event(Event::Start(edge))?;
    for point in &flow.waypoints {
        let (x, y) = (point.x.to_string(), point.y.to_string());
        let mut waypoint = BytesStart::new("di:waypoint");
        waypoint.push_attribute(("x", x.as_str()));
        waypoint.push_attribute(("y", y.as_str()));
        xml.event(Event::Empty(waypoint))?;
    }
    xml.end("bpmndi:BPMNEdge")
}

// ---------------------------------------------------------------------------
// Writer wrapper
// ---------------------------------------------------------------------------

struct XmlOut {
    writer: Writer<Vec<u8>>,
}

impl XmlOut {
    fn new() -> Self {
        Self {
            writer: Writer::new_with_indent(Vec::new(), b' ', 2),
        }
    }

    fn event(&mut self, event: Event<'_>) -> Result<(), CompileError> {
        self.writer
            .write_event(event)
            .map_err(|e| CompileError::Serialize(e.to_string()))
    }

    fn end(&mut self, tag: &str) -> Result<(), CompileError> {
        self.event(Event::End(BytesEnd::new(tag)))
    }

    fn text_element(&mut self, tag: &str, text: &str) -> Result<(), CompileError> {
        self.event(Event::Start(BytesStart::new(tag)))?;
        self.event(Event::Text(BytesText::new(text)))?;
        self.end(tag)
    }

    fn empty_with_id(&mut self, tag: &str, id: &str) -> Result<(), CompileError> {
        let mut start = BytesStart::new(tag);
        start.push_attribute(("id", id));
        self.event(Event::Empty(start))
    }

    fn finish(self) -> Result<String, CompileError> {
        String::from_utf8(self.writer.into_inner()).map_err(|e| CompileError::Serialize(e.to_string()))
    }
}
