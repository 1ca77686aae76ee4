//! Compile pipeline.
//!
//! ```text
//! YAML -> TreeBuilder -> indexer -> references -> control_flow -> Compilation
//!                                                                    |
//!                                                        diagram / diagram_all
//! ```
//!
//! A compile either produces a complete [`Compilation`] or fails with the
//! first fatal [`CompileError`]; there is no partial output.

use serde_json::Value;
use stepflow_types::config::{CompilerConfig, LayoutConfig, StepflowConfig};
use stepflow_types::diagram::DiagramDocument;
use stepflow_types::error::{CompileError, CompileWarning};
use stepflow_types::node::{LibraryDescriptor, Node, NodeId};
use stepflow_types::tree::NodeTree;
use tracing::info;

use crate::registry::BlockRegistry;
use crate::services::CompileServices;
use crate::tree_builder::{TreeBuilder, parse_document};
use crate::{control_flow, diagram, indexer, lowering, references};

pub struct Compiler<S> {
    services: S,
    registry: BlockRegistry,
    compiler: CompilerConfig,
    layout: LayoutConfig,
}

impl<S: CompileServices> Compiler<S> {
    pub fn new(services: S) -> Self {
        Self {
            services,
            registry: BlockRegistry::default(),
            compiler: CompilerConfig::default(),
            layout: LayoutConfig::default(),
        }
    }

    pub fn with_config(mut self, config: &StepflowConfig) -> Self {
        self.compiler = config.compiler.clone();
        self.layout = config.layout.clone();
        self
    }

    pub fn with_registry(mut self, registry: BlockRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> &BlockRegistry {
        &self.registry
    }

    /// Parse and compile YAML text.
    pub async fn compile_str(&self, yaml: &str) -> Result<Compilation, CompileError> {
        let document = parse_document(yaml)?;
        self.compile(&document).await
    }

    /// Compile an already parsed document.
    #[tracing::instrument(skip_all)]
    pub async fn compile(&self, document: &Value) -> Result<Compilation, CompileError> {
        let mut tree = TreeBuilder::new(&self.registry).build(document)?;
        indexer::index_tree(&mut tree)?;
        let dependencies =
            references::resolve_references(&mut tree, &self.registry, &self.services).await?;
        let warnings = control_flow::resolve_successors(&mut tree, self.compiler.strict_targets)?;

        info!(
            nodes = tree.len(),
            dependencies = dependencies.len(),
            warnings = warnings.len(),
            "Compile finished"
        );
        Ok(Compilation {
            tree,
            dependencies,
            warnings,
            layout: self.layout.clone(),
        })
    }
}

/// Result of a successful compile: the indexed, resolved tree plus what was
/// found along the way.
#[derive(Debug, Clone)]
pub struct Compilation {
    tree: NodeTree,
    dependencies: Vec<LibraryDescriptor>,
    warnings: Vec<CompileWarning>,
    layout: LayoutConfig,
}

impl Compilation {
    pub fn tree(&self) -> &NodeTree {
        &self.tree
    }

    pub fn dependencies(&self) -> &[LibraryDescriptor] {
        &self.dependencies
    }

    pub fn warnings(&self) -> &[CompileWarning] {
        &self.warnings
    }

    pub fn node(&self, index_key: &str) -> Option<&Node> {
        self.tree.lookup(index_key).map(|id| self.tree.get(id))
    }

    /// Lowered payload of a node (computed once, then cached).
    pub fn lowered(&self, id: NodeId) -> &str {
        lowering::lowered(self.tree.get(id))
    }

    pub fn flow_names(&self) -> Vec<&str> {
        self.tree
            .flows()
            .map(|f| self.tree.get(f).name.as_str())
            .collect()
    }

    /// Diagram of one flow.
    pub fn diagram(&self, flow: &str) -> Result<DiagramDocument, CompileError> {
        let id = self
            .tree
            .child_named(self.tree.root(), flow)
            .ok_or_else(|| CompileError::FlowNotFound(flow.to_string()))?;
        diagram::build_document(&self.tree, &[id], &self.layout)
    }

    /// One document with every flow as its own process.
    pub fn diagram_all(&self) -> Result<DiagramDocument, CompileError> {
        let flows: Vec<NodeId> = self.tree.flows().collect();
        diagram::build_document(&self.tree, &flows, &self.layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagram::serializer::{to_bpmn_xml, to_json};
    use crate::services::OfflineServices;
    use stepflow_types::diagram::{DiagramScope, ElementKind, FlowElement};
    use stepflow_types::node::{Successor, Terminal};

    async fn compile(yaml: &str) -> Compilation {
        Compiler::new(OfflineServices::default())
            .compile_str(yaml)
            .await
            .unwrap()
    }

    fn count(scope: &DiagramScope, pred: impl Fn(&ElementKind) -> bool) -> usize {
        scope.elements.iter().filter(|e| pred(&e.kind)).count()
    }

    fn named<'a>(scope: &'a DiagramScope, name: &str) -> &'a FlowElement {
        scope
            .element_named(name)
            .unwrap_or_else(|| panic!("no element named {name}"))
    }

    fn single_target<'a>(scope: &'a DiagramScope, source: &FlowElement) -> &'a FlowElement {
        assert_eq!(source.outgoing.len(), 1, "{} has {:?}", source.name, source.outgoing);
        let flow = scope.flows.iter().find(|f| f.id == source.outgoing[0]).unwrap();
        scope.element(&flow.target).unwrap()
    }

    // -----------------------------------------------------------------------
    // Scenarios
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_sequential_steps_diagram() {
        let compilation = compile(
            "main:\n  - step1: { assign: [] }\n  - step2: { assign: [] }\n  - step3: { assign: [] }\n",
        )
        .await;
        let doc = compilation.diagram("main").unwrap();
        let scope = &doc.processes[0].scope;

        assert_eq!(count(scope, |k| *k == ElementKind::Task), 3);
        let start = scope.elements_of(|k| *k == ElementKind::StartEvent).next().unwrap();
        let first = single_target(scope, start);
        assert_eq!(first.name, "step1");
        let second = single_target(scope, first);
        assert_eq!(second.name, "step2");
        let third = single_target(scope, second);
        assert_eq!(third.name, "step3");
        let end = single_target(scope, third);
        assert_eq!(end.kind, ElementKind::EndEvent { error: false });
        assert!(end.name.is_empty());
        // start->1, 1->2, 2->3, 3->end
        assert_eq!(scope.flows.len(), 4);
    }

    #[tokio::test]
    async fn test_explicit_next_skips_step() {
        let compilation = compile(
            "main:\n  - stepA: { assign: [], next: stepC }\n  - stepB: { assign: [] }\n  - stepC: { assign: [] }\n",
        )
        .await;
        assert_eq!(
            compilation.node("/main/stepA").unwrap().successor,
            Some(Successor::Node(compilation.tree().lookup("/main/stepC").unwrap()))
        );
        let doc = compilation.diagram("main").unwrap();
        let scope = &doc.processes[0].scope;
        let a = named(scope, "stepA");
        let c = named(scope, "stepC");
        assert!(scope.flow_between(&a.id, &c.id).is_some());
        let b = named(scope, "stepB");
        assert!(scope.flow_between(&a.id, &b.id).is_none());
    }

    #[tokio::test]
    async fn test_try_scope_boundary_event() {
        let compilation = compile(
            r#"
main:
  - guarded:
      try:
        - risky: { call: "npm:risky-lib" }
      except:
        steps:
          - recover: { assign: [] }
  - after: { assign: [] }
"#,
        )
        .await;
        let doc = compilation.diagram("main").unwrap();
        let main = &doc.processes[0].scope;
        let guarded = named(main, "guarded");
        assert_eq!(guarded.kind, ElementKind::SubProcess);

        let inner = main.nested_for(&guarded.id).unwrap();
        let boundaries: Vec<_> = inner.elements_of(|k| *k == ElementKind::BoundaryEvent).collect();
        assert_eq!(boundaries.len(), 1);
        let try_el = named(inner, "try");
        let except_el = named(inner, "except");
        assert_eq!(boundaries[0].attached_to.as_deref(), Some(try_el.id.as_str()));
        assert!(inner.flow_between(&boundaries[0].id, &except_el.id).is_some());

        // Inside the handler, the first element follows the start event.
        let handler = inner.nested_for(&except_el.id).unwrap();
        let start = handler.elements_of(|k| *k == ElementKind::StartEvent).next().unwrap();
        assert_eq!(single_target(handler, start).name, "recover");
    }

    #[tokio::test]
    async fn test_several_handlers_get_separate_boundary_events() {
        let compilation = compile(
            r#"
main:
  - guarded:
      try:
        - t1: { assign: [] }
      except:
        - steps: [ { e0: { assign: [] } } ]
        - steps: [ { e1: { assign: [] } } ]
        - steps: [ { e2: { assign: [] } } ]
        - steps: [ { e3: { assign: [] } } ]
  - after: { assign: [] }
"#,
        )
        .await;
        let after = compilation.tree().lookup("/main/after").unwrap();
        for step in ["/main/guarded/try/t1", "/main/guarded/except_0/e0", "/main/guarded/except_3/e3"] {
            assert_eq!(compilation.node(step).unwrap().successor, Some(Successor::Node(after)));
        }

        let doc = compilation.diagram("main").unwrap();
        let main = &doc.processes[0].scope;
        let inner = main.nested_for(&named(main, "guarded").id).unwrap();
        let try_el = inner
            .elements
            .iter()
            .find(|e| e.name == "try" && e.kind == ElementKind::SubProcess)
            .unwrap();
        let boundaries: Vec<_> = inner.elements_of(|k| *k == ElementKind::BoundaryEvent).collect();
        assert_eq!(boundaries.len(), 4);
        for (i, a) in boundaries.iter().enumerate() {
            assert_eq!(a.attached_to.as_deref(), Some(try_el.id.as_str()));
            assert_eq!(a.outgoing.len(), 1);
            for b in &boundaries[i + 1..] {
                assert!(!a.bounds.overlaps(&b.bounds), "{} overlaps {}", a.id, b.id);
            }
        }
    }

    #[tokio::test]
    async fn test_parallel_fork_join() {
        let compilation = compile(
            r#"
main:
  - fan:
      parallel:
        - left: { assign: [] }
        - right: { assign: [], next: end }
  - after: { assign: [] }
"#,
        )
        .await;
        let doc = compilation.diagram("main").unwrap();
        let main = &doc.processes[0].scope;
        let fan = named(main, "fan");
        let inner = main.nested_for(&fan.id).unwrap();

        let gateways: Vec<_> = inner
            .elements_of(|k| *k == ElementKind::ParallelGateway)
            .collect();
        assert_eq!(gateways.len(), 2);
        let (fork, join) = (gateways[0], gateways[1]);
        let start = inner.elements_of(|k| *k == ElementKind::StartEvent).next().unwrap();
        assert_eq!(single_target(inner, start).id, fork.id);

        for branch in ["left", "right"] {
            let el = named(inner, branch);
            assert!(inner.flow_between(&fork.id, &el.id).is_some());
            assert_eq!(single_target(inner, el).id, join.id);
        }
        let end = single_target(inner, join);
        assert_eq!(end.kind, ElementKind::EndEvent { error: false });

        // The parallel scope itself continues to `after`.
        let after = named(main, "after");
        assert!(main.flow_between(&fan.id, &after.id).is_some());
    }

    #[tokio::test]
    async fn test_call_to_sibling_flow_is_call_activity() {
        let compilation = compile(
            "main:\n  - go: { call: helper }\n  - ext: { call: \"npm:left-pad\" }\nhelper:\n  - h: { assign: [] }\n",
        )
        .await;
        let doc = compilation.diagram("main").unwrap();
        let scope = &doc.processes[0].scope;
        assert_eq!(
            named(scope, "go").kind,
            ElementKind::CallActivity {
                called_element: "helper".to_string()
            }
        );
        assert_eq!(named(scope, "ext").kind, ElementKind::ServiceTask);
    }

    #[tokio::test]
    async fn test_unknown_flow_is_fatal() {
        let compilation = compile("main:\n  - a: { assign: [] }\n").await;
        let err = compilation.diagram("missing").unwrap_err();
        assert!(matches!(err, CompileError::FlowNotFound(ref f) if f == "missing"));
    }

    // -----------------------------------------------------------------------
    // Behaviour details
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_switch_gateway_with_continue_end() {
        let compilation = compile(
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
          steps:
            - s2: { assign: [] }
  - after: { assign: [] }
"#,
        )
        .await;
        let doc = compilation.diagram("main").unwrap();
        let main = &doc.processes[0].scope;
        let route = named(main, "route");
        let inner = main.nested_for(&route.id).unwrap();

        let gateway = inner
            .elements_of(|k| *k == ElementKind::ExclusiveGateway)
            .next()
            .unwrap();
        assert_eq!(gateway.outgoing.len(), 3);
        let fallback = inner
            .elements
            .iter()
            .find(|e| matches!(e.kind, ElementKind::EndEvent { .. }) && e.name == "after")
            .unwrap();
        assert!(inner.flow_between(&gateway.id, &fallback.id).is_some());
        assert!(main.flow_between(&route.id, &named(main, "after").id).is_some());
    }

    #[tokio::test]
    async fn test_raise_and_return_markers() {
        let compilation = compile(
            r#"
main:
  - check:
      condition: "js:bad"
      steps:
        - fail: { raise: "bad input" }
  - done: { assign: [{ result: 1 }], return: "var:result" }
  - unreachable: { assign: [] }
"#,
        )
        .await;
        let doc = compilation.diagram("main").unwrap();
        let main = &doc.processes[0].scope;
        let done = named(main, "done");
        let end = single_target(main, done);
        assert_eq!(end.kind, ElementKind::EndEvent { error: false });
        assert!(end.name.is_empty());

        let check = named(main, "check");
        let inner = main.nested_for(&check.id).unwrap();
        let fail = named(inner, "fail");
        let error_end = single_target(inner, fail);
        assert_eq!(error_end.kind, ElementKind::EndEvent { error: true });
        assert_eq!(error_end.name, "bad input");
        assert!(error_end.style.as_ref().unwrap().stroke.is_some());
    }

    #[tokio::test]
    async fn test_jump_out_of_nested_scope_propagates() {
        let compilation = compile(
            r#"
main:
  - outer:
      steps:
        - maybe:
            condition: "js:x"
            steps:
              - leave: { next: target }
        - stay: { assign: [] }
  - skipped: { assign: [] }
  - target: { assign: [], next: stop }
"#,
        )
        .await;
        let doc = compilation.diagram("main").unwrap();
        let main = &doc.processes[0].scope;
        let outer = named(main, "outer");
        let target = named(main, "target");
        let skipped = named(main, "skipped");

        // `outer` has two exits: its own successor and the propagated jump.
        let gateway = single_target(main, outer);
        assert_eq!(gateway.kind, ElementKind::ExclusiveGateway);
        assert!(main.flow_between(&gateway.id, &target.id).is_some());
        assert!(main.flow_between(&gateway.id, &skipped.id).is_some());

        // `stop` is a named end event.
        let stop = single_target(main, target);
        assert_eq!(stop.name, "stop");

        // Inside `outer`, the branch leaves to a marker named after the target.
        let inner = main.nested_for(&outer.id).unwrap();
        let maybe = named(inner, "maybe");
        assert!(maybe.outgoing.len() == 1);
        let gw = single_target(inner, maybe);
        assert_eq!(gw.kind, ElementKind::ExclusiveGateway);
        assert!(
            gw.outgoing
                .iter()
                .filter_map(|f| inner.flows.iter().find(|x| &x.id == f))
                .any(|f| inner.element(&f.target).is_some_and(|e| e.name == "target"))
        );
    }

    #[tokio::test]
    async fn test_module_import_gets_catch_event() {
        let compilation = compile(
            "main:\n  - a: { assign: [] }\n  - lib: { module: \"npm:lodash\" }\n  - b: { assign: [] }\n",
        )
        .await;
        let doc = compilation.diagram("main").unwrap();
        let scope = &doc.processes[0].scope;
        let lib = named(scope, "lib");
        assert_eq!(lib.kind, ElementKind::ServiceTask);
        let catch = scope
            .elements_of(|k| *k == ElementKind::IntermediateCatchEvent)
            .next()
            .unwrap();
        assert!(scope.flow_between(&catch.id, &lib.id).is_some());
        let a = named(scope, "a");
        assert_eq!(single_target(scope, a).name, "b");
    }

    #[tokio::test]
    async fn test_terminal_successors() {
        let compilation = compile("main:\n  - a: { next: none }\n  - b: { assign: [] }\n").await;
        assert_eq!(
            compilation.node("/main/a").unwrap().successor,
            Some(Successor::Terminal(Terminal::None))
        );
    }

    // -----------------------------------------------------------------------
    // Properties
    // -----------------------------------------------------------------------

    const MIXED: &str = r#"
main:
  description: Order intake
  steps:
    - load: { config: { path: ".env" } }
    - fetch: { http: { url: "var:endpoint" } }
    - each:
        for:
          in: "out:fetch.items"
          steps:
            - store: { call: save }
    - fan:
        parallel:
          - left: { shell: "echo left" }
          - right: { prompt: "summarize lp:item" }
    - ask: { form: "./forms/confirm.json" }
save:
  - persist: { assign: [{ saved: true }] }
"#;

    #[tokio::test]
    async fn test_compile_is_deterministic() {
        let a = compile(MIXED).await;
        let b = compile(MIXED).await;
        let keys = |c: &Compilation| {
            c.tree()
                .iter()
                .map(|(_, n)| (n.index_key.clone(), n.successor.clone()))
                .collect::<Vec<_>>()
        };
        assert_eq!(keys(&a), keys(&b));
        assert_eq!(a.diagram_all().unwrap(), b.diagram_all().unwrap());
        // Diagram generation leaves the compiled tree untouched.
        let before = a.tree().len();
        a.diagram_all().unwrap();
        assert_eq!(a.tree().len(), before);
    }

    #[tokio::test]
    async fn test_edges_are_unique_and_keys_unique() {
        let compilation = compile(MIXED).await;
        let mut keys = std::collections::HashSet::new();
        for (_, node) in compilation.tree().iter() {
            assert!(keys.insert(node.index_key.clone()), "duplicate {}", node.index_key);
        }
        fn check(scope: &DiagramScope) {
            let mut pairs = std::collections::HashSet::new();
            for flow in &scope.flows {
                assert!(pairs.insert((flow.source.clone(), flow.target.clone())));
            }
            scope.nested.iter().for_each(check);
        }
        for process in compilation.diagram_all().unwrap().processes {
            check(&process.scope);
        }
    }

    #[tokio::test]
    async fn test_dependencies_and_lowering() {
        let compilation = compile(MIXED).await;
        let names: Vec<_> = compilation
            .dependencies()
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(names, vec!["dotenv", "axios", "execa", "openai", "./forms/confirm.json"]);

        let fetch = compilation.tree().lookup("/main/fetch").unwrap();
        assert_eq!(
            compilation.lowered(fetch),
            r#"{"http":{"url":ctx.vars.endpoint}}"#
        );
    }

    #[tokio::test]
    async fn test_all_flows_serialize() {
        let compilation = compile(MIXED).await;
        let doc = compilation.diagram_all().unwrap();
        assert_eq!(doc.processes.len(), 2);
        assert_eq!(doc.processes[0].documentation, "Order intake");
        assert_eq!(doc.processes[0].id, "Process_0");

        let xml = to_bpmn_xml(&doc).unwrap();
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains(r#"<bpmn:process id="Process_0" name="main" isExecutable="false">"#));
        assert!(xml.contains("<bpmn:serviceTask"));
        assert!(xml.contains("<bpmn:userTask"));
        assert!(xml.contains(r##"bioc:fill="#fff8e1""##));
        assert!(xml.contains(r#"calledElement="save""#));
        assert!(xml.contains(r#"isExpanded="false""#));
        // One plane per process plus one per sub-process (each, fan).
        assert_eq!(xml.matches("<bpmndi:BPMNPlane").count(), 4);

        let json: serde_json::Value = serde_json::from_str(&to_json(&doc).unwrap()).unwrap();
        assert_eq!(json["processes"][1]["name"], "save");
    }

    #[tokio::test]
    async fn test_strict_targets_config() {
        let mut config = StepflowConfig::default();
        config.compiler.strict_targets = true;
        let err = Compiler::new(OfflineServices::default())
            .with_config(&config)
            .compile_str("main:\n  - a: { next: ghost }\n")
            .await
            .unwrap_err();
        assert!(matches!(err, CompileError::UnresolvedNamedTarget { .. }));

        let lenient = compile("main:\n  - a: { next: ghost }\n").await;
        assert_eq!(lenient.warnings().len(), 1);
    }

    #[tokio::test]
    async fn test_hash_step_name_is_rejected_before_diagram() {
        let err = Compiler::new(OfflineServices::default())
            .compile_str("main:\n  - a: { assign: [] }\n  - \"#3\": { assign: [] }\n")
            .await
            .unwrap_err();
        assert!(matches!(err, CompileError::InvalidDocument(_)));
    }
}
