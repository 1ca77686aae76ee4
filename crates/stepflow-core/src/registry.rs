//! Block registry: the ordered set of step kinds.
//!
//! Each raw step body is tested against the kinds in priority order and the
//! first match wins. Predicates are cheap structural checks ("has a `raise`
//! field") and are not mutually exclusive, so the order is part of the
//! grammar: a switch case carrying `steps` must classify as a branch, not a
//! group, which is why `Branch` precedes `Group`.

use serde_json::Value;
use stepflow_types::node::{FallthroughPolicy, Node, NodeKind};

// ---------------------------------------------------------------------------
// Integration family
// ---------------------------------------------------------------------------

/// One member of the parameterized integration family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrationSpec {
    /// Display key of the integration (`http`, `shell`, ...).
    pub key: String,
    /// Package backing the integration.
    pub library: String,
    /// Body field whose presence selects this integration.
    pub master_field: String,
}

impl IntegrationSpec {
    pub fn new(key: &str, library: &str, master_field: &str) -> Self {
        Self {
            key: key.to_string(),
            library: library.to_string(),
            master_field: master_field.to_string(),
        }
    }
}

/// Built-in integrations: (display key, backing library, master field).
pub const DEFAULT_INTEGRATIONS: &[(&str, &str, &str)] = &[
    ("config", "dotenv", "config"),
    ("http", "axios", "http"),
    ("shell", "execa", "shell"),
    ("files", "fast-glob", "glob"),
    ("ai", "openai", "prompt"),
    ("template", "handlebars", "template"),
];

// ---------------------------------------------------------------------------
// Block kinds
// ---------------------------------------------------------------------------

/// A registered step kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockKind {
    Module,
    Parallel,
    Try,
    Loop,
    Switch,
    Branch,
    Group,
    Raise,
    Form,
    Call,
    Integration(IntegrationSpec),
    Assign,
    Return,
    Jump,
}

impl BlockKind {
    /// Manufacture an integration kind from its table row.
    pub fn integration(key: &str, library: &str, master_field: &str) -> Self {
        BlockKind::Integration(IntegrationSpec::new(key, library, master_field))
    }

    /// Structural predicate over a raw step body.
    pub fn matches(&self, body: &Value) -> bool {
        let Some(map) = body.as_object() else {
            return false;
        };
        match self {
            BlockKind::Module => map.contains_key("module"),
            BlockKind::Parallel => map.contains_key("parallel"),
            BlockKind::Try => map.contains_key("try"),
            BlockKind::Loop => map.contains_key("for"),
            BlockKind::Switch => map.contains_key("switch"),
            BlockKind::Branch => map.contains_key("condition"),
            BlockKind::Group => map.contains_key("steps"),
            BlockKind::Raise => map.contains_key("raise"),
            BlockKind::Form => map.contains_key("form"),
            BlockKind::Call => map.contains_key("call"),
            BlockKind::Integration(spec) => map.contains_key(&spec.master_field),
            BlockKind::Assign => map.contains_key("assign"),
            BlockKind::Return => map.contains_key("return"),
            BlockKind::Jump => {
                map.contains_key("next") && map.keys().all(|k| k == "next" || k == "description")
            }
        }
    }

    /// Node kind this block produces.
    pub fn node_kind(&self) -> NodeKind {
        match self {
            BlockKind::Module => NodeKind::Module,
            BlockKind::Parallel => NodeKind::Parallel,
            BlockKind::Try => NodeKind::Try,
            BlockKind::Loop => NodeKind::Loop,
            BlockKind::Switch => NodeKind::Switch,
            BlockKind::Branch => NodeKind::Branch,
            BlockKind::Group => NodeKind::Group,
            BlockKind::Raise => NodeKind::Raise,
            BlockKind::Form => NodeKind::Form,
            BlockKind::Call => NodeKind::Call,
            BlockKind::Integration(_) => NodeKind::Integration,
            BlockKind::Assign => NodeKind::Assign,
            BlockKind::Return => NodeKind::Return,
            BlockKind::Jump => NodeKind::Jump,
        }
    }

    /// Fallthrough flags a container sets on itself; constant per kind.
    pub fn fallthrough(&self) -> Option<FallthroughPolicy> {
        match self {
            BlockKind::Parallel => Some(FallthroughPolicy::SEALED),
            BlockKind::Loop | BlockKind::Module => Some(FallthroughPolicy::BOUNDED),
            BlockKind::Switch | BlockKind::Try => Some(FallthroughPolicy::PASSTHROUGH),
            _ => None,
        }
    }

    /// Stamp this kind onto a freshly built node.
    pub fn classify(&self, node: &mut Node) {
        node.kind = self.node_kind();
        node.fallthrough = self.fallthrough();
        match self {
            BlockKind::Module => node.is_module_import = true,
            BlockKind::Integration(spec) => node.integration = Some(spec.key.clone()),
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// References
// ---------------------------------------------------------------------------

/// What a classified node points at, before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference<'a> {
    /// Authored reference text (`helper`, `npm:lodash`, `./lib.ts`).
    Named(&'a str),
    /// Fixed backing package of an integration.
    Library(&'a str),
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Ordered block kinds. The order is the match precedence.
#[derive(Debug, Clone)]
pub struct BlockRegistry {
    kinds: Vec<BlockKind>,
}

impl Default for BlockRegistry {
    fn default() -> Self {
        let mut kinds = vec![
            BlockKind::Module,
            BlockKind::Parallel,
            BlockKind::Try,
            BlockKind::Loop,
            BlockKind::Switch,
            BlockKind::Branch,
            BlockKind::Group,
            BlockKind::Raise,
            BlockKind::Form,
            BlockKind::Call,
        ];
        kinds.extend(
            DEFAULT_INTEGRATIONS
                .iter()
                .map(|(key, library, field)| BlockKind::integration(key, library, field)),
        );
        kinds.extend([BlockKind::Assign, BlockKind::Return, BlockKind::Jump]);
        Self { kinds }
    }
}

impl BlockRegistry {
    /// Add an integration after the built-in ones (before `assign`).
    pub fn with_integration(mut self, spec: IntegrationSpec) -> Self {
        let at = self
            .kinds
            .iter()
            .position(|k| *k == BlockKind::Assign)
            .unwrap_or(self.kinds.len());
        self.kinds.insert(at, BlockKind::Integration(spec));
        self
    }

    pub fn kinds(&self) -> &[BlockKind] {
        &self.kinds
    }

    /// First kind matching `body`, in priority order.
    pub fn classify(&self, body: &Value) -> Option<&BlockKind> {
        self.kinds.iter().find(|k| k.matches(body))
    }

    pub fn integration(&self, key: &str) -> Option<&IntegrationSpec> {
        self.kinds.iter().find_map(|k| match k {
            BlockKind::Integration(spec) if spec.key == key => Some(spec),
            _ => None,
        })
    }

    /// The reference a classified node needs resolved, if any.
    pub fn reference_of<'a>(&'a self, node: &'a Node) -> Option<Reference<'a>> {
        match node.kind {
            NodeKind::Call => node.field("call").and_then(Value::as_str).map(Reference::Named),
            NodeKind::Form => node.field("form").and_then(Value::as_str).map(Reference::Named),
            NodeKind::Module => node
                .field("module")
                .and_then(Value::as_str)
                .map(Reference::Named),
            NodeKind::Integration => node
                .integration
                .as_deref()
                .and_then(|key| self.integration(key))
                .map(|spec| Reference::Library(spec.library.as_str())),
            _ => None,
        }
    }
}
