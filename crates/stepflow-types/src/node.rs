//! Step tree node model shared by every compiler pass.
//!
//! A compiled workflow is a forest: one synthetic root whose direct children
//! are the named flows (`main`, helpers, ...). Each authored step becomes a
//! [`Node`]; diagram generation later appends synthetic nodes (start/end
//! markers, gateways, events) to a working copy of the same tree.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::diagram::DiagramMeta;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Handle into a [`crate::tree::NodeTree`] arena.
///
/// Parent links are stored as `NodeId`s, never as owning pointers: a node is
/// owned by the arena and listed in exactly one parent's `children`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Kinds
// ---------------------------------------------------------------------------

/// The tagged category of a node.
///
/// Authored kinds are assigned by the block registry; `Root` and `Flow` are
/// structural; the `Synthetic*` kinds only ever exist on a diagram working copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Branch,
    Loop,
    Switch,
    Parallel,
    Try,
    Except,
    Assign,
    Raise,
    Call,
    Group,
    Form,
    Jump,
    Module,
    Return,
    Integration,
    Root,
    Flow,
    SyntheticStart,
    SyntheticEnd { error: bool },
    SyntheticGateway { parallel: bool },
    SyntheticBoundary,
    SyntheticCatch,
}

impl NodeKind {
    /// Stable lowercase label, used in logs and CLI tables.
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Branch => "branch",
            NodeKind::Loop => "loop",
            NodeKind::Switch => "switch",
            NodeKind::Parallel => "parallel",
            NodeKind::Try => "try",
            NodeKind::Except => "except",
            NodeKind::Assign => "assign",
            NodeKind::Raise => "raise",
            NodeKind::Call => "call",
            NodeKind::Group => "group",
            NodeKind::Form => "form",
            NodeKind::Jump => "jump",
            NodeKind::Module => "module",
            NodeKind::Return => "return",
            NodeKind::Integration => "integration",
            NodeKind::Root => "root",
            NodeKind::Flow => "flow",
            NodeKind::SyntheticStart => "synthetic-start",
            NodeKind::SyntheticEnd { .. } => "synthetic-end",
            NodeKind::SyntheticGateway { .. } => "synthetic-gateway",
            NodeKind::SyntheticBoundary => "synthetic-boundary",
            NodeKind::SyntheticCatch => "synthetic-catch",
        }
    }

    /// Kinds whose children are laid out as their own diagram scope.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            NodeKind::Branch
                | NodeKind::Loop
                | NodeKind::Switch
                | NodeKind::Parallel
                | NodeKind::Try
                | NodeKind::Except
                | NodeKind::Group
                | NodeKind::Module
                | NodeKind::Flow
        )
    }

    pub fn is_synthetic(&self) -> bool {
        matches!(
            self,
            NodeKind::SyntheticStart
                | NodeKind::SyntheticEnd { .. }
                | NodeKind::SyntheticGateway { .. }
                | NodeKind::SyntheticBoundary
                | NodeKind::SyntheticCatch
        )
    }
}

// ---------------------------------------------------------------------------
// Fallthrough policy
// ---------------------------------------------------------------------------

/// The pair of flags a container sets on itself to steer implicit successor search.
///
/// The flags are constant per container kind. Their effect is defined by
/// [`FallthroughPolicy::mode`], not by their names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallthroughPolicy {
    pub bounded: bool,
    pub passthrough: bool,
}

/// How the implicit search treats a container it is currently inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallthroughMode {
    /// No policy: try the next sibling, otherwise ascend.
    Open,
    /// Both flags: stop, no successor.
    Sealed,
    /// First flag only: one sibling attempt, never ascend.
    Bounded,
    /// Second flag only: ascend without looking at siblings.
    Passthrough,
}

impl FallthroughPolicy {
    pub const SEALED: FallthroughPolicy = FallthroughPolicy {
        bounded: true,
        passthrough: true,
    };
    pub const BOUNDED: FallthroughPolicy = FallthroughPolicy {
        bounded: true,
        passthrough: false,
    };
    pub const PASSTHROUGH: FallthroughPolicy = FallthroughPolicy {
        bounded: false,
        passthrough: true,
    };

    /// Resolve an optional policy into a search mode. `None` and a policy with
    /// neither flag set are both `Open`.
    pub fn mode(policy: Option<FallthroughPolicy>) -> FallthroughMode {
        match policy {
            Some(FallthroughPolicy {
                bounded: true,
                passthrough: true,
            }) => FallthroughMode::Sealed,
            Some(FallthroughPolicy {
                bounded: true,
                passthrough: false,
            }) => FallthroughMode::Bounded,
            Some(FallthroughPolicy {
                bounded: false,
                passthrough: true,
            }) => FallthroughMode::Passthrough,
            _ => FallthroughMode::Open,
        }
    }
}

// ---------------------------------------------------------------------------
// Resolved links
// ---------------------------------------------------------------------------

/// Terminal sentinels accepted by `next`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Terminal {
    End,
    Stop,
    None,
}

impl Terminal {
    pub fn parse(s: &str) -> Option<Terminal> {
        match s {
            "end" => Some(Terminal::End),
            "stop" => Some(Terminal::Stop),
            "none" => Some(Terminal::None),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Terminal::End => "end",
            Terminal::Stop => "stop",
            Terminal::None => "none",
        }
    }
}

/// The node executed after a given node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Successor {
    Node(NodeId),
    Terminal(Terminal),
    /// An explicit `next` whose name was not found by ancestor search.
    Unresolved(String),
}

/// How an external reference is addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceScheme {
    /// `file:` or a relative path.
    LocalFile,
    /// `npm:` or a bare reference with no local match.
    Package,
    /// `hub:` platform-hosted atom.
    Hosted,
}

impl ReferenceScheme {
    pub fn prefix(&self) -> &'static str {
        match self {
            ReferenceScheme::LocalFile => "file",
            ReferenceScheme::Package => "npm",
            ReferenceScheme::Hosted => "hub",
        }
    }
}

/// An external library a step depends on.
///
/// Descriptors are deduplicated per compile by `(name, scheme)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryDescriptor {
    pub name: String,
    pub scheme: ReferenceScheme,
    /// The reference text as authored.
    pub reference: String,
    /// Member accessed inside the library (`lodash.get` -> `get`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member: Option<String>,
    /// Version range, filled for package references.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl LibraryDescriptor {
    pub fn key(&self) -> (&str, ReferenceScheme) {
        (self.name.as_str(), self.scheme)
    }
}

/// What a call/form/module step refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum RefTarget {
    Local(NodeId),
    External(LibraryDescriptor),
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// One authored step or synthesized diagram element.
#[derive(Debug, Clone, Serialize)]
pub struct Node {
    pub kind: NodeKind,
    /// Author-given label; empty for anonymous synthetic nodes and the root.
    pub name: String,
    /// The untouched step body.
    pub raw_definition: Value,
    /// Lowered payload text, computed at most once.
    #[serde(skip)]
    lowered_definition: OnceLock<String>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub sibling_index: usize,
    pub depth: usize,
    pub index_key: String,
    pub path_key: String,
    pub code_key: String,
    /// Random per-compile token, assigned by the indexer.
    pub unique_id: Uuid,
    pub is_flow_root: bool,
    pub is_module_import: bool,
    pub is_virtual: bool,
    pub fallthrough: Option<FallthroughPolicy>,
    /// Display key of the integration family member, for `Integration` nodes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integration: Option<String>,
    pub successor: Option<Successor>,
    pub target: Option<RefTarget>,
    #[serde(skip)]
    pub diagram_meta: Option<DiagramMeta>,
}

impl Node {
    pub fn new(kind: NodeKind, name: impl Into<String>, raw_definition: Value) -> Self {
        Self {
            kind,
            name: name.into(),
            raw_definition,
            lowered_definition: OnceLock::new(),
            parent: None,
            children: Vec::new(),
            sibling_index: 0,
            depth: 0,
            index_key: String::new(),
            path_key: String::new(),
            code_key: String::new(),
            unique_id: Uuid::nil(),
            is_flow_root: false,
            is_module_import: false,
            is_virtual: false,
            fallthrough: None,
            integration: None,
            successor: None,
            target: None,
            diagram_meta: None,
        }
    }

    /// A diagram-only node. Synthetic nodes carry no definition.
    pub fn synthetic(kind: NodeKind, name: impl Into<String>) -> Self {
        let mut node = Self::new(kind, name, Value::Null);
        node.is_virtual = true;
        node
    }

    /// Field of the raw body, if the body is a mapping.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.raw_definition.as_object().and_then(|m| m.get(key))
    }

    /// The explicit `next` field as a string.
    pub fn next_field(&self) -> Option<&str> {
        self.field("next").and_then(Value::as_str)
    }

    /// True when the body carries a `return` (including `return` steps).
    pub fn has_embedded_return(&self) -> bool {
        !self.is_virtual && self.field("return").is_some()
    }

    /// Lowered payload, computing it with `lower` on first access.
    pub fn lowered_or_init(&self, lower: impl FnOnce(&Value) -> String) -> &str {
        self.lowered_definition
            .get_or_init(|| lower(&self.raw_definition))
    }

    /// Lowered payload if it was already computed.
    pub fn lowered(&self) -> Option<&str> {
        self.lowered_definition.get().map(String::as_str)
    }

    pub fn successor_node(&self) -> Option<NodeId> {
        match self.successor {
            Some(Successor::Node(id)) => Some(id),
            _ => None,
        }
    }

    pub fn local_target(&self) -> Option<NodeId> {
        match self.target {
            Some(RefTarget::Local(id)) => Some(id),
            _ => None,
        }
    }
}
