//! Reference resolution for call, form, module and integration steps.
//!
//! Reference text is split by scheme:
//!
//! - `file:path`, `./path`, `../path` - local file
//! - `npm:name[@range]` - package
//! - `hub:owner/atom` - hosted atom
//! - anything else is bare: first searched as a local subflow (flow root,
//!   inline module or group) among the children of the node's ancestors,
//!   then treated as a package named by the text before the first `.`
//!
//! Package descriptors without an authored range get one from
//! [`CompileServices::package_version`]. Lookups run one at a time in
//! document order, and each `(name, scheme)` is looked up once.

use stepflow_types::error::CompileError;
use stepflow_types::node::{LibraryDescriptor, Node, NodeId, NodeKind, RefTarget, ReferenceScheme};
use stepflow_types::tree::NodeTree;
use tracing::debug;

use crate::registry::{BlockRegistry, Reference};
use crate::services::CompileServices;

/// Reference text split by scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedReference<'a> {
    Bare(&'a str),
    Scheme(ReferenceScheme, &'a str),
}

pub fn parse_reference(text: &str) -> ParsedReference<'_> {
    let text = text.trim();
    if let Some(rest) = text.strip_prefix("file:") {
        ParsedReference::Scheme(ReferenceScheme::LocalFile, rest)
    } else if text.starts_with("./") || text.starts_with("../") {
        ParsedReference::Scheme(ReferenceScheme::LocalFile, text)
    } else if let Some(rest) = text.strip_prefix("npm:") {
        ParsedReference::Scheme(ReferenceScheme::Package, rest)
    } else if let Some(rest) = text.strip_prefix("hub:") {
        ParsedReference::Scheme(ReferenceScheme::Hosted, rest)
    } else {
        ParsedReference::Bare(text)
    }
}

/// Resolve the target of every referencing node and return the deduplicated
/// external dependencies in first-seen order.
#[tracing::instrument(skip_all)]
pub async fn resolve_references<S: CompileServices>(
    tree: &mut NodeTree,
    registry: &BlockRegistry,
    services: &S,
) -> Result<Vec<LibraryDescriptor>, CompileError> {
    let mut dependencies: Vec<LibraryDescriptor> = Vec::new();

    for id in tree.ids() {
        let node = tree.get(id);
        let Some(reference) = registry.reference_of(node) else {
            continue;
        };

        let mut target = match reference {
            Reference::Library(library) => {
                RefTarget::External(services.describe_library(ReferenceScheme::Package, library))
            }
            Reference::Named(text) => match parse_reference(text) {
                ParsedReference::Scheme(scheme, identifier) => {
                    RefTarget::External(services.describe_library(scheme, identifier))
                }
                ParsedReference::Bare(name) => match find_subflow(tree, id, name) {
                    Some(local) => RefTarget::Local(local),
                    None => {
                        let (package, member) = match name.split_once('.') {
                            Some((package, member)) => (package, Some(member.to_string())),
                            None => (name, None),
                        };
                        let mut descriptor =
                            services.describe_library(ReferenceScheme::Package, package);
                        descriptor.reference = name.to_string();
                        descriptor.member = member;
                        RefTarget::External(descriptor)
                    }
                },
            },
        };

        if let RefTarget::External(descriptor) = &mut target {
            let known = dependencies.iter().find(|d| d.key() == descriptor.key());
            match known {
                Some(existing) => {
                    if descriptor.version.is_none() {
                        descriptor.version = existing.version.clone();
                    }
                }
                None => {
                    if descriptor.scheme == ReferenceScheme::Package && descriptor.version.is_none() {
                        let version = services.package_version(&descriptor.name).await.map_err(
                            |source| CompileError::DependencyLookupFailure {
                                index_key: node.index_key.clone(),
                                package: descriptor.name.clone(),
                                source,
                            },
                        )?;
                        debug!(package = %descriptor.name, %version, "Resolved package version");
                        descriptor.version = Some(version);
                    }
                    dependencies.push(descriptor.clone());
                }
            }
        }

        tree.get_mut(id).target = Some(target);
    }

    debug!(dependencies = dependencies.len(), "References resolved");
    Ok(dependencies)
}

/// Local subflow named `name` visible from `id`, nearest ancestor first.
pub fn find_subflow(tree: &NodeTree, id: NodeId, name: &str) -> Option<NodeId> {
    tree.ancestors(id).find_map(|a| {
        tree.children(a)
            .iter()
            .copied()
            .find(|c| *c != id && tree.get(*c).name == name && is_subflow(tree.get(*c)))
    })
}

fn is_subflow(node: &Node) -> bool {
    node.is_flow_root
        || node.kind == NodeKind::Group
        || (node.kind == NodeKind::Module && node.field("module").is_some_and(|m| m.is_object()))
}
