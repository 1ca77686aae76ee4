//! `stepflow compile` -- show the resolved step tree.

use std::path::Path;

use anyhow::{Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use stepflow_core::Compilation;
use stepflow_types::node::{Node, NodeId, RefTarget, Successor};
use stepflow_types::tree::NodeTree;

use crate::state::AppState;

pub async fn compile_workflow(
    state: &AppState,
    file: &Path,
    flow: Option<&str>,
    json: bool,
) -> Result<()> {
    let compilation = state.compile_file(file).await?;
    let tree = compilation.tree();

    let scope = match flow {
        Some(name) => match tree.child_named(tree.root(), name) {
            Some(id) => Some(id),
            None => bail!(
                "Flow '{name}' not found (available: {})",
                compilation.flow_names().join(", ")
            ),
        },
        None => None,
    };
    let rows = step_rows(tree, scope);

    if json {
        let steps: Vec<_> = rows
            .iter()
            .map(|id| {
                let node = tree.get(*id);
                serde_json::json!({
                    "index_key": node.index_key,
                    "code_key": node.code_key,
                    "kind": node.kind.label(),
                    "next": describe_successor(tree, node),
                    "target": describe_target(tree, node),
                    "lowered": compilation.lowered(*id),
                })
            })
            .collect();
        let out = serde_json::json!({
            "flows": compilation.flow_names(),
            "steps": steps,
            "warnings": warning_lines(&compilation),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Step").fg(Color::Cyan),
            Cell::new("Kind"),
            Cell::new("Next"),
            Cell::new("Target"),
        ]);

    for id in &rows {
        let node = tree.get(*id);
        let next_cell = match &node.successor {
            Some(Successor::Unresolved(_)) => Cell::new(describe_successor(tree, node)).fg(Color::Red),
            Some(Successor::Terminal(_)) => Cell::new(describe_successor(tree, node)).fg(Color::Yellow),
            _ => Cell::new(describe_successor(tree, node)),
        };
        table.add_row(vec![
            Cell::new(&node.index_key),
            Cell::new(node.kind.label()),
            next_cell,
            Cell::new(describe_target(tree, node)),
        ]);
    }

    println!();
    println!(
        "  {} {} ({} step(s), {} dependenc{})",
        style("Compiled").green().bold(),
        style(file.display()).cyan(),
        rows.len(),
        compilation.dependencies().len(),
        if compilation.dependencies().len() == 1 { "y" } else { "ies" },
    );
    println!();
    println!("{table}");

    let warnings = warning_lines(&compilation);
    if !warnings.is_empty() {
        println!();
        for warning in &warnings {
            println!("  {} {warning}", style("warning:").yellow().bold());
        }
    }
    println!();

    Ok(())
}

/// Authored steps in tree order, optionally limited to one flow.
fn step_rows(tree: &NodeTree, flow: Option<NodeId>) -> Vec<NodeId> {
    tree.iter()
        .filter(|(id, node)| *id != tree.root() && !node.is_virtual)
        .filter(|(id, _)| flow.is_none() || tree.flow_of(*id) == flow)
        .map(|(id, _)| id)
        .collect()
}

fn describe_successor(tree: &NodeTree, node: &Node) -> String {
    match &node.successor {
        Some(Successor::Node(id)) => tree.get(*id).index_key.clone(),
        Some(Successor::Terminal(terminal)) => terminal.as_str().to_string(),
        Some(Successor::Unresolved(name)) => format!("{name}?"),
        None => "-".to_string(),
    }
}

fn describe_target(tree: &NodeTree, node: &Node) -> String {
    match &node.target {
        Some(RefTarget::Local(id)) => tree.get(*id).index_key.clone(),
        Some(RefTarget::External(library)) => library.reference.clone(),
        None => String::new(),
    }
}

fn warning_lines(compilation: &Compilation) -> Vec<String> {
    compilation.warnings().iter().map(ToString::to_string).collect()
}
