//! `stepflow diagram` -- render process diagrams.

use std::path::Path;

use anyhow::{Context, Result};
use console::style;
use stepflow_core::diagram::serializer::{to_bpmn_xml, to_json};
use stepflow_types::diagram::{DiagramDocument, DiagramScope};

use super::DiagramFormat;
use crate::state::AppState;

pub async fn render_diagram(
    state: &AppState,
    file: &Path,
    flow: Option<&str>,
    format: DiagramFormat,
    output: Option<&Path>,
    quiet: bool,
) -> Result<()> {
    let compilation = state.compile_file(file).await?;
    let document = match flow {
        Some(name) => compilation.diagram(name)?,
        None => compilation.diagram_all()?,
    };

    let rendered = match format {
        DiagramFormat::Bpmn => to_bpmn_xml(&document)?,
        DiagramFormat::Json => to_json(&document)?,
    };

    let Some(path) = output else {
        println!("{rendered}");
        return Ok(());
    };

    tokio::fs::write(path, &rendered)
        .await
        .with_context(|| format!("Failed to write '{}'", path.display()))?;

    if !quiet {
        println!();
        println!(
            "  {} {} ({} process(es), {} element(s))",
            style("Wrote").green().bold(),
            style(path.display()).cyan(),
            document.processes.len(),
            element_count(&document),
        );
        println!();
    }

    Ok(())
}

/// Elements across every plane, nested ones included.
fn element_count(document: &DiagramDocument) -> usize {
    fn count(scope: &DiagramScope) -> usize {
        scope.elements.len() + scope.nested.iter().map(count).sum::<usize>()
    }
    document.processes.iter().map(|p| count(&p.scope)).sum()
}
