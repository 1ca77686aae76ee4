//! `stepflow deps` -- list external libraries.

use std::path::Path;

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use stepflow_types::node::{LibraryDescriptor, ReferenceScheme};

use crate::state::AppState;

pub async fn list_dependencies(state: &AppState, file: &Path, json: bool) -> Result<()> {
    let compilation = state.compile_file(file).await?;
    let dependencies = compilation.dependencies();

    if json {
        println!("{}", serde_json::to_string_pretty(dependencies)?);
        return Ok(());
    }

    if dependencies.is_empty() {
        println!();
        println!("  No external dependencies in {}.", style(file.display()).cyan());
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Name").fg(Color::Cyan),
            Cell::new("Scheme"),
            Cell::new("Version"),
            Cell::new("Reference"),
        ]);

    for library in dependencies {
        table.add_row(vec![
            Cell::new(&library.name),
            scheme_cell(library.scheme),
            Cell::new(version_text(library)),
            Cell::new(&library.reference),
        ]);
    }

    println!();
    println!("{table}");
    if state.config.registry.offline {
        println!(
            "  {}",
            style("offline: versions come from pins or the default range").dim()
        );
    }
    println!();

    Ok(())
}

fn scheme_cell(scheme: ReferenceScheme) -> Cell {
    let color = match scheme {
        ReferenceScheme::Package => Color::Green,
        ReferenceScheme::LocalFile => Color::Yellow,
        ReferenceScheme::Hosted => Color::Magenta,
    };
    Cell::new(scheme.prefix()).fg(color)
}

fn version_text(library: &LibraryDescriptor) -> &str {
    library.version.as_deref().unwrap_or("-")
}
