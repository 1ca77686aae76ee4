//! Workflow document loading.

use std::path::Path;

use serde_json::Value;
use stepflow_core::tree_builder::parse_document;
use stepflow_types::error::CompileError;

/// Read a workflow file as text.
pub async fn read_source(path: &Path) -> Result<String, CompileError> {
    let text = tokio::fs::read_to_string(path).await?;
    tracing::debug!(path = %path.display(), bytes = text.len(), "Workflow source read");
    Ok(text)
}

/// Read and parse a workflow file.
pub async fn load_document(path: &Path) -> Result<Value, CompileError> {
    let text = read_source(path).await?;
    parse_document(&text)
}
