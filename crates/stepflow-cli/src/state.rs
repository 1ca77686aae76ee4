//! Application state shared by every command.
//!
//! Holds the loaded configuration and knows how to turn a workflow file into
//! a [`Compilation`] backed by the npm registry client.

use std::path::Path;

use anyhow::Context;
use stepflow_core::{Compilation, Compiler};
use stepflow_infra::config::resolve_config;
use stepflow_infra::registry::NpmRegistryClient;
use stepflow_infra::source::load_document;
use stepflow_types::config::StepflowConfig;

pub struct AppState {
    pub config: StepflowConfig,
}

impl AppState {
    /// Load configuration; `--offline` overrides the file.
    pub async fn init(config_path: Option<&Path>, offline: bool) -> Self {
        let mut config = resolve_config(config_path).await;
        if offline {
            config.registry.offline = true;
        }
        Self { config }
    }

    pub fn compiler(&self) -> Compiler<NpmRegistryClient> {
        Compiler::new(NpmRegistryClient::new(&self.config.registry)).with_config(&self.config)
    }

    /// Read and compile `path`.
    pub async fn compile_file(&self, path: &Path) -> anyhow::Result<Compilation> {
        tracing::info!(path = %path.display(), offline = self.config.registry.offline, "Compiling workflow");
        let document = load_document(path)
            .await
            .with_context(|| format!("Failed to load '{}'", path.display()))?;

        self.compiler()
            .compile(&document)
            .await
            .with_context(|| format!("Failed to compile '{}'", path.display()))
    }
}
