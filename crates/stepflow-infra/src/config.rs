//! Configuration loader for Stepflow.
//!
//! Reads `stepflow.toml` and deserializes it into [`StepflowConfig`]. Falls
//! back to defaults when the file is missing or malformed.

use std::path::{Path, PathBuf};

use stepflow_types::config::StepflowConfig;

pub const CONFIG_FILE: &str = "stepflow.toml";

/// Load configuration from `path`.
///
/// - If the file does not exist, returns [`StepflowConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
/// - If the file exists and parses successfully, returns the parsed config.
pub async fn load_config(path: &Path) -> StepflowConfig {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config found at {}, using defaults", path.display());
            return StepflowConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", path.display());
            return StepflowConfig::default();
        }
    };

    match toml::from_str::<StepflowConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", path.display());
            StepflowConfig::default()
        }
    }
}

/// Where to look for configuration when none is given explicitly.
///
/// `./stepflow.toml` wins over `{config_dir}/stepflow/stepflow.toml`.
pub fn default_config_path() -> PathBuf {
    let local = PathBuf::from(CONFIG_FILE);
    if local.exists() {
        return local;
    }
    dirs::config_dir()
        .map(|dir| dir.join("stepflow").join(CONFIG_FILE))
        .unwrap_or(local)
}

/// Load from `explicit` if given, otherwise from [`default_config_path`].
pub async fn resolve_config(explicit: Option<&Path>) -> StepflowConfig {
    match explicit {
        Some(path) => load_config(path).await,
        None => load_config(&default_config_path()).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join(CONFIG_FILE)).await;
        assert_eq!(config.layout.node_width, 120.0);
        assert!(config.registry.pinned.is_empty());
    }

    #[tokio::test]
    async fn load_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join(CONFIG_FILE);
        tokio::fs::write(
            &config_path,
            r#"
[layout]
node_separation = 25.0

[registry]
url = "https://registry.example.com"
offline = true

[registry.pinned]
execa = "^9.0.0"
"#,
        )
        .await
        .unwrap();

        let config = load_config(&config_path).await;
        assert_eq!(config.layout.node_separation, 25.0);
        assert_eq!(config.registry.url, "https://registry.example.com");
        assert!(config.registry.offline);
        assert_eq!(config.registry.pinned["execa"], "^9.0.0");
    }

    #[tokio::test]
    async fn load_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join(CONFIG_FILE);
        tokio::fs::write(&config_path, "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_config(&config_path).await;
        assert!(!config.compiler.strict_targets);
        assert_eq!(config.layout.margin, 50.0);
    }

    #[tokio::test]
    async fn resolve_config_prefers_explicit_path() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("custom.toml");
        tokio::fs::write(&config_path, "[compiler]\nstrict_targets = true\n")
            .await
            .unwrap();

        let config = resolve_config(Some(&config_path)).await;
        assert!(config.compiler.strict_targets);
    }
}
