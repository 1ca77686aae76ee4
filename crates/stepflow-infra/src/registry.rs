//! npm registry client.
//!
//! Implements [`CompileServices`] by reading a package document from the
//! registry and turning its `latest` dist-tag into a caret range. Results are
//! cached per package for the lifetime of the client. Pinned versions bypass
//! the registry entirely; offline mode never contacts it.

use std::collections::HashMap;

use dashmap::DashMap;
use reqwest::StatusCode;
use serde::Deserialize;
use stepflow_core::services::CompileServices;
use stepflow_types::config::RegistryConfig;
use stepflow_types::error::LookupError;
use tracing::debug;

const USER_AGENT: &str = "stepflow-registry/0.1";

/// Subset of an npm package document.
#[derive(Debug, Deserialize)]
struct PackageDocument {
    #[serde(rename = "dist-tags", default)]
    dist_tags: HashMap<String, String>,
}

pub struct NpmRegistryClient {
    base_url: String,
    offline: bool,
    default_range: String,
    pinned: HashMap<String, String>,
    cache: DashMap<String, String>,
    http: reqwest::Client,
}

impl NpmRegistryClient {
    pub fn new(config: &RegistryConfig) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();

        Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            offline: config.offline,
            default_range: config.default_range.clone(),
            pinned: config.pinned.clone(),
            cache: DashMap::new(),
            http,
        }
    }

    /// Document URL of `package`; the scope separator is percent-encoded.
    fn package_url(&self, package: &str) -> String {
        format!("{}/{}", self.base_url, package.replace('/', "%2f"))
    }

    async fn fetch_latest(&self, package: &str) -> Result<String, LookupError> {
        let url = self.package_url(package);
        debug!(package, %url, "Fetching package document");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| LookupError::Http(e.to_string()))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(LookupError::NotFound(package.to_string()));
        }

        let document: PackageDocument = response
            .error_for_status()
            .map_err(|e| LookupError::Http(e.to_string()))?
            .json()
            .await
            .map_err(|e| LookupError::InvalidResponse(e.to_string()))?;

        document
            .dist_tags
            .get("latest")
            .map(|latest| format!("^{latest}"))
            .ok_or_else(|| LookupError::InvalidResponse(format!("no latest dist-tag for '{package}'")))
    }
}

impl CompileServices for NpmRegistryClient {
    async fn package_version(&self, package: &str) -> Result<String, LookupError> {
        if let Some(pinned) = self.pinned.get(package) {
            return Ok(pinned.clone());
        }
        if let Some(cached) = self.cache.get(package) {
            return Ok(cached.value().clone());
        }
        if self.offline {
            if self.default_range.is_empty() {
                return Err(LookupError::Offline(package.to_string()));
            }
            return Ok(self.default_range.clone());
        }

        let range = self.fetch_latest(package).await?;
        debug!(package, %range, "Resolved latest version");
        self.cache.insert(package.to_string(), range.clone());
        Ok(range)
    }
}
