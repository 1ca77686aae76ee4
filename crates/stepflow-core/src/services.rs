//! Host services the compiler consults while resolving references.
//!
//! Implementations live in the infrastructure layer (the npm registry client)
//! or here for tests and offline use ([`OfflineServices`]).

use std::collections::HashMap;
use std::future::Future;

use stepflow_types::error::LookupError;
use stepflow_types::node::{LibraryDescriptor, ReferenceScheme};

/// External lookups needed by reference resolution.
///
/// Uses native async fn in traits (Rust 2024 edition), consumed through
/// generics rather than `dyn`.
pub trait CompileServices: Send + Sync {
    /// Build a descriptor for an external reference.
    ///
    /// `identifier` is the reference with its scheme prefix stripped. For
    /// packages it may carry a range (`lodash@^4`), which becomes the version.
    fn describe_library(&self, scheme: ReferenceScheme, identifier: &str) -> LibraryDescriptor {
        describe_library(scheme, identifier)
    }

    /// Version range to record for a package without an authored range.
    fn package_version(
        &self,
        package: &str,
    ) -> impl Future<Output = Result<String, LookupError>> + Send;
}

/// Default descriptor construction shared by all implementations.
pub fn describe_library(scheme: ReferenceScheme, identifier: &str) -> LibraryDescriptor {
    let reference = match scheme {
        ReferenceScheme::LocalFile if identifier.starts_with('.') => identifier.to_string(),
        _ => format!("{}:{identifier}", scheme.prefix()),
    };
    let (name, version) = match scheme {
        ReferenceScheme::Package => split_package_range(identifier),
        _ => (identifier.to_string(), None),
    };
    LibraryDescriptor {
        name,
        scheme,
        reference,
        member: None,
        version,
    }
}

/// Split `name@range`, keeping a leading scope `@` as part of the name.
pub fn split_package_range(spec: &str) -> (String, Option<String>) {
    match spec.rfind('@') {
        Some(at) if at > 0 => {
            let range = &spec[at + 1..];
            let range = (!range.is_empty()).then(|| range.to_string());
            (spec[..at].to_string(), range)
        }
        _ => (spec.to_string(), None),
    }
}

/// Services that never touch the network.
///
/// Pinned packages get their pinned range; everything else gets
/// `default_range`.
#[derive(Debug, Clone)]
pub struct OfflineServices {
    pinned: HashMap<String, String>,
    default_range: String,
}

impl Default for OfflineServices {
    fn default() -> Self {
        Self {
            pinned: HashMap::new(),
            default_range: "*".to_string(),
        }
    }
}

impl OfflineServices {
    pub fn new(default_range: impl Into<String>) -> Self {
        Self {
            pinned: HashMap::new(),
            default_range: default_range.into(),
        }
    }

    pub fn with_pin(mut self, package: impl Into<String>, range: impl Into<String>) -> Self {
        self.pinned.insert(package.into(), range.into());
        self
    }
}

impl CompileServices for OfflineServices {
    async fn package_version(&self, package: &str) -> Result<String, LookupError> {
        Ok(self
            .pinned
            .get(package)
            .cloned()
            .unwrap_or_else(|| self.default_range.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_package_range() {
        assert_eq!(split_package_range("lodash"), ("lodash".to_string(), None));
        assert_eq!(
            split_package_range("lodash@^4.17.0"),
            ("lodash".to_string(), Some("^4.17.0".to_string()))
        );
        assert_eq!(
            split_package_range("@scope/pkg@1.2.3"),
            ("@scope/pkg".to_string(), Some("1.2.3".to_string()))
        );
        assert_eq!(split_package_range("@scope/pkg"), ("@scope/pkg".to_string(), None));
    }

    #[test]
    fn test_describe_library_per_scheme() {
        let pkg = describe_library(ReferenceScheme::Package, "axios@1.7.0");
        assert_eq!(pkg.name, "axios");
        assert_eq!(pkg.reference, "npm:axios@1.7.0");
        assert_eq!(pkg.version.as_deref(), Some("1.7.0"));

        let file = describe_library(ReferenceScheme::LocalFile, "./lib/util.ts");
        assert_eq!(file.name, "./lib/util.ts");
        assert_eq!(file.reference, "./lib/util.ts");
        assert!(file.version.is_none());

        let hosted = describe_library(ReferenceScheme::Hosted, "acme/notify");
        assert_eq!(hosted.reference, "hub:acme/notify");
    }

    #[tokio::test]
    async fn test_offline_services_use_pins() {
        let services = OfflineServices::new("latest").with_pin("axios", "^1.7.0");
        assert_eq!(services.package_version("axios").await.unwrap(), "^1.7.0");
        assert_eq!(services.package_version("execa").await.unwrap(), "latest");
    }
}
