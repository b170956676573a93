//! Cross-kind dependency gating

use crate::error::{CloudError, Result};
use crate::kind::ResourceKind;
use crate::manifest::{ExportManifest, ManifestStore};
use std::collections::BTreeMap;

/// Loads the export manifests a kind depends on.
///
/// Only reads what upstream runs already published; a missing manifest is
/// an error, never a reason to provision the upstream kind.
#[derive(Debug, Clone)]
pub struct DependencyResolver {
    manifests: ManifestStore,
}

impl DependencyResolver {
    pub fn new(manifests: ManifestStore) -> Self {
        Self { manifests }
    }

    pub async fn resolve(&self, kind: ResourceKind) -> Result<ResolvedDependencies> {
        let mut resolved = ResolvedDependencies::default();

        for &dependency in kind.dependencies() {
            let manifest = self.manifests.read(dependency).await?.ok_or_else(|| {
                CloudError::missing_dependency(
                    dependency,
                    format!(
                        "no export manifest at {}; provision {} first",
                        self.manifests.path(dependency).display(),
                        dependency
                    ),
                )
            })?;
            if manifest.is_empty() {
                return Err(CloudError::missing_dependency(
                    dependency,
                    "export manifest is empty",
                ));
            }
            tracing::debug!("{}: resolved dependency {}", kind, dependency);
            resolved.manifests.insert(dependency, manifest);
        }

        Ok(resolved)
    }
}

/// Upstream manifests available to one run
#[derive(Debug, Clone, Default)]
pub struct ResolvedDependencies {
    manifests: BTreeMap<ResourceKind, ExportManifest>,
}

impl ResolvedDependencies {
    pub fn get(&self, kind: ResourceKind) -> Option<&ExportManifest> {
        self.manifests.get(&kind)
    }

    pub fn insert(&mut self, manifest: ExportManifest) {
        self.manifests.insert(manifest.kind(), manifest);
    }

    /// A single value from an upstream manifest
    pub fn require(&self, kind: ResourceKind, key: &str) -> Result<&str> {
        self.get(kind)
            .ok_or_else(|| CloudError::missing_dependency(kind, "export manifest not loaded"))?
            .get(key)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| CloudError::missing_dependency(kind, format!("{} is not exported", key)))
    }

    /// A non-empty list value from an upstream manifest
    pub fn require_list(&self, kind: ResourceKind, key: &str) -> Result<Vec<String>> {
        let items = self
            .get(kind)
            .ok_or_else(|| CloudError::missing_dependency(kind, "export manifest not loaded"))?
            .get_list(key)
            .unwrap_or_default();
        if items.is_empty() {
            return Err(CloudError::missing_dependency(
                kind,
                format!("{} is not exported", key),
            ));
        }
        Ok(items)
    }
}
