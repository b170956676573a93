//! Export manifests
//!
//! Each successful run publishes a small `KEY=value` file with the
//! identifiers downstream kinds need. List values are comma-separated and
//! their order is significant (index follows availability-zone or
//! configuration order).

use crate::error::{CloudError, Result};
use crate::kind::ResourceKind;
use crate::state::{StateStore, write_atomic};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::fs;

const LIST_SEPARATOR: char = ',';

/// Identifiers a resource kind publishes for its dependents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportManifest {
    kind: ResourceKind,
    values: BTreeMap<String, String>,
}

impl ExportManifest {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            values: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) -> Result<&mut Self> {
        validate_key(key)?;
        let value = value.into();
        if value.contains(['\n', '\r']) {
            return Err(CloudError::Manifest(format!(
                "value of {} contains a line break",
                key
            )));
        }
        self.values.insert(key.to_string(), value);
        Ok(self)
    }

    pub fn set_list<I, S>(&mut self, key: &str, items: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut joined = Vec::new();
        for item in items {
            let item = item.as_ref();
            if item.is_empty() || item.contains(LIST_SEPARATOR) {
                return Err(CloudError::Manifest(format!(
                    "list element '{}' of {} is empty or contains '{}'",
                    item, key, LIST_SEPARATOR
                )));
            }
            joined.push(item.to_string());
        }
        let separator = LIST_SEPARATOR.to_string();
        self.set(key, joined.join(separator.as_str()))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Ordered list under `key`; an empty value is an empty list
    pub fn get_list(&self, key: &str) -> Option<Vec<String>> {
        self.values.get(key).map(|v| {
            v.split(LIST_SEPARATOR)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn render(&self) -> String {
        let mut out = format!("# stratus exports: {}\n", self.kind);
        for (key, value) in &self.values {
            out.push_str(key);
            out.push('=');
            out.push_str(value);
            out.push('\n');
        }
        out
    }

    pub fn parse(kind: ResourceKind, text: &str) -> Result<Self> {
        let mut manifest = Self::new(kind);
        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| {
                CloudError::Manifest(format!(
                    "{} manifest line {}: expected KEY=value",
                    kind,
                    index + 1
                ))
            })?;
            manifest.set(key.trim(), value.trim())?;
        }
        Ok(manifest)
    }
}

fn validate_key(key: &str) -> Result<()> {
    let valid = key.starts_with(|c: char| c.is_ascii_uppercase())
        && key
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(CloudError::Manifest(format!("invalid key '{}'", key)))
    }
}

/// Manifest files under `<state dir>/exports/<kind>.env`
#[derive(Debug, Clone)]
pub struct ManifestStore {
    dir: PathBuf,
}

impl ManifestStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn for_store(store: &StateStore) -> Self {
        Self::new(store.dir().join("exports"))
    }

    pub fn path(&self, kind: ResourceKind) -> PathBuf {
        self.dir.join(format!("{}.env", kind.slug()))
    }

    pub async fn read(&self, kind: ResourceKind) -> Result<Option<ExportManifest>> {
        let path = self.path(kind);
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path).await?;
        ExportManifest::parse(kind, &text).map(Some)
    }

    /// Overwrite the manifest of `manifest.kind()`
    pub async fn write(&self, manifest: &ExportManifest) -> Result<PathBuf> {
        let path = self.path(manifest.kind());
        write_atomic(&path, manifest.render().as_bytes()).await?;
        tracing::debug!("Wrote {} exports to {}", manifest.kind(), path.display());
        Ok(path)
    }

    /// Delete the manifest of `kind`, if there is one
    pub async fn remove(&self, kind: ResourceKind) -> Result<()> {
        let path = self.path(kind);
        if path.exists() {
            fs::remove_file(&path).await?;
            tracing::debug!("Removed {} exports at {}", kind, path.display());
        }
        Ok(())
    }
}
