//! Persisted state document
//!
//! One `state.json` per (project, environment) under
//! `<state_dir>/<project>/<environment>/`. Every writer goes through
//! [`StateStore::merge_and_save`], which re-reads the document and replaces a
//! single section, so provisioners of different kinds never clobber each
//! other. Separate processes writing at the same time are not coordinated by
//! the merge itself; the last writer wins. [`StateLock`] is the advisory
//! guard callers can take around a whole run.

use crate::error::{CloudError, Result};
use crate::kind::ResourceKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use stratus_config::ResolvedConfiguration;
use tokio::fs;

const STATE_VERSION: u32 = 1;
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";
const LOCK_FILE: &str = "lock.json";
const STALE_LOCK_HOURS: i64 = 1;

fn default_version() -> u32 {
    STATE_VERSION
}

/// The unified state document for one (project, environment, region)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudState {
    #[serde(default = "default_version")]
    pub version: u32,

    pub project: String,

    pub environment: String,

    pub region: String,

    /// Never moves backwards across writes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,

    #[serde(default)]
    pub network: ResourceSection,

    #[serde(default)]
    pub object_store: ResourceSection,

    #[serde(default)]
    pub image_registry: ResourceSection,

    #[serde(default)]
    pub cluster: ResourceSection,

    /// Keys this version does not know about, kept verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl CloudState {
    pub fn new(
        project: impl Into<String>,
        environment: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            version: STATE_VERSION,
            project: project.into(),
            environment: environment.into(),
            region: region.into(),
            last_updated: None,
            network: ResourceSection::default(),
            object_store: ResourceSection::default(),
            image_registry: ResourceSection::default(),
            cluster: ResourceSection::default(),
            extra: BTreeMap::new(),
        }
    }

    pub fn section(&self, kind: ResourceKind) -> &ResourceSection {
        match kind {
            ResourceKind::Network => &self.network,
            ResourceKind::ObjectStore => &self.object_store,
            ResourceKind::ImageRegistry => &self.image_registry,
            ResourceKind::Cluster => &self.cluster,
        }
    }

    pub fn section_mut(&mut self, kind: ResourceKind) -> &mut ResourceSection {
        match kind {
            ResourceKind::Network => &mut self.network,
            ResourceKind::ObjectStore => &mut self.object_store,
            ResourceKind::ImageRegistry => &mut self.image_registry,
            ResourceKind::Cluster => &mut self.cluster,
        }
    }

    /// Advance `last_updated` to now, or keep it if the clock went backwards
    pub fn touch(&mut self) {
        let now = Utc::now();
        self.last_updated = Some(match self.last_updated {
            Some(previous) if previous > now => previous,
            _ => now,
        });
    }
}

/// Flat attribute map describing the last known state of one kind.
///
/// Values are JSON scalars or ordered lists of identifiers. The schema is
/// loose on purpose: readers must tolerate missing keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceSection(BTreeMap<String, Value>);

impl ResourceSection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    /// List of strings under `key`; a scalar string is a one-element list
    pub fn get_list(&self, key: &str) -> Vec<String> {
        match self.0.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
            Some(Value::String(s)) => vec![s.clone()],
            _ => Vec::new(),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn set_list<I, S>(&mut self, key: impl Into<String>, items: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let items = items.into_iter().map(|s| Value::String(s.into())).collect();
        self.0.insert(key.into(), Value::Array(items));
    }

    /// Append an identifier to the list under `key`
    pub fn push(&mut self, key: &str, id: impl Into<String>) {
        let mut items = self.get_list(key);
        items.push(id.into());
        self.set_list(key, items);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Remove `id` from the value under `key`.
    ///
    /// A scalar equal to `id` removes the key. A list loses the matching
    /// element and the key is dropped once the list is empty.
    pub fn remove_value(&mut self, key: &str, id: &str) -> bool {
        match self.0.get_mut(key) {
            Some(Value::String(s)) if s == id => {
                self.0.remove(key);
                true
            }
            Some(Value::Array(items)) => {
                let before = items.len();
                items.retain(|v| v.as_str() != Some(id));
                let removed = items.len() != before;
                if items.is_empty() {
                    self.0.remove(key);
                }
                removed
            }
            _ => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

/// Reads and writes the state document of one (project, environment)
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
    project: String,
    environment: String,
    region: String,
}

impl StateStore {
    pub fn new(
        state_root: impl AsRef<Path>,
        project: impl Into<String>,
        environment: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        let project = project.into();
        let environment = environment.into();
        Self {
            dir: state_root.as_ref().join(&project).join(&environment),
            project,
            environment,
            region: region.into(),
        }
    }

    pub fn from_config(config: &ResolvedConfiguration) -> Self {
        Self::new(
            &config.state.dir,
            &config.project,
            &config.environment,
            &config.region,
        )
    }

    /// Directory holding the state document, lock and export manifests
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.dir.join(STATE_BACKUP)
    }

    fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }

    /// Load the document; a missing file yields an empty-sectioned state
    pub async fn load(&self) -> Result<CloudState> {
        let path = self.state_path();
        if !path.exists() {
            tracing::debug!("State file not found, returning empty state");
            return Ok(CloudState::new(
                &self.project,
                &self.environment,
                &self.region,
            ));
        }

        let content = fs::read_to_string(&path).await?;
        let state: CloudState = serde_json::from_str(&content).map_err(|e| {
            CloudError::StateError(format!("cannot parse {}: {}", path.display(), e))
        })?;

        if state.version > STATE_VERSION {
            return Err(CloudError::StateError(format!(
                "State file version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }
        if state.project != self.project || state.environment != self.environment {
            return Err(CloudError::StateError(format!(
                "{} belongs to {}/{}, expected {}/{}",
                path.display(),
                state.project,
                state.environment,
                self.project,
                self.environment
            )));
        }

        Ok(state)
    }

    /// Replace exactly one section, keeping every sibling section intact.
    ///
    /// Always reads the current document first, so callers that only know
    /// about their own kind cannot drop the others.
    pub async fn merge_and_save(
        &self,
        kind: ResourceKind,
        section: ResourceSection,
    ) -> Result<CloudState> {
        let mut state = self.load().await?;
        *state.section_mut(kind) = section;
        state.region = self.region.clone();
        state.touch();
        self.save(&state).await?;
        tracing::debug!(
            "Merged {} section into {}",
            kind,
            self.state_path().display()
        );
        Ok(state)
    }

    async fn save(&self, state: &CloudState) -> Result<()> {
        let path = self.state_path();
        if path.exists() {
            fs::copy(&path, self.backup_path()).await?;
        }
        let content = serde_json::to_string_pretty(state)?;
        write_atomic(&path, content.as_bytes()).await
    }

    /// Acquire the advisory run lock for this (project, environment)
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        fs::create_dir_all(&self.dir).await?;

        let lock_path = self.lock_path();

        if lock_path.exists() {
            let content = fs::read_to_string(&lock_path).await?;
            match serde_json::from_str::<LockInfo>(&content) {
                Ok(lock_info) => {
                    let age = Utc::now().signed_duration_since(lock_info.acquired_at);
                    if age.num_hours() < STALE_LOCK_HOURS {
                        return Err(CloudError::LockError(format!(
                            "State is locked by {} (pid {}) since {}",
                            lock_info.holder, lock_info.pid, lock_info.acquired_at
                        )));
                    }
                    tracing::warn!("Removing stale lock from {}", lock_info.holder);
                }
                Err(_) => tracing::warn!("Replacing unreadable lock file"),
            }
        }

        let lock_info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            pid: std::process::id(),
            acquired_at: Utc::now(),
        };

        let content = serde_json::to_string_pretty(&lock_info)?;
        write_atomic(&lock_path, content.as_bytes()).await?;

        tracing::debug!("Acquired state lock");
        Ok(StateLock {
            lock_path,
            released: false,
        })
    }
}

/// Write through a temporary sibling and rename it into place
pub(crate) async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, contents).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    pid: u32,
    acquired_at: DateTime<Utc>,
}

/// RAII guard for the advisory state lock
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            if self.lock_path.exists() {
                fs::remove_file(&self.lock_path).await?;
                tracing::debug!("Released state lock");
            }
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released && self.lock_path.exists() {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn store(root: &Path) -> StateStore {
        StateStore::new(root, "shop", "dev", "us-east-1")
    }

    #[tokio::test]
    async fn test_load_missing_returns_empty_state() {
        let temp_dir = tempdir().unwrap();
        let state = store(temp_dir.path()).load().await.unwrap();

        assert_eq!(state.project, "shop");
        assert_eq!(state.environment, "dev");
        assert!(state.network.is_empty());
        assert!(state.cluster.is_empty());
        assert!(state.last_updated.is_none());
    }

    #[tokio::test]
    async fn test_merge_keeps_sibling_sections() {
        let temp_dir = tempdir().unwrap();
        let store = store(temp_dir.path());

        let mut network = ResourceSection::new();
        network.set("vpc_id", "vpc-1");
        store
            .merge_and_save(ResourceKind::Network, network.clone())
            .await
            .unwrap();

        let mut buckets = ResourceSection::new();
        buckets.set_list("bucket_names", ["shop-dev-artifacts"]);
        store
            .merge_and_save(ResourceKind::ObjectStore, buckets.clone())
            .await
            .unwrap();

        let state = store.load().await.unwrap();
        assert_eq!(state.network, network);
        assert_eq!(state.object_store, buckets);
        assert!(store.dir().join("state.json.backup").exists());
    }

    #[tokio::test]
    async fn test_last_updated_never_goes_backwards() {
        let temp_dir = tempdir().unwrap();
        let store = store(temp_dir.path());

        let future = Utc::now() + chrono::Duration::hours(2);
        let mut state = CloudState::new("shop", "dev", "us-east-1");
        state.last_updated = Some(future);
        store.save(&state).await.unwrap();

        let saved = store
            .merge_and_save(ResourceKind::Cluster, ResourceSection::new())
            .await
            .unwrap();
        assert_eq!(saved.last_updated, Some(future));
    }

    #[tokio::test]
    async fn test_last_updated_advances() {
        let temp_dir = tempdir().unwrap();
        let store = store(temp_dir.path());

        let first = store
            .merge_and_save(ResourceKind::Network, ResourceSection::new())
            .await
            .unwrap()
            .last_updated;
        let second = store
            .merge_and_save(ResourceKind::Cluster, ResourceSection::new())
            .await
            .unwrap()
            .last_updated;
        assert!(first.is_some());
        assert!(second >= first);
    }

    #[tokio::test]
    async fn test_unknown_keys_survive_merge() {
        let temp_dir = tempdir().unwrap();
        let store = store(temp_dir.path());
        std::fs::create_dir_all(store.dir()).unwrap();
        std::fs::write(
            store.state_path(),
            json!({
                "project": "shop",
                "environment": "dev",
                "region": "us-east-1",
                "network": {"vpc_id": "vpc-9"},
                "dns": {"zone_id": "Z123"}
            })
            .to_string(),
        )
        .unwrap();

        store
            .merge_and_save(ResourceKind::ImageRegistry, ResourceSection::new())
            .await
            .unwrap();

        let raw: Value =
            serde_json::from_str(&std::fs::read_to_string(store.state_path()).unwrap()).unwrap();
        assert_eq!(raw["dns"]["zone_id"], "Z123");
        assert_eq!(raw["network"]["vpc_id"], "vpc-9");
        assert_eq!(raw["object_store"], json!({}));
    }

    #[tokio::test]
    async fn test_rejects_foreign_document() {
        let temp_dir = tempdir().unwrap();
        let other = StateStore::new(temp_dir.path(), "shop", "dev", "us-east-1");
        other
            .merge_and_save(ResourceKind::Network, ResourceSection::new())
            .await
            .unwrap();

        // Same directory, different identity written into the file
        let mut state = other.load().await.unwrap();
        state.project = "billing".to_string();
        other.save(&state).await.unwrap();

        let err = other.load().await.unwrap_err();
        assert!(matches!(err, CloudError::StateError(_)));
    }

    #[tokio::test]
    async fn test_rejects_newer_version() {
        let temp_dir = tempdir().unwrap();
        let store = store(temp_dir.path());
        let mut state = CloudState::new("shop", "dev", "us-east-1");
        state.version = STATE_VERSION + 1;
        store.save(&state).await.unwrap();

        assert!(store.load().await.is_err());
    }

    #[tokio::test]
    async fn test_lock_excludes_second_holder() {
        let temp_dir = tempdir().unwrap();
        let store = store(temp_dir.path());

        let lock = store.acquire_lock().await.unwrap();
        assert!(matches!(
            store.acquire_lock().await,
            Err(CloudError::LockError(_))
        ));

        lock.release().await.unwrap();
        let again = store.acquire_lock().await.unwrap();
        drop(again);
        assert!(!store.dir().join("lock.json").exists());
    }

    #[test]
    fn test_section_remove_value() {
        let mut section = ResourceSection::new();
        section.set("vpc_id", "vpc-1");
        section.set_list("subnet_ids", ["subnet-a", "subnet-b"]);

        assert!(section.remove_value("subnet_ids", "subnet-b"));
        assert_eq!(section.get_list("subnet_ids"), vec!["subnet-a"]);
        assert!(section.remove_value("subnet_ids", "subnet-a"));
        assert!(!section.contains_key("subnet_ids"));

        assert!(!section.remove_value("vpc_id", "vpc-2"));
        assert!(section.remove_value("vpc_id", "vpc-1"));
        assert!(section.is_empty());
    }

    #[test]
    fn test_section_push_preserves_order() {
        let mut section = ResourceSection::new();
        section.push("ids", "b");
        section.push("ids", "a");
        section.push("ids", "c");
        assert_eq!(section.get_list("ids"), vec!["b", "a", "c"]);
    }
}
