//! Image registry: one repository per configured name

use super::{recorded, require_auth, wait_for};
use crate::error::{CloudError, Result};
use crate::kind::ResourceKind;
use crate::ledger::{CreationLedger, LedgerEntry, ObjectType};
use crate::manifest::ExportManifest;
use crate::provider::{RegistryApi, RepositoryInfo};
use crate::provisioner::{ExistingObject, ResourcePolicy, RunContext};
use crate::rollback::Teardown;
use crate::state::ResourceSection;
use async_trait::async_trait;
use std::sync::Arc;
use stratus_config::{RegistryConfig, ResolvedConfiguration};

const REPOSITORY_NAMES: &str = "repository_names";
const REGISTRY_ID: &str = "registry_id";
const REGISTRY_HOST: &str = "registry_host";

pub struct ImageRegistryPolicy {
    config: Arc<ResolvedConfiguration>,
    api: Arc<dyn RegistryApi>,
}

impl ImageRegistryPolicy {
    pub fn new(config: Arc<ResolvedConfiguration>, api: Arc<dyn RegistryApi>) -> Self {
        Self { config, api }
    }

    fn registry(&self) -> &RegistryConfig {
        &self.config.image_registry
    }

    /// `<project>-<environment>/<name>` for every configured repository
    fn repositories(&self) -> Vec<String> {
        self.registry()
            .repositories
            .iter()
            .map(|name| {
                format!(
                    "{}-{}/{}",
                    self.config.project, self.config.environment, name
                )
            })
            .collect()
    }

    fn recorded_repositories(&self, section: &ResourceSection) -> Vec<String> {
        let present = section.get_list(REPOSITORY_NAMES);
        self.repositories()
            .into_iter()
            .filter(|name| present.contains(name))
            .collect()
    }

    /// Registry id and host are shared by every repository in the account
    fn record_registry(&self, section: &mut ResourceSection, info: &RepositoryInfo) {
        section.set(REGISTRY_ID, info.registry_id.as_str());
        if let Some(host) = registry_host(info) {
            section.set(REGISTRY_HOST, host);
        }
    }
}

/// `123456789012.dkr.ecr.us-east-1.amazonaws.com` from a repository URI
fn registry_host(info: &RepositoryInfo) -> Option<&str> {
    info.uri
        .strip_suffix(info.name.as_str())
        .and_then(|rest| rest.strip_suffix('/'))
        .filter(|host| !host.is_empty())
}

#[async_trait]
impl Teardown for ImageRegistryPolicy {
    async fn teardown(&self, entry: &LedgerEntry) -> Result<()> {
        match entry.object {
            ObjectType::Repository => self.api.delete_repository(&entry.id).await,
            other => Err(CloudError::api(
                "image registry teardown",
                format!("{} is not a repository", other),
            )),
        }
    }
}

#[async_trait]
impl ResourcePolicy for ImageRegistryPolicy {
    fn kind(&self) -> ResourceKind {
        ResourceKind::ImageRegistry
    }

    async fn check_prerequisites(&self, _ctx: &RunContext) -> Result<()> {
        if self.registry().repositories.is_empty() {
            return Err(CloudError::prerequisite(
                "image_registry.repositories needs at least one name",
            ));
        }
        if self.registry().keep_last_images == Some(0) {
            return Err(CloudError::prerequisite(
                "image_registry.keep_last_images must be at least 1",
            ));
        }
        require_auth(self.api.as_ref()).await
    }

    async fn find_existing(&self) -> Result<Vec<ExistingObject>> {
        let mut existing = Vec::new();
        for name in self.repositories() {
            if let Some(info) = self.api.find_repository(&name).await? {
                existing.push(ExistingObject::new(ObjectType::Repository, info.name, info.arn));
            }
        }
        Ok(existing)
    }

    async fn adopt(
        &self,
        existing: &[ExistingObject],
        section: &mut ResourceSection,
        _ctx: &RunContext,
    ) -> Result<()> {
        for object in existing.iter().filter(|o| o.object == ObjectType::Repository) {
            let info = self.api.find_repository(&object.name).await?.ok_or_else(|| {
                CloudError::api(
                    "describe repository",
                    format!("{} disappeared before it could be adopted", object.name),
                )
            })?;
            tracing::info!("Adopting repository {} ({})", info.name, info.uri);
            self.record_registry(section, &info);
            section.push(REPOSITORY_NAMES, info.name.as_str());
        }
        Ok(())
    }

    async fn create(
        &self,
        section: &mut ResourceSection,
        ledger: &mut CreationLedger,
        ctx: &RunContext,
    ) -> Result<()> {
        for name in self.repositories() {
            if section.get_list(REPOSITORY_NAMES).contains(&name) {
                continue;
            }
            ctx.checkpoint()?;
            let info = self
                .api
                .create_repository(&name, &self.registry().encryption)
                .await?;
            tracing::info!("Created repository {} ({})", info.name, info.uri);
            ledger.record(LedgerEntry::new(
                ObjectType::Repository,
                &info.name,
                &info.name,
                REPOSITORY_NAMES,
            ));
            self.record_registry(section, &info);
            section.push(REPOSITORY_NAMES, info.name.as_str());
        }
        let ordered = self.recorded_repositories(section);
        section.set_list(REPOSITORY_NAMES, ordered);
        Ok(())
    }

    async fn configure(&self, section: &mut ResourceSection, ctx: &RunContext) -> Result<()> {
        let registry = self.registry();
        for name in self.recorded_repositories(section) {
            ctx.checkpoint()?;
            self.api.put_scan_on_push(&name, registry.scan_on_push).await?;
            self.api
                .put_tag_mutability(&name, registry.immutable_tags)
                .await?;
            self.api
                .put_lifecycle_policy(&name, registry.keep_last_images)
                .await?;
        }

        section.set("scan_on_push", registry.scan_on_push);
        section.set("immutable_tags", registry.immutable_tags);
        match registry.keep_last_images {
            Some(count) => section.set("keep_last_images", count),
            None => {
                section.remove("keep_last_images");
            }
        }
        Ok(())
    }

    async fn verify(&self, section: &ResourceSection, ctx: &RunContext) -> Result<()> {
        let config = self.config.as_ref();
        recorded(section, REGISTRY_HOST)?;
        for name in self.recorded_repositories(section) {
            let repository = name.as_str();
            wait_for(
                config,
                ctx,
                format!("repository {}", repository),
                config.timeouts.repository(),
                || self.api.repository_status(repository),
            )
            .await?;
        }
        Ok(())
    }

    fn exports(&self, section: &ResourceSection) -> Result<ExportManifest> {
        let host = recorded(section, REGISTRY_HOST)?;
        let names = self.recorded_repositories(section);
        if names.len() != self.repositories().len() {
            return Err(CloudError::StateError(
                "not every configured repository is recorded".to_string(),
            ));
        }
        let uris: Vec<String> = names.iter().map(|n| format!("{}/{}", host, n)).collect();

        let mut manifest = ExportManifest::new(ResourceKind::ImageRegistry);
        manifest
            .set("REGISTRY_ID", recorded(section, REGISTRY_ID)?)?
            .set("REGISTRY_HOST", host)?
            .set_list("REPOSITORY_NAMES", &names)?
            .set_list("REPOSITORY_URIS", &uris)?;
        Ok(manifest)
    }
}
