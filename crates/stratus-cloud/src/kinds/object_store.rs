//! Object store: one bucket per configured purpose

use super::{require_auth, wait_for};
use crate::error::{CloudError, Result};
use crate::kind::ResourceKind;
use crate::ledger::{CreationLedger, LedgerEntry, ObjectType};
use crate::manifest::ExportManifest;
use crate::provider::ObjectStoreApi;
use crate::provisioner::{ExistingObject, ResourcePolicy, RunContext};
use crate::rollback::Teardown;
use crate::state::ResourceSection;
use async_trait::async_trait;
use std::sync::Arc;
use stratus_config::{Encryption, ObjectStoreConfig, ResolvedConfiguration};

const BUCKET_NAMES: &str = "bucket_names";

/// Longest bucket name the provider accepts
const MAX_BUCKET_NAME: usize = 63;

pub struct ObjectStorePolicy {
    config: Arc<ResolvedConfiguration>,
    api: Arc<dyn ObjectStoreApi>,
}

impl ObjectStorePolicy {
    pub fn new(config: Arc<ResolvedConfiguration>, api: Arc<dyn ObjectStoreApi>) -> Self {
        Self { config, api }
    }

    fn store(&self) -> &ObjectStoreConfig {
        &self.config.object_store
    }

    /// `(purpose, bucket name)` in configuration order
    fn buckets(&self) -> Vec<(String, String)> {
        self.store()
            .buckets
            .iter()
            .map(|purpose| (purpose.clone(), self.config.resource_name(purpose)))
            .collect()
    }

    /// Configured bucket names present in `section`, in purpose order
    fn recorded_buckets(&self, section: &ResourceSection) -> Vec<String> {
        let present = section.get_list(BUCKET_NAMES);
        self.buckets()
            .into_iter()
            .map(|(_, name)| name)
            .filter(|name| present.contains(name))
            .collect()
    }
}

fn export_key(purpose: &str) -> String {
    format!("BUCKET_{}", purpose.to_ascii_uppercase().replace('-', "_"))
}

fn encryption_label(encryption: &Encryption) -> &'static str {
    match encryption {
        Encryption::Aes256 => "aes256",
        Encryption::Kms { .. } => "kms",
    }
}

#[async_trait]
impl Teardown for ObjectStorePolicy {
    async fn teardown(&self, entry: &LedgerEntry) -> Result<()> {
        match entry.object {
            ObjectType::Bucket => {
                self.api.empty_bucket(&entry.id).await?;
                self.api.delete_bucket(&entry.id).await
            }
            other => Err(CloudError::api(
                "object store teardown",
                format!("{} is not a bucket", other),
            )),
        }
    }
}

#[async_trait]
impl ResourcePolicy for ObjectStorePolicy {
    fn kind(&self) -> ResourceKind {
        ResourceKind::ObjectStore
    }

    async fn check_prerequisites(&self, _ctx: &RunContext) -> Result<()> {
        if self.store().buckets.is_empty() {
            return Err(CloudError::prerequisite(
                "object_store.buckets needs at least one purpose",
            ));
        }
        for (purpose, name) in self.buckets() {
            if name.len() > MAX_BUCKET_NAME {
                return Err(CloudError::prerequisite(format!(
                    "bucket name '{}' for purpose '{}' exceeds {} characters",
                    name, purpose, MAX_BUCKET_NAME
                )));
            }
        }
        require_auth(self.api.as_ref()).await
    }

    async fn find_existing(&self) -> Result<Vec<ExistingObject>> {
        let mut existing = Vec::new();
        for (_, name) in self.buckets() {
            if self.api.bucket_exists(&name).await? {
                existing.push(ExistingObject::new(ObjectType::Bucket, &name, &name));
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
        for object in existing.iter().filter(|o| o.object == ObjectType::Bucket) {
            tracing::info!("Adopting bucket {}", object.name);
            section.push(BUCKET_NAMES, &object.name);
        }
        Ok(())
    }

    async fn create(
        &self,
        section: &mut ResourceSection,
        ledger: &mut CreationLedger,
        ctx: &RunContext,
    ) -> Result<()> {
        for (purpose, name) in self.buckets() {
            if section.get_list(BUCKET_NAMES).contains(&name) {
                continue;
            }
            ctx.checkpoint()?;
            self.api.create_bucket(&name).await?;
            tracing::info!("Created {} bucket {}", purpose, name);
            ledger.record(LedgerEntry::new(ObjectType::Bucket, &name, &name, BUCKET_NAMES));
            section.push(BUCKET_NAMES, &name);
        }
        let ordered = self.recorded_buckets(section);
        section.set_list(BUCKET_NAMES, ordered);
        Ok(())
    }

    async fn configure(&self, section: &mut ResourceSection, ctx: &RunContext) -> Result<()> {
        let store = self.store();
        for name in self.recorded_buckets(section) {
            ctx.checkpoint()?;
            tracing::debug!("Configuring bucket {}", name);
            self.api.put_versioning(&name, store.versioning).await?;
            self.api.put_encryption(&name, &store.encryption).await?;
            self.api
                .put_public_access_block(&name, store.block_public_access)
                .await?;
            self.api
                .put_lifecycle(&name, store.noncurrent_expiration_days)
                .await?;
        }

        section.set("versioning", store.versioning);
        section.set("encryption", encryption_label(&store.encryption));
        section.set("block_public_access", store.block_public_access);
        match store.noncurrent_expiration_days {
            Some(days) => section.set("noncurrent_expiration_days", days),
            None => {
                section.remove("noncurrent_expiration_days");
            }
        }
        Ok(())
    }

    async fn verify(&self, section: &ResourceSection, ctx: &RunContext) -> Result<()> {
        let config = self.config.as_ref();
        for name in self.recorded_buckets(section) {
            let bucket = name.as_str();
            wait_for(
                config,
                ctx,
                format!("bucket {}", bucket),
                config.timeouts.bucket(),
                || self.api.bucket_status(bucket),
            )
            .await?;
        }
        Ok(())
    }

    fn exports(&self, section: &ResourceSection) -> Result<ExportManifest> {
        let present = self.recorded_buckets(section);
        let mut manifest = ExportManifest::new(ResourceKind::ObjectStore);
        let mut arns = Vec::new();

        for (purpose, name) in self.buckets() {
            if !present.contains(&name) {
                return Err(CloudError::StateError(format!(
                    "bucket {} is missing from the section",
                    name
                )));
            }
            manifest.set(&export_key(&purpose), name.as_str())?;
            arns.push(self.api.bucket_arn(&name));
        }
        manifest
            .set_list("BUCKET_NAMES", &present)?
            .set_list("BUCKET_ARNS", &arns)?;
        Ok(manifest)
    }
}
