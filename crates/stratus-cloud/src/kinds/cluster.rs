//! Managed cluster: IAM roles, control plane and one node group

use super::{recorded, require_auth, wait_for};
use crate::error::{CloudError, Result};
use crate::kind::ResourceKind;
use crate::ledger::{CreationLedger, LedgerEntry, ObjectType};
use crate::manifest::ExportManifest;
use crate::provider::{ClusterApi, ClusterSpec, NodeGroupSpec, RolePurpose, Scaling};
use crate::provisioner::{ExistingObject, ResourcePolicy, RunContext};
use crate::rollback::Teardown;
use crate::state::ResourceSection;
use async_trait::async_trait;
use std::sync::Arc;
use stratus_config::{ClusterConfig, ResolvedConfiguration};

const CLUSTER_NAME: &str = "cluster_name";
const CLUSTER_ARN: &str = "cluster_arn";
const CLUSTER_ENDPOINT: &str = "cluster_endpoint";
const CLUSTER_VERSION: &str = "cluster_version";
const CLUSTER_ROLE_NAME: &str = "cluster_role_name";
const CLUSTER_ROLE_ARN: &str = "cluster_role_arn";
const NODE_GROUP_NAME: &str = "node_group_name";
const NODE_GROUP_ARN: &str = "node_group_arn";
const NODE_ROLE_NAME: &str = "node_role_name";
const NODE_ROLE_ARN: &str = "node_role_arn";
const VPC_ID: &str = "vpc_id";

pub struct ClusterPolicy {
    config: Arc<ResolvedConfiguration>,
    api: Arc<dyn ClusterApi>,
}

impl ClusterPolicy {
    pub fn new(config: Arc<ResolvedConfiguration>, api: Arc<dyn ClusterApi>) -> Self {
        Self { config, api }
    }

    fn cluster(&self) -> &ClusterConfig {
        &self.config.cluster
    }

    fn cluster_name(&self) -> String {
        self.config.resource_name("cluster")
    }

    fn node_group_name(&self) -> String {
        self.config.resource_name("nodes")
    }

    fn scaling(&self) -> Scaling {
        let cluster = self.cluster();
        Scaling {
            min: cluster.min_size,
            max: cluster.max_size,
            desired: cluster.desired_size,
        }
    }

    /// Reuse a same-named role, or create one and put it on the ledger
    async fn ensure_role(
        &self,
        suffix: &str,
        purpose: RolePurpose,
        keys: (&str, &str),
        section: &mut ResourceSection,
        ledger: &mut CreationLedger,
    ) -> Result<String> {
        let (name_key, arn_key) = keys;
        let name = self.config.resource_name(suffix);
        let role = match self.api.find_role(&name).await? {
            Some(role) => {
                tracing::info!("Reusing IAM role {}", role.name);
                role
            }
            None => {
                let role = self.api.create_role(&name, purpose).await?;
                tracing::info!("Created IAM role {}", role.name);
                ledger.record(LedgerEntry::new(ObjectType::IamRole, &role.name, &role.name, name_key));
                role
            }
        };
        section.set(name_key, role.name.as_str());
        section.set(arn_key, role.arn.as_str());
        Ok(role.arn)
    }

    async fn wait_cluster_active(&self, name: &str, ctx: &RunContext) -> Result<()> {
        let config = self.config.as_ref();
        wait_for(
            config,
            ctx,
            format!("cluster {}", name),
            config.timeouts.cluster(),
            || self.api.cluster_status(name),
        )
        .await
    }

    /// Pull ARN, endpoint and version of the live cluster into `section`
    async fn refresh_cluster(&self, name: &str, section: &mut ResourceSection) -> Result<()> {
        let info = self.api.find_cluster(name).await?.ok_or_else(|| {
            CloudError::api("describe cluster", format!("cluster {} not found", name))
        })?;
        section.set(CLUSTER_ARN, info.arn.as_str());
        section.set(CLUSTER_VERSION, info.version.as_str());
        if let Some(endpoint) = info.endpoint {
            section.set(CLUSTER_ENDPOINT, endpoint);
        }
        Ok(())
    }
}

#[async_trait]
impl Teardown for ClusterPolicy {
    async fn teardown(&self, entry: &LedgerEntry) -> Result<()> {
        match entry.object {
            ObjectType::NodeGroup => {
                let cluster = entry.parent.as_deref().ok_or_else(|| {
                    CloudError::api(
                        "node group teardown",
                        format!("{} has no cluster recorded", entry.id),
                    )
                })?;
                self.api.delete_node_group(cluster, &entry.id).await
            }
            ObjectType::Cluster => self.api.delete_cluster(&entry.id).await,
            ObjectType::IamRole => self.api.delete_role(&entry.id).await,
            other => Err(CloudError::api(
                "cluster teardown",
                format!("{} is not a cluster object", other),
            )),
        }
    }
}

#[async_trait]
impl ResourcePolicy for ClusterPolicy {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Cluster
    }

    fn cost_notice(&self) -> Option<String> {
        let cluster = self.cluster();
        Some(format!(
            "A managed cluster bills hourly for its control plane plus {} to {} {} node(s).",
            cluster.min_size,
            cluster.max_size,
            cluster.instance_types.join("/")
        ))
    }

    async fn check_prerequisites(&self, ctx: &RunContext) -> Result<()> {
        let cluster = self.cluster();
        if cluster.version.trim().is_empty() {
            return Err(CloudError::prerequisite("cluster.version is not set"));
        }
        if cluster.instance_types.is_empty() {
            return Err(CloudError::prerequisite(
                "cluster.instance_types needs at least one type",
            ));
        }
        let scaling = self.scaling();
        if scaling.max == 0 {
            return Err(CloudError::prerequisite("cluster.max_size must be positive"));
        }
        if !(scaling.min <= scaling.desired && scaling.desired <= scaling.max) {
            return Err(CloudError::prerequisite(format!(
                "cluster scaling needs min <= desired <= max (got {} / {} / {})",
                scaling.min, scaling.desired, scaling.max
            )));
        }

        let network = &ctx.dependencies;
        network.require(ResourceKind::Network, "VPC_ID")?;
        network.require_list(ResourceKind::Network, "PRIVATE_SUBNET_IDS")?;
        network.require_list(ResourceKind::Network, "PUBLIC_SUBNET_IDS")?;

        require_auth(self.api.as_ref()).await
    }

    async fn find_existing(&self) -> Result<Vec<ExistingObject>> {
        let name = self.cluster_name();
        let Some(cluster) = self.api.find_cluster(&name).await? else {
            return Ok(Vec::new());
        };
        let mut existing = vec![ExistingObject::new(ObjectType::Cluster, &name, cluster.arn)];
        if let Some(group) = self
            .api
            .find_node_group(&name, &self.node_group_name())
            .await?
        {
            existing.push(ExistingObject::new(
                ObjectType::NodeGroup,
                group.name,
                group.arn,
            ));
        }
        Ok(existing)
    }

    async fn adopt(
        &self,
        existing: &[ExistingObject],
        section: &mut ResourceSection,
        _ctx: &RunContext,
    ) -> Result<()> {
        for object in existing {
            match object.object {
                ObjectType::Cluster => {
                    tracing::info!("Adopting cluster {}", object.name);
                    section.set(CLUSTER_NAME, object.name.as_str());
                    self.refresh_cluster(&object.name, section).await?;
                }
                ObjectType::NodeGroup => {
                    tracing::info!("Adopting node group {}", object.name);
                    section.set(NODE_GROUP_NAME, object.name.as_str());
                    section.set(NODE_GROUP_ARN, object.id.as_str());
                }
                _ => {}
            }
        }
        Ok(())
    }

    async fn create(
        &self,
        section: &mut ResourceSection,
        ledger: &mut CreationLedger,
        ctx: &RunContext,
    ) -> Result<()> {
        let network = &ctx.dependencies;
        let vpc_id = network.require(ResourceKind::Network, "VPC_ID")?;
        let private_subnets = network.require_list(ResourceKind::Network, "PRIVATE_SUBNET_IDS")?;
        let public_subnets = network.require_list(ResourceKind::Network, "PUBLIC_SUBNET_IDS")?;
        section.set(VPC_ID, vpc_id);

        let cluster_name = match section.get_str(CLUSTER_NAME) {
            Some(name) => name.to_string(),
            None => {
                ctx.checkpoint()?;
                let role_arn = self
                    .ensure_role(
                        "cluster-role",
                        RolePurpose::ClusterControlPlane,
                        (CLUSTER_ROLE_NAME, CLUSTER_ROLE_ARN),
                        section,
                        ledger,
                    )
                    .await?;

                ctx.checkpoint()?;
                let cluster = self.cluster();
                let spec = ClusterSpec {
                    name: self.cluster_name(),
                    version: cluster.version.clone(),
                    role_arn,
                    subnet_ids: private_subnets
                        .iter()
                        .chain(public_subnets.iter())
                        .cloned()
                        .collect(),
                    endpoint_public_access: cluster.endpoint_public_access,
                    endpoint_private_access: cluster.endpoint_private_access,
                    log_types: cluster.log_types.clone(),
                };
                let info = self.api.create_cluster(&spec).await?;
                tracing::info!("Created cluster {} ({})", info.name, info.arn);
                ledger.record(LedgerEntry::new(
                    ObjectType::Cluster,
                    &info.name,
                    &info.name,
                    CLUSTER_NAME,
                ));
                section.set(CLUSTER_NAME, info.name.as_str());
                section.set(CLUSTER_ARN, info.arn.as_str());

                // node groups can only join an active control plane
                self.wait_cluster_active(&info.name, ctx).await?;
                self.refresh_cluster(&info.name, section).await?;
                info.name
            }
        };

        if !section.contains_key(NODE_GROUP_NAME) {
            ctx.checkpoint()?;
            let role_arn = self
                .ensure_role(
                    "node-role",
                    RolePurpose::NodeGroup,
                    (NODE_ROLE_NAME, NODE_ROLE_ARN),
                    section,
                    ledger,
                )
                .await?;

            ctx.checkpoint()?;
            let spec = NodeGroupSpec {
                cluster: cluster_name.clone(),
                name: self.node_group_name(),
                role_arn,
                subnet_ids: private_subnets,
                instance_types: self.cluster().instance_types.clone(),
                scaling: self.scaling(),
            };
            let group = self.api.create_node_group(&spec).await?;
            tracing::info!("Created node group {} in {}", group.name, cluster_name);
            ledger.record(
                LedgerEntry::new(ObjectType::NodeGroup, &group.name, &group.name, NODE_GROUP_NAME)
                    .with_parent(&cluster_name),
            );
            section.set(NODE_GROUP_NAME, group.name.as_str());
            section.set(NODE_GROUP_ARN, group.arn.as_str());
        }

        Ok(())
    }

    async fn configure(&self, section: &mut ResourceSection, _ctx: &RunContext) -> Result<()> {
        let cluster = self.cluster();
        let name = recorded(section, CLUSTER_NAME)?.to_string();
        let group = recorded(section, NODE_GROUP_NAME)?.to_string();

        self.api
            .update_cluster_config(
                &name,
                cluster.endpoint_public_access,
                cluster.endpoint_private_access,
                &cluster.log_types,
            )
            .await?;
        self.api
            .update_node_group_scaling(&name, &group, self.scaling())
            .await?;

        section.set("endpoint_public_access", cluster.endpoint_public_access);
        section.set("endpoint_private_access", cluster.endpoint_private_access);
        section.set_list("log_types", cluster.log_types.iter());
        section.set("min_size", cluster.min_size);
        section.set("max_size", cluster.max_size);
        section.set("desired_size", cluster.desired_size);
        self.refresh_cluster(&name, section).await
    }

    async fn verify(&self, section: &ResourceSection, ctx: &RunContext) -> Result<()> {
        let config = self.config.as_ref();
        let name = recorded(section, CLUSTER_NAME)?;
        let group = recorded(section, NODE_GROUP_NAME)?;

        self.wait_cluster_active(name, ctx).await?;
        wait_for(
            config,
            ctx,
            format!("node group {}", group),
            config.timeouts.node_group(),
            || self.api.node_group_status(name, group),
        )
        .await?;

        if !section.contains_key(CLUSTER_ENDPOINT) {
            return Err(CloudError::ProviderFailureState {
                resource: format!("cluster {}", name),
                reason: "no API endpoint published".to_string(),
            });
        }
        Ok(())
    }

    fn exports(&self, section: &ResourceSection) -> Result<ExportManifest> {
        let mut manifest = ExportManifest::new(ResourceKind::Cluster);
        manifest
            .set("CLUSTER_NAME", recorded(section, CLUSTER_NAME)?)?
            .set("CLUSTER_ARN", recorded(section, CLUSTER_ARN)?)?
            .set("CLUSTER_ENDPOINT", recorded(section, CLUSTER_ENDPOINT)?)?
            .set("CLUSTER_VERSION", recorded(section, CLUSTER_VERSION)?)?
            .set("NODE_GROUP_NAME", recorded(section, NODE_GROUP_NAME)?)?;
        Ok(manifest)
    }
}
