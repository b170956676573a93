//! Cloud provider API seams
//!
//! Provisioners talk to the cloud only through these traits. The AWS crate
//! implements them by driving the `aws` CLI; tests use an in-memory fake.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stratus_config::Encryption;

/// Base provider trait: identity and credential check
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Returns the provider name (e.g., "aws")
    fn name(&self) -> &str;

    /// Check that tooling is installed and credentials are usable
    async fn check_auth(&self) -> Result<AuthStatus>;
}

/// Authentication status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    pub authenticated: bool,
    pub account_info: Option<String>,
    pub error: Option<String>,
}

impl AuthStatus {
    pub fn ok(account_info: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            account_info: Some(account_info.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            account_info: None,
            error: Some(error.into()),
        }
    }
}

/// Result of one status poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteStatus {
    /// Terminal success: available / active
    Ready,
    /// Still converging; carries the provider's state string
    Pending(String),
    /// Provider reports the object as failed
    Failed(String),
}

// ========== Network ==========

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VpcInfo {
    pub id: String,
    pub name: String,
    pub cidr: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetInfo {
    pub id: String,
    pub name: String,
    pub cidr: String,
    pub availability_zone: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NatGatewayInfo {
    pub id: String,
    pub name: String,
    pub subnet_id: String,
    pub allocation_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTableInfo {
    pub id: String,
    pub name: String,
    pub associated_subnets: Vec<String>,
}

/// Target of a default route
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteTarget {
    InternetGateway(String),
    NatGateway(String),
}

#[async_trait]
pub trait NetworkApi: CloudProvider {
    async fn find_vpc(&self, name: &str) -> Result<Option<VpcInfo>>;
    async fn create_vpc(&self, name: &str, cidr: &str) -> Result<String>;
    async fn set_vpc_dns(&self, vpc_id: &str, support: bool, hostnames: bool) -> Result<()>;
    async fn vpc_status(&self, vpc_id: &str) -> Result<RemoteStatus>;
    async fn delete_vpc(&self, vpc_id: &str) -> Result<()>;

    async fn find_internet_gateway(&self, vpc_id: &str) -> Result<Option<String>>;
    async fn create_internet_gateway(&self, name: &str) -> Result<String>;
    async fn attach_internet_gateway(&self, gateway_id: &str, vpc_id: &str) -> Result<()>;
    async fn gateway_attachment_status(&self, gateway_id: &str, vpc_id: &str)
    -> Result<RemoteStatus>;
    /// Detach from `vpc_id` (if attached) and delete
    async fn delete_internet_gateway(&self, gateway_id: &str, vpc_id: Option<&str>) -> Result<()>;

    async fn list_subnets(&self, vpc_id: &str) -> Result<Vec<SubnetInfo>>;
    async fn create_subnet(
        &self,
        vpc_id: &str,
        name: &str,
        cidr: &str,
        availability_zone: &str,
    ) -> Result<String>;
    async fn set_subnet_public_ip(&self, subnet_id: &str, enabled: bool) -> Result<()>;
    async fn delete_subnet(&self, subnet_id: &str) -> Result<()>;

    async fn allocate_address(&self, name: &str) -> Result<String>;
    async fn release_address(&self, allocation_id: &str) -> Result<()>;

    async fn list_nat_gateways(&self, vpc_id: &str) -> Result<Vec<NatGatewayInfo>>;
    async fn create_nat_gateway(
        &self,
        name: &str,
        subnet_id: &str,
        allocation_id: &str,
    ) -> Result<String>;
    async fn nat_gateway_status(&self, nat_gateway_id: &str) -> Result<RemoteStatus>;
    /// Delete and wait until gone, so the address can be released afterwards
    async fn delete_nat_gateway(&self, nat_gateway_id: &str) -> Result<()>;

    async fn list_route_tables(&self, vpc_id: &str) -> Result<Vec<RouteTableInfo>>;
    async fn create_route_table(&self, vpc_id: &str, name: &str) -> Result<String>;
    /// Create or replace the 0.0.0.0/0 route
    async fn set_default_route(&self, route_table_id: &str, target: &RouteTarget) -> Result<()>;
    async fn associate_route_table(&self, route_table_id: &str, subnet_id: &str) -> Result<()>;
    /// Remove associations, then delete
    async fn delete_route_table(&self, route_table_id: &str) -> Result<()>;
}

// ========== Object store ==========

#[async_trait]
pub trait ObjectStoreApi: CloudProvider {
    async fn bucket_exists(&self, name: &str) -> Result<bool>;
    async fn create_bucket(&self, name: &str) -> Result<()>;
    async fn put_versioning(&self, name: &str, enabled: bool) -> Result<()>;
    async fn put_encryption(&self, name: &str, encryption: &Encryption) -> Result<()>;
    async fn put_public_access_block(&self, name: &str, blocked: bool) -> Result<()>;
    /// `None` removes the lifecycle configuration
    async fn put_lifecycle(&self, name: &str, noncurrent_expiration_days: Option<u32>)
    -> Result<()>;
    async fn bucket_status(&self, name: &str) -> Result<RemoteStatus>;
    /// Delete every object and object version
    async fn empty_bucket(&self, name: &str) -> Result<()>;
    async fn delete_bucket(&self, name: &str) -> Result<()>;
    fn bucket_arn(&self, name: &str) -> String;
}

// ========== Image registry ==========

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryInfo {
    pub name: String,
    pub arn: String,
    pub uri: String,
    pub registry_id: String,
}

#[async_trait]
pub trait RegistryApi: CloudProvider {
    async fn find_repository(&self, name: &str) -> Result<Option<RepositoryInfo>>;
    async fn create_repository(&self, name: &str, encryption: &Encryption)
    -> Result<RepositoryInfo>;
    async fn put_scan_on_push(&self, name: &str, enabled: bool) -> Result<()>;
    async fn put_tag_mutability(&self, name: &str, immutable: bool) -> Result<()>;
    /// `None` removes the lifecycle policy
    async fn put_lifecycle_policy(&self, name: &str, keep_last_images: Option<u32>) -> Result<()>;
    async fn repository_status(&self, name: &str) -> Result<RemoteStatus>;
    /// Delete including all images
    async fn delete_repository(&self, name: &str) -> Result<()>;
}

// ========== Managed cluster ==========

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleInfo {
    pub name: String,
    pub arn: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterInfo {
    pub name: String,
    pub arn: String,
    pub endpoint: Option<String>,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeGroupInfo {
    pub name: String,
    pub arn: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSpec {
    pub name: String,
    pub version: String,
    pub role_arn: String,
    pub subnet_ids: Vec<String>,
    pub endpoint_public_access: bool,
    pub endpoint_private_access: bool,
    pub log_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeGroupSpec {
    pub cluster: String,
    pub name: String,
    pub role_arn: String,
    pub subnet_ids: Vec<String>,
    pub instance_types: Vec<String>,
    pub scaling: Scaling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scaling {
    pub min: u32,
    pub max: u32,
    pub desired: u32,
}

/// Which AWS service a role is assumed by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolePurpose {
    ClusterControlPlane,
    NodeGroup,
}

#[async_trait]
pub trait ClusterApi: CloudProvider {
    async fn find_role(&self, name: &str) -> Result<Option<RoleInfo>>;
    async fn create_role(&self, name: &str, purpose: RolePurpose) -> Result<RoleInfo>;
    /// Detach managed policies, then delete
    async fn delete_role(&self, name: &str) -> Result<()>;

    async fn find_cluster(&self, name: &str) -> Result<Option<ClusterInfo>>;
    async fn create_cluster(&self, spec: &ClusterSpec) -> Result<ClusterInfo>;
    /// Reassert endpoint access and logging; a no-op when already in place
    async fn update_cluster_config(
        &self,
        name: &str,
        endpoint_public_access: bool,
        endpoint_private_access: bool,
        log_types: &[String],
    ) -> Result<()>;
    async fn cluster_status(&self, name: &str) -> Result<RemoteStatus>;
    async fn delete_cluster(&self, name: &str) -> Result<()>;

    async fn find_node_group(&self, cluster: &str, name: &str) -> Result<Option<NodeGroupInfo>>;
    async fn create_node_group(&self, spec: &NodeGroupSpec) -> Result<NodeGroupInfo>;
    /// Reassert scaling bounds; a no-op when already in place
    async fn update_node_group_scaling(
        &self,
        cluster: &str,
        name: &str,
        scaling: Scaling,
    ) -> Result<()>;
    async fn node_group_status(&self, cluster: &str, name: &str) -> Result<RemoteStatus>;
    /// Delete and wait until gone, so the cluster can be deleted afterwards
    async fn delete_node_group(&self, cluster: &str, name: &str) -> Result<()>;
}
