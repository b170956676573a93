#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt::Display;
use std::sync::{Arc, Mutex, MutexGuard};
use stratus_cloud::{
    AuthStatus, CloudError, CloudProvider, ClusterApi, ClusterInfo, ClusterSpec, Confirm,
    NatGatewayInfo, NetworkApi, NodeGroupInfo, NodeGroupSpec, ObjectStoreApi, Provisioner,
    RegistryApi, RemoteStatus, RepositoryInfo, ResourceKind, Result, RoleInfo, RolePurpose,
    RouteTableInfo, RouteTarget, Scaling, StateStore, SubnetInfo, VpcInfo, policy_for,
};
use stratus_config::{Encryption, ResolvedConfiguration};
use tempfile::TempDir;

pub const ACCOUNT: &str = "123456789012";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BucketSettings {
    pub versioning: Option<bool>,
    pub encryption: Option<Encryption>,
    pub public_access_blocked: Option<bool>,
    pub noncurrent_expiration_days: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepositorySettings {
    pub scan_on_push: Option<bool>,
    pub immutable_tags: Option<bool>,
    pub keep_last_images: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct Gateway {
    pub id: String,
    pub name: String,
    pub attached_to: Option<String>,
}

/// Everything the fake cloud knows
#[derive(Debug, Default)]
pub struct FakeState {
    pub calls: Vec<String>,
    pub fail_on: HashSet<String>,
    pub statuses: HashMap<String, VecDeque<RemoteStatus>>,
    pub unauthenticated: bool,
    next_id: u32,

    pub vpcs: Vec<VpcInfo>,
    pub vpc_dns: HashMap<String, (bool, bool)>,
    pub gateways: Vec<Gateway>,
    pub subnets: Vec<(String, SubnetInfo)>,
    pub public_ip_on_launch: HashMap<String, bool>,
    pub addresses: Vec<(String, String)>,
    pub nat_gateways: Vec<(String, NatGatewayInfo)>,
    pub route_tables: Vec<(String, RouteTableInfo)>,
    pub default_routes: HashMap<String, RouteTarget>,
    /// Subnets whose route table association is accepted but never sticks
    pub dropped_associations: HashSet<String>,

    pub buckets: BTreeMap<String, BucketSettings>,
    pub repositories: BTreeMap<String, RepositoryInfo>,
    pub repository_settings: BTreeMap<String, RepositorySettings>,

    pub roles: BTreeMap<String, RoleInfo>,
    pub clusters: BTreeMap<String, ClusterInfo>,
    pub cluster_access: BTreeMap<String, (bool, bool, Vec<String>)>,
    pub node_groups: BTreeMap<(String, String), NodeGroupInfo>,
    pub node_group_scaling: BTreeMap<(String, String), Scaling>,
}

impl FakeState {
    fn id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    /// Next scripted status for `method`, `Ready` once the script runs out
    fn status(&mut self, method: &str) -> RemoteStatus {
        self.statuses
            .get_mut(method)
            .and_then(VecDeque::pop_front)
            .unwrap_or(RemoteStatus::Ready)
    }

    fn vpc_of_subnet(&self, subnet_id: &str) -> Option<String> {
        self.subnets
            .iter()
            .find(|(_, s)| s.id == subnet_id)
            .map(|(vpc, _)| vpc.clone())
    }
}

/// In-memory cloud implementing every provider API.
///
/// Each call is appended to the call log as `"<method> <detail>"`.
/// Methods listed via [`FakeCloud::fail_on`] return an API error after
/// being logged.
#[derive(Default)]
pub struct FakeCloud {
    state: Mutex<FakeState>,
}

impl FakeCloud {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn fail_on(&self, method: &str) {
        self.state().fail_on.insert(method.to_string());
    }

    pub fn recover(&self, method: &str) {
        self.state().fail_on.remove(method);
    }

    pub fn script_status(&self, method: &str, statuses: Vec<RemoteStatus>) {
        self.state()
            .statuses
            .insert(method.to_string(), statuses.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Calls whose method name is `method`
    pub fn calls_to(&self, method: &str) -> Vec<String> {
        let prefix = format!("{} ", method);
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(&prefix) || c == method)
            .collect()
    }

    /// Just the method names, in order
    pub fn methods(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .map(|c| c.split(' ').next().unwrap_or_default().to_string())
            .collect()
    }

    pub fn subnet_by_name(&self, name: &str) -> Option<SubnetInfo> {
        self.state()
            .subnets
            .iter()
            .find(|(_, s)| s.name == name)
            .map(|(_, s)| s.clone())
    }

    // ========== Seeding ==========

    pub fn seed_bucket(&self, name: &str) {
        self.state()
            .buckets
            .insert(name.to_string(), BucketSettings::default());
    }

    pub fn seed_vpc(&self, name: &str, cidr: &str) -> String {
        let mut state = self.state();
        let id = state.id("vpc");
        state.vpcs.push(VpcInfo {
            id: id.clone(),
            name: name.to_string(),
            cidr: cidr.to_string(),
        });
        id
    }

    pub fn seed_subnet(&self, vpc_id: &str, name: &str, cidr: &str, zone: &str) -> String {
        let mut state = self.state();
        let id = state.id("subnet");
        state.subnets.push((
            vpc_id.to_string(),
            SubnetInfo {
                id: id.clone(),
                name: name.to_string(),
                cidr: cidr.to_string(),
                availability_zone: zone.to_string(),
            },
        ));
        id
    }

    pub fn seed_attached_gateway(&self, vpc_id: &str, name: &str) -> String {
        let mut state = self.state();
        let id = state.id("igw");
        state.gateways.push(Gateway {
            id: id.clone(),
            name: name.to_string(),
            attached_to: Some(vpc_id.to_string()),
        });
        id
    }

    fn call(&self, method: &str, detail: impl Display) -> Result<MutexGuard<'_, FakeState>> {
        let mut state = self.state();
        let detail = detail.to_string();
        if detail.is_empty() {
            state.calls.push(method.to_string());
        } else {
            state.calls.push(format!("{} {}", method, detail));
        }
        if state.fail_on.contains(method) {
            return Err(CloudError::api(method, "injected failure"));
        }
        Ok(state)
    }
}

#[async_trait]
impl CloudProvider for FakeCloud {
    fn name(&self) -> &str {
        "fake"
    }

    async fn check_auth(&self) -> Result<AuthStatus> {
        let state = self.call("check_auth", "")?;
        if state.unauthenticated {
            Ok(AuthStatus::failed("credentials expired"))
        } else {
            Ok(AuthStatus::ok(format!("account {}", ACCOUNT)))
        }
    }
}

// ========== Network ==========

#[async_trait]
impl NetworkApi for FakeCloud {
    async fn find_vpc(&self, name: &str) -> Result<Option<VpcInfo>> {
        let state = self.call("find_vpc", name)?;
        Ok(state.vpcs.iter().find(|v| v.name == name).cloned())
    }

    async fn create_vpc(&self, name: &str, cidr: &str) -> Result<String> {
        let mut state = self.call("create_vpc", name)?;
        let id = state.id("vpc");
        state.vpcs.push(VpcInfo {
            id: id.clone(),
            name: name.to_string(),
            cidr: cidr.to_string(),
        });
        Ok(id)
    }

    async fn set_vpc_dns(&self, vpc_id: &str, support: bool, hostnames: bool) -> Result<()> {
        let mut state = self.call("set_vpc_dns", vpc_id)?;
        state.vpc_dns.insert(vpc_id.to_string(), (support, hostnames));
        Ok(())
    }

    async fn vpc_status(&self, vpc_id: &str) -> Result<RemoteStatus> {
        let mut state = self.call("vpc_status", vpc_id)?;
        Ok(state.status("vpc_status"))
    }

    async fn delete_vpc(&self, vpc_id: &str) -> Result<()> {
        let mut state = self.call("delete_vpc", vpc_id)?;
        state.vpcs.retain(|v| v.id != vpc_id);
        Ok(())
    }

    async fn find_internet_gateway(&self, vpc_id: &str) -> Result<Option<String>> {
        let state = self.call("find_internet_gateway", vpc_id)?;
        Ok(state
            .gateways
            .iter()
            .find(|g| g.attached_to.as_deref() == Some(vpc_id))
            .map(|g| g.id.clone()))
    }

    async fn create_internet_gateway(&self, name: &str) -> Result<String> {
        let mut state = self.call("create_internet_gateway", name)?;
        let id = state.id("igw");
        state.gateways.push(Gateway {
            id: id.clone(),
            name: name.to_string(),
            attached_to: None,
        });
        Ok(id)
    }

    async fn attach_internet_gateway(&self, gateway_id: &str, vpc_id: &str) -> Result<()> {
        let mut state = self.call("attach_internet_gateway", gateway_id)?;
        if let Some(gateway) = state.gateways.iter_mut().find(|g| g.id == gateway_id) {
            gateway.attached_to = Some(vpc_id.to_string());
        }
        Ok(())
    }

    async fn gateway_attachment_status(
        &self,
        gateway_id: &str,
        _vpc_id: &str,
    ) -> Result<RemoteStatus> {
        let mut state = self.call("gateway_attachment_status", gateway_id)?;
        Ok(state.status("gateway_attachment_status"))
    }

    async fn delete_internet_gateway(&self, gateway_id: &str, vpc_id: Option<&str>) -> Result<()> {
        let mut state = self.call(
            "delete_internet_gateway",
            format!("{} {}", gateway_id, vpc_id.unwrap_or("-")),
        )?;
        state.gateways.retain(|g| g.id != gateway_id);
        Ok(())
    }

    async fn list_subnets(&self, vpc_id: &str) -> Result<Vec<SubnetInfo>> {
        let state = self.call("list_subnets", vpc_id)?;
        Ok(state
            .subnets
            .iter()
            .filter(|(vpc, _)| vpc == vpc_id)
            .map(|(_, s)| s.clone())
            .collect())
    }

    async fn create_subnet(
        &self,
        vpc_id: &str,
        name: &str,
        cidr: &str,
        availability_zone: &str,
    ) -> Result<String> {
        let mut state = self.call("create_subnet", name)?;
        let id = state.id("subnet");
        state.subnets.push((
            vpc_id.to_string(),
            SubnetInfo {
                id: id.clone(),
                name: name.to_string(),
                cidr: cidr.to_string(),
                availability_zone: availability_zone.to_string(),
            },
        ));
        Ok(id)
    }

    async fn set_subnet_public_ip(&self, subnet_id: &str, enabled: bool) -> Result<()> {
        let mut state = self.call("set_subnet_public_ip", subnet_id)?;
        state
            .public_ip_on_launch
            .insert(subnet_id.to_string(), enabled);
        Ok(())
    }

    async fn delete_subnet(&self, subnet_id: &str) -> Result<()> {
        let mut state = self.call("delete_subnet", subnet_id)?;
        state.subnets.retain(|(_, s)| s.id != subnet_id);
        Ok(())
    }

    async fn allocate_address(&self, name: &str) -> Result<String> {
        let mut state = self.call("allocate_address", name)?;
        let id = state.id("eipalloc");
        state.addresses.push((id.clone(), name.to_string()));
        Ok(id)
    }

    async fn release_address(&self, allocation_id: &str) -> Result<()> {
        let mut state = self.call("release_address", allocation_id)?;
        state.addresses.retain(|(id, _)| id != allocation_id);
        Ok(())
    }

    async fn list_nat_gateways(&self, vpc_id: &str) -> Result<Vec<NatGatewayInfo>> {
        let state = self.call("list_nat_gateways", vpc_id)?;
        Ok(state
            .nat_gateways
            .iter()
            .filter(|(vpc, _)| vpc == vpc_id)
            .map(|(_, n)| n.clone())
            .collect())
    }

    async fn create_nat_gateway(
        &self,
        name: &str,
        subnet_id: &str,
        allocation_id: &str,
    ) -> Result<String> {
        let mut state = self.call("create_nat_gateway", name)?;
        let id = state.id("nat");
        let vpc = state.vpc_of_subnet(subnet_id).unwrap_or_default();
        state.nat_gateways.push((
            vpc,
            NatGatewayInfo {
                id: id.clone(),
                name: name.to_string(),
                subnet_id: subnet_id.to_string(),
                allocation_id: Some(allocation_id.to_string()),
            },
        ));
        Ok(id)
    }

    async fn nat_gateway_status(&self, nat_gateway_id: &str) -> Result<RemoteStatus> {
        let mut state = self.call("nat_gateway_status", nat_gateway_id)?;
        Ok(state.status("nat_gateway_status"))
    }

    async fn delete_nat_gateway(&self, nat_gateway_id: &str) -> Result<()> {
        let mut state = self.call("delete_nat_gateway", nat_gateway_id)?;
        state.nat_gateways.retain(|(_, n)| n.id != nat_gateway_id);
        Ok(())
    }

    async fn list_route_tables(&self, vpc_id: &str) -> Result<Vec<RouteTableInfo>> {
        let state = self.call("list_route_tables", vpc_id)?;
        Ok(state
            .route_tables
            .iter()
            .filter(|(vpc, _)| vpc == vpc_id)
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn create_route_table(&self, vpc_id: &str, name: &str) -> Result<String> {
        let mut state = self.call("create_route_table", name)?;
        let id = state.id("rtb");
        state.route_tables.push((
            vpc_id.to_string(),
            RouteTableInfo {
                id: id.clone(),
                name: name.to_string(),
                associated_subnets: Vec::new(),
            },
        ));
        Ok(id)
    }

    async fn set_default_route(&self, route_table_id: &str, target: &RouteTarget) -> Result<()> {
        let mut state = self.call("set_default_route", route_table_id)?;
        state
            .default_routes
            .insert(route_table_id.to_string(), target.clone());
        Ok(())
    }

    async fn associate_route_table(&self, route_table_id: &str, subnet_id: &str) -> Result<()> {
        let mut state = self.call(
            "associate_route_table",
            format!("{} {}", route_table_id, subnet_id),
        )?;
        if state.dropped_associations.contains(subnet_id) {
            return Ok(());
        }
        if let Some((_, table)) = state
            .route_tables
            .iter_mut()
            .find(|(_, r)| r.id == route_table_id)
        {
            table.associated_subnets.push(subnet_id.to_string());
        }
        Ok(())
    }

    async fn delete_route_table(&self, route_table_id: &str) -> Result<()> {
        let mut state = self.call("delete_route_table", route_table_id)?;
        state.route_tables.retain(|(_, r)| r.id != route_table_id);
        state.default_routes.remove(route_table_id);
        Ok(())
    }
}

// ========== Object store ==========

#[async_trait]
impl ObjectStoreApi for FakeCloud {
    async fn bucket_exists(&self, name: &str) -> Result<bool> {
        let state = self.call("bucket_exists", name)?;
        Ok(state.buckets.contains_key(name))
    }

    async fn create_bucket(&self, name: &str) -> Result<()> {
        let mut state = self.call("create_bucket", name)?;
        state
            .buckets
            .insert(name.to_string(), BucketSettings::default());
        Ok(())
    }

    async fn put_versioning(&self, name: &str, enabled: bool) -> Result<()> {
        let mut state = self.call("put_versioning", name)?;
        state.buckets.entry(name.to_string()).or_default().versioning = Some(enabled);
        Ok(())
    }

    async fn put_encryption(&self, name: &str, encryption: &Encryption) -> Result<()> {
        let mut state = self.call("put_encryption", name)?;
        state.buckets.entry(name.to_string()).or_default().encryption = Some(encryption.clone());
        Ok(())
    }

    async fn put_public_access_block(&self, name: &str, blocked: bool) -> Result<()> {
        let mut state = self.call("put_public_access_block", name)?;
        state
            .buckets
            .entry(name.to_string())
            .or_default()
            .public_access_blocked = Some(blocked);
        Ok(())
    }

    async fn put_lifecycle(
        &self,
        name: &str,
        noncurrent_expiration_days: Option<u32>,
    ) -> Result<()> {
        let mut state = self.call("put_lifecycle", name)?;
        state
            .buckets
            .entry(name.to_string())
            .or_default()
            .noncurrent_expiration_days = noncurrent_expiration_days;
        Ok(())
    }

    async fn bucket_status(&self, name: &str) -> Result<RemoteStatus> {
        let mut state = self.call("bucket_status", name)?;
        Ok(state.status("bucket_status"))
    }

    async fn empty_bucket(&self, name: &str) -> Result<()> {
        let _state = self.call("empty_bucket", name)?;
        Ok(())
    }

    async fn delete_bucket(&self, name: &str) -> Result<()> {
        let mut state = self.call("delete_bucket", name)?;
        state.buckets.remove(name);
        Ok(())
    }

    fn bucket_arn(&self, name: &str) -> String {
        format!("arn:aws:s3:::{}", name)
    }
}

// ========== Image registry ==========

fn repository_info(name: &str) -> RepositoryInfo {
    RepositoryInfo {
        name: name.to_string(),
        arn: format!("arn:aws:ecr:us-east-1:{}:repository/{}", ACCOUNT, name),
        uri: format!("{}.dkr.ecr.us-east-1.amazonaws.com/{}", ACCOUNT, name),
        registry_id: ACCOUNT.to_string(),
    }
}

impl FakeCloud {
    pub fn seed_repository(&self, name: &str) {
        self.state()
            .repositories
            .insert(name.to_string(), repository_info(name));
    }
}

#[async_trait]
impl RegistryApi for FakeCloud {
    async fn find_repository(&self, name: &str) -> Result<Option<RepositoryInfo>> {
        let state = self.call("find_repository", name)?;
        Ok(state.repositories.get(name).cloned())
    }

    async fn create_repository(
        &self,
        name: &str,
        _encryption: &Encryption,
    ) -> Result<RepositoryInfo> {
        let mut state = self.call("create_repository", name)?;
        let info = repository_info(name);
        state.repositories.insert(name.to_string(), info.clone());
        Ok(info)
    }

    async fn put_scan_on_push(&self, name: &str, enabled: bool) -> Result<()> {
        let mut state = self.call("put_scan_on_push", name)?;
        state
            .repository_settings
            .entry(name.to_string())
            .or_default()
            .scan_on_push = Some(enabled);
        Ok(())
    }

    async fn put_tag_mutability(&self, name: &str, immutable: bool) -> Result<()> {
        let mut state = self.call("put_tag_mutability", name)?;
        state
            .repository_settings
            .entry(name.to_string())
            .or_default()
            .immutable_tags = Some(immutable);
        Ok(())
    }

    async fn put_lifecycle_policy(&self, name: &str, keep_last_images: Option<u32>) -> Result<()> {
        let mut state = self.call("put_lifecycle_policy", name)?;
        state
            .repository_settings
            .entry(name.to_string())
            .or_default()
            .keep_last_images = keep_last_images;
        Ok(())
    }

    async fn repository_status(&self, name: &str) -> Result<RemoteStatus> {
        let mut state = self.call("repository_status", name)?;
        Ok(state.status("repository_status"))
    }

    async fn delete_repository(&self, name: &str) -> Result<()> {
        let mut state = self.call("delete_repository", name)?;
        state.repositories.remove(name);
        Ok(())
    }
}

// ========== Managed cluster ==========

#[async_trait]
impl ClusterApi for FakeCloud {
    async fn find_role(&self, name: &str) -> Result<Option<RoleInfo>> {
        let state = self.call("find_role", name)?;
        Ok(state.roles.get(name).cloned())
    }

    async fn create_role(&self, name: &str, _purpose: RolePurpose) -> Result<RoleInfo> {
        let mut state = self.call("create_role", name)?;
        let role = RoleInfo {
            name: name.to_string(),
            arn: format!("arn:aws:iam::{}:role/{}", ACCOUNT, name),
        };
        state.roles.insert(name.to_string(), role.clone());
        Ok(role)
    }

    async fn delete_role(&self, name: &str) -> Result<()> {
        let mut state = self.call("delete_role", name)?;
        state.roles.remove(name);
        Ok(())
    }

    async fn find_cluster(&self, name: &str) -> Result<Option<ClusterInfo>> {
        let state = self.call("find_cluster", name)?;
        Ok(state.clusters.get(name).cloned())
    }

    async fn create_cluster(&self, spec: &ClusterSpec) -> Result<ClusterInfo> {
        let mut state = self.call("create_cluster", &spec.name)?;
        let info = ClusterInfo {
            name: spec.name.clone(),
            arn: format!("arn:aws:eks:us-east-1:{}:cluster/{}", ACCOUNT, spec.name),
            endpoint: Some(format!("https://{}.eks.example.com", spec.name)),
            version: spec.version.clone(),
        };
        state.clusters.insert(spec.name.clone(), info.clone());
        Ok(info)
    }

    async fn update_cluster_config(
        &self,
        name: &str,
        endpoint_public_access: bool,
        endpoint_private_access: bool,
        log_types: &[String],
    ) -> Result<()> {
        let mut state = self.call("update_cluster_config", name)?;
        state.cluster_access.insert(
            name.to_string(),
            (
                endpoint_public_access,
                endpoint_private_access,
                log_types.to_vec(),
            ),
        );
        Ok(())
    }

    async fn cluster_status(&self, name: &str) -> Result<RemoteStatus> {
        let mut state = self.call("cluster_status", name)?;
        Ok(state.status("cluster_status"))
    }

    async fn delete_cluster(&self, name: &str) -> Result<()> {
        let mut state = self.call("delete_cluster", name)?;
        state.clusters.remove(name);
        Ok(())
    }

    async fn find_node_group(&self, cluster: &str, name: &str) -> Result<Option<NodeGroupInfo>> {
        let state = self.call("find_node_group", name)?;
        Ok(state
            .node_groups
            .get(&(cluster.to_string(), name.to_string()))
            .cloned())
    }

    async fn create_node_group(&self, spec: &NodeGroupSpec) -> Result<NodeGroupInfo> {
        let mut state = self.call("create_node_group", &spec.name)?;
        let info = NodeGroupInfo {
            name: spec.name.clone(),
            arn: format!(
                "arn:aws:eks:us-east-1:{}:nodegroup/{}/{}",
                ACCOUNT, spec.cluster, spec.name
            ),
        };
        let key = (spec.cluster.clone(), spec.name.clone());
        state.node_groups.insert(key.clone(), info.clone());
        state.node_group_scaling.insert(key, spec.scaling);
        Ok(info)
    }

    async fn update_node_group_scaling(
        &self,
        cluster: &str,
        name: &str,
        scaling: Scaling,
    ) -> Result<()> {
        let mut state = self.call("update_node_group_scaling", name)?;
        state
            .node_group_scaling
            .insert((cluster.to_string(), name.to_string()), scaling);
        Ok(())
    }

    async fn node_group_status(&self, _cluster: &str, name: &str) -> Result<RemoteStatus> {
        let mut state = self.call("node_group_status", name)?;
        Ok(state.status("node_group_status"))
    }

    async fn delete_node_group(&self, cluster: &str, name: &str) -> Result<()> {
        let mut state = self.call("delete_node_group", name)?;
        state
            .node_groups
            .remove(&(cluster.to_string(), name.to_string()));
        Ok(())
    }
}

// ========== Operator ==========

/// Answers prompts from a queue and keeps every prompt it was shown
pub struct ScriptedConfirm {
    answers: Mutex<VecDeque<bool>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedConfirm {
    pub fn new(answers: &[bool]) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.iter().copied().collect()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl Confirm for ScriptedConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.answers.lock().unwrap().pop_front().unwrap_or(false)
    }
}

// ========== Harness ==========

pub fn config() -> ResolvedConfiguration {
    let mut config = ResolvedConfiguration {
        project: "shop".to_string(),
        environment: "dev".to_string(),
        region: "us-east-1".to_string(),
        ..Default::default()
    };
    config.timeouts.poll_interval_secs = 5;
    config
}

/// A temporary state directory plus a fake cloud
pub struct TestWorld {
    pub root: TempDir,
    pub cloud: Arc<FakeCloud>,
    pub config: Arc<ResolvedConfiguration>,
}

impl TestWorld {
    pub fn new() -> Self {
        Self::with_config(config())
    }

    pub fn with_config(config: ResolvedConfiguration) -> Self {
        let root = tempfile::tempdir().unwrap();
        Self {
            root,
            cloud: FakeCloud::new(),
            config: Arc::new(config),
        }
    }

    pub fn store(&self) -> StateStore {
        StateStore::new(
            self.root.path(),
            &self.config.project,
            &self.config.environment,
            &self.config.region,
        )
    }

    pub fn provisioner(&self, confirm: Arc<dyn Confirm>) -> Provisioner {
        Provisioner::new(self.store(), confirm)
    }

    pub fn yes(&self) -> Provisioner {
        self.provisioner(Arc::new(stratus_cloud::AssumeAnswer(true)))
    }

    pub fn policy(&self, kind: ResourceKind) -> Box<dyn stratus_cloud::ResourcePolicy> {
        policy_for(kind, self.config.clone(), self.cloud.clone())
    }
}
