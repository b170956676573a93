//! EKS clusters, node groups and their IAM roles

use crate::provider::AwsProvider;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use stratus_cloud::{
    ClusterApi, ClusterInfo, ClusterSpec, NodeGroupInfo, NodeGroupSpec, RemoteStatus, Result,
    RoleInfo, RolePurpose, Scaling,
};

const MISSING_ROLE: &[&str] = &["NoSuchEntity"];
const MISSING_EKS_RESOURCE: &[&str] = &["ResourceNotFoundException"];

/// Every control-plane log type EKS knows
const ALL_LOG_TYPES: &[&str] = &["api", "audit", "authenticator", "controllerManager", "scheduler"];

// ========== IAM ==========

fn trusted_service(purpose: RolePurpose) -> &'static str {
    match purpose {
        RolePurpose::ClusterControlPlane => "eks.amazonaws.com",
        RolePurpose::NodeGroup => "ec2.amazonaws.com",
    }
}

fn managed_policies(purpose: RolePurpose) -> &'static [&'static str] {
    match purpose {
        RolePurpose::ClusterControlPlane => &["arn:aws:iam::aws:policy/AmazonEKSClusterPolicy"],
        RolePurpose::NodeGroup => &[
            "arn:aws:iam::aws:policy/AmazonEKSWorkerNodePolicy",
            "arn:aws:iam::aws:policy/AmazonEKS_CNI_Policy",
            "arn:aws:iam::aws:policy/AmazonEC2ContainerRegistryReadOnly",
        ],
    }
}

fn assume_role_policy(purpose: RolePurpose) -> String {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": { "Service": trusted_service(purpose) },
            "Action": "sts:AssumeRole",
        }]
    })
    .to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RoleResponse {
    role: Role,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Role {
    role_name: String,
    arn: String,
}

impl From<Role> for RoleInfo {
    fn from(role: Role) -> Self {
        Self {
            name: role.role_name,
            arn: role.arn,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AttachedPolicies {
    #[serde(default)]
    attached_policies: Vec<AttachedPolicy>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AttachedPolicy {
    policy_arn: String,
}

// ========== EKS ==========

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClusterResponse {
    cluster: Cluster,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Cluster {
    name: String,
    arn: String,
    endpoint: Option<String>,
    version: String,
    status: String,
    resources_vpc_config: Option<VpcConfig>,
    logging: Option<Logging>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VpcConfig {
    #[serde(default)]
    endpoint_public_access: bool,
    #[serde(default)]
    endpoint_private_access: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Logging {
    #[serde(default)]
    cluster_logging: Vec<LogSetup>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogSetup {
    #[serde(default)]
    types: Vec<String>,
    #[serde(default)]
    enabled: bool,
}

impl Cluster {
    fn enabled_log_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .logging
            .iter()
            .flat_map(|l| &l.cluster_logging)
            .filter(|setup| setup.enabled)
            .flat_map(|setup| setup.types.iter().cloned())
            .collect();
        types.sort();
        types
    }

    /// Whether endpoint access and logging already match
    fn matches_config(&self, public: bool, private: bool, log_types: &[String]) -> bool {
        let access_matches = self
            .resources_vpc_config
            .as_ref()
            .is_some_and(|c| c.endpoint_public_access == public && c.endpoint_private_access == private);
        let mut wanted = log_types.to_vec();
        wanted.sort();
        access_matches && self.enabled_log_types() == wanted
    }
}

impl From<Cluster> for ClusterInfo {
    fn from(cluster: Cluster) -> Self {
        Self {
            name: cluster.name,
            arn: cluster.arn,
            endpoint: cluster.endpoint,
            version: cluster.version,
        }
    }
}

fn cluster_status(status: &str) -> RemoteStatus {
    match status {
        "ACTIVE" => RemoteStatus::Ready,
        "FAILED" => RemoteStatus::Failed("cluster status FAILED".to_string()),
        other => RemoteStatus::Pending(other.to_string()),
    }
}

/// `{"clusterLogging":[...]}` enabling exactly `log_types`
fn logging_configuration(log_types: &[String]) -> String {
    let disabled: Vec<&str> = ALL_LOG_TYPES
        .iter()
        .copied()
        .filter(|t| !log_types.iter().any(|wanted| wanted == *t))
        .collect();
    let mut setups = Vec::new();
    if !log_types.is_empty() {
        setups.push(json!({ "types": log_types, "enabled": true }));
    }
    if !disabled.is_empty() {
        setups.push(json!({ "types": disabled, "enabled": false }));
    }
    json!({ "clusterLogging": setups }).to_string()
}

fn endpoint_configuration(public: bool, private: bool) -> String {
    format!(
        "endpointPublicAccess={},endpointPrivateAccess={}",
        public, private
    )
}

fn scaling_configuration(scaling: Scaling) -> String {
    format!(
        "minSize={},maxSize={},desiredSize={}",
        scaling.min, scaling.max, scaling.desired
    )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeGroupResponse {
    nodegroup: NodeGroup,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeGroup {
    nodegroup_name: String,
    nodegroup_arn: String,
    status: String,
    scaling_config: Option<ScalingConfig>,
    health: Option<Health>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScalingConfig {
    min_size: u32,
    max_size: u32,
    desired_size: u32,
}

#[derive(Debug, Deserialize)]
struct Health {
    #[serde(default)]
    issues: Vec<HealthIssue>,
}

#[derive(Debug, Deserialize)]
struct HealthIssue {
    code: Option<String>,
    message: Option<String>,
}

impl NodeGroup {
    fn scaling(&self) -> Option<Scaling> {
        self.scaling_config.as_ref().map(|c| Scaling {
            min: c.min_size,
            max: c.max_size,
            desired: c.desired_size,
        })
    }

    fn health_summary(&self) -> String {
        let issues: Vec<String> = self
            .health
            .iter()
            .flat_map(|h| &h.issues)
            .map(|issue| {
                format!(
                    "{}: {}",
                    issue.code.as_deref().unwrap_or("unknown"),
                    issue.message.as_deref().unwrap_or("")
                )
            })
            .collect();
        if issues.is_empty() {
            format!("node group status {}", self.status)
        } else {
            issues.join("; ")
        }
    }

    fn remote_status(&self) -> RemoteStatus {
        match self.status.as_str() {
            "ACTIVE" => RemoteStatus::Ready,
            "CREATE_FAILED" | "DEGRADED" | "DELETE_FAILED" => {
                RemoteStatus::Failed(self.health_summary())
            }
            other => RemoteStatus::Pending(other.to_string()),
        }
    }
}

impl From<NodeGroup> for NodeGroupInfo {
    fn from(group: NodeGroup) -> Self {
        Self {
            name: group.nodegroup_name,
            arn: group.nodegroup_arn,
        }
    }
}

impl AwsProvider {
    async fn describe_cluster(&self, name: &str) -> Result<Option<Cluster>> {
        let response: Option<ClusterResponse> = self
            .cli
            .run_json_optional(
                &["eks", "describe-cluster", "--name", name],
                MISSING_EKS_RESOURCE,
            )
            .await?;
        Ok(response.map(|r| r.cluster))
    }

    async fn describe_node_group(&self, cluster: &str, name: &str) -> Result<Option<NodeGroup>> {
        let response: Option<NodeGroupResponse> = self
            .cli
            .run_json_optional(
                &[
                    "eks",
                    "describe-nodegroup",
                    "--cluster-name",
                    cluster,
                    "--nodegroup-name",
                    name,
                ],
                MISSING_EKS_RESOURCE,
            )
            .await?;
        Ok(response.map(|r| r.nodegroup))
    }
}

#[async_trait]
impl ClusterApi for AwsProvider {
    async fn find_role(&self, name: &str) -> Result<Option<RoleInfo>> {
        let response: Option<RoleResponse> = self
            .cli
            .run_json_optional(&["iam", "get-role", "--role-name", name], MISSING_ROLE)
            .await?;
        Ok(response.map(|r| r.role.into()))
    }

    async fn create_role(&self, name: &str, purpose: RolePurpose) -> Result<RoleInfo> {
        let response: RoleResponse = self
            .cli
            .run_json(&[
                "iam",
                "create-role",
                "--role-name",
                name,
                "--assume-role-policy-document",
                &assume_role_policy(purpose),
                "--tags",
                "Key=managed-by,Value=stratus",
            ])
            .await?;
        for policy in managed_policies(purpose) {
            self.cli
                .run(&[
                    "iam",
                    "attach-role-policy",
                    "--role-name",
                    name,
                    "--policy-arn",
                    *policy,
                ])
                .await?;
        }
        Ok(response.role.into())
    }

    async fn delete_role(&self, name: &str) -> Result<()> {
        let attached: AttachedPolicies = self
            .cli
            .run_json(&["iam", "list-attached-role-policies", "--role-name", name])
            .await?;
        for policy in attached.attached_policies {
            self.cli
                .run(&[
                    "iam",
                    "detach-role-policy",
                    "--role-name",
                    name,
                    "--policy-arn",
                    &policy.policy_arn,
                ])
                .await?;
        }
        self.cli
            .run(&["iam", "delete-role", "--role-name", name])
            .await?;
        Ok(())
    }

    async fn find_cluster(&self, name: &str) -> Result<Option<ClusterInfo>> {
        Ok(self.describe_cluster(name).await?.map(ClusterInfo::from))
    }

    async fn create_cluster(&self, spec: &ClusterSpec) -> Result<ClusterInfo> {
        let vpc_config = format!(
            "subnetIds={},{}",
            spec.subnet_ids.join(","),
            endpoint_configuration(spec.endpoint_public_access, spec.endpoint_private_access)
        );
        let response: ClusterResponse = self
            .cli
            .run_json(&[
                "eks",
                "create-cluster",
                "--name",
                &spec.name,
                "--kubernetes-version",
                &spec.version,
                "--role-arn",
                &spec.role_arn,
                "--resources-vpc-config",
                &vpc_config,
                "--logging",
                &logging_configuration(&spec.log_types),
                "--tags",
                "managed-by=stratus",
            ])
            .await?;
        Ok(response.cluster.into())
    }

    async fn update_cluster_config(
        &self,
        name: &str,
        endpoint_public_access: bool,
        endpoint_private_access: bool,
        log_types: &[String],
    ) -> Result<()> {
        // EKS rejects updates that change nothing
        if let Some(cluster) = self.describe_cluster(name).await? {
            if cluster.matches_config(endpoint_public_access, endpoint_private_access, log_types) {
                tracing::debug!("Cluster {} configuration already in place", name);
                return Ok(());
            }
        }
        self.cli
            .run(&[
                "eks",
                "update-cluster-config",
                "--name",
                name,
                "--resources-vpc-config",
                &endpoint_configuration(endpoint_public_access, endpoint_private_access),
                "--logging",
                &logging_configuration(log_types),
            ])
            .await?;
        Ok(())
    }

    async fn cluster_status(&self, name: &str) -> Result<RemoteStatus> {
        Ok(match self.describe_cluster(name).await? {
            Some(cluster) => cluster_status(&cluster.status),
            None => RemoteStatus::Pending("not found".to_string()),
        })
    }

    async fn delete_cluster(&self, name: &str) -> Result<()> {
        self.cli
            .run(&["eks", "delete-cluster", "--name", name])
            .await?;
        Ok(())
    }

    async fn find_node_group(&self, cluster: &str, name: &str) -> Result<Option<NodeGroupInfo>> {
        Ok(self
            .describe_node_group(cluster, name)
            .await?
            .map(NodeGroupInfo::from))
    }

    async fn create_node_group(&self, spec: &NodeGroupSpec) -> Result<NodeGroupInfo> {
        let scaling = scaling_configuration(spec.scaling);
        let mut args = vec![
            "eks",
            "create-nodegroup",
            "--cluster-name",
            spec.cluster.as_str(),
            "--nodegroup-name",
            spec.name.as_str(),
            "--node-role",
            spec.role_arn.as_str(),
        ];
        args.push("--scaling-config");
        args.push(&scaling);
        args.push("--subnets");
        args.extend(spec.subnet_ids.iter().map(String::as_str));
        args.push("--instance-types");
        args.extend(spec.instance_types.iter().map(String::as_str));
        args.push("--tags");
        args.push("managed-by=stratus");

        let response: NodeGroupResponse = self.cli.run_json(&args).await?;
        Ok(response.nodegroup.into())
    }

    async fn update_node_group_scaling(
        &self,
        cluster: &str,
        name: &str,
        scaling: Scaling,
    ) -> Result<()> {
        if let Some(group) = self.describe_node_group(cluster, name).await? {
            if group.scaling() == Some(scaling) {
                tracing::debug!("Node group {} scaling already in place", name);
                return Ok(());
            }
        }
        self.cli
            .run(&[
                "eks",
                "update-nodegroup-config",
                "--cluster-name",
                cluster,
                "--nodegroup-name",
                name,
                "--scaling-config",
                &scaling_configuration(scaling),
            ])
            .await?;
        Ok(())
    }

    async fn node_group_status(&self, cluster: &str, name: &str) -> Result<RemoteStatus> {
        Ok(match self.describe_node_group(cluster, name).await? {
            Some(group) => group.remote_status(),
            None => RemoteStatus::Pending("not found".to_string()),
        })
    }

    async fn delete_node_group(&self, cluster: &str, name: &str) -> Result<()> {
        self.cli
            .run(&[
                "eks",
                "delete-nodegroup",
                "--cluster-name",
                cluster,
                "--nodegroup-name",
                name,
            ])
            .await?;

        // the cluster cannot be deleted while a node group remains
        self.wait_gone(&format!("node group {}", name), move || async move {
            Ok(self.describe_node_group(cluster, name).await?.is_none())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLUSTER_JSON: &str = r#"{
        "cluster": {
            "name": "shop-dev-cluster",
            "arn": "arn:aws:eks:us-east-1:123456789012:cluster/shop-dev-cluster",
            "endpoint": "https://ABCDEF.gr7.us-east-1.eks.amazonaws.com",
            "version": "1.29",
            "status": "ACTIVE",
            "resourcesVpcConfig": {
                "subnetIds": ["subnet-1", "subnet-2"],
                "endpointPublicAccess": true,
                "endpointPrivateAccess": true
            },
            "logging": {
                "clusterLogging": [
                    {"types": ["audit", "api"], "enabled": true},
                    {"types": ["authenticator", "controllerManager", "scheduler"], "enabled": false}
                ]
            }
        }
    }"#;

    #[test]
    fn test_parse_cluster() {
        let response: ClusterResponse = serde_json::from_str(CLUSTER_JSON).unwrap();
        let cluster = response.cluster;
        assert_eq!(cluster_status(&cluster.status), RemoteStatus::Ready);
        assert_eq!(cluster.enabled_log_types(), vec!["api", "audit"]);
        assert!(cluster.matches_config(true, true, &["api".to_string(), "audit".to_string()]));
        assert!(!cluster.matches_config(false, true, &["api".to_string(), "audit".to_string()]));
        assert!(!cluster.matches_config(true, true, &["api".to_string()]));

        let info = ClusterInfo::from(cluster);
        assert_eq!(info.version, "1.29");
        assert!(info.endpoint.unwrap().starts_with("https://"));
    }

    #[test]
    fn test_cluster_status_mapping() {
        assert_eq!(
            cluster_status("CREATING"),
            RemoteStatus::Pending("CREATING".to_string())
        );
        assert!(matches!(cluster_status("FAILED"), RemoteStatus::Failed(_)));
    }

    #[test]
    fn test_failed_node_group_reports_health_issues() {
        let json = r#"{
            "nodegroup": {
                "nodegroupName": "shop-dev-nodes",
                "nodegroupArn": "arn:aws:eks:us-east-1:123456789012:nodegroup/shop-dev-cluster/shop-dev-nodes/1",
                "status": "CREATE_FAILED",
                "scalingConfig": {"minSize": 1, "maxSize": 3, "desiredSize": 2},
                "health": {
                    "issues": [{"code": "AsgInstanceLaunchFailures", "message": "insufficient capacity"}]
                }
            }
        }"#;
        let response: NodeGroupResponse = serde_json::from_str(json).unwrap();
        let group = response.nodegroup;
        assert_eq!(
            group.scaling(),
            Some(Scaling {
                min: 1,
                max: 3,
                desired: 2
            })
        );
        assert_eq!(
            group.remote_status(),
            RemoteStatus::Failed("AsgInstanceLaunchFailures: insufficient capacity".to_string())
        );
    }

    #[test]
    fn test_logging_configuration_disables_the_rest() {
        let value: serde_json::Value =
            serde_json::from_str(&logging_configuration(&["api".to_string()])).unwrap();
        let setups = value["clusterLogging"].as_array().unwrap();
        assert_eq!(setups.len(), 2);
        assert_eq!(setups[0]["types"][0], "api");
        assert_eq!(setups[0]["enabled"], true);
        assert_eq!(setups[1]["types"].as_array().unwrap().len(), 4);
        assert_eq!(setups[1]["enabled"], false);
    }

    #[test]
    fn test_assume_role_policy_trusts_service() {
        let value: serde_json::Value =
            serde_json::from_str(&assume_role_policy(RolePurpose::NodeGroup)).unwrap();
        assert_eq!(
            value["Statement"][0]["Principal"]["Service"],
            "ec2.amazonaws.com"
        );
        assert_eq!(managed_policies(RolePurpose::NodeGroup).len(), 3);
    }

    #[test]
    fn test_scaling_configuration() {
        assert_eq!(
            scaling_configuration(Scaling {
                min: 1,
                max: 3,
                desired: 2
            }),
            "minSize=1,maxSize=3,desiredSize=2"
        );
    }
}
