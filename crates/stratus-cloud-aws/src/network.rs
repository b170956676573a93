//! EC2 networking through `aws ec2`

use crate::cli::tag_specification;
use crate::provider::AwsProvider;
use async_trait::async_trait;
use serde::Deserialize;
use stratus_cloud::{
    NatGatewayInfo, NetworkApi, RemoteStatus, Result, RouteTableInfo, RouteTarget, SubnetInfo,
    VpcInfo,
};

const DEFAULT_ROUTE: &str = "0.0.0.0/0";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Tag {
    pub key: String,
    pub value: String,
}

/// Value of the `Name` tag, empty when untagged
fn name_tag(tags: &[Tag]) -> String {
    tags.iter()
        .find(|t| t.key == "Name")
        .map(|t| t.value.clone())
        .unwrap_or_default()
}

fn name_filter(name: &str) -> String {
    format!("Name=tag:Name,Values={}", name)
}

fn vpc_filter(vpc_id: &str) -> String {
    format!("Name=vpc-id,Values={}", vpc_id)
}

// ========== Response shapes ==========

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VpcList {
    #[serde(default)]
    vpcs: Vec<Vpc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreatedVpc {
    vpc: Vpc,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Vpc {
    vpc_id: String,
    cidr_block: String,
    state: Option<String>,
    #[serde(default)]
    tags: Vec<Tag>,
}

impl From<Vpc> for VpcInfo {
    fn from(vpc: Vpc) -> Self {
        Self {
            name: name_tag(&vpc.tags),
            id: vpc.vpc_id,
            cidr: vpc.cidr_block,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GatewayList {
    #[serde(default)]
    internet_gateways: Vec<InternetGateway>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreatedGateway {
    internet_gateway: InternetGateway,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InternetGateway {
    internet_gateway_id: String,
    #[serde(default)]
    attachments: Vec<Attachment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Attachment {
    vpc_id: String,
    state: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SubnetList {
    #[serde(default)]
    subnets: Vec<Subnet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreatedSubnet {
    subnet: Subnet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Subnet {
    subnet_id: String,
    cidr_block: String,
    availability_zone: String,
    #[serde(default)]
    tags: Vec<Tag>,
}

impl From<Subnet> for SubnetInfo {
    fn from(subnet: Subnet) -> Self {
        Self {
            name: name_tag(&subnet.tags),
            id: subnet.subnet_id,
            cidr: subnet.cidr_block,
            availability_zone: subnet.availability_zone,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Allocation {
    allocation_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NatGatewayList {
    #[serde(default)]
    nat_gateways: Vec<NatGateway>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreatedNatGateway {
    nat_gateway: NatGateway,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NatGateway {
    nat_gateway_id: String,
    subnet_id: String,
    state: String,
    failure_message: Option<String>,
    #[serde(default)]
    nat_gateway_addresses: Vec<NatAddress>,
    #[serde(default)]
    tags: Vec<Tag>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NatAddress {
    allocation_id: Option<String>,
}

impl NatGateway {
    /// Deleted or failed gateways linger in describe output for a while
    fn is_live(&self) -> bool {
        matches!(self.state.as_str(), "pending" | "available")
    }
}

impl From<NatGateway> for NatGatewayInfo {
    fn from(nat: NatGateway) -> Self {
        Self {
            name: name_tag(&nat.tags),
            allocation_id: nat
                .nat_gateway_addresses
                .into_iter()
                .find_map(|a| a.allocation_id),
            id: nat.nat_gateway_id,
            subnet_id: nat.subnet_id,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RouteTableList {
    #[serde(default)]
    route_tables: Vec<RouteTable>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreatedRouteTable {
    route_table: RouteTable,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RouteTable {
    route_table_id: String,
    #[serde(default)]
    associations: Vec<Association>,
    #[serde(default)]
    tags: Vec<Tag>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Association {
    route_table_association_id: Option<String>,
    subnet_id: Option<String>,
    #[serde(default)]
    main: bool,
}

impl From<RouteTable> for RouteTableInfo {
    fn from(table: RouteTable) -> Self {
        Self {
            name: name_tag(&table.tags),
            associated_subnets: table
                .associations
                .into_iter()
                .filter_map(|a| a.subnet_id)
                .collect(),
            id: table.route_table_id,
        }
    }
}

// ========== State mapping ==========

fn vpc_status(state: Option<&str>) -> RemoteStatus {
    match state {
        Some("available") => RemoteStatus::Ready,
        Some(other) => RemoteStatus::Pending(other.to_string()),
        None => RemoteStatus::Pending("unknown".to_string()),
    }
}

fn attachment_status(gateway: &InternetGateway, vpc_id: &str) -> RemoteStatus {
    let Some(attachment) = gateway.attachments.iter().find(|a| a.vpc_id == vpc_id) else {
        return RemoteStatus::Failed(format!("not attached to {}", vpc_id));
    };
    match attachment.state.as_deref() {
        Some("available") | Some("attached") => RemoteStatus::Ready,
        Some("attaching") | None => RemoteStatus::Pending("attaching".to_string()),
        Some(other) => RemoteStatus::Failed(other.to_string()),
    }
}

fn nat_status(nat: &NatGateway) -> RemoteStatus {
    match nat.state.as_str() {
        "available" => RemoteStatus::Ready,
        "pending" => RemoteStatus::Pending("pending".to_string()),
        "failed" => RemoteStatus::Failed(
            nat.failure_message
                .clone()
                .unwrap_or_else(|| "failed".to_string()),
        ),
        other => RemoteStatus::Failed(other.to_string()),
    }
}

#[async_trait]
impl NetworkApi for AwsProvider {
    async fn find_vpc(&self, name: &str) -> Result<Option<VpcInfo>> {
        let list: VpcList = self
            .cli
            .run_json(&["ec2", "describe-vpcs", "--filters", &name_filter(name)])
            .await?;
        Ok(list.vpcs.into_iter().next().map(VpcInfo::from))
    }

    async fn create_vpc(&self, name: &str, cidr: &str) -> Result<String> {
        let created: CreatedVpc = self
            .cli
            .run_json(&[
                "ec2",
                "create-vpc",
                "--cidr-block",
                cidr,
                "--tag-specifications",
                &tag_specification("vpc", name),
            ])
            .await?;
        Ok(created.vpc.vpc_id)
    }

    async fn set_vpc_dns(&self, vpc_id: &str, support: bool, hostnames: bool) -> Result<()> {
        // one attribute per call
        let support = format!("{{\"Value\":{}}}", support);
        let hostnames = format!("{{\"Value\":{}}}", hostnames);
        self.cli
            .run(&[
                "ec2",
                "modify-vpc-attribute",
                "--vpc-id",
                vpc_id,
                "--enable-dns-support",
                &support,
            ])
            .await?;
        self.cli
            .run(&[
                "ec2",
                "modify-vpc-attribute",
                "--vpc-id",
                vpc_id,
                "--enable-dns-hostnames",
                &hostnames,
            ])
            .await?;
        Ok(())
    }

    async fn vpc_status(&self, vpc_id: &str) -> Result<RemoteStatus> {
        let list: Option<VpcList> = self
            .cli
            .run_json_optional(
                &["ec2", "describe-vpcs", "--vpc-ids", vpc_id],
                &["InvalidVpcID.NotFound"],
            )
            .await?;
        Ok(match list.and_then(|l| l.vpcs.into_iter().next()) {
            Some(vpc) => vpc_status(vpc.state.as_deref()),
            None => RemoteStatus::Pending("not found".to_string()),
        })
    }

    async fn delete_vpc(&self, vpc_id: &str) -> Result<()> {
        self.cli
            .run(&["ec2", "delete-vpc", "--vpc-id", vpc_id])
            .await?;
        Ok(())
    }

    async fn find_internet_gateway(&self, vpc_id: &str) -> Result<Option<String>> {
        let filter = format!("Name=attachment.vpc-id,Values={}", vpc_id);
        let list: GatewayList = self
            .cli
            .run_json(&["ec2", "describe-internet-gateways", "--filters", &filter])
            .await?;
        Ok(list
            .internet_gateways
            .into_iter()
            .next()
            .map(|g| g.internet_gateway_id))
    }

    async fn create_internet_gateway(&self, name: &str) -> Result<String> {
        let created: CreatedGateway = self
            .cli
            .run_json(&[
                "ec2",
                "create-internet-gateway",
                "--tag-specifications",
                &tag_specification("internet-gateway", name),
            ])
            .await?;
        Ok(created.internet_gateway.internet_gateway_id)
    }

    async fn attach_internet_gateway(&self, gateway_id: &str, vpc_id: &str) -> Result<()> {
        self.cli
            .run(&[
                "ec2",
                "attach-internet-gateway",
                "--internet-gateway-id",
                gateway_id,
                "--vpc-id",
                vpc_id,
            ])
            .await?;
        Ok(())
    }

    async fn gateway_attachment_status(
        &self,
        gateway_id: &str,
        vpc_id: &str,
    ) -> Result<RemoteStatus> {
        let list: GatewayList = self
            .cli
            .run_json(&[
                "ec2",
                "describe-internet-gateways",
                "--internet-gateway-ids",
                gateway_id,
            ])
            .await?;
        Ok(match list.internet_gateways.first() {
            Some(gateway) => attachment_status(gateway, vpc_id),
            None => RemoteStatus::Pending("not found".to_string()),
        })
    }

    async fn delete_internet_gateway(&self, gateway_id: &str, vpc_id: Option<&str>) -> Result<()> {
        if let Some(vpc_id) = vpc_id {
            let detached = self
                .cli
                .run(&[
                    "ec2",
                    "detach-internet-gateway",
                    "--internet-gateway-id",
                    gateway_id,
                    "--vpc-id",
                    vpc_id,
                ])
                .await;
            match detached {
                Ok(_) => {}
                Err(e) if e.is_code(&["Gateway.NotAttached"]) => {}
                Err(e) => return Err(e.into()),
            }
        }
        self.cli
            .run(&[
                "ec2",
                "delete-internet-gateway",
                "--internet-gateway-id",
                gateway_id,
            ])
            .await?;
        Ok(())
    }

    async fn list_subnets(&self, vpc_id: &str) -> Result<Vec<SubnetInfo>> {
        let list: SubnetList = self
            .cli
            .run_json(&["ec2", "describe-subnets", "--filters", &vpc_filter(vpc_id)])
            .await?;
        Ok(list.subnets.into_iter().map(SubnetInfo::from).collect())
    }

    async fn create_subnet(
        &self,
        vpc_id: &str,
        name: &str,
        cidr: &str,
        availability_zone: &str,
    ) -> Result<String> {
        let created: CreatedSubnet = self
            .cli
            .run_json(&[
                "ec2",
                "create-subnet",
                "--vpc-id",
                vpc_id,
                "--cidr-block",
                cidr,
                "--availability-zone",
                availability_zone,
                "--tag-specifications",
                &tag_specification("subnet", name),
            ])
            .await?;
        Ok(created.subnet.subnet_id)
    }

    async fn set_subnet_public_ip(&self, subnet_id: &str, enabled: bool) -> Result<()> {
        let flag = if enabled {
            "--map-public-ip-on-launch"
        } else {
            "--no-map-public-ip-on-launch"
        };
        self.cli
            .run(&["ec2", "modify-subnet-attribute", "--subnet-id", subnet_id, flag])
            .await?;
        Ok(())
    }

    async fn delete_subnet(&self, subnet_id: &str) -> Result<()> {
        self.cli
            .run(&["ec2", "delete-subnet", "--subnet-id", subnet_id])
            .await?;
        Ok(())
    }

    async fn allocate_address(&self, name: &str) -> Result<String> {
        let allocation: Allocation = self
            .cli
            .run_json(&[
                "ec2",
                "allocate-address",
                "--domain",
                "vpc",
                "--tag-specifications",
                &tag_specification("elastic-ip", name),
            ])
            .await?;
        Ok(allocation.allocation_id)
    }

    async fn release_address(&self, allocation_id: &str) -> Result<()> {
        self.cli
            .run(&["ec2", "release-address", "--allocation-id", allocation_id])
            .await?;
        Ok(())
    }

    async fn list_nat_gateways(&self, vpc_id: &str) -> Result<Vec<NatGatewayInfo>> {
        // describe-nat-gateways takes --filter, not --filters
        let list: NatGatewayList = self
            .cli
            .run_json(&["ec2", "describe-nat-gateways", "--filter", &vpc_filter(vpc_id)])
            .await?;
        Ok(list
            .nat_gateways
            .into_iter()
            .filter(NatGateway::is_live)
            .map(NatGatewayInfo::from)
            .collect())
    }

    async fn create_nat_gateway(
        &self,
        name: &str,
        subnet_id: &str,
        allocation_id: &str,
    ) -> Result<String> {
        let created: CreatedNatGateway = self
            .cli
            .run_json(&[
                "ec2",
                "create-nat-gateway",
                "--subnet-id",
                subnet_id,
                "--allocation-id",
                allocation_id,
                "--tag-specifications",
                &tag_specification("natgateway", name),
            ])
            .await?;
        Ok(created.nat_gateway.nat_gateway_id)
    }

    async fn nat_gateway_status(&self, nat_gateway_id: &str) -> Result<RemoteStatus> {
        let list: NatGatewayList = self
            .cli
            .run_json(&[
                "ec2",
                "describe-nat-gateways",
                "--nat-gateway-ids",
                nat_gateway_id,
            ])
            .await?;
        Ok(match list.nat_gateways.first() {
            Some(nat) => nat_status(nat),
            None => RemoteStatus::Pending("not found".to_string()),
        })
    }

    async fn delete_nat_gateway(&self, nat_gateway_id: &str) -> Result<()> {
        self.cli
            .run(&[
                "ec2",
                "delete-nat-gateway",
                "--nat-gateway-id",
                nat_gateway_id,
            ])
            .await?;

        // the elastic address stays in use until the gateway is fully deleted
        self.wait_gone(&format!("nat gateway {}", nat_gateway_id), move || async move {
            let list: Option<NatGatewayList> = self
                .cli
                .run_json_optional(
                    &[
                        "ec2",
                        "describe-nat-gateways",
                        "--nat-gateway-ids",
                        nat_gateway_id,
                    ],
                    &["NatGatewayNotFound"],
                )
                .await?;
            Ok(list
                .map(|l| l.nat_gateways.iter().all(|n| n.state == "deleted"))
                .unwrap_or(true))
        })
        .await
    }

    async fn list_route_tables(&self, vpc_id: &str) -> Result<Vec<RouteTableInfo>> {
        let list: RouteTableList = self
            .cli
            .run_json(&[
                "ec2",
                "describe-route-tables",
                "--filters",
                &vpc_filter(vpc_id),
            ])
            .await?;
        Ok(list
            .route_tables
            .into_iter()
            .map(RouteTableInfo::from)
            .collect())
    }

    async fn create_route_table(&self, vpc_id: &str, name: &str) -> Result<String> {
        let created: CreatedRouteTable = self
            .cli
            .run_json(&[
                "ec2",
                "create-route-table",
                "--vpc-id",
                vpc_id,
                "--tag-specifications",
                &tag_specification("route-table", name),
            ])
            .await?;
        Ok(created.route_table.route_table_id)
    }

    async fn set_default_route(&self, route_table_id: &str, target: &RouteTarget) -> Result<()> {
        let (flag, id) = match target {
            RouteTarget::InternetGateway(id) => ("--gateway-id", id.as_str()),
            RouteTarget::NatGateway(id) => ("--nat-gateway-id", id.as_str()),
        };
        let args = |operation: &'static str| {
            [
                "ec2",
                operation,
                "--route-table-id",
                route_table_id,
                "--destination-cidr-block",
                DEFAULT_ROUTE,
                flag,
                id,
            ]
        };

        match self.cli.run(&args("replace-route")).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_code(&["InvalidRoute.NotFound"]) => {
                self.cli.run(&args("create-route")).await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn associate_route_table(&self, route_table_id: &str, subnet_id: &str) -> Result<()> {
        self.cli
            .run(&[
                "ec2",
                "associate-route-table",
                "--route-table-id",
                route_table_id,
                "--subnet-id",
                subnet_id,
            ])
            .await?;
        Ok(())
    }

    async fn delete_route_table(&self, route_table_id: &str) -> Result<()> {
        let list: RouteTableList = self
            .cli
            .run_json(&[
                "ec2",
                "describe-route-tables",
                "--route-table-ids",
                route_table_id,
            ])
            .await?;
        let associations = list
            .route_tables
            .into_iter()
            .flat_map(|t| t.associations)
            .filter(|a| !a.main)
            .filter_map(|a| a.route_table_association_id);
        for association in associations {
            self.cli
                .run(&[
                    "ec2",
                    "disassociate-route-table",
                    "--association-id",
                    &association,
                ])
                .await?;
        }
        self.cli
            .run(&[
                "ec2",
                "delete-route-table",
                "--route-table-id",
                route_table_id,
            ])
            .await?;
        Ok(())
    }
}
