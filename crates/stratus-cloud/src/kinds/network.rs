//! Network: VPC, internet gateway, subnets, NAT and route tables

use super::{recorded, require_auth, wait_for};
use crate::error::{CloudError, Result};
use crate::kind::ResourceKind;
use crate::ledger::{CreationLedger, LedgerEntry, ObjectType};
use crate::manifest::ExportManifest;
use crate::provider::{NatGatewayInfo, NetworkApi, RouteTableInfo, RouteTarget, SubnetInfo};
use crate::provisioner::{ExistingObject, ResourcePolicy, RunContext};
use crate::rollback::Teardown;
use crate::state::ResourceSection;
use async_trait::async_trait;
use std::sync::Arc;
use stratus_config::{NetworkConfig, ResolvedConfiguration};

const VPC_ID: &str = "vpc_id";
const VPC_CIDR: &str = "vpc_cidr";
const INTERNET_GATEWAY_ID: &str = "internet_gateway_id";
const AVAILABILITY_ZONES: &str = "availability_zones";
const PUBLIC_SUBNET_IDS: &str = "public_subnet_ids";
const PRIVATE_SUBNET_IDS: &str = "private_subnet_ids";
const ELASTIC_IP_ALLOCATION_IDS: &str = "elastic_ip_allocation_ids";
const NAT_GATEWAY_IDS: &str = "nat_gateway_ids";
const PUBLIC_ROUTE_TABLE_ID: &str = "public_route_table_id";
const PRIVATE_ROUTE_TABLE_IDS: &str = "private_route_table_ids";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tier {
    Public,
    Private,
}

impl Tier {
    fn label(self) -> &'static str {
        match self {
            Tier::Public => "public",
            Tier::Private => "private",
        }
    }

    fn section_key(self) -> &'static str {
        match self {
            Tier::Public => PUBLIC_SUBNET_IDS,
            Tier::Private => PRIVATE_SUBNET_IDS,
        }
    }
}

/// What already lives inside an adopted VPC, looked up by name
#[derive(Debug, Default)]
struct Inventory {
    internet_gateway: Option<String>,
    subnets: Vec<SubnetInfo>,
    nat_gateways: Vec<NatGatewayInfo>,
    route_tables: Vec<RouteTableInfo>,
}

impl Inventory {
    fn subnet(&self, name: &str) -> Option<String> {
        self.subnets
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.id.clone())
    }

    fn nat_gateway(&self, name: &str) -> Option<&NatGatewayInfo> {
        self.nat_gateways.iter().find(|n| n.name == name)
    }

    fn route_table(&self, name: &str) -> Option<String> {
        self.route_tables
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.id.clone())
    }
}

/// One private route table and what it serves
#[derive(Debug, Clone, PartialEq, Eq)]
struct PrivateRoute {
    name: String,
    nat_gateway: Option<String>,
    subnets: Vec<String>,
}

/// Deterministic names and route layout derived from configuration
#[derive(Debug, Clone)]
struct Layout {
    config: Arc<ResolvedConfiguration>,
}

impl Layout {
    fn net(&self) -> &NetworkConfig {
        &self.config.network
    }

    fn vpc_name(&self) -> String {
        self.config.resource_name("vpc")
    }

    fn gateway_name(&self) -> String {
        self.config.resource_name("igw")
    }

    fn subnet_name(&self, tier: Tier, index: usize) -> String {
        self.config
            .resource_name(&format!("{}-{}", tier.label(), index + 1))
    }

    fn nat_name(&self, index: usize) -> String {
        self.config.resource_name(&format!("nat-{}", index + 1))
    }

    fn public_route_table_name(&self) -> String {
        self.config.resource_name("public-rt")
    }

    fn private_route_table_count(&self) -> usize {
        self.net().nat_count().max(1)
    }

    fn private_route_table_name(&self, index: usize) -> String {
        if self.private_route_table_count() == 1 {
            self.config.resource_name("private-rt")
        } else {
            self.config
                .resource_name(&format!("private-rt-{}", index + 1))
        }
    }

    /// Private route tables with their NAT target and subnets.
    ///
    /// Single-NAT (or no NAT) shares one table across every private subnet;
    /// per-AZ NAT gives each private subnet its own table.
    fn private_routes(
        &self,
        private_subnets: &[String],
        nat_gateways: &[String],
    ) -> Vec<PrivateRoute> {
        let count = self.private_route_table_count();
        (0..count)
            .map(|i| PrivateRoute {
                name: self.private_route_table_name(i),
                nat_gateway: if count == 1 {
                    nat_gateways.first().cloned()
                } else {
                    nat_gateways.get(i).cloned()
                },
                subnets: if count == 1 {
                    private_subnets.to_vec()
                } else {
                    private_subnets.get(i).cloned().into_iter().collect()
                },
            })
            .collect()
    }
}

pub struct NetworkPolicy {
    layout: Layout,
    api: Arc<dyn NetworkApi>,
}

impl NetworkPolicy {
    pub fn new(config: Arc<ResolvedConfiguration>, api: Arc<dyn NetworkApi>) -> Self {
        Self {
            layout: Layout { config },
            api,
        }
    }

    fn net(&self) -> &NetworkConfig {
        self.layout.net()
    }

    async fn inventory(&self, vpc_id: &str) -> Result<Inventory> {
        Ok(Inventory {
            internet_gateway: self.api.find_internet_gateway(vpc_id).await?,
            subnets: self.api.list_subnets(vpc_id).await?,
            nat_gateways: self.api.list_nat_gateways(vpc_id).await?,
            route_tables: self.api.list_route_tables(vpc_id).await?,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn ensure_subnets(
        &self,
        tier: Tier,
        vpc_id: &str,
        cidrs: &[String],
        inventory: &Inventory,
        section: &mut ResourceSection,
        ledger: &mut CreationLedger,
        ctx: &RunContext,
    ) -> Result<Vec<String>> {
        let key = tier.section_key();
        let zones = &self.net().availability_zones;
        let mut slots: Vec<Option<String>> = (0..zones.len())
            .map(|i| inventory.subnet(&self.layout.subnet_name(tier, i)))
            .collect();

        for (i, zone) in zones.iter().enumerate() {
            if slots[i].is_some() {
                continue;
            }
            ctx.checkpoint()?;
            let name = self.layout.subnet_name(tier, i);
            let cidr = cidrs.get(i).ok_or_else(|| {
                CloudError::prerequisite(format!("no {} subnet CIDR for {}", tier.label(), zone))
            })?;
            let id = self.api.create_subnet(vpc_id, &name, cidr, zone).await?;
            tracing::info!("Created {} subnet {} ({}) in {}", tier.label(), name, id, zone);
            ledger.record(LedgerEntry::new(ObjectType::Subnet, &id, &name, key));
            slots[i] = Some(id);
            section.set_list(key, slots.iter().flatten());
        }

        Ok(slots.into_iter().flatten().collect())
    }
}

#[async_trait]
impl Teardown for NetworkPolicy {
    async fn teardown(&self, entry: &LedgerEntry) -> Result<()> {
        match entry.object {
            ObjectType::Vpc => self.api.delete_vpc(&entry.id).await,
            ObjectType::InternetGateway => {
                self.api
                    .delete_internet_gateway(&entry.id, entry.parent.as_deref())
                    .await
            }
            ObjectType::Subnet => self.api.delete_subnet(&entry.id).await,
            ObjectType::ElasticIp => self.api.release_address(&entry.id).await,
            ObjectType::NatGateway => self.api.delete_nat_gateway(&entry.id).await,
            ObjectType::RouteTable => self.api.delete_route_table(&entry.id).await,
            other => Err(CloudError::api(
                "network teardown",
                format!("{} is not a network object", other),
            )),
        }
    }
}

#[async_trait]
impl ResourcePolicy for NetworkPolicy {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Network
    }

    fn cost_notice(&self) -> Option<String> {
        let count = self.net().nat_count();
        (count > 0).then(|| {
            format!(
                "This network uses {} NAT gateway(s) and elastic address(es), which are billed hourly.",
                count
            )
        })
    }

    async fn check_prerequisites(&self, _ctx: &RunContext) -> Result<()> {
        let net = self.net();
        if net.vpc_cidr.trim().is_empty() {
            return Err(CloudError::prerequisite("network.vpc_cidr is not set"));
        }
        let zones = net.availability_zones.len();
        if zones == 0 {
            return Err(CloudError::prerequisite(
                "network.availability_zones needs at least one zone",
            ));
        }
        for (key, cidrs) in [
            ("network.public_subnet_cidrs", &net.public_subnet_cidrs),
            ("network.private_subnet_cidrs", &net.private_subnet_cidrs),
        ] {
            if cidrs.len() != zones {
                return Err(CloudError::prerequisite(format!(
                    "{} has {} entries but {} availability zones are configured",
                    key,
                    cidrs.len(),
                    zones
                )));
            }
        }
        require_auth(self.api.as_ref()).await
    }

    async fn find_existing(&self) -> Result<Vec<ExistingObject>> {
        let name = self.layout.vpc_name();
        Ok(self
            .api
            .find_vpc(&name)
            .await?
            .map(|vpc| vec![ExistingObject::new(ObjectType::Vpc, name, vpc.id)])
            .unwrap_or_default())
    }

    async fn adopt(
        &self,
        existing: &[ExistingObject],
        section: &mut ResourceSection,
        _ctx: &RunContext,
    ) -> Result<()> {
        let vpc = existing
            .iter()
            .find(|o| o.object == ObjectType::Vpc)
            .ok_or_else(|| CloudError::StateError("no VPC to adopt".to_string()))?;
        section.set(VPC_ID, vpc.id.as_str());
        section.set(VPC_CIDR, self.net().vpc_cidr.as_str());

        let inventory = self.inventory(&vpc.id).await?;
        if let Some(gateway) = &inventory.internet_gateway {
            section.set(INTERNET_GATEWAY_ID, gateway.as_str());
        }

        let zones = self.net().availability_zones.len();
        for tier in [Tier::Public, Tier::Private] {
            let ids: Vec<String> = (0..zones)
                .filter_map(|i| inventory.subnet(&self.layout.subnet_name(tier, i)))
                .collect();
            if !ids.is_empty() {
                section.set_list(tier.section_key(), ids);
            }
        }

        let nats: Vec<&NatGatewayInfo> = (0..self.net().nat_count())
            .filter_map(|i| inventory.nat_gateway(&self.layout.nat_name(i)))
            .collect();
        if !nats.is_empty() {
            section.set_list(NAT_GATEWAY_IDS, nats.iter().map(|n| n.id.as_str()));
            section.set_list(
                ELASTIC_IP_ALLOCATION_IDS,
                nats.iter().filter_map(|n| n.allocation_id.as_deref()),
            );
        }

        if let Some(id) = inventory.route_table(&self.layout.public_route_table_name()) {
            section.set(PUBLIC_ROUTE_TABLE_ID, id);
        }
        let private_tables: Vec<String> = (0..self.layout.private_route_table_count())
            .filter_map(|i| inventory.route_table(&self.layout.private_route_table_name(i)))
            .collect();
        if !private_tables.is_empty() {
            section.set_list(PRIVATE_ROUTE_TABLE_IDS, private_tables);
        }

        tracing::info!(
            "Adopted VPC {} ({} subnets, {} NAT gateways, {} route tables already present)",
            vpc.id,
            inventory.subnets.len(),
            nats.len(),
            inventory.route_tables.len()
        );
        Ok(())
    }

    async fn create(
        &self,
        section: &mut ResourceSection,
        ledger: &mut CreationLedger,
        ctx: &RunContext,
    ) -> Result<()> {
        let net = self.net();
        section.set_list(AVAILABILITY_ZONES, net.availability_zones.iter());

        // VPC
        let (vpc_id, inventory) = match section.get_str(VPC_ID) {
            Some(id) => {
                let id = id.to_string();
                let inventory = self.inventory(&id).await?;
                (id, inventory)
            }
            None => {
                ctx.checkpoint()?;
                let name = self.layout.vpc_name();
                let id = self.api.create_vpc(&name, &net.vpc_cidr).await?;
                tracing::info!("Created VPC {} ({})", name, id);
                ledger.record(LedgerEntry::new(ObjectType::Vpc, &id, &name, VPC_ID));
                section.set(VPC_ID, id.as_str());
                section.set(VPC_CIDR, net.vpc_cidr.as_str());
                (id, Inventory::default())
            }
        };

        // Internet gateway
        let gateway_id = match inventory.internet_gateway.clone() {
            Some(id) => id,
            None => {
                ctx.checkpoint()?;
                let name = self.layout.gateway_name();
                let id = self.api.create_internet_gateway(&name).await?;
                ledger.record(
                    LedgerEntry::new(ObjectType::InternetGateway, &id, &name, INTERNET_GATEWAY_ID)
                        .with_parent(&vpc_id),
                );
                section.set(INTERNET_GATEWAY_ID, id.as_str());
                self.api.attach_internet_gateway(&id, &vpc_id).await?;
                tracing::info!("Created internet gateway {} attached to {}", id, vpc_id);
                id
            }
        };

        // Subnets, AZ order
        let public_subnets = self
            .ensure_subnets(
                Tier::Public,
                &vpc_id,
                &net.public_subnet_cidrs,
                &inventory,
                section,
                ledger,
                ctx,
            )
            .await?;
        let private_subnets = self
            .ensure_subnets(
                Tier::Private,
                &vpc_id,
                &net.private_subnet_cidrs,
                &inventory,
                section,
                ledger,
                ctx,
            )
            .await?;

        // NAT: elastic address first, then the gateway in public subnet n
        let mut nat_slots: Vec<Option<String>> = (0..net.nat_count())
            .map(|i| inventory.nat_gateway(&self.layout.nat_name(i)).map(|n| n.id.clone()))
            .collect();
        for i in 0..nat_slots.len() {
            if nat_slots[i].is_some() {
                continue;
            }
            ctx.checkpoint()?;
            let name = self.layout.nat_name(i);
            let subnet = public_subnets.get(i).ok_or_else(|| {
                CloudError::StateError(format!("no public subnet for NAT gateway {}", name))
            })?;

            let allocation_id = self.api.allocate_address(&name).await?;
            ledger.record(LedgerEntry::new(
                ObjectType::ElasticIp,
                &allocation_id,
                &name,
                ELASTIC_IP_ALLOCATION_IDS,
            ));
            section.push(ELASTIC_IP_ALLOCATION_IDS, &allocation_id);

            let nat_id = self
                .api
                .create_nat_gateway(&name, subnet, &allocation_id)
                .await?;
            tracing::info!("Created NAT gateway {} ({}) in {}", name, nat_id, subnet);
            ledger.record(LedgerEntry::new(
                ObjectType::NatGateway,
                &nat_id,
                &name,
                NAT_GATEWAY_IDS,
            ));
            nat_slots[i] = Some(nat_id);
            section.set_list(NAT_GATEWAY_IDS, nat_slots.iter().flatten());
        }
        let nat_gateways: Vec<String> = nat_slots.into_iter().flatten().collect();

        // Public route table
        if inventory
            .route_table(&self.layout.public_route_table_name())
            .is_none()
        {
            ctx.checkpoint()?;
            let name = self.layout.public_route_table_name();
            let id = self.api.create_route_table(&vpc_id, &name).await?;
            ledger.record(LedgerEntry::new(
                ObjectType::RouteTable,
                &id,
                &name,
                PUBLIC_ROUTE_TABLE_ID,
            ));
            section.set(PUBLIC_ROUTE_TABLE_ID, id.as_str());
            self.api
                .set_default_route(&id, &RouteTarget::InternetGateway(gateway_id.clone()))
                .await?;
            for subnet in &public_subnets {
                self.api.associate_route_table(&id, subnet).await?;
            }
            tracing::info!("Created public route table {} ({})", name, id);
        }

        // Private route tables
        let mut private_slots: Vec<Option<String>> = (0..self.layout.private_route_table_count())
            .map(|i| inventory.route_table(&self.layout.private_route_table_name(i)))
            .collect();
        for (i, route) in self
            .layout
            .private_routes(&private_subnets, &nat_gateways)
            .into_iter()
            .enumerate()
        {
            if private_slots[i].is_some() {
                continue;
            }
            ctx.checkpoint()?;
            let id = self.api.create_route_table(&vpc_id, &route.name).await?;
            ledger.record(LedgerEntry::new(
                ObjectType::RouteTable,
                &id,
                &route.name,
                PRIVATE_ROUTE_TABLE_IDS,
            ));
            private_slots[i] = Some(id.clone());
            section.set_list(PRIVATE_ROUTE_TABLE_IDS, private_slots.iter().flatten());
            if let Some(nat) = route.nat_gateway {
                self.api
                    .set_default_route(&id, &RouteTarget::NatGateway(nat))
                    .await?;
            }
            for subnet in &route.subnets {
                self.api.associate_route_table(&id, subnet).await?;
            }
            tracing::info!("Created private route table {} ({})", route.name, id);
        }

        Ok(())
    }

    async fn configure(&self, section: &mut ResourceSection, _ctx: &RunContext) -> Result<()> {
        let vpc_id = recorded(section, VPC_ID)?.to_string();
        self.api.set_vpc_dns(&vpc_id, true, true).await?;

        for subnet in section.get_list(PUBLIC_SUBNET_IDS) {
            self.api.set_subnet_public_ip(&subnet, true).await?;
        }
        for subnet in section.get_list(PRIVATE_SUBNET_IDS) {
            self.api.set_subnet_public_ip(&subnet, false).await?;
        }

        let tables = self.api.list_route_tables(&vpc_id).await?;
        for (table, target, subnets) in expected_routes(self, section)? {
            if let Some(target) = target {
                self.api.set_default_route(&table, &target).await?;
            }
            let associated: &[String] = tables
                .iter()
                .find(|t| t.id == table)
                .map(|t| t.associated_subnets.as_slice())
                .unwrap_or_default();
            for subnet in subnets.iter().filter(|s| !associated.contains(s)) {
                tracing::info!("Associating {} with route table {}", subnet, table);
                self.api.associate_route_table(&table, subnet).await?;
            }
        }

        section.set("dns_support", true);
        section.set("dns_hostnames", true);
        section.set("nat_enabled", self.net().nat_count() > 0);
        section.set("single_nat", self.net().single_nat);
        Ok(())
    }

    async fn verify(&self, section: &ResourceSection, ctx: &RunContext) -> Result<()> {
        let config = self.layout.config.as_ref();
        let timeouts = &config.timeouts;
        let vpc_id = recorded(section, VPC_ID)?;
        let gateway_id = recorded(section, INTERNET_GATEWAY_ID)?;

        wait_for(config, ctx, format!("vpc {}", vpc_id), timeouts.gateway(), || {
            self.api.vpc_status(vpc_id)
        })
        .await?;

        wait_for(
            config,
            ctx,
            format!("internet gateway {} attachment", gateway_id),
            timeouts.gateway(),
            || self.api.gateway_attachment_status(gateway_id, vpc_id),
        )
        .await?;

        for nat in section.get_list(NAT_GATEWAY_IDS) {
            let nat = nat.as_str();
            wait_for(
                config,
                ctx,
                format!("nat gateway {}", nat),
                timeouts.nat_gateway(),
                || self.api.nat_gateway_status(nat),
            )
            .await?;
        }

        let tables = self.api.list_route_tables(vpc_id).await?;
        for (table, _, subnets) in expected_routes(self, section)? {
            let associated = tables
                .iter()
                .find(|t| t.id == table)
                .map(|t| t.associated_subnets.clone())
                .unwrap_or_default();
            if let Some(missing) = subnets.iter().find(|s| !associated.contains(s)) {
                return Err(CloudError::ProviderFailureState {
                    resource: format!("route table {}", table),
                    reason: format!("subnet {} is not associated", missing),
                });
            }
        }

        tracing::info!("Network {} verified", vpc_id);
        Ok(())
    }

    fn exports(&self, section: &ResourceSection) -> Result<ExportManifest> {
        let mut manifest = ExportManifest::new(ResourceKind::Network);
        manifest
            .set("VPC_ID", recorded(section, VPC_ID)?)?
            .set("VPC_CIDR", recorded(section, VPC_CIDR)?)?
            .set("INTERNET_GATEWAY_ID", recorded(section, INTERNET_GATEWAY_ID)?)?
            .set_list("AVAILABILITY_ZONES", section.get_list(AVAILABILITY_ZONES))?
            .set_list("PUBLIC_SUBNET_IDS", section.get_list(PUBLIC_SUBNET_IDS))?
            .set_list("PRIVATE_SUBNET_IDS", section.get_list(PRIVATE_SUBNET_IDS))?
            .set("PUBLIC_ROUTE_TABLE_ID", recorded(section, PUBLIC_ROUTE_TABLE_ID)?)?
            .set_list(
                "PRIVATE_ROUTE_TABLE_IDS",
                section.get_list(PRIVATE_ROUTE_TABLE_IDS),
            )?
            .set_list("NAT_GATEWAY_IDS", section.get_list(NAT_GATEWAY_IDS))?;
        Ok(manifest)
    }
}

/// Route table id, default route target and expected subnets, for every
/// table recorded in `section`
fn expected_routes(
    policy: &NetworkPolicy,
    section: &ResourceSection,
) -> Result<Vec<(String, Option<RouteTarget>, Vec<String>)>> {
    let mut routes = vec![(
        recorded(section, PUBLIC_ROUTE_TABLE_ID)?.to_string(),
        section
            .get_str(INTERNET_GATEWAY_ID)
            .map(|id| RouteTarget::InternetGateway(id.to_string())),
        section.get_list(PUBLIC_SUBNET_IDS),
    )];

    let private_tables = section.get_list(PRIVATE_ROUTE_TABLE_IDS);
    let plan = policy.layout.private_routes(
        &section.get_list(PRIVATE_SUBNET_IDS),
        &section.get_list(NAT_GATEWAY_IDS),
    );
    for (table, route) in private_tables.into_iter().zip(plan) {
        routes.push((
            table,
            route.nat_gateway.map(RouteTarget::NatGateway),
            route.subnets,
        ));
    }
    Ok(routes)
}
