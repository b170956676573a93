//! Run-scoped record of reversible actions

use crate::kind::ResourceKind;
use std::fmt;

/// Cloud object types that can appear in a ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Vpc,
    InternetGateway,
    Subnet,
    ElasticIp,
    NatGateway,
    RouteTable,
    Bucket,
    Repository,
    IamRole,
    Cluster,
    NodeGroup,
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObjectType::Vpc => "vpc",
            ObjectType::InternetGateway => "internet-gateway",
            ObjectType::Subnet => "subnet",
            ObjectType::ElasticIp => "elastic-ip",
            ObjectType::NatGateway => "nat-gateway",
            ObjectType::RouteTable => "route-table",
            ObjectType::Bucket => "bucket",
            ObjectType::Repository => "repository",
            ObjectType::IamRole => "iam-role",
            ObjectType::Cluster => "cluster",
            ObjectType::NodeGroup => "node-group",
        };
        f.write_str(name)
    }
}

/// One successfully created object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub object: ObjectType,
    /// Provider identifier passed back to the teardown call
    pub id: String,
    /// Deterministic name the object was created under
    pub name: String,
    /// Identifier of the owning object teardown needs (gateway's VPC,
    /// node group's cluster)
    pub parent: Option<String>,
    /// Section key the identifier was recorded under
    pub section_key: String,
}

impl LedgerEntry {
    pub fn new(
        object: ObjectType,
        id: impl Into<String>,
        name: impl Into<String>,
        section_key: impl Into<String>,
    ) -> Self {
        Self {
            object,
            id: id.into(),
            name: name.into(),
            parent: None,
            section_key: section_key.into(),
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }
}

impl fmt::Display for LedgerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.id == self.name {
            write!(f, "{} {}", self.object, self.id)
        } else {
            write!(f, "{} {} ({})", self.object, self.id, self.name)
        }
    }
}

/// Ordered, append-only list of objects created during one run
#[derive(Debug, Clone)]
pub struct CreationLedger {
    kind: ResourceKind,
    entries: Vec<LedgerEntry>,
}

impl CreationLedger {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            entries: Vec::new(),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn record(&mut self, entry: LedgerEntry) {
        tracing::debug!("{}: recorded {}", self.kind, entry);
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in creation order
    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// Consume the ledger, newest entry first
    pub fn into_reverse(self) -> impl Iterator<Item = LedgerEntry> {
        self.entries.into_iter().rev()
    }
}
