//! Resource kinds and their dependency declarations

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The four provisionable resource categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Network,
    ObjectStore,
    ImageRegistry,
    Cluster,
}

impl ResourceKind {
    /// Canonical provisioning order
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Network,
        ResourceKind::ObjectStore,
        ResourceKind::ImageRegistry,
        ResourceKind::Cluster,
    ];

    /// Kinds whose export manifests must exist before this kind runs
    pub fn dependencies(self) -> &'static [ResourceKind] {
        match self {
            ResourceKind::Cluster => &[ResourceKind::Network],
            _ => &[],
        }
    }

    /// Key of this kind's section in the state document
    pub fn section_name(self) -> &'static str {
        match self {
            ResourceKind::Network => "network",
            ResourceKind::ObjectStore => "object_store",
            ResourceKind::ImageRegistry => "image_registry",
            ResourceKind::Cluster => "cluster",
        }
    }

    /// Name used on the command line and in manifest file names
    pub fn slug(self) -> &'static str {
        match self {
            ResourceKind::Network => "network",
            ResourceKind::ObjectStore => "object-store",
            ResourceKind::ImageRegistry => "image-registry",
            ResourceKind::Cluster => "cluster",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "network" | "vpc" => Ok(ResourceKind::Network),
            "object-store" | "s3" | "storage" => Ok(ResourceKind::ObjectStore),
            "image-registry" | "ecr" | "registry" => Ok(ResourceKind::ImageRegistry),
            "cluster" | "eks" => Ok(ResourceKind::Cluster),
            other => Err(format!(
                "unknown resource kind '{}' (expected one of: network, object-store, image-registry, cluster)",
                other
            )),
        }
    }
}
