//! Resolved configuration record and its default table

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Fully resolved configuration for one (project, environment) pair.
///
/// Built once by [`crate::ConfigResolver`] and handed to every component by
/// reference. Nothing reads process environment after resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolvedConfiguration {
    pub project: String,
    pub environment: String,
    pub region: String,
    /// AWS CLI profile, if not using the default credential chain
    pub profile: Option<String>,
    pub state: StateConfig,
    pub network: NetworkConfig,
    pub object_store: ObjectStoreConfig,
    pub image_registry: RegistryConfig,
    pub cluster: ClusterConfig,
    pub timeouts: TimeoutConfig,
}

impl Default for ResolvedConfiguration {
    fn default() -> Self {
        Self {
            project: "stratus".to_string(),
            environment: "dev".to_string(),
            region: "us-east-1".to_string(),
            profile: None,
            state: StateConfig::default(),
            network: NetworkConfig::default(),
            object_store: ObjectStoreConfig::default(),
            image_registry: RegistryConfig::default(),
            cluster: ClusterConfig::default(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl ResolvedConfiguration {
    /// Deterministic name for a resource: `<project>-<environment>-<suffix>`
    pub fn resource_name(&self, suffix: &str) -> String {
        format!("{}-{}-{}", self.project, self.environment, suffix)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StateConfig {
    /// Root directory; documents live under `<dir>/<project>/<environment>/`
    pub dir: PathBuf,
    /// Take the advisory run lock before provisioning
    pub lock: bool,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".stratus"),
            lock: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkConfig {
    pub vpc_cidr: String,
    pub availability_zones: Vec<String>,
    pub public_subnet_cidrs: Vec<String>,
    pub private_subnet_cidrs: Vec<String>,
    pub enable_nat: bool,
    /// One shared NAT gateway instead of one per availability zone
    pub single_nat: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            vpc_cidr: "10.0.0.0/16".to_string(),
            availability_zones: vec!["us-east-1a".to_string(), "us-east-1b".to_string()],
            public_subnet_cidrs: vec!["10.0.1.0/24".to_string(), "10.0.2.0/24".to_string()],
            private_subnet_cidrs: vec!["10.0.101.0/24".to_string(), "10.0.102.0/24".to_string()],
            enable_nat: true,
            single_nat: true,
        }
    }
}

impl NetworkConfig {
    /// Number of NAT gateways the configuration calls for
    pub fn nat_count(&self) -> usize {
        match (self.enable_nat, self.single_nat) {
            (false, _) => 0,
            (true, true) => 1,
            (true, false) => self.availability_zones.len(),
        }
    }
}

/// Server-side encryption for buckets and repositories
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Encryption {
    #[default]
    Aes256,
    Kms {
        #[serde(default)]
        key_id: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ObjectStoreConfig {
    /// Bucket purposes; each becomes `<project>-<environment>-<purpose>`
    pub buckets: Vec<String>,
    pub versioning: bool,
    pub encryption: Encryption,
    pub block_public_access: bool,
    /// Expire non-current object versions after this many days
    pub noncurrent_expiration_days: Option<u32>,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            buckets: vec!["artifacts".to_string(), "logs".to_string()],
            versioning: true,
            encryption: Encryption::Aes256,
            block_public_access: true,
            noncurrent_expiration_days: Some(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryConfig {
    /// Repository names; each becomes `<project>-<environment>/<name>`
    pub repositories: Vec<String>,
    pub scan_on_push: bool,
    pub immutable_tags: bool,
    /// Lifecycle policy: keep only this many most recent images
    pub keep_last_images: Option<u32>,
    pub encryption: Encryption,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            repositories: vec!["app".to_string()],
            scan_on_push: true,
            immutable_tags: false,
            keep_last_images: Some(30),
            encryption: Encryption::Aes256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClusterConfig {
    pub version: String,
    pub instance_types: Vec<String>,
    pub min_size: u32,
    pub max_size: u32,
    pub desired_size: u32,
    pub endpoint_public_access: bool,
    pub endpoint_private_access: bool,
    /// Control-plane log types to ship (api, audit, authenticator, ...)
    pub log_types: Vec<String>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            version: "1.29".to_string(),
            instance_types: vec!["t3.medium".to_string()],
            min_size: 1,
            max_size: 3,
            desired_size: 2,
            endpoint_public_access: true,
            endpoint_private_access: true,
            log_types: vec!["api".to_string(), "audit".to_string()],
        }
    }
}

/// Bounded waits used while verifying resources, in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeoutConfig {
    pub poll_interval_secs: u64,
    pub gateway_secs: u64,
    pub nat_gateway_secs: u64,
    pub bucket_secs: u64,
    pub repository_secs: u64,
    pub cluster_secs: u64,
    pub node_group_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
            gateway_secs: 300,
            nat_gateway_secs: 600,
            bucket_secs: 120,
            repository_secs: 120,
            cluster_secs: 1200,
            node_group_secs: 900,
        }
    }
}

impl TimeoutConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn gateway(&self) -> Duration {
        Duration::from_secs(self.gateway_secs)
    }

    pub fn nat_gateway(&self) -> Duration {
        Duration::from_secs(self.nat_gateway_secs)
    }

    pub fn bucket(&self) -> Duration {
        Duration::from_secs(self.bucket_secs)
    }

    pub fn repository(&self) -> Duration {
        Duration::from_secs(self.repository_secs)
    }

    pub fn cluster(&self) -> Duration {
        Duration::from_secs(self.cluster_secs)
    }

    pub fn node_group(&self) -> Duration {
        Duration::from_secs(self.node_group_secs)
    }
}
