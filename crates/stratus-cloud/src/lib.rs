//! Stratus Cloud Provisioning
//!
//! Provider-neutral core of Stratus: the provisioning state machine, the
//! shared state document, export manifests and rollback.
//!
//! # Resource kinds
//!
//! - **Network**: VPC, internet gateway, subnets, NAT, route tables
//! - **Object store**: one bucket per purpose
//! - **Image registry**: one repository per image
//! - **Cluster**: managed control plane and node group (needs Network)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                   stratus CLI                    │
//! │             (stratus provision ...)              │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                 stratus-cloud                    │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │  Provisioner  ──▶  trait ResourcePolicy  │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌────────────┐ ┌────────────┐ ┌────────────┐   │
//! │  │ StateStore │ │ Manifests  │ │  Rollback  │   │
//! │  └────────────┘ └────────────┘ └────────────┘   │
//! └─────────────────┬───────────────────────────────┘
//!                   │  NetworkApi / ObjectStoreApi /
//!                   │  RegistryApi / ClusterApi
//!           ┌───────▼───────┐
//!           │ stratus-cloud │
//!           │      -aws     │
//!           └───────────────┘
//! ```

pub mod dependency;
pub mod error;
pub mod kind;
pub mod kinds;
pub mod ledger;
pub mod manifest;
pub mod operator;
pub mod provider;
pub mod provisioner;
pub mod rollback;
pub mod state;
pub mod wait;

// Re-exports
pub use dependency::{DependencyResolver, ResolvedDependencies};
pub use error::{CloudError, ProvisionFailure, Result};
pub use kind::ResourceKind;
pub use kinds::{ClusterPolicy, ImageRegistryPolicy, NetworkPolicy, ObjectStorePolicy, policy_for};
pub use ledger::{CreationLedger, LedgerEntry, ObjectType};
pub use manifest::{ExportManifest, ManifestStore};
pub use operator::{AssumeAnswer, Confirm, Interrupt};
pub use provider::{
    AuthStatus, CloudProvider, ClusterApi, ClusterInfo, ClusterSpec, NatGatewayInfo, NetworkApi,
    NodeGroupInfo, NodeGroupSpec, ObjectStoreApi, RegistryApi, RemoteStatus, RepositoryInfo,
    RoleInfo, RolePurpose, RouteTableInfo, RouteTarget, Scaling, SubnetInfo, VpcInfo,
};
pub use provisioner::{
    ExistingObject, Phase, Provisioner, ResourcePolicy, RunContext, RunOutcome, RunReport,
};
pub use rollback::{RollbackCoordinator, RollbackGuard, RollbackReport, Teardown, TeardownFailure};
pub use state::{CloudState, ResourceSection, StateLock, StateStore};
pub use wait::{WaitSpec, poll_until};
