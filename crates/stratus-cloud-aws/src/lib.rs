//! AWS provider for Stratus
//!
//! Implements the provider APIs of `stratus-cloud` (network, object store,
//! image registry, managed cluster) for AWS.
//!
//! # Requirements
//!
//! - `aws` CLI v2 must be installed
//! - Credentials come from the usual AWS chain or the configured profile
//!
//! # Example
//!
//! ```ignore
//! use stratus_cloud::CloudProvider;
//! use stratus_cloud_aws::AwsProvider;
//!
//! let provider = AwsProvider::new("us-east-1", None);
//!
//! let auth = provider.check_auth().await?;
//! if !auth.authenticated {
//!     panic!("Not authenticated: {:?}", auth.error);
//! }
//! ```

pub mod cli;
pub mod error;
mod cluster;
mod network;
mod provider;
mod registry;
mod storage;

pub use cli::AwsCli;
pub use error::{AwsError, Result};
pub use provider::{AwsProvider, CallerIdentity};
