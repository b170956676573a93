//! Stratus configuration
//!
//! Produces the immutable [`ResolvedConfiguration`] every provisioner is
//! constructed with. Values are layered: built-in defaults, then the YAML
//! config file, then `STRATUS_*` / `AWS_*` environment variables.

pub mod error;
pub mod model;
pub mod resolver;

pub use error::{ConfigError, Result};
pub use model::{
    ClusterConfig, Encryption, NetworkConfig, ObjectStoreConfig, RegistryConfig,
    ResolvedConfiguration, StateConfig, TimeoutConfig,
};
pub use resolver::{ConfigResolver, find_config_file};
