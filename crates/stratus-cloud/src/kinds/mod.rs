//! Resource kind policies
//!
//! One [`ResourcePolicy`](crate::provisioner::ResourcePolicy) per kind.
//! Each policy holds the resolved configuration and the provider API for
//! its kind; the engine in [`crate::provisioner`] does the rest.

mod cluster;
mod image_registry;
mod network;
mod object_store;

pub use cluster::ClusterPolicy;
pub use image_registry::ImageRegistryPolicy;
pub use network::NetworkPolicy;
pub use object_store::ObjectStorePolicy;

use crate::error::{CloudError, Result};
use crate::kind::ResourceKind;
use crate::provider::{ClusterApi, CloudProvider, NetworkApi, ObjectStoreApi, RegistryApi};
use crate::provisioner::{ResourcePolicy, RunContext};
use crate::state::ResourceSection;
use crate::wait::{WaitSpec, poll_until};
use std::sync::Arc;
use std::time::Duration;
use stratus_config::ResolvedConfiguration;

/// Build the policy for `kind` on top of a provider implementing every API
pub fn policy_for<P>(
    kind: ResourceKind,
    config: Arc<ResolvedConfiguration>,
    provider: Arc<P>,
) -> Box<dyn ResourcePolicy>
where
    P: NetworkApi + ObjectStoreApi + RegistryApi + ClusterApi + 'static,
{
    match kind {
        ResourceKind::Network => Box::new(NetworkPolicy::new(config, provider)),
        ResourceKind::ObjectStore => Box::new(ObjectStorePolicy::new(config, provider)),
        ResourceKind::ImageRegistry => Box::new(ImageRegistryPolicy::new(config, provider)),
        ResourceKind::Cluster => Box::new(ClusterPolicy::new(config, provider)),
    }
}

/// Fail with `Prerequisite` unless the provider accepts our credentials
async fn require_auth<P>(provider: &P) -> Result<()>
where
    P: CloudProvider + ?Sized,
{
    let status = provider.check_auth().await?;
    if status.authenticated {
        if let Some(account) = &status.account_info {
            tracing::debug!("Authenticated with {} as {}", provider.name(), account);
        }
        Ok(())
    } else {
        Err(CloudError::prerequisite(format!(
            "{} credentials are not usable: {}",
            provider.name(),
            status.error.as_deref().unwrap_or("unknown error")
        )))
    }
}

/// Identifier a previous phase must have recorded
fn recorded<'a>(section: &'a ResourceSection, key: &str) -> Result<&'a str> {
    section
        .get_str(key)
        .ok_or_else(|| CloudError::StateError(format!("section has no '{}' recorded", key)))
}

/// Poll with the configured interval and the given bound
async fn wait_for<F, Fut>(
    config: &ResolvedConfiguration,
    ctx: &RunContext,
    resource: String,
    timeout: Duration,
    check: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<crate::provider::RemoteStatus>>,
{
    tracing::info!("Waiting for {} (up to {}s)", resource, timeout.as_secs());
    let spec = WaitSpec::new(resource, config.timeouts.poll_interval(), timeout);
    poll_until(&spec, &ctx.interrupt, check).await
}
