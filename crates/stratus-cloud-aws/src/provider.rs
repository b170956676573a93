//! AWS provider: identity check and shared helpers

use crate::cli::AwsCli;
use crate::error::AwsError;
use async_trait::async_trait;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use stratus_cloud::{AuthStatus, CloudError, CloudProvider, Result};
use stratus_config::ResolvedConfiguration;

/// Upper bound on polls while waiting for a deletion to settle
const MAX_SETTLE_POLLS: u32 = 180;

/// AWS provider
///
/// Implements every provider API of `stratus-cloud` on top of [`AwsCli`].
pub struct AwsProvider {
    pub(crate) cli: AwsCli,
    /// Pause between polls while a deletion settles
    pub(crate) settle_interval: Duration,
}

impl AwsProvider {
    pub fn new(region: impl Into<String>, profile: Option<String>) -> Self {
        Self {
            cli: AwsCli::new(region, profile),
            settle_interval: Duration::from_secs(5),
        }
    }

    pub fn from_config(config: &ResolvedConfiguration) -> Self {
        let mut provider = Self::new(&config.region, config.profile.clone());
        provider.settle_interval = config.timeouts.poll_interval();
        provider
    }

    pub fn region(&self) -> &str {
        self.cli.region()
    }

    /// Poll `gone` until it reports true, for deletions that later
    /// teardown steps depend on
    pub(crate) async fn wait_gone<F, Fut>(&self, resource: &str, mut gone: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        for attempt in 1..=MAX_SETTLE_POLLS {
            if gone().await? {
                tracing::debug!("{} gone after {} poll(s)", resource, attempt);
                return Ok(());
            }
            tokio::time::sleep(self.settle_interval).await;
        }
        Err(CloudError::Timeout {
            resource: resource.to_string(),
            waited: self.settle_interval * MAX_SETTLE_POLLS,
        })
    }
}

/// `sts get-caller-identity`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CallerIdentity {
    pub account: String,
    pub arn: String,
    pub user_id: Option<String>,
}

#[async_trait]
impl CloudProvider for AwsProvider {
    fn name(&self) -> &str {
        "aws"
    }

    async fn check_auth(&self) -> Result<AuthStatus> {
        if let Err(e) = self.cli.ensure_installed().await {
            return Ok(AuthStatus::failed(e.to_string()));
        }

        match self
            .cli
            .run_json::<CallerIdentity>(&["sts", "get-caller-identity"])
            .await
        {
            Ok(identity) => Ok(AuthStatus::ok(format!(
                "account {} ({})",
                identity.account, identity.arn
            ))),
            Err(AwsError::CommandFailed { message, .. }) => Ok(AuthStatus::failed(message)),
            Err(e) => Err(e.into()),
        }
    }
}
