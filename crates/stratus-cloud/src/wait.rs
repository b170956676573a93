//! Bounded status polling

use crate::error::{CloudError, Result};
use crate::operator::Interrupt;
use crate::provider::RemoteStatus;
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep};

/// What to wait for and for how long
#[derive(Debug, Clone)]
pub struct WaitSpec {
    pub resource: String,
    pub interval: Duration,
    pub timeout: Duration,
}

impl WaitSpec {
    pub fn new(resource: impl Into<String>, interval: Duration, timeout: Duration) -> Self {
        Self {
            resource: resource.into(),
            interval,
            timeout,
        }
    }
}

/// Poll `check` at a fixed interval until it reports [`RemoteStatus::Ready`].
///
/// - `Failed` ends the wait immediately with `ProviderFailureState`.
/// - Errors from `check` are treated as transient and polling continues.
/// - Running past `spec.timeout` yields `Timeout`.
/// - The interrupt flag is checked between polls.
pub async fn poll_until<F, Fut>(spec: &WaitSpec, interrupt: &Interrupt, mut check: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<RemoteStatus>>,
{
    let started = Instant::now();
    let deadline = started + spec.timeout;
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        match check().await {
            Ok(RemoteStatus::Ready) => {
                tracing::debug!(
                    "{} ready after {} poll(s)",
                    spec.resource,
                    attempt
                );
                return Ok(());
            }
            Ok(RemoteStatus::Pending(state)) => {
                tracing::debug!("{} is {} (poll {})", spec.resource, state, attempt);
            }
            Ok(RemoteStatus::Failed(reason)) => {
                return Err(CloudError::ProviderFailureState {
                    resource: spec.resource.clone(),
                    reason,
                });
            }
            Err(e) => {
                tracing::warn!("Polling {} failed, will retry: {}", spec.resource, e);
            }
        }

        if Instant::now() + spec.interval > deadline {
            return Err(CloudError::Timeout {
                resource: spec.resource.clone(),
                waited: started.elapsed(),
            });
        }
        if interrupt.is_triggered() {
            return Err(CloudError::Interrupted);
        }
        sleep(spec.interval).await;
    }
}
