//! Provisioning error types

use crate::kind::ResourceKind;
use crate::provisioner::Phase;
use crate::rollback::RollbackReport;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by provisioning steps, stores and providers
#[derive(Error, Debug)]
pub enum CloudError {
    /// Missing configuration or unusable credentials/tooling. Raised before
    /// any cloud mutation.
    #[error("prerequisite not met: {0}")]
    Prerequisite(String),

    /// A same-named resource exists and the operator declined to adopt it
    #[error("{kind} resource '{name}' already exists and adoption was declined; rename or delete it")]
    Conflict { kind: ResourceKind, name: String },

    /// An upstream export manifest is absent or incomplete
    #[error("missing dependency '{kind}': {detail}")]
    MissingDependency { kind: ResourceKind, detail: String },

    #[error("provider API error in {operation}: {message}")]
    Api { operation: String, message: String },

    #[error("timed out after {}s waiting for {resource}", .waited.as_secs())]
    Timeout { resource: String, waited: Duration },

    /// The provider reported the resource as failed, not merely slow
    #[error("{resource} reported failure state: {reason}")]
    ProviderFailureState { resource: String, reason: String },

    #[error("interrupted by operator")]
    Interrupted,

    #[error("export manifest error: {0}")]
    Manifest(String),

    #[error("State file error: {0}")]
    StateError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    pub fn api(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn prerequisite(message: impl Into<String>) -> Self {
        Self::Prerequisite(message.into())
    }

    pub fn missing_dependency(kind: ResourceKind, detail: impl Into<String>) -> Self {
        Self::MissingDependency {
            kind,
            detail: detail.into(),
        }
    }

    /// Whether re-running without changing configuration or cloud state can
    /// possibly succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            CloudError::Prerequisite(_)
                | CloudError::Conflict { .. }
                | CloudError::MissingDependency { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;

/// Fatal outcome of one provisioner run
///
/// Carries the resource kind, the phase that failed and, when the failure
/// happened after cloud mutation started, the rollback report.
#[derive(Debug)]
pub struct ProvisionFailure {
    pub kind: ResourceKind,
    pub phase: Phase,
    pub error: CloudError,
    pub rollback: Option<RollbackReport>,
}

impl ProvisionFailure {
    pub fn new(kind: ResourceKind, phase: Phase, error: CloudError) -> Self {
        Self {
            kind,
            phase,
            error,
            rollback: None,
        }
    }

    pub fn with_rollback(mut self, report: RollbackReport) -> Self {
        self.rollback = Some(report);
        self
    }

    /// Teardown actions that failed during rollback, if any
    pub fn needs_manual_cleanup(&self) -> bool {
        self.rollback
            .as_ref()
            .is_some_and(|r| !r.failures.is_empty() || !r.state_saved)
    }
}

impl fmt::Display for ProvisionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} provisioning failed during {}: {}",
            self.kind, self.phase, self.error
        )?;
        match &self.rollback {
            Some(report) => write!(f, "; {}", report),
            None => write!(f, "; nothing was created, no rollback needed"),
        }
    }
}

impl std::error::Error for ProvisionFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
