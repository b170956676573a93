//! Provisioning workflow engine
//!
//! One [`Provisioner`] drives any [`ResourcePolicy`] through the same state
//! machine:
//!
//! ```text
//! CHECK_PREREQUISITES -> CHECK_EXISTING -> { ADOPT_EXISTING | CREATE } -> CONFIGURE
//!     -> VERIFY -> PUBLISH_EXPORTS -> DONE
//! any mutation phase -> (error) -> ROLLBACK -> FAILED
//! ```
//!
//! Failures before cloud mutation starts leave no trace. From
//! ADOPT_EXISTING onwards every error is routed through the
//! [`RollbackCoordinator`], which persists what survived.

use crate::dependency::{DependencyResolver, ResolvedDependencies};
use crate::error::{CloudError, ProvisionFailure, Result};
use crate::kind::ResourceKind;
use crate::ledger::{CreationLedger, ObjectType};
use crate::manifest::{ExportManifest, ManifestStore};
use crate::operator::{Confirm, Interrupt};
use crate::rollback::{RollbackCoordinator, RollbackGuard, Teardown};
use crate::state::{ResourceSection, StateStore};
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Steps of one provisioning run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    CheckPrerequisites,
    CheckExisting,
    AdoptExisting,
    Create,
    Configure,
    Verify,
    PublishExports,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::CheckPrerequisites => "check-prerequisites",
            Phase::CheckExisting => "check-existing",
            Phase::AdoptExisting => "adopt-existing",
            Phase::Create => "create",
            Phase::Configure => "configure",
            Phase::Verify => "verify",
            Phase::PublishExports => "publish-exports",
        };
        f.write_str(name)
    }
}

/// A pre-existing cloud object carrying one of this run's deterministic names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingObject {
    pub object: ObjectType,
    pub name: String,
    pub id: String,
}

impl ExistingObject {
    pub fn new(object: ObjectType, name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            object,
            name: name.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for ExistingObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.id == self.name {
            write!(f, "{} {}", self.object, self.name)
        } else {
            write!(f, "{} {} ({})", self.object, self.name, self.id)
        }
    }
}

/// Per-run inputs shared with every policy step
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    pub dependencies: ResolvedDependencies,
    pub interrupt: Interrupt,
}

impl RunContext {
    pub fn new(dependencies: ResolvedDependencies, interrupt: Interrupt) -> Self {
        Self {
            dependencies,
            interrupt,
        }
    }

    /// Fail with `Interrupted` if the operator asked to stop
    pub fn checkpoint(&self) -> Result<()> {
        if self.interrupt.is_triggered() {
            Err(CloudError::Interrupted)
        } else {
            Ok(())
        }
    }
}

/// What a resource kind contributes to the workflow.
///
/// Policies own the kind's object graph: naming, creation order, the
/// declarative settings to reassert, what "ready" means and what to export.
/// The engine owns sequencing, operator prompts, persistence and rollback.
#[async_trait]
pub trait ResourcePolicy: Teardown {
    fn kind(&self) -> ResourceKind;

    /// Warning shown before a run that incurs ongoing cost; `None` skips the gate
    fn cost_notice(&self) -> Option<String> {
        None
    }

    /// Configuration consistency, upstream identifiers and credentials.
    /// Must not mutate anything.
    async fn check_prerequisites(&self, ctx: &RunContext) -> Result<()>;

    /// Objects that already carry this run's deterministic names
    async fn find_existing(&self) -> Result<Vec<ExistingObject>>;

    /// Read the remote attributes of `existing` into `section`
    async fn adopt(
        &self,
        existing: &[ExistingObject],
        section: &mut ResourceSection,
        ctx: &RunContext,
    ) -> Result<()>;

    /// Create every object not already present in `section`, recording each
    /// one in `ledger` as soon as the provider returns its identifier
    async fn create(
        &self,
        section: &mut ResourceSection,
        ledger: &mut CreationLedger,
        ctx: &RunContext,
    ) -> Result<()>;

    /// Reassert every declarative setting, recording what was applied
    async fn configure(&self, section: &mut ResourceSection, ctx: &RunContext) -> Result<()>;

    /// Wait until everything reports ready
    async fn verify(&self, section: &ResourceSection, ctx: &RunContext) -> Result<()>;

    fn exports(&self, section: &ResourceSection) -> Result<ExportManifest>;
}

/// Summary of a successful run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub kind: ResourceKind,
    /// Objects taken over instead of created
    pub adopted: Vec<String>,
    /// Number of objects created by this run
    pub created: usize,
    pub exports: ExportManifest,
    pub manifest_path: PathBuf,
}

/// How a run ended when it did not fail
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Provisioned(RunReport),
    /// The operator declined the cost confirmation; nothing was touched
    Declined { kind: ResourceKind },
}

impl RunOutcome {
    pub fn kind(&self) -> ResourceKind {
        match self {
            RunOutcome::Provisioned(report) => report.kind,
            RunOutcome::Declined { kind } => *kind,
        }
    }
}

/// Drives resource policies through the provisioning state machine
pub struct Provisioner {
    store: StateStore,
    manifests: ManifestStore,
    dependencies: DependencyResolver,
    rollback: RollbackCoordinator,
    confirm: Arc<dyn Confirm>,
    interrupt: Interrupt,
}

impl Provisioner {
    pub fn new(store: StateStore, confirm: Arc<dyn Confirm>) -> Self {
        let manifests = ManifestStore::for_store(&store);
        Self {
            dependencies: DependencyResolver::new(manifests.clone()),
            rollback: RollbackCoordinator::new(store.clone()),
            manifests,
            store,
            confirm,
            interrupt: Interrupt::new(),
        }
    }

    /// Share an interrupt flag with a signal listener
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn manifests(&self) -> &ManifestStore {
        &self.manifests
    }

    pub async fn run(
        &self,
        policy: &dyn ResourcePolicy,
    ) -> std::result::Result<RunOutcome, ProvisionFailure> {
        let kind = policy.kind();
        let fail = |phase: Phase, error: CloudError| {
            tracing::error!("{}: {} failed: {}", kind, phase, error);
            ProvisionFailure::new(kind, phase, error)
        };

        // ========== Check prerequisites ==========
        self.enter(kind, Phase::CheckPrerequisites)
            .map_err(|e| fail(Phase::CheckPrerequisites, e))?;
        let dependencies = self
            .dependencies
            .resolve(kind)
            .await
            .map_err(|e| fail(Phase::CheckPrerequisites, e))?;
        let ctx = RunContext::new(dependencies, self.interrupt.clone());
        policy
            .check_prerequisites(&ctx)
            .await
            .map_err(|e| fail(Phase::CheckPrerequisites, e))?;

        if let Some(notice) = policy.cost_notice() {
            let prompt = format!("{}\nProvision {} now?", notice, kind);
            if !self.confirm.confirm(&prompt) {
                tracing::info!("{}: declined by operator, nothing was changed", kind);
                return Ok(RunOutcome::Declined { kind });
            }
        }

        // ========== Check existing ==========
        self.enter(kind, Phase::CheckExisting)
            .map_err(|e| fail(Phase::CheckExisting, e))?;
        let existing = policy
            .find_existing()
            .await
            .map_err(|e| fail(Phase::CheckExisting, e))?;
        if let Some(first) = existing.first() {
            let listing: Vec<String> = existing.iter().map(|o| format!("  {}", o)).collect();
            let prompt = format!(
                "Found existing {} resources:\n{}\nAdopt them instead of creating new ones?",
                kind,
                listing.join("\n")
            );
            if !self.confirm.confirm(&prompt) {
                return Err(fail(
                    Phase::CheckExisting,
                    CloudError::Conflict {
                        kind,
                        name: first.name.clone(),
                    },
                ));
            }
        }

        // ========== Mutation ==========
        let mut guard = RollbackGuard::arm(kind);
        let mut section = ResourceSection::new();
        let exports = match self
            .mutate(policy, &ctx, &existing, guard.ledger_mut(), &mut section)
            .await
        {
            Ok(exports) => exports,
            Err((phase, error)) => {
                tracing::error!("{}: {} failed: {}", kind, phase, error);
                let report = guard.unwind(&self.rollback, policy, &mut section).await;
                return Err(ProvisionFailure::new(kind, phase, error).with_rollback(report));
            }
        };
        let created = guard.ledger().len();

        // ========== Publish exports ==========
        let manifest_path = match self.publish(kind, &exports, &mut section).await {
            Ok(path) => path,
            Err(error) => {
                tracing::error!("{}: {} failed: {}", kind, Phase::PublishExports, error);
                let report = guard.unwind(&self.rollback, policy, &mut section).await;
                return Err(ProvisionFailure::new(kind, Phase::PublishExports, error)
                    .with_rollback(report));
            }
        };
        guard.disarm();

        tracing::info!(
            "{}: provisioned ({} adopted, {} created)",
            kind,
            existing.len(),
            created
        );
        Ok(RunOutcome::Provisioned(RunReport {
            kind,
            adopted: existing.iter().map(|o| o.name.clone()).collect(),
            created,
            exports,
            manifest_path,
        }))
    }

    async fn mutate(
        &self,
        policy: &dyn ResourcePolicy,
        ctx: &RunContext,
        existing: &[ExistingObject],
        ledger: &mut CreationLedger,
        section: &mut ResourceSection,
    ) -> std::result::Result<ExportManifest, (Phase, CloudError)> {
        let kind = policy.kind();
        let at = |phase: Phase| move |e: CloudError| (phase, e);

        if !existing.is_empty() {
            self.enter(kind, Phase::AdoptExisting)
                .map_err(at(Phase::AdoptExisting))?;
            policy
                .adopt(existing, section, ctx)
                .await
                .map_err(at(Phase::AdoptExisting))?;
        }

        self.enter(kind, Phase::Create).map_err(at(Phase::Create))?;
        policy
            .create(section, ledger, ctx)
            .await
            .map_err(at(Phase::Create))?;

        self.enter(kind, Phase::Configure)
            .map_err(at(Phase::Configure))?;
        policy
            .configure(section, ctx)
            .await
            .map_err(at(Phase::Configure))?;

        self.enter(kind, Phase::Verify).map_err(at(Phase::Verify))?;
        policy
            .verify(section, ctx)
            .await
            .map_err(at(Phase::Verify))?;

        self.enter(kind, Phase::PublishExports)
            .map_err(at(Phase::PublishExports))?;
        policy.exports(section).map_err(at(Phase::PublishExports))
    }

    /// Write the manifest, then the section. A manifest whose section could
    /// not be saved is withdrawn again so no downstream kind consumes it.
    async fn publish(
        &self,
        kind: ResourceKind,
        exports: &ExportManifest,
        section: &mut ResourceSection,
    ) -> Result<PathBuf> {
        let path = self.manifests.write(exports).await?;

        let mut published = section.clone();
        published.set("status", "provisioned");
        if let Err(e) = self.store.merge_and_save(kind, published).await {
            if let Err(remove) = self.manifests.remove(kind).await {
                tracing::warn!("{}: could not withdraw {}: {}", kind, path.display(), remove);
            }
            return Err(e);
        }

        section.set("status", "provisioned");
        Ok(path)
    }

    fn enter(&self, kind: ResourceKind, phase: Phase) -> Result<()> {
        if self.interrupt.is_triggered() {
            return Err(CloudError::Interrupted);
        }
        tracing::info!("{}: {}", kind, phase);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerEntry;
    use crate::operator::AssumeAnswer;
    use std::sync::Mutex;

    /// Two-object policy with switchable failure points
    #[derive(Default)]
    struct StubPolicy {
        existing: Vec<ExistingObject>,
        costly: bool,
        fail_verify: bool,
        calls: Mutex<Vec<String>>,
    }

    impl StubPolicy {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn log(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }
    }

    #[async_trait]
    impl Teardown for StubPolicy {
        async fn teardown(&self, entry: &LedgerEntry) -> Result<()> {
            self.log(format!("teardown {}", entry.id));
            Ok(())
        }
    }

    #[async_trait]
    impl ResourcePolicy for StubPolicy {
        fn kind(&self) -> ResourceKind {
            ResourceKind::ImageRegistry
        }

        fn cost_notice(&self) -> Option<String> {
            self.costly.then(|| "This costs money.".to_string())
        }

        async fn check_prerequisites(&self, _ctx: &RunContext) -> Result<()> {
            self.log("check");
            Ok(())
        }

        async fn find_existing(&self) -> Result<Vec<ExistingObject>> {
            self.log("find");
            Ok(self.existing.clone())
        }

        async fn adopt(
            &self,
            existing: &[ExistingObject],
            section: &mut ResourceSection,
            _ctx: &RunContext,
        ) -> Result<()> {
            for object in existing {
                section.push("repository_names", &object.name);
            }
            Ok(())
        }

        async fn create(
            &self,
            section: &mut ResourceSection,
            ledger: &mut CreationLedger,
            _ctx: &RunContext,
        ) -> Result<()> {
            for name in ["repo-a", "repo-b"] {
                if section.get_list("repository_names").iter().any(|n| n == name) {
                    continue;
                }
                self.log(format!("create {}", name));
                section.push("repository_names", name);
                ledger.record(LedgerEntry::new(
                    ObjectType::Repository,
                    name,
                    name,
                    "repository_names",
                ));
            }
            Ok(())
        }

        async fn configure(
            &self,
            _section: &mut ResourceSection,
            _ctx: &RunContext,
        ) -> Result<()> {
            self.log("configure");
            Ok(())
        }

        async fn verify(&self, _section: &ResourceSection, _ctx: &RunContext) -> Result<()> {
            if self.fail_verify {
                return Err(CloudError::ProviderFailureState {
                    resource: "repository repo-b".into(),
                    reason: "FAILED".into(),
                });
            }
            Ok(())
        }

        fn exports(&self, section: &ResourceSection) -> Result<ExportManifest> {
            let mut manifest = ExportManifest::new(ResourceKind::ImageRegistry);
            manifest.set_list("REPOSITORY_NAMES", section.get_list("repository_names"))?;
            Ok(manifest)
        }
    }

    fn provisioner(answer: bool) -> (tempfile::TempDir, Provisioner) {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path(), "shop", "dev", "us-east-1");
        (dir, Provisioner::new(store, Arc::new(AssumeAnswer(answer))))
    }

    #[tokio::test]
    async fn test_successful_run_publishes_and_persists() {
        let (_dir, provisioner) = provisioner(true);
        let policy = StubPolicy::default();

        let outcome = provisioner.run(&policy).await.unwrap();
        let RunOutcome::Provisioned(report) = outcome else {
            panic!("expected a provisioned outcome");
        };
        assert_eq!(report.created, 2);
        assert!(report.manifest_path.exists());

        let state = provisioner.store().load().await.unwrap();
        assert_eq!(state.image_registry.get_str("status"), Some("provisioned"));
        assert_eq!(
            state.image_registry.get_list("repository_names"),
            vec!["repo-a", "repo-b"]
        );
    }

    #[tokio::test]
    async fn test_declined_cost_gate_touches_nothing() {
        let (_dir, provisioner) = provisioner(false);
        let policy = StubPolicy {
            costly: true,
            ..Default::default()
        };

        let outcome = provisioner.run(&policy).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Declined { .. }));
        assert_eq!(policy.calls(), vec!["check"]);
        assert!(!provisioner.store().state_path().exists());
    }

    #[tokio::test]
    async fn test_adopted_objects_are_not_recreated() {
        let (_dir, provisioner) = provisioner(true);
        let policy = StubPolicy {
            existing: vec![ExistingObject::new(ObjectType::Repository, "repo-a", "repo-a")],
            ..Default::default()
        };

        let RunOutcome::Provisioned(report) = provisioner.run(&policy).await.unwrap() else {
            panic!("expected a provisioned outcome");
        };
        assert_eq!(report.adopted, vec!["repo-a"]);
        assert_eq!(report.created, 1);
        assert!(!policy.calls().contains(&"create repo-a".to_string()));
    }

    #[tokio::test]
    async fn test_declined_adoption_is_conflict_without_rollback() {
        let (_dir, provisioner) = provisioner(false);
        let policy = StubPolicy {
            existing: vec![ExistingObject::new(ObjectType::Repository, "repo-a", "repo-a")],
            ..Default::default()
        };

        let failure = provisioner.run(&policy).await.unwrap_err();
        assert_eq!(failure.phase, Phase::CheckExisting);
        assert!(matches!(failure.error, CloudError::Conflict { .. }));
        assert!(failure.rollback.is_none());
        assert_eq!(policy.calls(), vec!["check", "find"]);
    }

    #[tokio::test]
    async fn test_verify_failure_rolls_back_in_reverse() {
        let (_dir, provisioner) = provisioner(true);
        let policy = StubPolicy {
            fail_verify: true,
            ..Default::default()
        };

        let failure = provisioner.run(&policy).await.unwrap_err();
        assert_eq!(failure.phase, Phase::Verify);
        let report = failure.rollback.as_ref().unwrap();
        assert!(report.is_complete());

        let calls = policy.calls();
        let teardowns: Vec<&String> = calls.iter().filter(|c| c.starts_with("teardown")).collect();
        assert_eq!(teardowns, vec!["teardown repo-b", "teardown repo-a"]);

        let state = provisioner.store().load().await.unwrap();
        assert_eq!(state.image_registry.get_str("status"), Some("rolled_back"));
        assert!(!state.image_registry.contains_key("repository_names"));
        assert!(!provisioner.manifests().path(ResourceKind::ImageRegistry).exists());
    }

    #[tokio::test]
    async fn test_interrupt_before_start_is_reported() {
        let (_dir, provisioner) = provisioner(true);
        let interrupt = Interrupt::new();
        let provisioner = provisioner.with_interrupt(interrupt.clone());
        interrupt.trigger();

        let failure = provisioner.run(&StubPolicy::default()).await.unwrap_err();
        assert!(matches!(failure.error, CloudError::Interrupted));
        assert!(failure.rollback.is_none());
    }
}
