//! Rollback of partially provisioned resources
//!
//! [`RollbackCoordinator::unwind`] walks a [`CreationLedger`] newest-first
//! and tears every entry down. Teardown is best-effort: a failing entry is
//! logged and the unwind moves on, so a rollback never gets stuck halfway.
//! The state section is persisted afterwards with whatever survived.

use crate::error::Result;
use crate::kind::ResourceKind;
use crate::ledger::{CreationLedger, LedgerEntry};
use crate::state::{ResourceSection, StateStore};
use async_trait::async_trait;
use std::fmt;

/// Kind-specific teardown of a single ledger entry
#[async_trait]
pub trait Teardown: Send + Sync {
    async fn teardown(&self, entry: &LedgerEntry) -> Result<()>;
}

/// A teardown action that itself failed
#[derive(Debug, Clone)]
pub struct TeardownFailure {
    pub entry: LedgerEntry,
    pub error: String,
}

/// Outcome of one unwind
#[derive(Debug, Clone)]
pub struct RollbackReport {
    pub kind: ResourceKind,
    /// Entries removed, in the order they were torn down
    pub removed: Vec<LedgerEntry>,
    pub failures: Vec<TeardownFailure>,
    /// Whether the post-rollback section reached the state document
    pub state_saved: bool,
}

impl RollbackReport {
    fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            removed: Vec::new(),
            failures: Vec::new(),
            state_saved: false,
        }
    }

    pub fn attempted(&self) -> usize {
        self.removed.len() + self.failures.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for RollbackReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.attempted() == 0 {
            write!(f, "rollback had nothing to remove")?;
        } else {
            write!(
                f,
                "rollback removed {} of {} created objects",
                self.removed.len(),
                self.attempted()
            )?;
        }
        if !self.failures.is_empty() {
            let left: Vec<String> = self.failures.iter().map(|x| x.entry.to_string()).collect();
            write!(
                f,
                " (left behind: {}; reconcile manually)",
                left.join(", ")
            )?;
        }
        if !self.state_saved {
            write!(f, "; state document was NOT updated")?;
        }
        Ok(())
    }
}

/// Drains a ledger through a kind's [`Teardown`]
#[derive(Debug, Clone)]
pub struct RollbackCoordinator {
    store: StateStore,
}

impl RollbackCoordinator {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    /// Tear down every ledger entry newest-first, then persist `section`.
    ///
    /// Identifiers of objects that were removed are dropped from `section`;
    /// those whose teardown failed stay so the document reflects reality.
    pub async fn unwind(
        &self,
        ledger: CreationLedger,
        teardown: &(impl Teardown + ?Sized),
        section: &mut ResourceSection,
    ) -> RollbackReport {
        let kind = ledger.kind();
        let mut report = RollbackReport::new(kind);
        tracing::warn!("{}: rolling back {} created objects", kind, ledger.len());

        for entry in ledger.into_reverse() {
            match teardown.teardown(&entry).await {
                Ok(()) => {
                    tracing::info!("{}: removed {}", kind, entry);
                    section.remove_value(&entry.section_key, &entry.id);
                    report.removed.push(entry);
                }
                Err(e) => {
                    tracing::warn!("{}: failed to remove {}: {}", kind, entry, e);
                    report.failures.push(TeardownFailure {
                        entry,
                        error: e.to_string(),
                    });
                }
            }
        }

        section.set("status", "rolled_back");
        match self.store.merge_and_save(kind, section.clone()).await {
            Ok(_) => report.state_saved = true,
            Err(e) => tracing::error!("{}: could not persist post-rollback state: {}", kind, e),
        }

        if !report.is_complete() {
            tracing::warn!(
                "{}: rollback partially failed, {} object(s) need manual cleanup",
                kind,
                report.failures.len()
            );
        }
        report
    }
}

/// Scoped ownership of a run's ledger.
///
/// Armed when cloud mutation begins. A successful run calls
/// [`RollbackGuard::disarm`]; an error branch hands it to
/// [`RollbackGuard::unwind`]. Dropping an armed guard with entries (a panic,
/// or a cancelled future) cannot run async teardown, so it reports every
/// orphaned object instead.
pub struct RollbackGuard {
    ledger: CreationLedger,
    armed: bool,
}

impl RollbackGuard {
    pub fn arm(kind: ResourceKind) -> Self {
        Self {
            ledger: CreationLedger::new(kind),
            armed: true,
        }
    }

    pub fn ledger(&self) -> &CreationLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut CreationLedger {
        &mut self.ledger
    }

    /// The run succeeded; forget the ledger
    pub fn disarm(mut self) {
        self.armed = false;
    }

    pub async fn unwind(
        mut self,
        coordinator: &RollbackCoordinator,
        teardown: &(impl Teardown + ?Sized),
        section: &mut ResourceSection,
    ) -> RollbackReport {
        self.armed = false;
        let kind = self.ledger.kind();
        let ledger = std::mem::replace(&mut self.ledger, CreationLedger::new(kind));
        coordinator.unwind(ledger, teardown, section).await
    }
}

impl Drop for RollbackGuard {
    fn drop(&mut self) {
        if self.armed && !self.ledger.is_empty() {
            tracing::error!(
                "{}: run aborted without rollback; {} object(s) were left behind",
                self.ledger.kind(),
                self.ledger.len()
            );
            for entry in self.ledger.entries() {
                tracing::error!("  orphaned: {}", entry);
            }
        }
    }
}
