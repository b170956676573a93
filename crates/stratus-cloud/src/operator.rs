//! Operator interaction points: confirmation prompts and interrupts

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Synchronous yes/no gate. Blocks until the operator answers.
pub trait Confirm: Send + Sync {
    fn confirm(&self, prompt: &str) -> bool;
}

/// Answers every prompt the same way (`--yes`, non-interactive runs)
#[derive(Debug, Clone, Copy)]
pub struct AssumeAnswer(pub bool);

impl Confirm for AssumeAnswer {
    fn confirm(&self, prompt: &str) -> bool {
        tracing::info!("{} -> {}", prompt, if self.0 { "yes" } else { "no" });
        self.0
    }
}

/// Interrupt flag shared between the signal listener and a running
/// provisioner. Observed only at step boundaries.
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_is_shared_between_clones() {
        let interrupt = Interrupt::new();
        let listener = interrupt.clone();
        assert!(!interrupt.is_triggered());

        listener.trigger();
        assert!(interrupt.is_triggered());
    }
}
