use crate::confirm::TerminalConfirm;
use colored::Colorize;
use std::sync::Arc;
use stratus_cloud::{
    Interrupt, ProvisionFailure, Provisioner, ResourceKind, RunOutcome, RunReport, StateStore,
    policy_for,
};
use stratus_cloud_aws::AwsProvider;
use stratus_config::ResolvedConfiguration;

pub async fn handle(
    config: ResolvedConfiguration,
    kinds: Vec<ResourceKind>,
    yes: bool,
) -> anyhow::Result<()> {
    let config = Arc::new(config);
    let store = StateStore::from_config(&config);

    println!(
        "{}",
        format!(
            "Provisioning {}/{} in {}",
            config.project, config.environment, config.region
        )
        .cyan()
        .bold()
    );
    let order: Vec<String> = kinds.iter().map(|k| k.to_string()).collect();
    println!("Order: {}", order.join(" -> ").cyan());

    let lock = if config.state.lock {
        Some(store.acquire_lock().await?)
    } else {
        None
    };

    // Ctrl-C is only observed between steps; the run then rolls back
    let interrupt = Interrupt::new();
    let listener = {
        let interrupt = interrupt.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!(
                    "{}",
                    "Interrupt received, stopping after the current step...".yellow()
                );
                interrupt.trigger();
            }
        })
    };

    let provider = Arc::new(AwsProvider::from_config(&config));
    let provisioner = Provisioner::new(store, Arc::new(TerminalConfirm::new(yes)))
        .with_interrupt(interrupt);

    let mut declined: Vec<ResourceKind> = Vec::new();
    let mut result = Ok(());
    for kind in kinds {
        let skipped_upstream = kind
            .dependencies()
            .iter()
            .copied()
            .find(|d| declined.contains(d));
        if let Some(upstream) = skipped_upstream {
            println!();
            println!(
                "{}",
                format!("ℹ Skipping {}: {} was not provisioned", kind, upstream).dimmed()
            );
            declined.push(kind);
            continue;
        }

        println!();
        println!("{}", format!("▶ {}", kind).cyan().bold());
        let policy = policy_for(kind, config.clone(), provider.clone());
        match provisioner.run(policy.as_ref()).await {
            Ok(RunOutcome::Provisioned(report)) => print_report(&report),
            Ok(RunOutcome::Declined { kind }) => {
                println!(
                    "{}",
                    format!("ℹ {} declined, nothing was changed", kind).dimmed()
                );
                declined.push(kind);
            }
            Err(failure) => {
                print_failure(&failure);
                result = Err(failure);
                break;
            }
        }
    }

    listener.abort();
    if let Some(lock) = lock {
        lock.release().await?;
    }

    result?;
    println!();
    println!("{}", "✓ Done".green().bold());
    Ok(())
}

fn print_report(report: &RunReport) {
    println!(
        "{}",
        format!(
            "✓ {} provisioned ({} adopted, {} created)",
            report.kind,
            report.adopted.len(),
            report.created
        )
        .green()
        .bold()
    );
    for name in &report.adopted {
        println!("  {} {}", "adopted".dimmed(), name);
    }
    println!(
        "  {} {}",
        "exports:".dimmed(),
        report.manifest_path.display()
    );
    for key in report.exports.keys() {
        if let Some(value) = report.exports.get(key) {
            println!("    {}={}", key, value);
        }
    }
}

fn print_failure(failure: &ProvisionFailure) {
    eprintln!();
    eprintln!(
        "{}",
        format!(
            "✗ {} failed during {}: {}",
            failure.kind, failure.phase, failure.error
        )
        .red()
        .bold()
    );

    if let Some(hint) = retry_hint(failure) {
        eprintln!("  {}", hint.dimmed());
    }

    let Some(report) = &failure.rollback else {
        eprintln!("  {}", "Nothing was created, no rollback needed".dimmed());
        return;
    };
    for entry in &report.removed {
        eprintln!("  {} {}", "removed".yellow(), entry);
    }
    for leftover in &report.failures {
        eprintln!(
            "  {} {}: {}",
            "left behind".red(),
            leftover.entry,
            leftover.error
        );
    }
    if !report.state_saved {
        eprintln!("  {}", "state document was NOT updated".red());
    }
    if failure.needs_manual_cleanup() {
        eprintln!(
            "{}",
            "Some resources could not be removed; clean them up manually.".yellow()
        );
    }
}

/// Tell the operator whether running the same command again can help
fn retry_hint(failure: &ProvisionFailure) -> Option<&'static str> {
    if failure.needs_manual_cleanup() {
        return None;
    }
    if failure.error.is_retryable() {
        Some("The error may be transient; re-running the same command is safe.")
    } else {
        Some("Re-running will fail the same way until the problem above is fixed.")
    }
}
