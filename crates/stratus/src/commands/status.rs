use colored::Colorize;
use serde_json::Value;
use stratus_cloud::{CloudState, ResourceKind, StateStore};
use stratus_config::ResolvedConfiguration;

pub async fn handle(config: &ResolvedConfiguration, json: bool) -> anyhow::Result<()> {
    let store = StateStore::from_config(config);
    let state = store.load().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&state)?);
        return Ok(());
    }

    print_state(&state);
    println!();
    println!(
        "{} {}",
        "State file:".dimmed(),
        store.state_path().display()
    );
    Ok(())
}

fn print_state(state: &CloudState) {
    println!(
        "{}",
        format!("{}/{} ({})", state.project, state.environment, state.region)
            .cyan()
            .bold()
    );
    match state.last_updated {
        Some(at) => println!("Last updated: {}", at.to_rfc3339()),
        None => println!("Last updated: {}", "never".dimmed()),
    }

    for kind in ResourceKind::ALL {
        let section = state.section(kind);
        println!();
        let status = match section.get_str("status") {
            Some("provisioned") => "provisioned".green(),
            Some("rolled_back") => "rolled back".yellow(),
            Some(other) => other.normal(),
            None if section.is_empty() => "not provisioned".dimmed(),
            None => "unknown".normal(),
        };
        println!("{} {}", format!("{}:", kind).bold(), status);

        for (key, value) in section.iter().filter(|(k, _)| k.as_str() != "status") {
            println!("  {:<28} {}", key, render_value(value));
        }
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(render_value)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}
