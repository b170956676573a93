mod commands;
mod confirm;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use stratus_config::ConfigResolver;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stratus")]
#[command(about = "Provision cloud infrastructure one resource kind at a time", long_about = None)]
struct Cli {
    /// Config file (otherwise searched in ./, ./.stratus/ and ~/.config/stratus/)
    #[arg(short, long, global = true, env = "STRATUS_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Log every cloud call
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision resource kinds in dependency order
    Provision {
        /// Kinds to provision (network, object-store, image-registry, cluster) or "all"
        #[arg(required = true)]
        kinds: Vec<String>,
        /// Answer yes to every adoption and cost prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Show the state document for the configured project and environment
    Status {
        /// Print the raw JSON document
        #[arg(long)]
        json: bool,
    },
    /// Print the export manifest of a provisioned kind
    Exports {
        /// Resource kind
        kind: String,
    },
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    // Version needs no configuration
    if matches!(cli.command, Commands::Version) {
        println!("stratus {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let resolver = match &cli.config {
        Some(path) => ConfigResolver::with_file(path),
        None => ConfigResolver::new(),
    };
    let config = resolver.resolve()?;
    tracing::debug!(
        "Resolved configuration for {}/{} in {}",
        config.project,
        config.environment,
        config.region
    );

    match cli.command {
        Commands::Provision { kinds, yes } => {
            let kinds = commands::parse_kinds(&kinds)?;
            commands::provision::handle(config, kinds, yes).await?;
        }
        Commands::Status { json } => {
            commands::status::handle(&config, json).await?;
        }
        Commands::Exports { kind } => {
            let kind = kind.parse().map_err(|e: String| anyhow::anyhow!(e))?;
            commands::exports::handle(&config, kind).await?;
        }
        Commands::Version => {
            unreachable!("Version is handled before config loading");
        }
    }

    Ok(())
}
