use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use madori::config::Config;

mod commands;

use commands::{RunOutcome, RunParams};

#[derive(Parser)]
#[command(
    name = "madori",
    version,
    about = "Watches a SUUMO search page and notifies new listings",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file (environment variables when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the configured format
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the search page once and notify new listings
    Run {
        /// Extract and diff only; do not notify or record anything
        #[arg(long, default_value = "false")]
        dry_run: bool,

        /// Search-results URL, overriding the configured one
        #[arg(short, long)]
        url: Option<String>,
    },

    /// Show identity store statistics
    Stats,

    /// Run the extraction rules against a saved page
    CheckRules {
        /// Saved search-results page
        #[arg(short, long)]
        file: PathBuf,

        /// Print records as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = load_config(&cli)?;

    // Initialize tracing/logging
    let log_format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());
    setup_tracing(&log_format, &config.logging.level, cli.verbose)?;

    match cli.command {
        Commands::Run { dry_run, url } => {
            tracing::info!(dry_run = %dry_run, url = ?url, "Starting run command");
            match commands::run(config, RunParams { url, dry_run }).await? {
                RunOutcome::Completed(summary) => {
                    tracing::debug!(run_id = %summary.run_id, "Run command finished");
                }
                RunOutcome::Skipped => {
                    tracing::info!("Run skipped");
                }
            }
        }

        Commands::Stats => {
            commands::stats(&config)?;
        }

        Commands::CheckRules { file, json } => {
            tracing::info!(file = %file.display(), "Starting check-rules command");
            commands::check_rules(&config, &file, json)?;
        }
    }

    Ok(())
}

/// Load configuration; a failure is logged with default settings first
fn load_config(cli: &Cli) -> Result<Config> {
    Config::load(cli.config.as_deref()).inspect_err(|e| {
        let format = cli.log_format.as_deref().unwrap_or("text");
        // a subscriber may already be installed
        setup_tracing(format, "info", cli.verbose).ok();
        tracing::error!(error = %format!("{e:#}"), "Failed to load configuration");
    })
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("madori=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_new(format!("madori={level},warn"))?
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()?;
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()?;
        }
    }

    Ok(())
}
