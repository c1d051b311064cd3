use anyhow::{Context, Result};

use madori::config::Config;
use madori::models::RunSummary;
use madori::pipeline::{Monitor, RunOptions};
use madori::storage::SqliteSeenStore;

/// Parameters for the `run` command
#[derive(Debug, Clone, Default)]
pub struct RunParams {
    /// Override of the configured search URL
    pub url: Option<String>,

    pub dry_run: bool,
}

/// How a `run` invocation ended without a fatal error
#[derive(Debug)]
pub enum RunOutcome {
    Completed(RunSummary),
    /// Another run held the identity store
    Skipped,
}

pub async fn run(mut config: Config, params: RunParams) -> Result<RunOutcome> {
    if let Some(url) = params.url {
        config.monitor.search_url = url;
    }
    config
        .validate_for_run(params.dry_run)
        .context("Invalid configuration")?;

    let monitor = Monitor::new(
        Box::new(config.build_fetcher()?),
        Box::new(config.build_extractor()?),
        config.build_dispatcher()?,
        config.monitor.search_url.clone(),
    )
    .with_fetch_timeout(config.request_timeout());

    tracing::info!(
        url = %monitor.search_url(),
        db = %config.storage.db_path.display(),
        channels = ?monitor.dispatcher().channel_ids(),
        dry_run = params.dry_run,
        "Starting monitor run"
    );

    let mut store = match SqliteSeenStore::open(&config.storage.db_path) {
        Ok(store) => store,
        Err(e) if e.is_lock_contention() => {
            tracing::warn!(error = %e, "Another run is in progress, skipping this run");
            println!("Skipped: another run holds {}", config.storage.db_path.display());
            return Ok(RunOutcome::Skipped);
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to open identity store");
            if !params.dry_run {
                let text = format!("Failed to open identity store: {e}");
                monitor.dispatcher().alert(&text).await;
            }
            return Err(e).context("Failed to open identity store");
        }
    };

    let options = RunOptions {
        dry_run: params.dry_run,
    };
    let summary = monitor.run(&mut store, options).await?;

    println!("Run {}", summary.run_id);
    println!("================");
    println!("Extracted: {} ({} dropped)", summary.extracted, summary.dropped);
    println!("Known:     {}", summary.known);
    println!("New:       {}", summary.new);
    if summary.dry_run {
        println!("Dry run: nothing notified, nothing committed");
    } else {
        println!("Notified:  {}", summary.notified);
        println!("Unhandled: {}", summary.unhandled);
        println!("Committed: {}", summary.committed);
        for (channel, count) in &summary.channel_failures {
            println!("  {channel} failures: {count}");
        }
    }

    Ok(RunOutcome::Completed(summary))
}
