use anyhow::{Context, Result};

use madori::config::Config;
use madori::storage::{lock_path_for, SqliteSeenStore};

pub fn stats(config: &Config) -> Result<()> {
    let database = &config.storage.db_path;

    if !database.exists() {
        println!("Database not found: {}", database.display());
        println!("Run the monitor once to create it.");
        return Ok(());
    }

    let stats = SqliteSeenStore::inspect(database)
        .with_context(|| format!("Failed to read {}", database.display()))?;

    println!("Seen Listings");
    println!("=============");
    println!("Database: {}", database.display());
    println!();
    println!("Total ids: {}", stats.total);
    match stats.last_seen_at {
        Some(at) => println!("Last new listing: {}", at.to_rfc3339()),
        None => println!("Last new listing: never"),
    }
    if lock_path_for(database).exists() {
        println!("Lock file: {}", lock_path_for(database).display());
    }

    Ok(())
}
