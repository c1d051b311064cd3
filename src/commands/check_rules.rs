use anyhow::{Context, Result};
use std::path::Path;

use madori::config::Config;
use madori::crawler::decode_bytes;
use madori::parser::Extractor;

/// Extract a saved search page offline and print what the rules find
pub fn check_rules(config: &Config, file: &Path, json: bool) -> Result<()> {
    let bytes =
        std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let content = decode_bytes(&bytes, "")?;

    let extractor = config.build_extractor()?;
    let extraction = extractor
        .extract(&content)
        .with_context(|| format!("Failed to extract {}", file.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&extraction.records)?);
    } else {
        println!("Rules: {}", config.rules.custom.as_ref().map_or(config.rules.preset.as_str(), |_| "custom"));
        println!("Candidates: {}", extraction.candidates);
        println!("Records:    {}", extraction.records.len());
        println!();
        for record in &extraction.records {
            println!("  {}", record.headline());
            println!("    {}", record.url);
        }
    }

    for warning in &extraction.warnings {
        eprintln!("warning: {warning}");
    }

    Ok(())
}
