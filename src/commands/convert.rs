// src/commands/convert.rs

//! Catalog conversion command

use anyhow::{Context, Result};
use appcatalog::assets::AssetFetcher;
use appcatalog::{Config, ConvertOptions, Platform, Summary, convert_all};
use tracing::info;

/// Convert every record (or just `app`) into the selected platforms
pub fn cmd_convert(
    config: &Config,
    app: Option<String>,
    platforms: &str,
    dry_run: bool,
    offline: bool,
) -> Result<Summary> {
    let platforms = Platform::parse_list(platforms)
        .map_err(|e| anyhow::anyhow!("Invalid --platform value: {}", e))?;
    if platforms.is_empty() {
        anyhow::bail!("No platforms selected");
    }

    // Dry runs never touch the network
    let assets = AssetFetcher::new(&config.assets, offline || dry_run);

    info!(
        "Converting {} into {}",
        app.as_deref().unwrap_or("all apps"),
        platforms
            .iter()
            .map(|p| p.key())
            .collect::<Vec<_>>()
            .join(", ")
    );
    if dry_run {
        println!("[DRY RUN] Nothing will be written to {}", config.output_dir.display());
    }

    let options = ConvertOptions {
        dry_run,
        specific_app: app,
    };
    let summary = convert_all(config, &platforms, &options, &assets)
        .context("Conversion run aborted")?;

    summary.print_report();
    Ok(summary)
}
