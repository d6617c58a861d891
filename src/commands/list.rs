// src/commands/list.rs

//! Catalog listing commands

use anyhow::{Context, Result};
use appcatalog::driver::is_reserved;
use appcatalog::record::{discover_records, load_record};
use appcatalog::{Config, Platform};

/// List every record with the platforms it targets
pub fn cmd_list(config: &Config) -> Result<()> {
    let names = discover_records(&config.apps_dir)
        .with_context(|| format!("Failed to read {}", config.apps_dir.display()))?;

    let mut count = 0;
    for name in names.iter().filter(|n| !is_reserved(n)) {
        match load_record(&config.apps_dir, name) {
            Ok(record) => {
                let platforms: Vec<&str> = Platform::ALL
                    .iter()
                    .filter(|p| record.supports(**p))
                    .map(|p| p.key())
                    .collect();
                println!(
                    "{:<24} {:<12} {}",
                    record.id(),
                    record.metadata.version,
                    if platforms.is_empty() {
                        "(none)".to_string()
                    } else {
                        platforms.join(", ")
                    }
                );
                count += 1;
            }
            Err(e) => println!("{:<24} [invalid] {}", name, e),
        }
    }

    if count == 0 {
        println!("No app records found in {}", config.apps_dir.display());
    }
    Ok(())
}

/// List target platforms and where their output lands
pub fn cmd_platforms(config: &Config) -> Result<()> {
    for platform in Platform::ALL {
        println!(
            "{:<10} {:<10} {}",
            platform.key(),
            platform.display_name(),
            config.platform_root(platform).display()
        );
    }
    Ok(())
}
