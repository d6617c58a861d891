// src/main.rs

use anyhow::Result;
use clap::{CommandFactory, Parser};
use std::process::ExitCode;
use tracing::debug;

mod cli;
mod commands;

use cli::{Cli, Commands};
use commands::PathOverrides;

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise -v switches info to debug
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(ExitCode::SUCCESS);
    };

    let config = commands::load_config(
        cli.config.as_deref(),
        PathOverrides {
            apps_dir: cli.apps_dir,
            output_dir: cli.output_dir,
        },
    )?;
    debug!(
        "apps_dir={} output_dir={}",
        config.apps_dir.display(),
        config.output_dir.display()
    );

    match command {
        Commands::Convert {
            app,
            platform,
            dry_run,
            offline,
        } => {
            let summary = commands::cmd_convert(&config, app, &platform, dry_run, offline)?;
            Ok(if summary.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::List => {
            commands::cmd_list(&config)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Platforms => {
            commands::cmd_platforms(&config)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
