// src/cli.rs
//! CLI definitions for appcatalog
//!
//! This module contains the command-line interface definitions using clap.
//! The command implementations are in the `commands` module.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "appcatalog")]
#[command(author = "appcatalog Contributors")]
#[command(version)]
#[command(about = "Convert a universal app catalog into self-hosting platform stores", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to ./appcatalog.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding one subdirectory per app record
    #[arg(long, global = true)]
    pub apps_dir: Option<PathBuf>,

    /// Directory the platform trees are written under
    #[arg(long, global = true)]
    pub output_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert app records into platform formats
    Convert {
        /// Convert only this app (directory name under the apps directory)
        app: Option<String>,

        /// Comma-separated platforms, or "all"
        #[arg(short, long, default_value = "all")]
        platform: String,

        /// Report what would be written without touching the output tree
        #[arg(long)]
        dry_run: bool,

        /// Do not download icons; use generated placeholders
        #[arg(long)]
        offline: bool,
    },

    /// List app records and the platforms each one supports
    List,

    /// List supported target platforms
    Platforms,
}
