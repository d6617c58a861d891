// src/commands/mod.rs
//! Command handlers for the appcatalog CLI

mod convert;
mod list;

pub use convert::cmd_convert;
pub use list::{cmd_list, cmd_platforms};

use anyhow::{Context, Result};
use appcatalog::Config;
pub use appcatalog::config::PathOverrides;
use std::path::Path;

/// Load the config file and apply command-line overrides
pub fn load_config(path: Option<&Path>, overrides: PathOverrides) -> Result<Config> {
    Config::load_with_overrides(path, overrides).with_context(|| match path {
        Some(p) => format!("Failed to load configuration from {}", p.display()),
        None => "Failed to load configuration".to_string(),
    })
}
