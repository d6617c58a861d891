// src/driver.rs

//! Conversion driver
//!
//! Walks the catalog in sorted order and runs every selected emitter on every
//! record. A failure is confined to its (record, platform) pair: the staged
//! output is rolled back, the cause is kept for the report, and the run
//! moves on. Only output-root I/O and a corrupt Portainer master list abort
//! the whole run.

use crate::aggregate::TemplateAggregator;
use crate::assets::AssetFetcher;
use crate::config::Config;
use crate::emit::{EmissionError, EmitContext, StagedOutput, emitter_for};
use crate::error::{Error, Result};
use crate::ports::PortResolver;
use crate::record::{AppRecord, Platform, discover_records, load_record};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Record directories that hold templates, not apps
pub const RESERVED_NAMES: &[&str] = &["_template", "template", "example", "_example"];

/// Master template list written at the Portainer root
pub const PORTAINER_TEMPLATES_FILE: &str = "templates.json";

#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    /// Report what would change without writing
    pub dry_run: bool,
    /// Convert only this record
    pub specific_app: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Converted { files: usize, warnings: Vec<String> },
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct RecordOutcome {
    pub app: String,
    /// `None` when the record failed to load
    pub platform: Option<Platform>,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlatformCounts {
    pub converted: usize,
    pub skipped: usize,
    pub errored: usize,
}

/// Result of a conversion run
#[derive(Debug, Default)]
pub struct Summary {
    pub converted: usize,
    pub skipped: usize,
    pub errored: usize,
    /// Reserved template directories that were ignored
    pub reserved: usize,
    pub per_platform: BTreeMap<Platform, PlatformCounts>,
    pub outcomes: Vec<RecordOutcome>,
}

impl Summary {
    pub fn is_success(&self) -> bool {
        self.errored == 0
    }

    fn record(&mut self, app: &str, platform: Option<Platform>, outcome: Outcome) {
        let counts = platform.map(|p| self.per_platform.entry(p).or_default());
        match &outcome {
            Outcome::Converted { .. } => {
                self.converted += 1;
                if let Some(c) = counts {
                    c.converted += 1;
                }
            }
            Outcome::Skipped => {
                self.skipped += 1;
                if let Some(c) = counts {
                    c.skipped += 1;
                }
            }
            Outcome::Failed(_) => {
                self.errored += 1;
                if let Some(c) = counts {
                    c.errored += 1;
                }
            }
        }
        self.outcomes.push(RecordOutcome {
            app: app.to_string(),
            platform,
            outcome,
        });
    }

    /// Failures in the order they happened
    pub fn failures(&self) -> impl Iterator<Item = &RecordOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, Outcome::Failed(_)))
    }

    /// Print per-platform counts, warnings and every failure cause
    pub fn print_report(&self) {
        println!();
        println!("Conversion summary:");
        for (platform, counts) in &self.per_platform {
            println!(
                "  {:<10} {} converted, {} skipped, {} failed",
                platform.display_name(),
                counts.converted,
                counts.skipped,
                counts.errored
            );
        }
        if self.reserved > 0 {
            println!("  Reserved template directories ignored: {}", self.reserved);
        }

        let warnings: Vec<_> = self
            .outcomes
            .iter()
            .filter_map(|o| match &o.outcome {
                Outcome::Converted { warnings, .. } if !warnings.is_empty() => Some((o, warnings)),
                _ => None,
            })
            .collect();
        if !warnings.is_empty() {
            println!();
            println!("Warnings:");
            for (o, list) in warnings {
                for w in list {
                    println!("  [{}/{}] {}", platform_label(o.platform), o.app, w);
                }
            }
        }

        if self.errored > 0 {
            println!();
            println!("Errors:");
            for o in self.failures() {
                if let Outcome::Failed(cause) = &o.outcome {
                    println!("  [{}/{}] {}", platform_label(o.platform), o.app, cause);
                }
            }
        }

        println!();
        println!(
            "Total: {} converted, {} skipped, {} failed",
            self.converted, self.skipped, self.errored
        );
    }
}

fn platform_label(platform: Option<Platform>) -> &'static str {
    platform.map_or("load", |p| p.key())
}

/// Mutable state shared by every emission of a run
#[derive(Debug)]
pub struct RunState {
    pub ports: BTreeMap<Platform, PortResolver>,
    pub templates: TemplateAggregator,
    /// Output folder of each platform mapped to the record that wrote it
    pub folders: BTreeMap<(Platform, String), String>,
}

impl RunState {
    pub fn new(config: &Config, platforms: &[Platform]) -> Self {
        let ports = platforms
            .iter()
            .map(|p| (*p, PortResolver::new(config.port_policy(*p))))
            .collect();
        Self {
            ports,
            templates: TemplateAggregator::new(),
            folders: BTreeMap::new(),
        }
    }
}

pub fn is_reserved(name: &str) -> bool {
    RESERVED_NAMES.contains(&name)
}

/// Convert the catalog under `config.apps_dir`
pub fn convert_all(
    config: &Config,
    platforms: &[Platform],
    options: &ConvertOptions,
    assets: &AssetFetcher,
) -> Result<Summary> {
    if !config.apps_dir.is_dir() {
        return Err(Error::NotFound(format!(
            "apps directory {}",
            config.apps_dir.display()
        )));
    }

    let mut names = discover_records(&config.apps_dir).map_err(|e| {
        Error::IoError(format!(
            "Failed to read {}: {}",
            config.apps_dir.display(),
            e
        ))
    })?;

    if let Some(app) = &options.specific_app {
        if !names.iter().any(|n| n == app) {
            return Err(Error::NotFound(format!("app '{}'", app)));
        }
        names.retain(|n| n == app);
    }

    let (summary, state) = convert_records(config, names, platforms, options, assets)?;

    if platforms.contains(&Platform::Portainer) {
        if options.dry_run {
            info!("[dry-run] {} Portainer templates collected", state.templates.len());
        } else if options.specific_app.is_some() {
            debug!("Single-app run, {} left untouched", PORTAINER_TEMPLATES_FILE);
        } else {
            write_master_templates(config, &state.templates)?;
        }
    }

    Ok(summary)
}

/// Convert `names` (sorted first so ports and template ids are stable)
pub fn convert_records(
    config: &Config,
    mut names: Vec<String>,
    platforms: &[Platform],
    options: &ConvertOptions,
    assets: &AssetFetcher,
) -> Result<(Summary, RunState)> {
    names.sort();
    names.dedup();

    if !options.dry_run {
        std::fs::create_dir_all(&config.output_dir).map_err(|e| {
            Error::IoError(format!(
                "Failed to create output directory {}: {}",
                config.output_dir.display(),
                e
            ))
        })?;
    }

    let mut summary = Summary::default();
    let mut state = RunState::new(config, platforms);

    for name in &names {
        if is_reserved(name) {
            debug!("Skipping reserved directory {}", name);
            summary.reserved += 1;
            continue;
        }

        let record = match load_record(&config.apps_dir, name) {
            Ok(record) => record,
            Err(e) => {
                warn!("Failed to load {}: {}", name, e);
                summary.record(name, None, Outcome::Failed(e.to_string()));
                continue;
            }
        };

        info!("Converting {} v{}", record.id(), record.metadata.version);
        for platform in platforms {
            let outcome = convert_one(config, &record, *platform, options, assets, &mut state);
            summary.record(record.id(), Some(*platform), outcome);
        }
    }

    Ok((summary, state))
}

fn convert_one(
    config: &Config,
    record: &AppRecord,
    platform: Platform,
    options: &ConvertOptions,
    assets: &AssetFetcher,
    state: &mut RunState,
) -> Outcome {
    if !record.supports(platform) {
        debug!("{}: {} not supported, skipping", record.id(), platform);
        return Outcome::Skipped;
    }

    let folder = record.folder_name(platform);
    if let Some(owner) = state.folders.get(&(platform, folder.to_string()))
        && owner != record.id()
    {
        let e = EmissionError::InvalidIdentifier {
            value: folder.to_string(),
            reason: format!("folder already written by '{}'", owner),
        };
        warn!("{}/{}: {}", platform, record.id(), e);
        return Outcome::Failed(e.to_string());
    }

    let root = config.platform_root(platform);
    let mut out = match StagedOutput::begin(&root, folder, options.dry_run) {
        Ok(out) => out,
        Err(e) => {
            warn!("{}/{}: {}", platform, record.id(), e);
            return Outcome::Failed(e.to_string());
        }
    };

    let ports = state
        .ports
        .entry(platform)
        .or_insert_with(|| PortResolver::new(config.port_policy(platform)));
    let mut ctx = EmitContext {
        record,
        config,
        ports,
        templates: &mut state.templates,
        assets,
    };

    match emitter_for(platform).emit(&mut ctx, &mut out) {
        Ok(_) => {
            let report = out.finish();
            state
                .folders
                .insert((platform, folder.to_string()), record.id().to_string());
            debug!(
                "{}/{}: wrote {} files",
                platform,
                record.id(),
                report.files_written.len()
            );
            Outcome::Converted {
                files: report.files_written.len(),
                warnings: report.warnings,
            }
        }
        Err(e) => {
            warn!("{}/{}: {}", platform, record.id(), e);
            out.rollback();
            Outcome::Failed(e.to_string())
        }
    }
}

fn write_master_templates(config: &Config, templates: &TemplateAggregator) -> Result<()> {
    let json = templates.finalize()?;
    let root = config.platform_root(Platform::Portainer);
    std::fs::create_dir_all(&root).map_err(|e| {
        Error::IoError(format!("Failed to create {}: {}", root.display(), e))
    })?;

    let path = root.join(PORTAINER_TEMPLATES_FILE);
    std::fs::write(&path, json)
        .map_err(|e| Error::IoError(format!("Failed to write {}: {}", path.display(), e)))?;
    info!("Wrote {} ({} templates)", path.display(), templates.len());
    Ok(())
}
