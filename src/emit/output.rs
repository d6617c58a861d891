// src/emit/output.rs

//! Staged record output
//!
//! All files of one (record, platform) pair go through a `StagedOutput`
//! rooted at `<output_dir>/<platform>/<folder>`. The directory is cleared
//! when staging begins so every run regenerates it from scratch, and
//! `rollback` removes it again when the emitter fails part way.
//!
//! In dry-run mode nothing touches the disk; each file is compared with
//! what is already there and reported as created, updated or unchanged.

use super::EmissionError;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Files and warnings produced by one emission
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmissionReport {
    /// Paths relative to the record directory, in write order
    pub files_written: Vec<PathBuf>,
    pub warnings: Vec<String>,
}

/// Pending change reported in dry-run mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannedChange {
    Create,
    Update,
    Unchanged,
}

impl std::fmt::Display for PlannedChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Unchanged => write!(f, "unchanged"),
        }
    }
}

pub struct StagedOutput {
    root: PathBuf,
    dry_run: bool,
    report: EmissionReport,
}

impl StagedOutput {
    /// Stage `<platform_root>/<folder>`
    pub fn begin(platform_root: &Path, folder: &str, dry_run: bool) -> Result<Self, EmissionError> {
        validate_folder(folder)?;
        let root = platform_root.join(folder);

        if !dry_run {
            if root.exists() {
                std::fs::remove_dir_all(&root).map_err(|source| EmissionError::Io {
                    path: root.clone(),
                    source,
                })?;
            }
            std::fs::create_dir_all(&root).map_err(|source| EmissionError::Io {
                path: root.clone(),
                source,
            })?;
        }

        Ok(Self {
            root,
            dry_run,
            report: EmissionReport::default(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Write `contents` at `relative` (parent directories are created)
    pub fn write(&mut self, relative: &str, contents: &[u8]) -> Result<(), EmissionError> {
        let path = self.root.join(relative);

        if self.dry_run {
            let change = self.plan(&path, contents);
            info!("[dry-run] {} {}", change, path.display());
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|source| EmissionError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
            std::fs::write(&path, contents).map_err(|source| EmissionError::Io {
                path: path.clone(),
                source,
            })?;
            debug!("Wrote {}", path.display());
        }

        self.report.files_written.push(PathBuf::from(relative));
        Ok(())
    }

    pub fn write_yaml<T: Serialize>(&mut self, relative: &str, value: &T) -> Result<(), EmissionError> {
        let yaml = serde_yaml::to_string(value)?;
        self.write(relative, yaml.as_bytes())
    }

    pub fn write_json<T: Serialize>(&mut self, relative: &str, value: &T) -> Result<(), EmissionError> {
        let json = super::to_json_pretty(value)?;
        self.write(relative, json.as_bytes())
    }

    /// Record a non-fatal problem for the report
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}: {}", self.root.display(), message);
        self.report.warnings.push(message);
    }

    pub fn report(&self) -> EmissionReport {
        self.report.clone()
    }

    /// Finish staging; in dry-run mode, list files a real run would drop
    pub fn finish(self) -> EmissionReport {
        if self.dry_run && self.root.is_dir() {
            let written: BTreeSet<PathBuf> = self.report.files_written.iter().cloned().collect();
            for entry in walkdir::WalkDir::new(&self.root)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                if let Ok(relative) = entry.path().strip_prefix(&self.root)
                    && !written.contains(relative)
                {
                    info!("[dry-run] remove {}", entry.path().display());
                }
            }
        }
        self.report
    }

    /// Remove the record directory after a failed emission
    pub fn rollback(self) {
        if self.dry_run {
            return;
        }
        match std::fs::remove_dir_all(&self.root) {
            Ok(()) => debug!("Rolled back {}", self.root.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to roll back {}: {}", self.root.display(), e),
        }
    }

    fn plan(&self, path: &Path, contents: &[u8]) -> PlannedChange {
        let Ok(existing) = std::fs::read(path) else {
            return PlannedChange::Create;
        };
        if existing == contents {
            return PlannedChange::Unchanged;
        }
        if let (Ok(old), Ok(new)) = (std::str::from_utf8(&existing), std::str::from_utf8(contents)) {
            let patch = diffy::create_patch(old, new);
            debug!("{}:\n{}", path.display(), patch);
        }
        PlannedChange::Update
    }
}

/// Folder names are single path components
fn validate_folder(folder: &str) -> Result<(), EmissionError> {
    let reason = if folder.trim().is_empty() {
        Some("folder name is empty")
    } else if folder == "." || folder == ".." {
        Some("folder name is a relative path component")
    } else if folder.contains('/') || folder.contains('\\') {
        Some("folder name contains a path separator")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(EmissionError::InvalidIdentifier {
            value: folder.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}
