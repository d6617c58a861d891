// src/record/loader.rs

//! Record loading and validation
//!
//! A record lives in `<apps_dir>/<id>/` as `app.json` plus the compose file
//! named by `technical.compose_file`. Each rejection cause has its own error
//! variant so batch runs can report per-record diagnostics.

use super::{AppRecord, Compose};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;
use tracing::{debug, warn};

/// Metadata document name inside a record directory
pub const RECORD_FILE: &str = "app.json";

static ID_PATTERN: LazyLock<Option<regex::Regex>> =
    LazyLock::new(|| regex::Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$").ok());

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Missing file: {}", path.display())]
    MissingFile { path: PathBuf },

    #[error("Invalid syntax in {}: {message}", path.display())]
    InvalidSyntax { path: PathBuf, message: String },

    #[error("Missing required field: {field}")]
    MissingRequiredField { field: String },

    #[error("Invalid field {field}: {message}")]
    InvalidField { field: String, message: String },

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Record directory names under `apps_dir`, sorted lexicographically
///
/// Only directories that contain an `app.json` count as records.
pub fn discover_records(apps_dir: &Path) -> std::io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(apps_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if !entry.path().join(RECORD_FILE).is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

/// Load the record stored in `<apps_dir>/<name>/`
pub fn load_record(apps_dir: &Path, name: &str) -> Result<AppRecord, LoadError> {
    load_record_from_dir(&apps_dir.join(name))
}

/// Load and validate the record stored in `dir`
pub fn load_record_from_dir(dir: &Path) -> Result<AppRecord, LoadError> {
    let record_path = dir.join(RECORD_FILE);
    let content = read_file(&record_path)?;

    let mut record: AppRecord =
        serde_json::from_str(&content).map_err(|e| LoadError::InvalidSyntax {
            path: record_path.clone(),
            message: e.to_string(),
        })?;

    validate_metadata(&record)?;

    let compose_path = dir.join(&record.technical.compose_file);
    let compose_text = read_file(&compose_path)?;
    record.compose = Compose::from_yaml(&compose_text).map_err(|e| LoadError::InvalidSyntax {
        path: compose_path.clone(),
        message: e.to_string(),
    })?;

    if !record.compose.has_services() {
        return Err(LoadError::MissingRequiredField {
            field: "compose.services".to_string(),
        });
    }

    if let Some(main) = record.technical.main_service.as_deref()
        && record.compose.service(main).is_none()
    {
        warn!(
            "{}: main service '{}' not declared in compose, using '{}'",
            record.metadata.id,
            main,
            record.main_service().unwrap_or_default()
        );
    }

    if let Some(dir_name) = dir.file_name().and_then(|n| n.to_str())
        && dir_name != record.metadata.id
    {
        return Err(LoadError::InvalidField {
            field: "metadata.id".to_string(),
            message: format!(
                "'{}' does not match record directory '{}'",
                record.metadata.id, dir_name
            ),
        });
    }

    debug!(
        "Loaded {} v{} ({} services)",
        record.metadata.id,
        record.metadata.version,
        record.compose.service_names().len()
    );

    Ok(record)
}

fn read_file(path: &Path) -> Result<String, LoadError> {
    std::fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            LoadError::MissingFile {
                path: path.to_path_buf(),
            }
        } else {
            LoadError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })
}

fn validate_metadata(record: &AppRecord) -> Result<(), LoadError> {
    let required = [
        ("metadata.id", record.metadata.id.as_str()),
        ("metadata.version", record.metadata.version.as_str()),
        ("technical.main_image", record.technical.main_image.as_str()),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(LoadError::MissingRequiredField {
                field: field.to_string(),
            });
        }
    }

    if !ID_PATTERN
        .as_ref()
        .is_some_and(|re| re.is_match(&record.metadata.id))
    {
        return Err(LoadError::InvalidField {
            field: "metadata.id".to_string(),
            message: format!(
                "'{}' must be lowercase alphanumeric with hyphens",
                record.metadata.id
            ),
        });
    }

    let version = record.metadata.version.trim_start_matches('v');
    if semver::Version::parse(version).is_err() {
        warn!(
            "{}: version '{}' is not a semantic version",
            record.metadata.id, record.metadata.version
        );
    }

    Ok(())
}
