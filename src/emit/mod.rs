// src/emit/mod.rs
//! Platform emitters
//!
//! Each emitter turns one `AppRecord` into the file set a platform's app
//! store expects. Emitters walk the live compose document and rewrite a copy
//! of it; `deployment` only supplies descriptions.

pub mod casaos;
pub mod cosmos;
pub mod dockge;
pub mod output;
pub mod portainer;
pub mod runtipi;
pub mod umbrel;

pub use output::{EmissionReport, StagedOutput};

use crate::aggregate::TemplateAggregator;
use crate::assets::AssetFetcher;
use crate::config::Config;
use crate::mounts::{self, MountError};
use crate::ports::{PortError, PortResolver, ResolvedPort};
use crate::record::{AppRecord, PortMapping, Platform};
use serde_yaml::{Mapping, Value};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmissionError {
    #[error("Missing required field for {platform}: {field}")]
    MissingField { platform: Platform, field: String },

    #[error("Volume mapping failed: {0}")]
    Mount(#[from] MountError),

    #[error("Port resolution failed: {0}")]
    Port(#[from] PortError),

    #[error("Invalid identifier '{value}': {reason}")]
    InvalidIdentifier { value: String, reason: String },

    #[error("Serialization failed: {0}")]
    Serialize(String),

    #[error("Failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl From<serde_yaml::Error> for EmissionError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Serialize(e.to_string())
    }
}

impl From<serde_json::Error> for EmissionError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialize(e.to_string())
    }
}

/// Everything an emitter may read or mutate for one (record, platform)
pub struct EmitContext<'a> {
    pub record: &'a AppRecord,
    pub config: &'a Config,
    /// Resolver of the platform being emitted
    pub ports: &'a mut PortResolver,
    pub templates: &'a mut TemplateAggregator,
    pub assets: &'a AssetFetcher,
}

/// Common contract of the six platform emitters
pub trait Emitter {
    /// Write the platform file set for `ctx.record` into `out`
    fn emit(
        &self,
        ctx: &mut EmitContext<'_>,
        out: &mut StagedOutput,
    ) -> Result<EmissionReport, EmissionError>;
}

/// Emitter for `platform`
pub fn emitter_for(platform: Platform) -> &'static dyn Emitter {
    match platform {
        Platform::CasaOs => &casaos::CasaOsEmitter,
        Platform::Portainer => &portainer::PortainerEmitter,
        Platform::Runtipi => &runtipi::RuntipiEmitter,
        Platform::Dockge => &dockge::DockgeEmitter,
        Platform::Cosmos => &cosmos::CosmosEmitter,
        Platform::Umbrel => &umbrel::UmbrelEmitter,
    }
}

impl EmitContext<'_> {
    /// Name of the main service, which must exist
    pub fn main_service(&self, platform: Platform) -> Result<String, EmissionError> {
        self.record
            .main_service()
            .ok_or_else(|| EmissionError::MissingField {
                platform,
                field: "compose.services".to_string(),
            })
    }

    /// Resolve the host port of the record's primary port, if it has one
    pub fn resolve_primary_port(
        &mut self,
        platform: Platform,
    ) -> Result<Option<ResolvedPort>, EmissionError> {
        let Some((container, requested)) = self.record.primary_port() else {
            return Ok(None);
        };
        let resolved = self.ports.resolve(
            container,
            requested,
            self.record.port_override(platform),
        )?;
        tracing::debug!(
            "{}/{}: port {} -> {} ({})",
            platform,
            self.record.id(),
            container,
            resolved.host_port,
            resolved.strategy
        );
        Ok(Some(resolved))
    }

    /// Like [`Self::resolve_primary_port`] but the port is mandatory
    pub fn require_primary_port(
        &mut self,
        platform: Platform,
    ) -> Result<ResolvedPort, EmissionError> {
        self.resolve_primary_port(platform)?
            .ok_or_else(|| EmissionError::MissingField {
                platform,
                field: "technical.default_port".to_string(),
            })
    }

    /// Rewrite every mount of `doc` with the platform's convention
    pub fn rewrite_mounts(
        &self,
        doc: &mut Mapping,
        platform: Platform,
    ) -> Result<Vec<mounts::ResolvedMount>, EmissionError> {
        let convention = self.config.mount_convention(platform);
        let overrides = self.record.volume_overrides(platform);
        Ok(mounts::rewrite_document(
            doc,
            &overrides,
            &convention,
            self.record.id(),
        )?)
    }
}

/// Mutable service body inside a compose document
pub(crate) fn service_mut<'a>(doc: &'a mut Mapping, name: &str) -> Option<&'a mut Mapping> {
    doc.get_mut("services")?
        .as_mapping_mut()?
        .get_mut(name)?
        .as_mapping_mut()
}

/// Point the published port of `container_port` on `service` at `host_port`
///
/// Only the first mapping for that container port is touched; entries
/// without a host side are left alone.
pub(crate) fn rewrite_published_port(
    doc: &mut Mapping,
    service: &str,
    port: &ResolvedPort,
) {
    let Some(Value::Sequence(ports)) = service_mut(doc, service).and_then(|s| s.get_mut("ports"))
    else {
        return;
    };
    for entry in ports.iter_mut() {
        let Some(mapping) = PortMapping::parse(entry) else {
            continue;
        };
        if mapping.container_port() != Some(port.container_port) || mapping.host.is_none() {
            continue;
        }
        if mapping.host_port() != Some(port.host_port) {
            match entry {
                Value::Mapping(long) => {
                    long.insert("published".into(), port_value(port.host_port));
                }
                _ => *entry = Value::String(mapping.with_host(port.host_port)),
            }
        }
        return;
    }
}

/// Rename a key of `map` in place, keeping its position
pub(crate) fn rename_key(map: &mut Mapping, from: &str, to: &str) {
    if from == to || !map.contains_key(from) {
        return;
    }
    let renamed: Mapping = std::mem::take(map)
        .into_iter()
        .map(|(k, v)| {
            if k.as_str() == Some(from) {
                (Value::String(to.to_string()), v)
            } else {
                (k, v)
            }
        })
        .collect();
    *map = renamed;
}

pub(crate) fn str_value(s: impl Into<String>) -> Value {
    Value::String(s.into())
}

pub(crate) fn port_value(port: u16) -> Value {
    Value::Number(serde_yaml::Number::from(u64::from(port)))
}

/// `{ en_us: text }` used by CasaOS localized fields
pub(crate) fn en_us(text: &str) -> Value {
    let mut map = Mapping::new();
    map.insert(str_value("en_us"), str_value(text));
    Value::Mapping(map)
}

/// Mapping from `(key, value)` pairs, skipping `None` values
pub(crate) fn mapping_of<I>(pairs: I) -> Mapping
where
    I: IntoIterator<Item = (&'static str, Option<Value>)>,
{
    pairs
        .into_iter()
        .filter_map(|(k, v)| v.map(|v| (str_value(k), v)))
        .collect()
}

/// Description, or a generic sentence naming the app
pub(crate) fn description_or_default(record: &AppRecord) -> String {
    if record.metadata.description.trim().is_empty() {
        format!("{} self-hosted application", record.display_name())
    } else {
        record.metadata.description.clone()
    }
}

/// Pretty JSON with a trailing newline
pub(crate) fn to_json_pretty<T: serde::Serialize>(value: &T) -> Result<String, EmissionError> {
    let mut json = serde_json::to_string_pretty(value)?;
    json.push('\n');
    Ok(json)
}
