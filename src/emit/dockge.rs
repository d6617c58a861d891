// src/emit/dockge.rs
//! Dockge stack emitter
//!
//! Dockge manages plain `compose.yaml` stacks, so the compose file is written
//! as-is apart from volume namespacing. A flat `metadata.json` sidecar carries
//! the catalog fields Dockge itself has no place for.

use super::{
    EmissionError, EmissionReport, EmitContext, Emitter, StagedOutput, description_or_default,
    rewrite_published_port,
};
use crate::record::Platform;
use serde::Serialize;

pub struct DockgeEmitter;

#[derive(Debug, Serialize)]
struct DockgeMetadata<'a> {
    id: &'a str,
    name: &'a str,
    description: String,
    tagline: String,
    version: &'a str,
    category: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    homepage: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    repository: Option<&'a str>,
    image: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    port: Option<u16>,
    tags: &'a [String],
}

impl Emitter for DockgeEmitter {
    fn emit(
        &self,
        ctx: &mut EmitContext<'_>,
        out: &mut StagedOutput,
    ) -> Result<EmissionReport, EmissionError> {
        let record = ctx.record;
        let main = ctx.main_service(Platform::Dockge)?;
        let port = ctx.resolve_primary_port(Platform::Dockge)?;

        let mut doc = record.compose.to_mapping();
        if let Some(port) = &port {
            rewrite_published_port(&mut doc, &main, port);
        }
        ctx.rewrite_mounts(&mut doc, Platform::Dockge)?;

        let metadata = DockgeMetadata {
            id: record.id(),
            name: record.display_name(),
            description: description_or_default(record),
            tagline: record.short_description(),
            version: &record.metadata.version,
            category: record.metadata.category.label(),
            icon: record.visual.icon.as_deref(),
            homepage: record.metadata.homepage.as_deref(),
            repository: record.resources.repository.as_deref(),
            image: &record.technical.main_image,
            port: port.map(|p| p.host_port),
            tags: &record.tags,
        };

        out.write_yaml("compose.yaml", &doc)?;
        out.write_json("metadata.json", &metadata)?;
        Ok(out.report())
    }
}
