// src/emit/cosmos.rs
//! Cosmos Server market emitter
//!
//! Cosmos installs apps from a JSON compose fragment. Only the main service
//! is exported, with a reverse-proxy route pointing at its internal port.
//! `{ServiceName}` is substituted by Cosmos at install time.

use super::{
    EmissionError, EmissionReport, EmitContext, Emitter, StagedOutput, description_or_default,
    service_mut, str_value,
};
use crate::record::{AppRecord, Platform};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue, json};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeSet;

pub struct CosmosEmitter;

const SERVICE_PLACEHOLDER: &str = "{ServiceName}";

#[derive(Debug, Serialize)]
struct CosmosDescription<'a> {
    name: &'a str,
    description: String,
    tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    repository: Option<&'a str>,
    image: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon: Option<&'a str>,
    screenshots: &'a [String],
    supported_architectures: Vec<&'static str>,
}

impl Emitter for CosmosEmitter {
    fn emit(
        &self,
        ctx: &mut EmitContext<'_>,
        out: &mut StagedOutput,
    ) -> Result<EmissionReport, EmissionError> {
        let record = ctx.record;
        let main = ctx.main_service(Platform::Cosmos)?;
        let port = ctx.require_primary_port(Platform::Cosmos)?;
        let config = ctx.config;
        let settings = &config.cosmos;

        let mut doc = record.compose.to_mapping();
        ctx.rewrite_mounts(&mut doc, Platform::Cosmos)?;

        let mut service = service_mut(&mut doc, &main)
            .cloned()
            .ok_or_else(|| EmissionError::MissingField {
                platform: Platform::Cosmos,
                field: format!("compose.services.{main}"),
            })?;
        service.insert(str_value("container_name"), str_value(SERVICE_PLACEHOLDER));
        // Sibling services are not exported
        service.shift_remove("depends_on");
        let used_volumes = named_volume_sources(&service);

        let mut service_json: JsonValue = serde_json::to_value(&service)?;
        if let JsonValue::Object(obj) = &mut service_json {
            obj.insert(
                "routes".to_string(),
                json!([{
                    "name": SERVICE_PLACEHOLDER,
                    "description": format!("Expose {} to the internet", record.display_name()),
                    "useHost": true,
                    "target": format!("http://{}:{}", SERVICE_PLACEHOLDER, port.container_port),
                    "mode": "SERVAPP",
                    "Timeout": settings.timeout_ms,
                    "ThrottlePerMinute": settings.throttle_per_minute,
                    "BlockCommonBots": settings.block_common_bots,
                    "SmartShield": { "Enabled": settings.smart_shield },
                }]),
            );
        }

        let mut services = Map::new();
        services.insert(SERVICE_PLACEHOLDER.to_string(), service_json);

        let mut fragment = Map::new();
        fragment.insert("cosmos-installer".to_string(), json!({}));
        fragment.insert("minVersion".to_string(), json!(settings.min_version));
        fragment.insert("services".to_string(), JsonValue::Object(services));

        let volumes = used_volume_declarations(&doc, &used_volumes)?;
        if !volumes.is_empty() {
            fragment.insert("volumes".to_string(), JsonValue::Object(volumes));
        }

        out.write_json("cosmos-compose.json", &JsonValue::Object(fragment))?;
        out.write_json("description.json", &description(record))?;
        Ok(out.report())
    }
}

/// Named volumes a service mounts after namespacing
fn named_volume_sources(service: &Mapping) -> BTreeSet<String> {
    service
        .get("volumes")
        .and_then(Value::as_sequence)
        .map(|seq| {
            seq.iter()
                .filter_map(crate::record::VolumeEntry::parse)
                .filter_map(|v| match v.source {
                    crate::record::VolumeSource::Named(name) => Some(name),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

fn used_volume_declarations(
    doc: &Mapping,
    used: &BTreeSet<String>,
) -> Result<Map<String, JsonValue>, EmissionError> {
    let mut volumes = Map::new();
    let Some(declared) = doc.get("volumes").and_then(Value::as_mapping) else {
        return Ok(volumes);
    };
    for (name, body) in declared {
        let Some(name) = name.as_str() else { continue };
        if used.contains(name) {
            let body = match body {
                Value::Null => json!({}),
                other => serde_json::to_value(other)?,
            };
            volumes.insert(name.to_string(), body);
        }
    }
    Ok(volumes)
}

fn description(record: &AppRecord) -> CosmosDescription<'_> {
    let mut tags = vec![record.metadata.category.label().to_string()];
    for tag in &record.tags {
        if !tags.contains(tag) {
            tags.push(tag.clone());
        }
    }

    let mut supported_architectures: Vec<&'static str> = record
        .technical
        .architectures
        .iter()
        .map(|a| a.as_str())
        .collect();
    if supported_architectures.is_empty() {
        supported_architectures = vec!["amd64", "arm64"];
    }

    CosmosDescription {
        name: record.display_name(),
        description: description_or_default(record),
        tags,
        repository: record.resources.repository.as_deref(),
        image: &record.technical.main_image,
        icon: record.visual.icon.as_deref(),
        screenshots: &record.visual.screenshots,
        supported_architectures,
    }
}
