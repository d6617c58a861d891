// src/emit/umbrel.rs
//! Umbrel app store emitter
//!
//! Umbrel fronts every app with its `app_proxy` container, so services lose
//! their published ports and fixed container names; the proxy is told where
//! to forward via `APP_HOST`/`APP_PORT`. Apps that need host networking skip
//! the proxy and expose their internal port directly.

use super::{
    EmissionError, EmissionReport, EmitContext, Emitter, StagedOutput, description_or_default,
    mapping_of, port_value, str_value,
};
use crate::record::Platform;
use serde::Serialize;
use serde_yaml::{Mapping, Value};

pub struct UmbrelEmitter;

/// Compose file format Umbrel expects
const COMPOSE_VERSION: &str = "3.7";

/// `umbrel-app.yml`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UmbrelManifest {
    manifest_version: u32,
    id: String,
    category: String,
    name: String,
    version: String,
    tagline: String,
    description: String,
    developer: String,
    website: String,
    dependencies: Vec<String>,
    repo: String,
    support: String,
    port: u16,
    gallery: Vec<String>,
    path: String,
    default_username: String,
    default_password: String,
    release_notes: String,
    submitter: String,
    submission: String,
}

impl Emitter for UmbrelEmitter {
    fn emit(
        &self,
        ctx: &mut EmitContext<'_>,
        out: &mut StagedOutput,
    ) -> Result<EmissionReport, EmissionError> {
        let record = ctx.record;
        let config = ctx.config;
        let settings = &config.umbrel;

        let folder = record.folder_name(Platform::Umbrel);
        let app_id = derive_app_id(&settings.app_id_prefix, folder)?;
        let main = ctx.main_service(Platform::Umbrel)?;

        let host_network = record
            .compose
            .service(&main)
            .is_some_and(|s| s.uses_host_network());

        let (internal_port, manifest_port) = if host_network {
            let (internal, _) = record.primary_port().ok_or_else(missing_port)?;
            (
                internal,
                record.port_override(Platform::Umbrel).unwrap_or(internal),
            )
        } else {
            let resolved = ctx.require_primary_port(Platform::Umbrel)?;
            (resolved.container_port, resolved.host_port)
        };

        let mut doc = record.compose.to_mapping();
        ctx.rewrite_mounts(&mut doc, Platform::Umbrel)?;
        let compose = build_compose(doc, &app_id, &main, internal_port, host_network);

        let extra = |key: &str| {
            record
                .compat(Platform::Umbrel)
                .and_then(|c| c.extra_str(key))
                .unwrap_or_default()
                .to_string()
        };

        let manifest = UmbrelManifest {
            manifest_version: 1,
            id: app_id.clone(),
            category: record.metadata.category.umbrel_slug().to_string(),
            name: record.display_name().to_string(),
            version: record.metadata.version.clone(),
            tagline: record.short_description(),
            description: description_or_default(record),
            developer: first_non_empty(&[&record.metadata.developer, &record.metadata.author])
                .unwrap_or(record.display_name())
                .to_string(),
            website: record.metadata.homepage.clone().unwrap_or_default(),
            dependencies: Vec::new(),
            repo: record.resources.repository.clone().unwrap_or_default(),
            support: record
                .resources
                .support
                .clone()
                .or_else(|| record.resources.issues.clone())
                .unwrap_or_default(),
            port: manifest_port,
            gallery: record.visual.screenshots.clone(),
            path: extra("path"),
            default_username: extra("default_username"),
            default_password: extra("default_password"),
            release_notes: extra("release_notes"),
            submitter: non_empty_or(&settings.submitter, &record.metadata.author),
            submission: settings.submission.clone(),
        };

        out.write_yaml("docker-compose.yml", &compose)?;
        out.write_yaml("umbrel-app.yml", &manifest)?;
        Ok(out.report())
    }
}

fn missing_port() -> EmissionError {
    EmissionError::MissingField {
        platform: Platform::Umbrel,
        field: "technical.default_port".to_string(),
    }
}

/// `<prefix>-<folder>` reduced to lowercase alphanumerics and single hyphens
pub fn derive_app_id(prefix: &str, folder: &str) -> Result<String, EmissionError> {
    let app_part = sanitize_id(folder);
    if app_part.is_empty() {
        return Err(EmissionError::InvalidIdentifier {
            value: folder.to_string(),
            reason: "sanitized app id is empty".to_string(),
        });
    }

    let prefix = sanitize_id(prefix);
    if prefix.is_empty() {
        Ok(app_part)
    } else {
        Ok(format!("{prefix}-{app_part}"))
    }
}

fn sanitize_id(raw: &str) -> String {
    let mut id = String::with_capacity(raw.len());
    for c in raw.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            id.push(c);
        } else if !id.is_empty() && !id.ends_with('-') {
            id.push('-');
        }
    }
    id.trim_end_matches('-').to_string()
}

fn build_compose(
    doc: Mapping,
    app_id: &str,
    main: &str,
    internal_port: u16,
    host_network: bool,
) -> Mapping {
    let mut services = Mapping::new();

    if !host_network {
        let environment = mapping_of([
            ("APP_HOST", Some(str_value(format!("{app_id}_{main}_1")))),
            ("APP_PORT", Some(port_value(internal_port))),
        ]);
        let proxy = mapping_of([("environment", Some(Value::Mapping(environment)))]);
        services.insert(str_value("app_proxy"), Value::Mapping(proxy));
    }

    let mut rest = Mapping::new();
    for (key, value) in doc {
        match key.as_str() {
            Some("version") | Some("name") => {}
            Some("services") => {
                if let Value::Mapping(declared) = value {
                    for (name, body) in declared {
                        services.insert(name, strip_service(body));
                    }
                }
            }
            _ => {
                rest.insert(key, value);
            }
        }
    }

    let mut compose = Mapping::new();
    compose.insert(str_value("version"), str_value(COMPOSE_VERSION));
    compose.insert(str_value("services"), Value::Mapping(services));
    compose.extend(rest);
    compose
}

/// Drop what the proxy owns: container names, published ports, custom networking
fn strip_service(body: Value) -> Value {
    let mut service = match body {
        Value::Mapping(service) => service,
        other => return other,
    };
    service.shift_remove("container_name");
    service.shift_remove("ports");
    let keep_network = service
        .get("network_mode")
        .and_then(Value::as_str)
        .is_some_and(|m| m == "host");
    if !keep_network {
        service.shift_remove("network_mode");
    }
    Value::Mapping(service)
}

fn first_non_empty<'a>(values: &[&'a String]) -> Option<&'a str> {
    values
        .iter()
        .map(|s| s.as_str())
        .find(|s| !s.trim().is_empty())
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}
