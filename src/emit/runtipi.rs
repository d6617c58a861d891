// src/emit/runtipi.rs
//! Runtipi app store emitter
//!
//! Layout of one Runtipi app:
//!
//! ```text
//! <folder>/
//!   config.json
//!   docker-compose.yml
//!   metadata/description.md
//!   metadata/logo.png
//! ```
//!
//! Runtipi owns the host port (`${APP_PORT}`) and routes traffic through
//! traefik on the shared `tipi_main_network`, so the main service is
//! renamed to the app id and attached to that network.

use super::{
    EmissionError, EmissionReport, EmitContext, Emitter, StagedOutput, description_or_default,
    port_value, rename_key, service_mut, str_value,
};
use crate::assets::placeholder_png;
use crate::ports::{PortResolver, ResolvedPort};
use crate::record::{AppRecord, Architecture, Platform, PortMapping};
use chrono::{DateTime, NaiveDate};
use serde::Serialize;
use serde_yaml::{Mapping, Value};

pub struct RuntipiEmitter;

#[derive(Debug, Serialize)]
struct RuntipiConfig {
    name: String,
    id: String,
    available: bool,
    short_desc: String,
    author: String,
    port: u16,
    internal_port: u16,
    categories: Vec<String>,
    description: String,
    tipi_version: u32,
    version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    website: Option<String>,
    exposable: bool,
    dynamic_config: bool,
    supported_architectures: Vec<String>,
    form_fields: Vec<FormField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_at: Option<i64>,
}

#[derive(Debug, Serialize)]
struct FormField {
    #[serde(rename = "type")]
    kind: &'static str,
    label: String,
    env_variable: String,
    required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    default: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
}

impl Emitter for RuntipiEmitter {
    fn emit(
        &self,
        ctx: &mut EmitContext<'_>,
        out: &mut StagedOutput,
    ) -> Result<EmissionReport, EmissionError> {
        let record = ctx.record;
        let id = record.id();
        let main = ctx.main_service(Platform::Runtipi)?;
        let port = ctx.require_primary_port(Platform::Runtipi)?;
        let config = ctx.config;
        let settings = &config.runtipi;

        let host_network = record
            .compose
            .service(&main)
            .is_some_and(|s| s.uses_host_network());
        let join_network = !host_network && !settings.host_network_exceptions.iter().any(|a| a == id);

        let mut doc = record.compose.to_mapping();
        ctx.rewrite_mounts(&mut doc, Platform::Runtipi)?;
        let multi_service = record.compose.service_names().len() > 1;
        rename_main_service(&mut doc, &main, id);

        if let Some(service) = service_mut(&mut doc, id) {
            service.insert(str_value("container_name"), str_value(id));
            if host_network {
                service.shift_remove("ports");
            } else {
                publish_ports(service, &port, &mut *ctx.ports)?;
            }
            if join_network {
                attach_network(service, &settings.network, multi_service);
            }
            add_labels(service, id, port.container_port);
        }

        if join_network {
            let networks = doc
                .entry(str_value("networks"))
                .or_insert_with(|| Value::Mapping(Mapping::new()));
            if let Value::Mapping(networks) = networks {
                let mut external = Mapping::new();
                external.insert(str_value("name"), str_value(format!("runtipi_{}", settings.network)));
                external.insert(str_value("external"), Value::Bool(true));
                networks.insert(str_value(settings.network.as_str()), Value::Mapping(external));
            }
        }

        let manifest = RuntipiConfig {
            name: record.display_name().to_string(),
            id: id.to_string(),
            available: true,
            short_desc: record.short_description(),
            author: non_empty_or(&record.metadata.author, record.display_name()),
            port: port.host_port,
            internal_port: port.container_port,
            categories: vec![record.metadata.category.runtipi_slug().to_string()],
            description: description_or_default(record),
            tipi_version: settings.tipi_version,
            version: record.metadata.version.clone(),
            source: record
                .resources
                .repository
                .clone()
                .or_else(|| record.metadata.homepage.clone()),
            website: record.metadata.homepage.clone(),
            exposable: !host_network,
            dynamic_config: true,
            supported_architectures: supported_architectures(record),
            form_fields: form_fields(record),
            created_at: record.metadata.created.as_deref().and_then(epoch_millis),
            updated_at: record.metadata.updated.as_deref().and_then(epoch_millis),
        };

        out.write_json("config.json", &manifest)?;
        out.write_yaml("docker-compose.yml", &doc)?;
        out.write("metadata/description.md", description_markdown(record).as_bytes())?;

        let logo_url = record.visual.logo.as_deref().or(record.visual.icon.as_deref());
        let logo = if out.is_dry_run() {
            placeholder_png(id)
        } else {
            let icon = ctx.assets.icon_png(logo_url, id);
            if let Some(warning) = icon.warning {
                out.warn(format!("logo placeholder used: {warning}"));
            }
            icon.bytes
        };
        out.write("metadata/logo.png", &logo)?;

        Ok(out.report())
    }
}

/// Rename the main service to `id` and follow `depends_on` references
fn rename_main_service(doc: &mut Mapping, main: &str, id: &str) {
    let Some(Value::Mapping(services)) = doc.get_mut("services") else {
        return;
    };
    rename_key(services, main, id);

    for (_, body) in services.iter_mut() {
        let Some(depends) = body.as_mapping_mut().and_then(|b| b.get_mut("depends_on")) else {
            continue;
        };
        match depends {
            Value::Sequence(list) => {
                for dep in list.iter_mut() {
                    if dep.as_str() == Some(main) {
                        *dep = str_value(id);
                    }
                }
            }
            Value::Mapping(map) => rename_key(map, main, id),
            _ => {}
        }
    }
}

fn attach_network(service: &mut Mapping, network: &str, keep_default: bool) {
    match service.get_mut("networks") {
        Some(Value::Sequence(list)) => {
            if !list.iter().any(|n| n.as_str() == Some(network)) {
                list.push(str_value(network));
            }
        }
        Some(Value::Mapping(map)) => {
            if !map.contains_key(network) {
                map.insert(str_value(network), Value::Null);
            }
        }
        _ => {
            let mut list = vec![str_value(network)];
            if keep_default {
                list.push(str_value("default"));
            }
            service.insert(str_value("networks"), Value::Sequence(list));
        }
    }
}

fn add_labels(service: &mut Mapping, id: &str, internal_port: u16) {
    let labels = [
        ("traefik.enable".to_string(), "true".to_string()),
        (
            format!("traefik.http.services.{id}.loadbalancer.server.port"),
            internal_port.to_string(),
        ),
        (
            format!("traefik.http.routers.{id}.rule"),
            "Host(`${APP_DOMAIN}`)".to_string(),
        ),
        (format!("traefik.http.routers.{id}.entrypoints"), "websecure".to_string()),
        (
            format!("traefik.http.routers.{id}.tls.certresolver"),
            "myresolver".to_string(),
        ),
        ("runtipi.managed".to_string(), "true".to_string()),
    ];

    match service.get_mut("labels") {
        Some(Value::Sequence(list)) => {
            for (k, v) in labels {
                list.push(str_value(format!("{k}={v}")));
            }
        }
        Some(Value::Mapping(map)) => {
            for (k, v) in labels {
                map.insert(str_value(k), str_value(v));
            }
        }
        _ => {
            let map: Mapping = labels
                .into_iter()
                .map(|(k, v)| (str_value(k), str_value(v)))
                .collect();
            service.insert(str_value("labels"), Value::Mapping(map));
        }
    }
}

/// Runtipi only builds for amd64 and arm64
fn supported_architectures(record: &AppRecord) -> Vec<String> {
    let archs: Vec<String> = record
        .technical
        .architectures
        .iter()
        .filter(|a| matches!(a, Architecture::Amd64 | Architecture::Arm64))
        .map(|a| a.as_str().to_string())
        .collect();
    if archs.is_empty() {
        vec!["amd64".to_string(), "arm64".to_string()]
    } else {
        archs
    }
}

/// Variables Runtipi fills in itself
const PROVIDED_VARIABLES: &[&str] = &["TZ", "ROOT_FOLDER_HOST"];

fn is_provided(name: &str) -> bool {
    name.starts_with("APP_") || PROVIDED_VARIABLES.contains(&name)
}

/// Variables the compose file references, then declared ones it does not.
///
/// Only variables without a usable default become form fields.
fn form_fields(record: &AppRecord) -> Vec<FormField> {
    let mut fields: Vec<FormField> = Vec::new();

    for svc in record.compose.iter_services() {
        for entry in svc.environment() {
            for name in entry.referenced_variables() {
                if is_provided(&name) || listed(&fields, &name) {
                    continue;
                }
                let field = match record.env_decl(&name) {
                    Some(decl) => form_field(
                        &name,
                        decl.required,
                        decl.default.clone(),
                        decl.description.clone(),
                    ),
                    None => {
                        let default = entry.literal_default();
                        form_field(&name, default.is_none(), default, None)
                    }
                };
                if field.required || field.default.is_none() {
                    fields.push(field);
                }
            }
        }
    }

    for decl in &record.deployment.environment_variables {
        if listed(&fields, &decl.name) || !(decl.required || decl.default.is_none()) {
            continue;
        }
        fields.push(form_field(
            &decl.name,
            decl.required,
            decl.default.clone(),
            decl.description.clone(),
        ));
    }

    fields
}

fn listed(fields: &[FormField], name: &str) -> bool {
    fields.iter().any(|f| f.env_variable == name)
}

fn form_field(
    name: &str,
    required: bool,
    default: Option<String>,
    hint: Option<String>,
) -> FormField {
    FormField {
        kind: if name.contains("PASSWORD") || name.contains("SECRET") {
            "password"
        } else {
            "text"
        },
        label: name.replace('_', " ").to_lowercase(),
        env_variable: name.to_string(),
        required,
        default,
        hint,
    }
}

/// Point the primary mapping at `${APP_PORT}`; other published ports keep
/// their container side and take a host port from the resolver
fn publish_ports(
    service: &mut Mapping,
    primary: &ResolvedPort,
    resolver: &mut PortResolver,
) -> Result<(), EmissionError> {
    let app_port = format!("${{APP_PORT}}:{}", primary.container_port);
    let mut entries = service
        .get("ports")
        .and_then(Value::as_sequence)
        .cloned()
        .unwrap_or_default();

    let mut primary_seen = false;
    for entry in entries.iter_mut() {
        let Some(mapping) = PortMapping::parse(entry) else {
            continue;
        };
        let Some(container) = mapping.container_port() else {
            continue;
        };
        if !primary_seen && container == primary.container_port {
            primary_seen = true;
            *entry = str_value(match &mapping.protocol {
                Some(proto) => format!("{app_port}/{proto}"),
                None => app_port.clone(),
            });
            continue;
        }
        // Ranges and container-only entries are left as written
        let Some(requested) = mapping.host_port() else {
            continue;
        };
        if mapping.host.as_deref().is_some_and(|h| h.contains('-')) {
            continue;
        }
        let resolved = resolver.resolve(container, requested, None)?;
        if resolved.host_port != requested {
            match entry {
                Value::Mapping(long) => {
                    long.insert(str_value("published"), port_value(resolved.host_port));
                }
                _ => *entry = str_value(mapping.with_host(resolved.host_port)),
            }
        }
    }

    if !primary_seen {
        entries.insert(0, str_value(app_port));
    }
    service.insert(str_value("ports"), Value::Sequence(entries));
    Ok(())
}

/// RFC 3339 timestamp or plain date as milliseconds since the epoch
fn epoch_millis(value: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.timestamp_millis());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
}

fn description_markdown(record: &AppRecord) -> String {
    let mut md = format!("# {}\n\n{}\n", record.display_name(), description_or_default(record));
    let links = [
        ("Website", record.metadata.homepage.as_deref()),
        ("Source", record.resources.repository.as_deref()),
        ("Documentation", record.resources.documentation.as_deref()),
    ];
    let present: Vec<_> = links
        .iter()
        .filter_map(|(label, url)| url.map(|u| format!("- {label}: {u}")))
        .collect();
    if !present.is_empty() {
        md.push_str("\n## Links\n\n");
        md.push_str(&present.join("\n"));
        md.push('\n');
    }
    md
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{COMPOSE, all_supported, emit_one, record};
    use super::*;
    use crate::assets::is_png;
    use crate::config::Config;
    use tempfile::TempDir;

    fn load(temp: &TempDir, folder: &str) -> (serde_json::Value, serde_yaml::Value) {
        let dir = temp.path().join(folder);
        let config = serde_json::from_str(&std::fs::read_to_string(dir.join("config.json")).unwrap())
            .unwrap();
        let compose =
            serde_yaml::from_str(&std::fs::read_to_string(dir.join("docker-compose.yml")).unwrap())
                .unwrap();
        (config, compose)
    }

    #[test]
    fn test_runtipi_outputs() {
        let temp = TempDir::new().unwrap();
        let record = record("demo", COMPOSE, all_supported());
        let report = emit_one(&record, Platform::Runtipi, &Config::default(), temp.path()).unwrap();
        assert_eq!(report.files_written.len(), 4);

        let (config, compose) = load(&temp, "demo");
        assert_eq!(config["id"], "demo");
        assert_eq!(config["port"], 8080);
        assert_eq!(config["internal_port"], 8080);
        assert_eq!(config["categories"][0], "utilities");
        assert_eq!(config["supported_architectures"], serde_json::json!(["amd64", "arm64"]));
        assert_eq!(config["created_at"], 1_704_164_645_000_i64);
        assert_eq!(config["dynamic_config"], true);

        let services = compose["services"].as_mapping().unwrap();
        assert!(services.contains_key("demo"));
        assert!(!services.contains_key("web"));
        let main = &compose["services"]["demo"];
        assert_eq!(main["container_name"].as_str(), Some("demo"));
        assert_eq!(main["ports"][0].as_str(), Some("${APP_PORT}:8080"));
        assert_eq!(main["volumes"][0].as_str(), Some("${APP_DATA_DIR}/data/data:/data"));
        assert_eq!(main["networks"][0].as_str(), Some("tipi_main_network"));
        assert_eq!(main["labels"]["traefik.enable"].as_str(), Some("true"));
        assert_eq!(compose["networks"]["tipi_main_network"]["external"].as_bool(), Some(true));

        let logo = std::fs::read(temp.path().join("demo/metadata/logo.png")).unwrap();
        assert!(is_png(&logo));
    }

    #[test]
    fn test_runtipi_low_port_substituted() {
        let compose = "services:\n  web:\n    image: nginx\n    ports:\n      - \"80:80\"\n";
        let temp = TempDir::new().unwrap();
        let record = record("demo", compose, all_supported());
        emit_one(&record, Platform::Runtipi, &Config::default(), temp.path()).unwrap();

        let (config, _) = load(&temp, "demo");
        assert_eq!(config["port"], 8080);
        assert_eq!(config["internal_port"], 80);
    }

    #[test]
    fn test_runtipi_depends_on_follows_rename() {
        let compose = r#"
services:
  web:
    image: org/web
    ports: ["3000:3000"]
  worker:
    image: org/worker
    depends_on: [web]
"#;
        let temp = TempDir::new().unwrap();
        let record = record("demo", compose, all_supported());
        emit_one(&record, Platform::Runtipi, &Config::default(), temp.path()).unwrap();
        let (_, compose) = load(&temp, "demo");
        assert_eq!(compose["services"]["worker"]["depends_on"][0].as_str(), Some("demo"));
    }

    #[test]
    fn test_runtipi_form_fields_follow_compose_references() {
        let compose = r#"
services:
  web:
    image: org/web
    ports: ["8080:8080"]
    environment:
      - ADMIN_PASSWORD=${ADMIN_PASSWORD}
      - LOG_LEVEL=${LOG_LEVEL:-info}
      - DOMAIN=${APP_DOMAIN}
"#;
        let temp = TempDir::new().unwrap();
        let record = record("demo", compose, all_supported());
        emit_one(&record, Platform::Runtipi, &Config::default(), temp.path()).unwrap();

        let (config, _) = load(&temp, "demo");
        let fields = config["form_fields"].as_array().unwrap();
        let names: Vec<&str> = fields
            .iter()
            .map(|f| f["env_variable"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["ADMIN_PASSWORD"]);
        assert_eq!(fields[0]["type"], "password");
        assert_eq!(fields[0]["required"], true);
    }

    #[test]
    fn test_runtipi_keeps_secondary_ports() {
        let compose = r#"
services:
  pihole:
    image: pihole/pihole
    ports:
      - "8080:80"
      - "53:53/udp"
      - "9000-9002:9000-9002"
"#;
        let temp = TempDir::new().unwrap();
        let record = record("demo", compose, all_supported());
        emit_one(&record, Platform::Runtipi, &Config::default(), temp.path()).unwrap();

        let (_, compose) = load(&temp, "demo");
        let ports: Vec<&str> = compose["services"]["demo"]["ports"]
            .as_sequence()
            .unwrap()
            .iter()
            .map(|p| p.as_str().unwrap())
            .collect();
        assert_eq!(ports.len(), 3);
        assert_eq!(ports[0], "${APP_PORT}:80");
        // 53 sits below the floor and is moved to the first free port
        assert_eq!(ports[1], "1000:53/udp");
        assert_eq!(ports[2], "9000-9002:9000-9002");
    }

    #[test]
    fn test_runtipi_requires_port() {
        let compose = "services:\n  web:\n    image: nginx\n";
        let temp = TempDir::new().unwrap();
        let mut record = record("demo", compose, all_supported());
        record.technical.default_port = None;
        let err = emit_one(&record, Platform::Runtipi, &Config::default(), temp.path()).unwrap_err();
        assert!(matches!(err, EmissionError::MissingField { .. }));
    }

    #[test]
    fn test_epoch_millis_formats() {
        assert_eq!(epoch_millis("1970-01-02"), Some(86_400_000));
        assert_eq!(epoch_millis("1970-01-01T00:00:01Z"), Some(1000));
        assert_eq!(epoch_millis("yesterday"), None);
    }
}
