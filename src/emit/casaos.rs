// src/emit/casaos.rs
//! CasaOS app store emitter
//!
//! CasaOS reads a single compose file annotated with `x-casaos` extension
//! blocks: one app-level block at the root and one per service describing
//! its environment, ports and volumes. Data lives under
//! `/DATA/AppData/$AppID`.

use super::{
    EmissionError, EmissionReport, EmitContext, Emitter, StagedOutput, description_or_default,
    en_us, mapping_of, rewrite_published_port, str_value,
};
use crate::record::{AppRecord, Platform, ServiceView};
use serde::Serialize;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;

pub struct CasaOsEmitter;

/// Companion `app.json`
#[derive(Debug, Serialize)]
struct CasaOsAppInfo<'a> {
    id: &'a str,
    name: &'a str,
    image: String,
    version: &'a str,
    links: BTreeMap<&'static str, String>,
}

impl Emitter for CasaOsEmitter {
    fn emit(
        &self,
        ctx: &mut EmitContext<'_>,
        out: &mut StagedOutput,
    ) -> Result<EmissionReport, EmissionError> {
        let record = ctx.record;
        let main = ctx.main_service(Platform::CasaOs)?;
        let port = ctx.resolve_primary_port(Platform::CasaOs)?;

        // Service annotations describe the compose as written, before mounts move
        let annotations: Vec<(String, Mapping)> = record
            .compose
            .iter_services()
            .map(|svc| (svc.name().to_string(), service_annotation(record, &svc)))
            .collect();

        let mut doc = record.compose.to_mapping();
        if let Some(port) = &port {
            rewrite_published_port(&mut doc, &main, port);
        }
        ctx.rewrite_mounts(&mut doc, Platform::CasaOs)?;

        for (name, annotation) in annotations {
            if let Some(service) = super::service_mut(&mut doc, &name) {
                service.insert(str_value("x-casaos"), Value::Mapping(annotation));
            }
        }

        if record.visual.icon.is_none() {
            out.warn("no icon URL; CasaOS will show a generic icon");
        }

        let mut compose = Mapping::new();
        compose.insert(str_value("name"), str_value(record.id()));
        for (key, value) in doc {
            if key.as_str() == Some("name") || key.as_str() == Some("x-casaos") {
                continue;
            }
            compose.insert(key, value);
        }
        compose.insert(
            str_value("x-casaos"),
            Value::Mapping(app_block(record, &main, port.map(|p| p.host_port))),
        );

        out.write_yaml("docker-compose.yml", &compose)?;
        out.write_json("app.json", &app_info(ctx, &main))?;

        Ok(out.report())
    }
}

fn app_block(record: &AppRecord, main: &str, host_port: Option<u16>) -> Mapping {
    let architectures: Vec<Value> = if record.technical.architectures.is_empty() {
        vec![str_value("amd64"), str_value("arm64")]
    } else {
        record
            .technical
            .architectures
            .iter()
            .map(|a| str_value(a.as_str()))
            .collect()
    };

    let screenshots: Vec<Value> = record
        .visual
        .screenshots
        .iter()
        .map(|s| str_value(s.as_str()))
        .collect();

    let tips = record
        .compat(Platform::CasaOs)
        .and_then(|c| c.extra_str("tips"))
        .map(|tips| {
            let mut map = Mapping::new();
            map.insert(str_value("before_install"), en_us(tips));
            Value::Mapping(map)
        });

    let author = non_empty(&record.metadata.author).unwrap_or(record.display_name());
    let developer = non_empty(&record.metadata.developer).unwrap_or(author);

    mapping_of([
        ("architectures", Some(Value::Sequence(architectures))),
        ("main", Some(str_value(main))),
        ("author", Some(str_value(author))),
        ("developer", Some(str_value(developer))),
        ("category", Some(str_value(record.metadata.category.label()))),
        ("description", Some(en_us(&description_or_default(record)))),
        ("tagline", Some(en_us(&record.short_description()))),
        ("title", Some(en_us(record.display_name()))),
        ("icon", record.visual.icon.as_deref().map(str_value)),
        (
            "thumbnail",
            record
                .visual
                .thumbnail
                .as_deref()
                .or(record.visual.screenshots.first().map(String::as_str))
                .map(str_value),
        ),
        (
            "screenshot_link",
            (!screenshots.is_empty()).then_some(Value::Sequence(screenshots)),
        ),
        ("port_map", host_port.map(|p| str_value(p.to_string()))),
        ("index", Some(str_value("/"))),
        ("scheme", Some(str_value("http"))),
        ("tips", tips),
    ])
}

/// `x-casaos` block listing what one service declares
fn service_annotation(record: &AppRecord, svc: &ServiceView<'_>) -> Mapping {
    let envs: Vec<Value> = svc
        .environment()
        .iter()
        .map(|env| {
            let description = record.env_description(&env.name).unwrap_or(&env.name);
            Value::Mapping(mapping_of([
                ("container", Some(str_value(env.name.as_str()))),
                ("description", Some(en_us(description))),
            ]))
        })
        .collect();

    let ports: Vec<Value> = svc
        .ports()
        .iter()
        .filter_map(|p| {
            let container = p.container_port()?;
            let description = record
                .port_description(&container.to_string())
                .map(str::to_string)
                .unwrap_or_else(|| format!("Port {container}"));
            Some(Value::Mapping(mapping_of([
                ("container", Some(str_value(container.to_string()))),
                ("description", Some(en_us(&description))),
                ("protocol", p.protocol.as_deref().map(str_value)),
            ])))
        })
        .collect();

    let volumes: Vec<Value> = svc
        .volumes()
        .iter()
        .map(|v| {
            let description = record
                .volume_description(&v.target)
                .map(str::to_string)
                .unwrap_or_else(|| format!("Data for {}", v.target));
            Value::Mapping(mapping_of([
                ("container", Some(str_value(v.target.as_str()))),
                ("description", Some(en_us(&description))),
            ]))
        })
        .collect();

    let mut block = Mapping::new();
    for (key, list) in [("envs", envs), ("ports", ports), ("volumes", volumes)] {
        if !list.is_empty() {
            block.insert(str_value(key), Value::Sequence(list));
        }
    }
    block
}

fn app_info<'a>(ctx: &EmitContext<'a>, main: &str) -> CasaOsAppInfo<'a> {
    let record = ctx.record;
    let image = record
        .compose
        .service(main)
        .and_then(|s| s.image())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}:{}", record.technical.main_image, record.metadata.version));

    let mut links = BTreeMap::new();
    let candidates = [
        ("homepage", record.metadata.homepage.as_deref()),
        ("repository", record.resources.repository.as_deref()),
        ("documentation", record.resources.documentation.as_deref()),
        ("support", record.resources.support.as_deref()),
        (
            "youtube",
            record.compat(Platform::CasaOs).and_then(|c| c.extra_str("youtube")),
        ),
    ];
    for (key, value) in candidates {
        if let Some(value) = value.and_then(non_empty) {
            links.insert(key, value.to_string());
        }
    }

    CasaOsAppInfo {
        id: record.id(),
        name: record.display_name(),
        image,
        version: &record.metadata.version,
        links,
    }
}

fn non_empty(s: &str) -> Option<&str> {
    (!s.trim().is_empty()).then_some(s)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{COMPOSE, all_supported, emit_one, record};
    use super::*;
    use crate::config::Config;
    use tempfile::TempDir;

    fn read_yaml(path: &std::path::Path) -> Value {
        serde_yaml::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn test_casaos_compose() {
        let temp = TempDir::new().unwrap();
        let record = record("demo", COMPOSE, all_supported());
        let report = emit_one(&record, Platform::CasaOs, &Config::default(), temp.path()).unwrap();
        assert_eq!(
            report.files_written,
            vec![
                std::path::PathBuf::from("docker-compose.yml"),
                std::path::PathBuf::from("app.json")
            ]
        );

        let text = std::fs::read_to_string(temp.path().join("demo/docker-compose.yml")).unwrap();
        assert!(text.starts_with("name: demo\n"));

        let doc = read_yaml(&temp.path().join("demo/docker-compose.yml"));
        let app = &doc["x-casaos"];
        assert_eq!(app["main"].as_str(), Some("web"));
        assert_eq!(app["title"]["en_us"].as_str(), Some("Demo App"));
        assert_eq!(app["port_map"].as_str(), Some("8080"));
        assert_eq!(app["index"].as_str(), Some("/"));
        assert_eq!(app["architectures"].as_sequence().unwrap().len(), 3);

        let web = &doc["services"]["web"];
        assert_eq!(
            web["volumes"][0].as_str(),
            Some("/DATA/AppData/$AppID/data:/data")
        );
        assert_eq!(
            web["volumes"][1].as_str(),
            Some("/DATA/AppData/$AppID/config:/config")
        );
        assert_eq!(web["x-casaos"]["envs"][0]["container"].as_str(), Some("TZ"));
        assert_eq!(web["x-casaos"]["envs"][0]["description"]["en_us"].as_str(), Some("Timezone"));
        assert_eq!(web["x-casaos"]["volumes"][0]["description"]["en_us"].as_str(), Some("App data"));
        assert_eq!(web["x-casaos"]["ports"][0]["description"]["en_us"].as_str(), Some("Web UI"));
        assert!(doc.get("volumes").is_none());
    }

    #[test]
    fn test_casaos_port_override_rewrites_compose() {
        let temp = TempDir::new().unwrap();
        let record = record(
            "demo",
            COMPOSE,
            r#", "compatibility": { "casaos": { "port": 9999, "youtube": "https://youtu.be/x" } }"#,
        );
        emit_one(&record, Platform::CasaOs, &Config::default(), temp.path()).unwrap();

        let doc = read_yaml(&temp.path().join("demo/docker-compose.yml"));
        assert_eq!(doc["services"]["web"]["ports"][0].as_str(), Some("9999:8080"));
        assert_eq!(doc["x-casaos"]["port_map"].as_str(), Some("9999"));

        let info: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(temp.path().join("demo/app.json")).unwrap())
                .unwrap();
        assert_eq!(info["image"], "org/demo:1.2.3");
        assert_eq!(info["links"]["youtube"], "https://youtu.be/x");
        assert_eq!(info["links"]["homepage"], "https://demo.example.com");
    }
}
