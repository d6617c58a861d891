// src/emit/portainer.rs
//! Portainer template emitter
//!
//! Portainer consumes one master `templates.json` (v2 format) whose stack
//! entries point at compose files in a git repository. Each record gets its
//! own `template.json` and `docker-compose.yml`; the entry is also appended
//! to the run's `TemplateAggregator`.

use super::{
    EmissionError, EmissionReport, EmitContext, Emitter, StagedOutput, description_or_default,
    rewrite_published_port,
};
use crate::aggregate::{PortainerTemplate, STACK_TEMPLATE_TYPE, TemplateEnv, TemplateRepository};
use crate::record::{AppRecord, Platform};

pub struct PortainerEmitter;

impl Emitter for PortainerEmitter {
    fn emit(
        &self,
        ctx: &mut EmitContext<'_>,
        out: &mut StagedOutput,
    ) -> Result<EmissionReport, EmissionError> {
        let record = ctx.record;
        let main = ctx.main_service(Platform::Portainer)?;
        let port = ctx.resolve_primary_port(Platform::Portainer)?;

        let mut doc = record.compose.to_mapping();
        if let Some(port) = &port {
            rewrite_published_port(&mut doc, &main, port);
        }
        ctx.rewrite_mounts(&mut doc, Platform::Portainer)?;

        let mut template = build_template(ctx, record);
        template.id = ctx.templates.next_id();

        out.write_yaml("docker-compose.yml", &doc)?;
        out.write_json("template.json", &template)?;

        ctx.templates.append(record.id(), template);
        Ok(out.report())
    }
}

fn build_template(ctx: &EmitContext<'_>, record: &AppRecord) -> PortainerTemplate {
    let settings = &ctx.config.portainer;
    let stackfile = format!(
        "{}/{}/docker-compose.yml",
        settings.stackfile_root.trim_end_matches('/'),
        record.folder_name(Platform::Portainer)
    );

    PortainerTemplate {
        id: 0,
        kind: STACK_TEMPLATE_TYPE,
        title: record.display_name().to_string(),
        name: record.id().to_string(),
        description: description_or_default(record),
        note: Some(record.short_description()).filter(|n| !n.is_empty()),
        categories: vec![record.metadata.category.label().to_string()],
        platform: "linux".to_string(),
        logo: record.visual.icon.clone(),
        repository: TemplateRepository {
            url: settings.repository_url.clone(),
            stackfile,
        },
        env: template_env(record),
    }
}

/// Variables the stack references, then declared ones it does not
fn template_env(record: &AppRecord) -> Vec<TemplateEnv> {
    let mut env: Vec<TemplateEnv> = Vec::new();

    for svc in record.compose.iter_services() {
        for entry in svc.environment() {
            for name in entry.referenced_variables() {
                if env.iter().any(|e| e.name == name) {
                    continue;
                }
                let decl = record.env_decl(&name);
                env.push(TemplateEnv {
                    label: name.clone(),
                    default: decl
                        .and_then(|d| d.default.clone())
                        .or_else(|| entry.literal_default()),
                    description: decl.and_then(|d| d.description.clone()),
                    name,
                });
            }
        }
    }

    for decl in &record.deployment.environment_variables {
        if env.iter().any(|e| e.name == decl.name) {
            continue;
        }
        env.push(TemplateEnv {
            name: decl.name.clone(),
            label: decl.name.clone(),
            default: decl.default.clone(),
            description: decl.description.clone(),
        });
    }

    env
}
