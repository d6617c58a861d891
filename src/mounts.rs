// src/mounts.rs

//! Volume normalization
//!
//! Turns the volume entries of a compose service into the mount sources a
//! platform expects. Two conventions exist:
//!
//! - `Flatten`: named volumes and relative binds become sub-directories of a
//!   data-root placeholder (`${APP_DATA_DIR}`, `/DATA/AppData/$AppID`).
//!   Named volume `myapp_data_config` of record `myapp` lands at
//!   `<root>/data/config` unless `volume_mappings` overrides the fragment.
//! - `Namespace`: named volumes stay named but are prefixed with the record id
//!   so stacks from different apps never share a volume.
//!
//! Absolute binds and anonymous volumes pass through untouched.

use crate::record::{VolumeEntry, VolumeSource};
use serde_yaml::{Mapping, Value};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MountError {
    #[error("Volume '{name}' is neither a declared named volume nor a bind path")]
    UndeclaredVolume { name: String },

    #[error("Volume '{name}' resolves to an empty path fragment")]
    EmptyFragment { name: String },

    #[error("Unsupported volume entry in service '{service}': {entry}")]
    Unsupported { service: String, entry: String },
}

/// Platform mount convention
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountConvention {
    Flatten { root: String },
    Namespace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountKind {
    Bind,
    Named,
    Anonymous,
}

/// A volume entry after platform resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMount {
    /// Host path or volume name; `None` for anonymous volumes
    pub source: Option<String>,
    pub target: String,
    pub mode: Option<String>,
    pub kind: MountKind,
}

impl ResolvedMount {
    /// Compose short syntax `src:dst[:mode]`
    pub fn to_short_syntax(&self) -> String {
        let mut s = match &self.source {
            Some(src) => format!("{}:{}", src, self.target),
            None => self.target.clone(),
        };
        if let Some(mode) = &self.mode {
            s.push(':');
            s.push_str(mode);
        }
        s
    }
}

/// Derive the path fragment of a named volume
///
/// Override first (verbatim), else strip the `<id>_` prefix and turn the
/// remaining underscores into path separators.
pub fn volume_fragment(
    name: &str,
    record_id: &str,
    overrides: &BTreeMap<String, String>,
) -> Result<String, MountError> {
    let fragment = match overrides.get(name) {
        Some(fragment) => fragment.trim_matches('/').to_string(),
        None => strip_record_prefix(name, record_id).replace('_', "/"),
    };

    if fragment.trim().is_empty() {
        return Err(MountError::EmptyFragment {
            name: name.to_string(),
        });
    }
    Ok(fragment)
}

fn strip_record_prefix<'a>(name: &'a str, record_id: &str) -> &'a str {
    let underscored = record_id.replace('-', "_");
    for prefix in [record_id, underscored.as_str()] {
        if let Some(rest) = name.strip_prefix(prefix).and_then(|r| r.strip_prefix('_'))
            && !rest.is_empty()
        {
            return rest;
        }
    }
    name
}

/// Namespaced name of a named volume (`<id>_<name>`)
pub fn namespaced_volume(name: &str, record_id: &str) -> String {
    let underscored = record_id.replace('-', "_");
    if name.starts_with(&format!("{record_id}_")) || name.starts_with(&format!("{underscored}_")) {
        name.to_string()
    } else {
        format!("{record_id}_{name}")
    }
}

/// Resolve one volume entry for a platform convention
pub fn normalize(
    entry: &VolumeEntry,
    named_volumes: &BTreeSet<String>,
    overrides: &BTreeMap<String, String>,
    convention: &MountConvention,
    record_id: &str,
) -> Result<ResolvedMount, MountError> {
    let (source, kind) = match &entry.source {
        VolumeSource::Anonymous => (None, MountKind::Anonymous),
        VolumeSource::AbsolutePath(path) => (Some(path.clone()), MountKind::Bind),
        VolumeSource::RelativePath(path) => match convention {
            MountConvention::Namespace => (Some(path.clone()), MountKind::Bind),
            MountConvention::Flatten { root } => {
                let segment = relative_segment(path);
                if segment.is_empty() {
                    return Err(MountError::EmptyFragment { name: path.clone() });
                }
                (Some(join_root(root, segment)), MountKind::Bind)
            }
        },
        VolumeSource::Named(name) => {
            if !named_volumes.contains(name) {
                return Err(MountError::UndeclaredVolume { name: name.clone() });
            }
            match convention {
                MountConvention::Namespace => {
                    (Some(namespaced_volume(name, record_id)), MountKind::Named)
                }
                MountConvention::Flatten { root } => {
                    let fragment = volume_fragment(name, record_id, overrides)?;
                    (Some(join_root(root, &fragment)), MountKind::Bind)
                }
            }
        }
    };

    Ok(ResolvedMount {
        source,
        target: entry.target.clone(),
        mode: entry.mode.clone(),
        kind,
    })
}

/// `./a/b` -> `a/b`, `../a` -> `a`
fn relative_segment(path: &str) -> &str {
    let mut rest = path;
    loop {
        if let Some(r) = rest.strip_prefix("./") {
            rest = r;
        } else if let Some(r) = rest.strip_prefix("../") {
            rest = r;
        } else if rest == "." || rest == ".." {
            return "";
        } else {
            return rest.trim_end_matches('/');
        }
    }
}

fn join_root(root: &str, fragment: &str) -> String {
    format!("{}/{}", root.trim_end_matches('/'), fragment.trim_start_matches('/'))
}

/// Rewrite the `volumes` list of a service mapping in place
///
/// Short entries stay short; long-form entries keep their keys with `source`
/// replaced (and `type: bind` when a named volume became a path).
pub fn rewrite_service_volumes(
    service_name: &str,
    service: &mut Mapping,
    named_volumes: &BTreeSet<String>,
    overrides: &BTreeMap<String, String>,
    convention: &MountConvention,
    record_id: &str,
) -> Result<Vec<ResolvedMount>, MountError> {
    let Some(Value::Sequence(entries)) = service.get_mut("volumes") else {
        return Ok(Vec::new());
    };

    let mut resolved = Vec::with_capacity(entries.len());
    for value in entries.iter_mut() {
        let entry = VolumeEntry::parse(value).ok_or_else(|| MountError::Unsupported {
            service: service_name.to_string(),
            entry: serde_yaml::to_string(value).unwrap_or_default().trim().to_string(),
        })?;
        let mount = normalize(&entry, named_volumes, overrides, convention, record_id)?;

        *value = match entry.long_form {
            None => Value::String(mount.to_short_syntax()),
            Some(mut long) => {
                if let Some(source) = &mount.source {
                    long.insert("source".into(), Value::String(source.clone()));
                }
                if mount.kind == MountKind::Bind {
                    long.insert("type".into(), Value::String("bind".to_string()));
                }
                Value::Mapping(long)
            }
        };
        resolved.push(mount);
    }
    Ok(resolved)
}

/// Rewrite the top-level `volumes` declarations to match the convention
///
/// `Flatten` drops them (every named volume became a bind path);
/// `Namespace` renames each key in place.
pub fn rewrite_top_level_volumes(doc: &mut Mapping, convention: &MountConvention, record_id: &str) {
    match convention {
        MountConvention::Flatten { .. } => {
            doc.shift_remove("volumes");
        }
        MountConvention::Namespace => {
            let Some(Value::Mapping(volumes)) = doc.get_mut("volumes") else {
                return;
            };
            let renamed: Mapping = std::mem::take(volumes)
                .into_iter()
                .map(|(k, v)| match k.as_str() {
                    Some(name) => (Value::String(namespaced_volume(name, record_id)), v),
                    None => (k, v),
                })
                .collect();
            *volumes = renamed;
        }
    }
}

/// Rewrite every service and the top-level declarations of a compose document
pub fn rewrite_document(
    doc: &mut Mapping,
    overrides: &BTreeMap<String, String>,
    convention: &MountConvention,
    record_id: &str,
) -> Result<Vec<ResolvedMount>, MountError> {
    let named_volumes: BTreeSet<String> = doc
        .get("volumes")
        .and_then(Value::as_mapping)
        .map(|v| v.keys().filter_map(|k| k.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    let mut all = Vec::new();
    if let Some(Value::Mapping(services)) = doc.get_mut("services") {
        for (name, body) in services.iter_mut() {
            let Some(body) = body.as_mapping_mut() else {
                continue;
            };
            let name = name.as_str().unwrap_or_default().to_string();
            all.extend(rewrite_service_volumes(
                &name,
                body,
                &named_volumes,
                overrides,
                convention,
                record_id,
            )?);
        }
    }

    rewrite_top_level_volumes(doc, convention, record_id);
    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flatten() -> MountConvention {
        MountConvention::Flatten {
            root: "${APP_DATA_DIR}".to_string(),
        }
    }

    fn named(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_fragment_strips_prefix_and_segments() {
        let none = BTreeMap::new();
        assert_eq!(volume_fragment("myapp_data_config", "myapp", &none).unwrap(), "data/config");
        assert_eq!(volume_fragment("my_app_data", "my-app", &none).unwrap(), "data");
        assert_eq!(volume_fragment("config", "myapp", &none).unwrap(), "config");
        assert_eq!(volume_fragment("myapp", "myapp", &none).unwrap(), "myapp");
        assert_eq!(volume_fragment("other_cache", "myapp", &none).unwrap(), "other/cache");
    }

    #[test]
    fn test_fragment_override_wins() {
        let overrides = BTreeMap::from([("myapp_data_config".to_string(), "cfg".to_string())]);
        assert_eq!(volume_fragment("myapp_data_config", "myapp", &overrides).unwrap(), "cfg");
    }

    #[test]
    fn test_empty_override_fails_loudly() {
        let overrides = BTreeMap::from([("myapp_data".to_string(), "/".to_string())]);
        assert_eq!(
            volume_fragment("myapp_data", "myapp", &overrides),
            Err(MountError::EmptyFragment {
                name: "myapp_data".to_string()
            })
        );
    }

    #[test]
    fn test_named_volume_round_trip_for_flatten() {
        let entry = VolumeEntry::parse_short("myapp_data_config:/config").unwrap();
        let vols = named(&["myapp_data_config"]);

        let mount = normalize(&entry, &vols, &BTreeMap::new(), &flatten(), "myapp").unwrap();
        assert_eq!(mount.source.as_deref(), Some("${APP_DATA_DIR}/data/config"));
        assert_eq!(mount.target, "/config");
        assert_eq!(mount.kind, MountKind::Bind);

        let overrides = BTreeMap::from([("myapp_data_config".to_string(), "cfg".to_string())]);
        let mount = normalize(&entry, &vols, &overrides, &flatten(), "myapp").unwrap();
        assert_eq!(mount.to_short_syntax(), "${APP_DATA_DIR}/cfg:/config");
    }

    #[test]
    fn test_relative_bind_under_flatten() {
        let entry = VolumeEntry::parse_short("./data:/data:ro").unwrap();
        let mount = normalize(&entry, &named(&[]), &BTreeMap::new(), &flatten(), "demo").unwrap();
        assert_eq!(mount.to_short_syntax(), "${APP_DATA_DIR}/data:/data:ro");

        let entry = VolumeEntry::parse_short("./:/data").unwrap();
        assert!(matches!(
            normalize(&entry, &named(&[]), &BTreeMap::new(), &flatten(), "demo"),
            Err(MountError::EmptyFragment { .. })
        ));
    }

    #[test]
    fn test_passthrough_entries() {
        let vols = named(&[]);
        let none = BTreeMap::new();

        let abs = VolumeEntry::parse_short("/var/run/docker.sock:/var/run/docker.sock").unwrap();
        let mount = normalize(&abs, &vols, &none, &flatten(), "demo").unwrap();
        assert_eq!(mount.source.as_deref(), Some("/var/run/docker.sock"));

        let rel = VolumeEntry::parse_short("./data:/data").unwrap();
        let mount = normalize(&rel, &vols, &none, &MountConvention::Namespace, "demo").unwrap();
        assert_eq!(mount.source.as_deref(), Some("./data"));

        let anon = VolumeEntry::parse_short("/cache").unwrap();
        let mount = normalize(&anon, &vols, &none, &flatten(), "demo").unwrap();
        assert_eq!(mount.to_short_syntax(), "/cache");
    }

    #[test]
    fn test_namespace_prefixes_once() {
        let vols = named(&["data", "demo_cache"]);
        let none = BTreeMap::new();
        let a = VolumeEntry::parse_short("data:/data").unwrap();
        let b = VolumeEntry::parse_short("demo_cache:/cache").unwrap();
        let ns = MountConvention::Namespace;
        assert_eq!(normalize(&a, &vols, &none, &ns, "demo").unwrap().source.as_deref(), Some("demo_data"));
        assert_eq!(normalize(&b, &vols, &none, &ns, "demo").unwrap().source.as_deref(), Some("demo_cache"));
    }

    #[test]
    fn test_undeclared_named_volume() {
        let entry = VolumeEntry::parse_short("ghost:/data").unwrap();
        assert_eq!(
            normalize(&entry, &named(&[]), &BTreeMap::new(), &flatten(), "demo"),
            Err(MountError::UndeclaredVolume {
                name: "ghost".to_string()
            })
        );
    }

    #[test]
    fn test_rewrite_document_flatten() {
        let mut doc: Mapping = serde_yaml::from_str(
            r#"
services:
  app:
    image: x
    volumes:
      - demo_data:/data
      - type: volume
        source: demo_media
        target: /media
volumes:
  demo_data: {}
  demo_media: {}
"#,
        )
        .unwrap();

        let mounts = rewrite_document(&mut doc, &BTreeMap::new(), &flatten(), "demo").unwrap();
        assert_eq!(mounts.len(), 2);
        assert!(doc.get("volumes").is_none());

        let vols = doc["services"]["app"]["volumes"].as_sequence().unwrap();
        assert_eq!(vols[0].as_str(), Some("${APP_DATA_DIR}/data:/data"));
        assert_eq!(vols[1]["source"].as_str(), Some("${APP_DATA_DIR}/media"));
        assert_eq!(vols[1]["type"].as_str(), Some("bind"));
    }

    #[test]
    fn test_rewrite_document_namespace() {
        let mut doc: Mapping = serde_yaml::from_str(
            r#"
services:
  app:
    image: x
    volumes:
      - data:/data
volumes:
  data:
    driver: local
"#,
        )
        .unwrap();

        rewrite_document(&mut doc, &BTreeMap::new(), &MountConvention::Namespace, "demo").unwrap();
        assert_eq!(doc["services"]["app"]["volumes"][0].as_str(), Some("demo_data:/data"));
        let top = doc["volumes"].as_mapping().unwrap();
        assert!(top.contains_key("demo_data"));
        assert_eq!(top["demo_data"]["driver"].as_str(), Some("local"));
    }
}
