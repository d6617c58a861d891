// src/record/compose.rs

//! Live compose document access
//!
//! The compose file is kept as an ordered YAML mapping so that emitters can
//! rewrite it without dropping keys this crate does not model. The typed
//! accessors here (`ServiceView`, `VolumeEntry`, `PortMapping`,
//! `EnvironmentEntry`) read both the short and long compose syntaxes.

use serde_yaml::{Mapping, Value};
use std::collections::BTreeSet;

/// Parsed compose document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Compose {
    doc: Mapping,
}

impl Compose {
    /// Parse a compose document; the root must be a mapping
    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        let doc: Mapping = serde_yaml::from_str(content)?;
        Ok(Self { doc })
    }

    pub fn from_mapping(doc: Mapping) -> Self {
        Self { doc }
    }

    pub fn document(&self) -> &Mapping {
        &self.doc
    }

    /// Owned copy of the document for emitters to rewrite
    pub fn to_mapping(&self) -> Mapping {
        self.doc.clone()
    }

    pub fn services(&self) -> Option<&Mapping> {
        self.doc.get("services").and_then(Value::as_mapping)
    }

    pub fn has_services(&self) -> bool {
        self.services().is_some_and(|s| !s.is_empty())
    }

    /// Service names in declaration order
    pub fn service_names(&self) -> Vec<String> {
        self.services()
            .map(|s| {
                s.keys()
                    .filter_map(|k| k.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn service(&self, name: &str) -> Option<ServiceView<'_>> {
        let (key, body) = self
            .services()?
            .iter()
            .find(|(k, _)| k.as_str() == Some(name))?;
        Some(ServiceView {
            name: key.as_str()?,
            body: body.as_mapping()?,
        })
    }

    /// Services in declaration order
    pub fn iter_services(&self) -> impl Iterator<Item = ServiceView<'_>> {
        self.services().into_iter().flat_map(|services| {
            services.iter().filter_map(|(k, v)| {
                Some(ServiceView {
                    name: k.as_str()?,
                    body: v.as_mapping()?,
                })
            })
        })
    }

    /// Top-level named volume declarations
    pub fn named_volumes(&self) -> BTreeSet<String> {
        self.doc
            .get("volumes")
            .and_then(Value::as_mapping)
            .map(|v| {
                v.keys()
                    .filter_map(|k| k.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// `preferred` when it names a declared service, else the first service
    pub fn resolve_main_service(&self, preferred: Option<&str>) -> Option<String> {
        let names = self.service_names();
        if let Some(p) = preferred
            && names.iter().any(|n| n == p)
        {
            return Some(p.to_string());
        }
        names.into_iter().next()
    }
}

/// Borrowed view of one service definition
#[derive(Debug, Clone, Copy)]
pub struct ServiceView<'a> {
    name: &'a str,
    body: &'a Mapping,
}

impl<'a> ServiceView<'a> {
    pub fn name(&self) -> &'a str {
        self.name
    }

    pub fn body(&self) -> &'a Mapping {
        self.body
    }

    pub fn image(&self) -> Option<&'a str> {
        self.body.get("image").and_then(Value::as_str)
    }

    pub fn environment(&self) -> Vec<EnvironmentEntry> {
        self.body
            .get("environment")
            .map(EnvironmentEntry::parse_all)
            .unwrap_or_default()
    }

    pub fn volumes(&self) -> Vec<VolumeEntry> {
        self.body
            .get("volumes")
            .and_then(Value::as_sequence)
            .map(|seq| seq.iter().filter_map(VolumeEntry::parse).collect())
            .unwrap_or_default()
    }

    pub fn ports(&self) -> Vec<PortMapping> {
        self.body
            .get("ports")
            .and_then(Value::as_sequence)
            .map(|seq| seq.iter().filter_map(PortMapping::parse).collect())
            .unwrap_or_default()
    }

    pub fn network_mode(&self) -> Option<&'a str> {
        self.body.get("network_mode").and_then(Value::as_str)
    }

    pub fn uses_host_network(&self) -> bool {
        self.network_mode() == Some("host")
    }

    /// Attached networks (list or map form)
    pub fn networks(&self) -> Vec<String> {
        match self.body.get("networks") {
            Some(Value::Sequence(seq)) => seq
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Some(Value::Mapping(map)) => map
                .keys()
                .filter_map(|k| k.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// One environment variable of a service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentEntry {
    pub name: String,
    pub value: Option<String>,
}

impl EnvironmentEntry {
    /// Read array-of-`KEY=VALUE` or map form
    pub fn parse_all(value: &Value) -> Vec<EnvironmentEntry> {
        match value {
            Value::Sequence(seq) => seq
                .iter()
                .filter_map(|item| {
                    let text = scalar_to_string(item)?;
                    let (name, value) = match text.split_once('=') {
                        Some((k, v)) => (k.trim().to_string(), Some(v.to_string())),
                        None => (text.trim().to_string(), None),
                    };
                    (!name.is_empty()).then_some(EnvironmentEntry { name, value })
                })
                .collect(),
            Value::Mapping(map) => map
                .iter()
                .filter_map(|(k, v)| {
                    Some(EnvironmentEntry {
                        name: k.as_str()?.to_string(),
                        value: scalar_to_string(v),
                    })
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Variables referenced as `${NAME}` / `${NAME:-default}` in the value
    pub fn referenced_variables(&self) -> Vec<String> {
        let Some(value) = &self.value else {
            return Vec::new();
        };
        let mut vars = Vec::new();
        let mut rest = value.as_str();
        while let Some(start) = rest.find("${") {
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else { break };
            let inner = &after[..end];
            let name: String = inner
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
                .collect();
            if !name.is_empty() && !vars.contains(&name) {
                vars.push(name);
            }
            rest = &after[end + 1..];
        }
        vars
    }

    /// Literal value, or the `:-` default of a single variable reference
    pub fn literal_default(&self) -> Option<String> {
        let value = self.value.as_ref()?;
        if let Some(inner) = value.strip_prefix("${").and_then(|v| v.strip_suffix('}')) {
            return inner.split_once(":-").map(|(_, d)| d.to_string());
        }
        if value.contains("${") {
            return None;
        }
        Some(value.clone())
    }
}

/// Where a volume entry gets its data from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeSource {
    /// `/abs/path`, `~/path` or `${VAR}/path`
    AbsolutePath(String),
    /// `./path` or `../path`
    RelativePath(String),
    /// Logical name declared under top-level `volumes`
    Named(String),
    /// Container path only
    Anonymous,
}

/// One entry of a service `volumes` list
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeEntry {
    pub source: VolumeSource,
    pub target: String,
    /// Mode flags (`ro`, `rw,z`, ...) from short syntax or `read_only`
    pub mode: Option<String>,
    /// Long-form mapping as written, kept for in-place rewriting
    pub long_form: Option<Mapping>,
}

impl VolumeEntry {
    pub fn parse(value: &Value) -> Option<VolumeEntry> {
        match value {
            Value::String(s) => Self::parse_short(s),
            Value::Mapping(m) => Self::parse_long(m),
            _ => None,
        }
    }

    /// `src:dst[:mode]` or a bare container path
    pub fn parse_short(s: &str) -> Option<VolumeEntry> {
        let parts: Vec<&str> = s.split(':').collect();
        let (source, target, mode) = match parts.as_slice() {
            [target] => (None, *target, None),
            [source, target] => (Some(*source), *target, None),
            [source, target, mode] => (Some(*source), *target, Some(*mode)),
            _ => return None,
        };
        if target.is_empty() {
            return None;
        }
        Some(VolumeEntry {
            source: source.map_or(VolumeSource::Anonymous, classify_source),
            target: target.to_string(),
            mode: mode.filter(|m| !m.is_empty()).map(str::to_string),
            long_form: None,
        })
    }

    fn parse_long(m: &Mapping) -> Option<VolumeEntry> {
        let target = m.get("target").and_then(Value::as_str)?.to_string();
        let kind = m.get("type").and_then(Value::as_str);
        let source = match m.get("source").and_then(Value::as_str) {
            None | Some("") => VolumeSource::Anonymous,
            Some(s) if kind == Some("volume") => VolumeSource::Named(s.to_string()),
            Some(s) => classify_source(s),
        };
        let mode = m
            .get("read_only")
            .and_then(Value::as_bool)
            .filter(|ro| *ro)
            .map(|_| "ro".to_string());
        Some(VolumeEntry {
            source,
            target,
            mode,
            long_form: Some(m.clone()),
        })
    }
}

fn classify_source(s: &str) -> VolumeSource {
    if s.starts_with('/') || s.starts_with('~') || s.starts_with('$') {
        VolumeSource::AbsolutePath(s.to_string())
    } else if s == "." || s == ".." || s.starts_with("./") || s.starts_with("../") {
        VolumeSource::RelativePath(s.to_string())
    } else {
        VolumeSource::Named(s.to_string())
    }
}

/// One entry of a service `ports` list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMapping {
    pub host_ip: Option<String>,
    pub host: Option<String>,
    pub container: String,
    pub protocol: Option<String>,
}

impl PortMapping {
    pub fn parse(value: &Value) -> Option<PortMapping> {
        match value {
            Value::Mapping(m) => {
                let container = m.get("target").and_then(scalar_to_string)?;
                Some(PortMapping {
                    host_ip: m.get("host_ip").and_then(scalar_to_string),
                    host: m.get("published").and_then(scalar_to_string),
                    container,
                    protocol: m.get("protocol").and_then(scalar_to_string),
                })
            }
            other => Self::parse_short(&scalar_to_string(other)?),
        }
    }

    /// `[ip:]host:container[/proto]` or a bare container port
    pub fn parse_short(s: &str) -> Option<PortMapping> {
        let (spec, protocol) = match s.rsplit_once('/') {
            Some((spec, proto)) => (spec, Some(proto.to_string())),
            None => (s, None),
        };
        let parts: Vec<&str> = spec.split(':').collect();
        let (host_ip, host, container) = match parts.len() {
            0 => return None,
            1 => (None, None, parts[0]),
            2 => (None, Some(parts[0]), parts[1]),
            n => (
                Some(parts[..n - 2].join(":")),
                Some(parts[n - 2]),
                parts[n - 1],
            ),
        };
        if container.is_empty() {
            return None;
        }
        Some(PortMapping {
            host_ip,
            host: host.filter(|h| !h.is_empty()).map(str::to_string),
            container: container.to_string(),
            protocol,
        })
    }

    /// First port of the container side (ranges resolve to their start)
    pub fn container_port(&self) -> Option<u16> {
        first_port(&self.container)
    }

    pub fn host_port(&self) -> Option<u16> {
        self.host.as_deref().and_then(first_port)
    }

    /// Short syntax with a replaced host port
    pub fn with_host(&self, host: u16) -> String {
        let mut s = String::new();
        if let Some(ip) = &self.host_ip {
            s.push_str(ip);
            s.push(':');
        }
        s.push_str(&format!("{}:{}", host, self.container));
        if let Some(proto) = &self.protocol {
            s.push('/');
            s.push_str(proto);
        }
        s
    }
}

fn first_port(s: &str) -> Option<u16> {
    s.split('-').next()?.trim().parse().ok()
}

pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
