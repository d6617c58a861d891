// src/record/mod.rs

//! Universal app record
//!
//! One record per self-hosted application: a JSON metadata document
//! (`app.json`) plus the compose document it points at. Records are read-only
//! during conversion; every platform artifact is derived from them.

pub mod compose;
mod de;
pub mod loader;

pub use compose::{
    Compose, EnvironmentEntry, PortMapping, ServiceView, VolumeEntry, VolumeSource,
};
pub use loader::{LoadError, discover_records, load_record, load_record_from_dir};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Target platforms, in the order they are converted
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    CasaOs,
    Portainer,
    Runtipi,
    Dockge,
    Cosmos,
    Umbrel,
}

impl Platform {
    pub const ALL: [Platform; 6] = [
        Platform::CasaOs,
        Platform::Portainer,
        Platform::Runtipi,
        Platform::Dockge,
        Platform::Cosmos,
        Platform::Umbrel,
    ];

    /// Key used in `compatibility` blocks and as the output directory name
    pub fn key(&self) -> &'static str {
        match self {
            Self::CasaOs => "casaos",
            Self::Portainer => "portainer",
            Self::Runtipi => "runtipi",
            Self::Dockge => "dockge",
            Self::Cosmos => "cosmos",
            Self::Umbrel => "umbrel",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::CasaOs => "CasaOS",
            Self::Portainer => "Portainer",
            Self::Runtipi => "Runtipi",
            Self::Dockge => "Dockge",
            Self::Cosmos => "Cosmos",
            Self::Umbrel => "Umbrel",
        }
    }

    /// Parse a comma separated platform list; `all` selects every platform
    pub fn parse_list(s: &str) -> Result<Vec<Platform>, String> {
        let mut platforms = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            if part.eq_ignore_ascii_case("all") {
                return Ok(Self::ALL.to_vec());
            }
            let platform: Platform = part.parse()?;
            if !platforms.contains(&platform) {
                platforms.push(platform);
            }
        }
        platforms.sort();
        Ok(platforms)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "casaos" | "casa" => Ok(Self::CasaOs),
            "portainer" => Ok(Self::Portainer),
            "runtipi" | "tipi" => Ok(Self::Runtipi),
            "dockge" => Ok(Self::Dockge),
            "cosmos" | "cosmos-server" => Ok(Self::Cosmos),
            "umbrel" | "umbrelos" => Ok(Self::Umbrel),
            _ => Err(format!("Unknown platform: {}", s)),
        }
    }
}

/// Target CPU architectures
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    Amd64,
    Arm64,
    Armv7,
    Armv6,
    I386,
    Ppc64le,
    S390x,
}

impl Architecture {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Amd64 => "amd64",
            Self::Arm64 => "arm64",
            Self::Armv7 => "armv7",
            Self::Armv6 => "armv6",
            Self::I386 => "i386",
            Self::Ppc64le => "ppc64le",
            Self::S390x => "s390x",
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Catalog category
///
/// Unknown categories load as `Other` so a new label never fails a record.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    Media,
    Productivity,
    Development,
    #[default]
    Utilities,
    Networking,
    Security,
    HomeAutomation,
    Finance,
    Social,
    Communication,
    Gaming,
    Ai,
    Storage,
    Monitoring,
    Other(String),
}

impl Category {
    /// Human readable label (CasaOS, Portainer)
    pub fn label(&self) -> &str {
        match self {
            Self::Media => "Media",
            Self::Productivity => "Productivity",
            Self::Development => "Development",
            Self::Utilities => "Utilities",
            Self::Networking => "Networking",
            Self::Security => "Security",
            Self::HomeAutomation => "Home Automation",
            Self::Finance => "Finance",
            Self::Social => "Social",
            Self::Communication => "Communication",
            Self::Gaming => "Gaming",
            Self::Ai => "AI",
            Self::Storage => "Storage",
            Self::Monitoring => "Monitoring",
            Self::Other(s) => s,
        }
    }

    /// Runtipi category slug
    pub fn runtipi_slug(&self) -> &'static str {
        match self {
            Self::Media => "media",
            Self::Productivity | Self::Communication => "utilities",
            Self::Development => "development",
            Self::Utilities | Self::Other(_) => "utilities",
            Self::Networking => "network",
            Self::Security => "security",
            Self::HomeAutomation => "automation",
            Self::Finance => "finance",
            Self::Social => "social",
            Self::Gaming => "gaming",
            Self::Ai => "ai",
            Self::Storage => "data",
            Self::Monitoring => "utilities",
        }
    }

    /// Umbrel category slug
    pub fn umbrel_slug(&self) -> &'static str {
        match self {
            Self::Media => "media",
            Self::Productivity | Self::Communication => "productivity",
            Self::Development => "developer",
            Self::Utilities | Self::Monitoring | Self::Other(_) => "utilities",
            Self::Networking | Self::Security => "networking",
            Self::HomeAutomation => "automation",
            Self::Finance => "finance",
            Self::Social => "social",
            Self::Gaming => "gaming",
            Self::Ai => "ai",
            Self::Storage => "files",
        }
    }
}

impl From<String> for Category {
    fn from(s: String) -> Self {
        let normalized: String = s
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        match normalized.as_str() {
            "media" | "multimedia" | "photos" | "music" => Self::Media,
            "productivity" => Self::Productivity,
            "development" | "developer" | "developertools" => Self::Development,
            "utilities" | "utility" | "tools" => Self::Utilities,
            "networking" | "network" => Self::Networking,
            "security" => Self::Security,
            "homeautomation" | "automation" | "smarthome" => Self::HomeAutomation,
            "finance" | "crypto" => Self::Finance,
            "social" => Self::Social,
            "communication" | "chat" => Self::Communication,
            "gaming" | "games" => Self::Gaming,
            "ai" | "machinelearning" => Self::Ai,
            "storage" | "files" | "backup" | "data" => Self::Storage,
            "monitoring" | "dashboard" => Self::Monitoring,
            _ => Self::Other(s),
        }
    }
}

impl From<Category> for String {
    fn from(c: Category) -> Self {
        c.label().to_string()
    }
}

/// Complete app record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppRecord {
    #[serde(default)]
    pub metadata: Metadata,

    #[serde(default)]
    pub visual: Visual,

    #[serde(default)]
    pub resources: Resources,

    #[serde(default)]
    pub technical: Technical,

    #[serde(default)]
    pub deployment: Deployment,

    /// Per-platform settings keyed by [`Platform::key`]
    #[serde(default)]
    pub compatibility: BTreeMap<String, PlatformCompat>,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Parsed compose document; loaded from `technical.compose_file`
    #[serde(skip)]
    pub compose: Compose,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tagline: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub developer: String,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub updated: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Visual {
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub screenshots: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Resources {
    #[serde(default)]
    pub documentation: Option<String>,
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub issues: Option<String>,
    #[serde(default)]
    pub support: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Technical {
    #[serde(default)]
    pub architectures: Vec<Architecture>,
    #[serde(default)]
    pub main_service: Option<String>,
    #[serde(default, deserialize_with = "de::opt_port")]
    pub default_port: Option<u16>,
    #[serde(default)]
    pub main_image: String,
    #[serde(default = "default_compose_file")]
    pub compose_file: String,
}

impl Default for Technical {
    fn default() -> Self {
        Self {
            architectures: Vec::new(),
            main_service: None,
            default_port: None,
            main_image: String::new(),
            compose_file: default_compose_file(),
        }
    }
}

fn default_compose_file() -> String {
    "docker-compose.yml".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Deployment {
    #[serde(default)]
    pub environment_variables: Vec<EnvVarDecl>,
    #[serde(default)]
    pub volumes: Vec<VolumeDecl>,
    #[serde(default)]
    pub ports: Vec<PortDecl>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvVarDecl {
    pub name: String,
    #[serde(default, deserialize_with = "de::opt_stringly")]
    pub default: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VolumeDecl {
    pub container: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortDecl {
    #[serde(deserialize_with = "de::stringly")]
    pub container: String,
    #[serde(default, deserialize_with = "de::opt_stringly")]
    pub host: Option<String>,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Per-platform compatibility block
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformCompat {
    #[serde(default = "de::default_true")]
    pub supported: bool,

    /// Host port override, used verbatim
    #[serde(default, deserialize_with = "de::opt_port")]
    pub port: Option<u16>,

    /// Output directory name override (never the catalog join key)
    #[serde(default)]
    pub folder_name: Option<String>,

    /// Named volume -> destination fragment, bypassing derivation
    #[serde(default)]
    pub volume_mappings: BTreeMap<String, String>,

    /// Platform specific extras (youtube, default_username, ...)
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PlatformCompat {
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(|v| v.as_str())
    }
}

impl AppRecord {
    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    pub fn compat(&self, platform: Platform) -> Option<&PlatformCompat> {
        self.compatibility.get(platform.key())
    }

    /// A platform is supported only when its compatibility block says so
    pub fn supports(&self, platform: Platform) -> bool {
        self.compat(platform).is_some_and(|c| c.supported)
    }

    /// Output directory name for `platform`
    pub fn folder_name(&self, platform: Platform) -> &str {
        self.compat(platform)
            .and_then(|c| c.folder_name.as_deref())
            .filter(|f| !f.trim().is_empty())
            .unwrap_or(&self.metadata.id)
    }

    pub fn port_override(&self, platform: Platform) -> Option<u16> {
        self.compat(platform).and_then(|c| c.port)
    }

    pub fn volume_overrides(&self, platform: Platform) -> BTreeMap<String, String> {
        self.compat(platform)
            .map(|c| c.volume_mappings.clone())
            .unwrap_or_default()
    }

    /// Display name, falling back to the id
    pub fn display_name(&self) -> &str {
        if self.metadata.name.is_empty() {
            &self.metadata.id
        } else {
            &self.metadata.name
        }
    }

    /// Tagline, falling back to the first sentence of the description
    pub fn short_description(&self) -> String {
        if !self.metadata.tagline.is_empty() {
            return self.metadata.tagline.clone();
        }
        self.metadata
            .description
            .split_terminator(". ")
            .next()
            .unwrap_or_default()
            .trim_end_matches('.')
            .to_string()
    }

    /// Name of the main compose service
    ///
    /// `technical.main_service` when it names a declared service, otherwise
    /// the first declared service.
    pub fn main_service(&self) -> Option<String> {
        self.compose
            .resolve_main_service(self.technical.main_service.as_deref())
    }

    pub fn env_description(&self, name: &str) -> Option<&str> {
        self.deployment
            .environment_variables
            .iter()
            .find(|e| e.name == name)
            .and_then(|e| e.description.as_deref())
    }

    pub fn env_decl(&self, name: &str) -> Option<&EnvVarDecl> {
        self.deployment
            .environment_variables
            .iter()
            .find(|e| e.name == name)
    }

    pub fn volume_description(&self, container_path: &str) -> Option<&str> {
        self.deployment
            .volumes
            .iter()
            .find(|v| v.container.trim_end_matches('/') == container_path.trim_end_matches('/'))
            .and_then(|v| v.description.as_deref())
    }

    pub fn port_description(&self, container_port: &str) -> Option<&str> {
        self.deployment
            .ports
            .iter()
            .find(|p| p.container == container_port)
            .and_then(|p| p.description.as_deref())
    }

    /// Primary `(container_port, requested_host_port)` pair
    ///
    /// Taken from the main service's first published port; falls back to
    /// `technical.default_port` for both sides.
    pub fn primary_port(&self) -> Option<(u16, u16)> {
        let from_compose = self
            .main_service()
            .and_then(|name| self.compose.service(&name))
            .and_then(|svc| {
                svc.ports()
                    .into_iter()
                    .find_map(|p| p.container_port().map(|c| (c, p.host_port().unwrap_or(c))))
            });

        from_compose.or_else(|| self.technical.default_port.map(|p| (p, p)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_roundtrip_names() {
        for platform in Platform::ALL {
            assert_eq!(platform.key().parse::<Platform>().unwrap(), platform);
        }
        assert!("yunohost".parse::<Platform>().is_err());
    }

    #[test]
    fn test_parse_platform_list() {
        let list = Platform::parse_list("umbrel, casaos,umbrel").unwrap();
        assert_eq!(list, vec![Platform::CasaOs, Platform::Umbrel]);
        assert_eq!(Platform::parse_list("all").unwrap().len(), 6);
        assert!(Platform::parse_list("casaos,bogus").is_err());
    }

    #[test]
    fn test_category_from_string() {
        assert_eq!(Category::from("Home Automation".to_string()), Category::HomeAutomation);
        assert_eq!(Category::from("media".to_string()), Category::Media);
        assert_eq!(
            Category::from("Weird Stuff".to_string()),
            Category::Other("Weird Stuff".to_string())
        );
        assert_eq!(Category::Other("Weird Stuff".to_string()).label(), "Weird Stuff");
        assert_eq!(Category::Storage.umbrel_slug(), "files");
        assert_eq!(Category::Networking.runtipi_slug(), "network");
    }

    #[test]
    fn test_compat_defaults() {
        let json = r#"{
            "metadata": {"id": "demo", "version": "1.0.0"},
            "technical": {"main_image": "org/demo", "default_port": "8080"},
            "compatibility": {
                "umbrel": {"port": 10123, "folder_name": "demo-app", "youtube": "https://y"},
                "cosmos": {"supported": false}
            }
        }"#;
        let record: AppRecord = serde_json::from_str(json).unwrap();
        assert!(record.supports(Platform::Umbrel));
        assert!(!record.supports(Platform::Cosmos));
        assert!(!record.supports(Platform::CasaOs));
        assert_eq!(record.folder_name(Platform::Umbrel), "demo-app");
        assert_eq!(record.folder_name(Platform::Cosmos), "demo");
        assert_eq!(record.port_override(Platform::Umbrel), Some(10123));
        assert_eq!(
            record.compat(Platform::Umbrel).unwrap().extra_str("youtube"),
            Some("https://y")
        );
        assert_eq!(record.technical.default_port, Some(8080));
        assert_eq!(record.technical.compose_file, "docker-compose.yml");
    }

    #[test]
    fn test_short_description_fallback() {
        let mut record: AppRecord =
            serde_json::from_str(r#"{"metadata": {"id": "x"}}"#).unwrap();
        record.metadata.description = "Fast wiki. Written in Go.".to_string();
        assert_eq!(record.short_description(), "Fast wiki");
        record.metadata.tagline = "The wiki".to_string();
        assert_eq!(record.short_description(), "The wiki");
    }
}
