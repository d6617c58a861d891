// src/config.rs

//! Converter configuration (appcatalog.toml)
//!
//! Every section is optional; a missing file yields the defaults below.
//!
//! ```toml
//! apps_dir = "apps"
//! output_dir = "converted"
//!
//! [assets]
//! fetch = true
//! timeout_secs = 10
//!
//! [runtipi]
//! port_floor = 1000
//! host_network_exceptions = ["pihole"]
//!
//! [umbrel]
//! port_floor = 10000
//! port_offset = 10000
//! app_id_prefix = "mystore"
//! ```

use crate::mounts::MountConvention;
use crate::ports::PortPolicy;
use crate::record::Platform;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default configuration file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "appcatalog.toml";

/// Well-known low ports and the replacement used when a platform floor applies
pub const WELL_KNOWN_SUBSTITUTIONS: &[(u16, u16)] = &[(80, 8080), (443, 8443)];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Directories given on the command line; each one overrides the file
#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub apps_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
}

/// Root configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding one sub-directory per app record
    pub apps_dir: PathBuf,

    /// Root of the generated platform trees
    pub output_dir: PathBuf,

    pub assets: AssetsConfig,
    pub casaos: CasaOsConfig,
    pub portainer: PortainerConfig,
    pub runtipi: RuntipiConfig,
    pub cosmos: CosmosConfig,
    pub umbrel: UmbrelConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            apps_dir: PathBuf::from("apps"),
            output_dir: PathBuf::from("converted"),
            assets: AssetsConfig::default(),
            casaos: CasaOsConfig::default(),
            portainer: PortainerConfig::default(),
            runtipi: RuntipiConfig::default(),
            cosmos: CosmosConfig::default(),
            umbrel: UmbrelConfig::default(),
        }
    }
}

/// Icon download settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    /// Download icons; when false every icon is a generated placeholder
    pub fetch: bool,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            fetch: true,
            timeout_secs: 10,
            user_agent: format!("appcatalog/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CasaOsConfig {
    pub data_root: String,
}

impl Default for CasaOsConfig {
    fn default() -> Self {
        Self {
            data_root: "/DATA/AppData/$AppID".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortainerConfig {
    /// Repository that hosts the generated stack files
    pub repository_url: String,
    /// Path of the Portainer tree inside that repository
    pub stackfile_root: String,
}

impl Default for PortainerConfig {
    fn default() -> Self {
        Self {
            repository_url: "https://github.com/appcatalog/appcatalog".to_string(),
            stackfile_root: "converted/portainer".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntipiConfig {
    pub port_floor: u16,
    pub data_root: String,
    pub network: String,
    /// Apps that keep their own network setup instead of the shared network
    pub host_network_exceptions: Vec<String>,
    pub tipi_version: u32,
}

impl Default for RuntipiConfig {
    fn default() -> Self {
        Self {
            port_floor: 1000,
            data_root: "${APP_DATA_DIR}/data".to_string(),
            network: "tipi_main_network".to_string(),
            host_network_exceptions: vec![
                "homeassistant".to_string(),
                "pihole".to_string(),
                "adguard".to_string(),
            ],
            tipi_version: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CosmosConfig {
    pub min_version: String,
    pub timeout_ms: u64,
    pub throttle_per_minute: u32,
    pub block_common_bots: bool,
    pub smart_shield: bool,
}

impl Default for CosmosConfig {
    fn default() -> Self {
        Self {
            min_version: "0.8.0".to_string(),
            timeout_ms: 14_400_000,
            throttle_per_minute: 12_000,
            block_common_bots: true,
            smart_shield: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UmbrelConfig {
    pub port_floor: u16,
    pub port_offset: Option<u16>,
    /// Community app stores require `<store>-<app>` identifiers
    pub app_id_prefix: String,
    pub data_root: String,
    pub submitter: String,
    pub submission: String,
}

impl Default for UmbrelConfig {
    fn default() -> Self {
        Self {
            port_floor: 10_000,
            port_offset: Some(10_000),
            app_id_prefix: String::new(),
            data_root: "${APP_DATA_DIR}".to_string(),
            submitter: String::new(),
            submission: String::new(),
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from `appcatalog.toml` when present.
    ///
    /// An explicitly given path must exist; the implicit default may be absent.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        if !path.exists() && !required {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::ReadError {
            path: path.clone(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Load like [`Config::load`], then apply directory overrides given on
    /// the command line and validate the result
    pub fn load_with_overrides(
        path: Option<&Path>,
        overrides: PathOverrides,
    ) -> crate::Result<Self> {
        let mut config = Self::load(path)?;
        if let Some(dir) = overrides.apps_dir {
            config.apps_dir = dir;
        }
        if let Some(dir) = overrides.output_dir {
            config.output_dir = dir;
        }
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.apps_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("apps_dir must not be empty".to_string()));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("output_dir must not be empty".to_string()));
        }
        if self.assets.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "assets.timeout_secs must be at least 1".to_string(),
            ));
        }
        if !self.umbrel.app_id_prefix.is_empty()
            && !self
                .umbrel
                .app_id_prefix
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(ConfigError::Invalid(format!(
                "umbrel.app_id_prefix '{}' must be lowercase alphanumeric",
                self.umbrel.app_id_prefix
            )));
        }
        Ok(())
    }

    /// Port rules applied to the externally exposed port of `platform`
    pub fn port_policy(&self, platform: Platform) -> PortPolicy {
        match platform {
            Platform::Runtipi => PortPolicy {
                floor: self.runtipi.port_floor,
                substitutions: WELL_KNOWN_SUBSTITUTIONS.to_vec(),
                offset: None,
            },
            Platform::Umbrel => PortPolicy {
                floor: self.umbrel.port_floor,
                substitutions: WELL_KNOWN_SUBSTITUTIONS.to_vec(),
                offset: self.umbrel.port_offset,
            },
            Platform::CasaOs | Platform::Portainer | Platform::Dockge | Platform::Cosmos => {
                PortPolicy::passthrough()
            }
        }
    }

    /// How named volumes and bind paths are rewritten for `platform`
    pub fn mount_convention(&self, platform: Platform) -> MountConvention {
        match platform {
            Platform::CasaOs => MountConvention::Flatten {
                root: self.casaos.data_root.clone(),
            },
            Platform::Runtipi => MountConvention::Flatten {
                root: self.runtipi.data_root.clone(),
            },
            Platform::Umbrel => MountConvention::Flatten {
                root: self.umbrel.data_root.clone(),
            },
            Platform::Portainer | Platform::Dockge | Platform::Cosmos => {
                MountConvention::Namespace
            }
        }
    }

    /// Directory that receives every record of `platform`
    pub fn platform_root(&self, platform: Platform) -> PathBuf {
        self.output_dir.join(platform.key())
    }
}
