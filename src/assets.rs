// src/assets.rs

//! Icon assets
//!
//! Platforms that ship a raster logo (Runtipi `metadata/logo.png`) get the
//! record icon as PNG. Icons are downloaded with a short timeout; non-PNG
//! images go through an external converter when one is installed. Any
//! failure falls back to a generated placeholder so a missing icon never
//! fails a conversion.

use flate2::Compression;
use flate2::write::ZlibEncoder;
use reqwest::blocking::Client;
use std::io::Write;
use std::process::{Command, Stdio};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use wait_timeout::ChildExt;

use crate::config::AssetsConfig;

/// PNG file signature
pub const PNG_MAGIC: &[u8; 8] = b"\x89PNG\r\n\x1a\n";

/// Edge length of generated placeholders
pub const PLACEHOLDER_SIZE: u32 = 128;

/// Converters tried in order for non-PNG icons
const CONVERTERS: &[&str] = &["rsvg-convert", "magick", "convert"];

const CONVERT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum AssetFetchError {
    #[error("Invalid icon URL '{0}'")]
    InvalidUrl(String),

    #[error("HTTP {status} from {url}")]
    Http { url: String, status: u16 },

    #[error("Failed to fetch {url}: {message}")]
    Transport { url: String, message: String },

    #[error("Image conversion failed: {0}")]
    Conversion(String),

    #[error("No image converter found (tried {})", CONVERTERS.join(", "))]
    NoConverter,
}

/// Where the icon bytes came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IconSource {
    Fetched,
    Converted,
    Placeholder,
}

#[derive(Debug, Clone)]
pub struct IconAsset {
    pub bytes: Vec<u8>,
    pub source: IconSource,
    /// Why a placeholder was used, for the emission report
    pub warning: Option<String>,
}

/// Downloads icons, or hands out placeholders when offline
pub struct AssetFetcher {
    client: Option<Client>,
}

impl AssetFetcher {
    /// Build a fetcher from config; `offline` forces placeholders
    pub fn new(config: &AssetsConfig, offline: bool) -> Self {
        if offline || !config.fetch {
            debug!("Icon downloads disabled, using placeholders");
            return Self::offline();
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build();

        match client {
            Ok(client) => Self {
                client: Some(client),
            },
            Err(e) => {
                warn!("Failed to create HTTP client, icons will be placeholders: {}", e);
                Self::offline()
            }
        }
    }

    pub fn offline() -> Self {
        Self { client: None }
    }

    pub fn is_offline(&self) -> bool {
        self.client.is_none()
    }

    /// PNG icon for `url`, or a placeholder derived from `seed`
    pub fn icon_png(&self, url: Option<&str>, seed: &str) -> IconAsset {
        let Some(url) = url.filter(|u| !u.trim().is_empty()) else {
            return placeholder_asset(seed, None);
        };
        let Some(client) = &self.client else {
            return placeholder_asset(seed, None);
        };

        match fetch(client, url).and_then(into_png) {
            Ok((bytes, source)) => IconAsset {
                bytes,
                source,
                warning: None,
            },
            Err(e) => {
                warn!("Icon for {} unavailable, using placeholder: {}", seed, e);
                placeholder_asset(seed, Some(e.to_string()))
            }
        }
    }
}

fn placeholder_asset(seed: &str, warning: Option<String>) -> IconAsset {
    IconAsset {
        bytes: placeholder_png(seed),
        source: IconSource::Placeholder,
        warning,
    }
}

fn fetch(client: &Client, raw: &str) -> Result<Vec<u8>, AssetFetchError> {
    let url = url::Url::parse(raw).map_err(|_| AssetFetchError::InvalidUrl(raw.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(AssetFetchError::InvalidUrl(raw.to_string()));
    }

    debug!("Fetching icon {}", url);
    let response = client
        .get(url.clone())
        .send()
        .map_err(|e| AssetFetchError::Transport {
            url: raw.to_string(),
            message: e.to_string(),
        })?;

    if !response.status().is_success() {
        return Err(AssetFetchError::Http {
            url: raw.to_string(),
            status: response.status().as_u16(),
        });
    }

    let bytes = response.bytes().map_err(|e| AssetFetchError::Transport {
        url: raw.to_string(),
        message: e.to_string(),
    })?;
    Ok(bytes.to_vec())
}

pub fn is_png(bytes: &[u8]) -> bool {
    bytes.starts_with(PNG_MAGIC)
}

fn into_png(bytes: Vec<u8>) -> Result<(Vec<u8>, IconSource), AssetFetchError> {
    if is_png(&bytes) {
        return Ok((bytes, IconSource::Fetched));
    }
    convert_to_png(&bytes).map(|png| (png, IconSource::Converted))
}

/// Convert an arbitrary image to PNG with the first available converter
pub fn convert_to_png(bytes: &[u8]) -> Result<Vec<u8>, AssetFetchError> {
    let (name, path) = CONVERTERS
        .iter()
        .find_map(|name| which::which(name).ok().map(|p| (*name, p)))
        .ok_or(AssetFetchError::NoConverter)?;

    let dir = tempfile::tempdir().map_err(|e| AssetFetchError::Conversion(e.to_string()))?;
    let input = dir.path().join("icon.src");
    let output = dir.path().join("icon.png");
    std::fs::write(&input, bytes).map_err(|e| AssetFetchError::Conversion(e.to_string()))?;

    let mut cmd = Command::new(&path);
    if name == "rsvg-convert" {
        cmd.args(["-w", "256", "-h", "256", "-f", "png", "-o"])
            .arg(&output)
            .arg(&input);
    } else {
        cmd.arg(&input).args(["-resize", "256x256"]).arg(&output);
    }

    debug!("Converting icon with {}", path.display());
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| AssetFetchError::Conversion(format!("Failed to spawn '{}': {}", name, e)))?;

    match child
        .wait_timeout(CONVERT_TIMEOUT)
        .map_err(|e| AssetFetchError::Conversion(e.to_string()))?
    {
        Some(status) if status.success() => {}
        Some(status) => {
            let output = child
                .wait_with_output()
                .map_err(|e| AssetFetchError::Conversion(e.to_string()))?;
            return Err(AssetFetchError::Conversion(format!(
                "'{}' exited with code {}: {}",
                name,
                status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        None => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(AssetFetchError::Conversion(format!(
                "'{}' timed out after {} seconds",
                name,
                CONVERT_TIMEOUT.as_secs()
            )));
        }
    }

    let png = std::fs::read(&output).map_err(|e| AssetFetchError::Conversion(e.to_string()))?;
    if !is_png(&png) {
        return Err(AssetFetchError::Conversion(format!(
            "'{}' did not produce a PNG",
            name
        )));
    }
    Ok(png)
}

/// Deterministic single-colour PNG; the colour is derived from `seed`
pub fn placeholder_png(seed: &str) -> Vec<u8> {
    let [r, g, b] = seed_colour(seed);
    let size = PLACEHOLDER_SIZE;

    let row_len = 1 + 3 * size as usize;
    let mut raw = Vec::with_capacity(row_len * size as usize);
    for _ in 0..size {
        raw.push(0); // filter: none
        for _ in 0..size {
            raw.extend_from_slice(&[r, g, b]);
        }
    }

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    // Writing into a Vec cannot fail
    let _ = encoder.write_all(&raw);
    let idat = encoder.finish().unwrap_or_default();

    let mut ihdr = Vec::with_capacity(13);
    ihdr.extend_from_slice(&size.to_be_bytes());
    ihdr.extend_from_slice(&size.to_be_bytes());
    ihdr.extend_from_slice(&[8, 2, 0, 0, 0]); // 8-bit RGB, no interlace

    let mut png = PNG_MAGIC.to_vec();
    write_chunk(&mut png, b"IHDR", &ihdr);
    write_chunk(&mut png, b"IDAT", &idat);
    write_chunk(&mut png, b"IEND", &[]);
    png
}

fn write_chunk(out: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(data);

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(kind);
    hasher.update(data);
    out.extend_from_slice(&hasher.finalize().to_be_bytes());
}

/// FNV-1a over the seed, mapped to a mid-saturation colour
fn seed_colour(seed: &str) -> [u8; 3] {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in seed.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    let [a, b, c, _] = hash.to_be_bytes();
    [64 + a / 2, 64 + b / 2, 64 + c / 2]
}
