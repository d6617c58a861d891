// src/lib.rs

//! appcatalog
//!
//! Converts a universal self-hosted app catalog into the store formats of
//! CasaOS, Portainer, Runtipi, Dockge, Cosmos and Umbrel.
//!
//! # Architecture
//!
//! - Records: one directory per app with `app.json` and `docker-compose.yml`
//! - Emitters: one per platform, all behind the [`emit::Emitter`] trait
//! - Shared normalization: volume mounts ([`mounts`]) and host ports ([`ports`])
//! - Staged output: a failed emission leaves no partial directory behind
//! - Aggregation: Portainer templates are collected into one master file

pub mod aggregate;
pub mod assets;
pub mod config;
pub mod driver;
pub mod emit;
mod error;
pub mod mounts;
pub mod ports;
pub mod record;

pub use config::Config;
pub use driver::{ConvertOptions, Summary, convert_all};
pub use error::{Error, Result};
pub use record::{AppRecord, Platform};
