// src/error.rs

//! Crate-level error type
//!
//! Record- and emission-level failures have their own enums
//! ([`LoadError`](crate::record::LoadError),
//! [`EmissionError`](crate::emit::EmissionError)) and are accumulated into the
//! run summary. Only failures that stop the whole run surface as [`Error`].

use crate::aggregate::AggregationError;
use crate::config::ConfigError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Master template aggregation failed: {0}")]
    Aggregation(#[from] AggregationError),
}

/// Result type for run-level operations
pub type Result<T> = std::result::Result<T, Error>;
