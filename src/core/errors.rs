// src/core/errors.rs

//! The error type for conditions a caller cannot productively branch on.
//!
//! Per-call outcomes (`OK` / `NOT_FOUND` / `DATA_CONTENTION` / `ERROR`) are
//! *not* represented here — they are plain sum types in [`crate::store`],
//! returned inside `Ok(...)`. This enum is reserved for configuration and
//! setup failures: malformed cluster config, connection pool exhaustion, and
//! the like.

use std::num::ParseIntError;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum MeshKvError {
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("malformed cluster config: {0}")]
    ConfigParse(String),

    #[error("malformed client settings: {0}")]
    SettingsParse(String),

    #[error("invalid client settings: {0}")]
    InvalidSettings(String),

    #[error("no backend connection available for server '{0}'")]
    NoConnection(String),

    #[error("backend transport failure: {0}")]
    Transport(String),

    #[error("operation timed out")]
    Timeout,
}

impl From<std::io::Error> for MeshKvError {
    fn from(e: std::io::Error) -> Self {
        MeshKvError::Io(Arc::new(e))
    }
}

impl From<toml::de::Error> for MeshKvError {
    fn from(e: toml::de::Error) -> Self {
        MeshKvError::SettingsParse(e.to_string())
    }
}

impl From<ParseIntError> for MeshKvError {
    fn from(e: ParseIntError) -> Self {
        MeshKvError::ConfigParse(format!("invalid integer: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, MeshKvError>;
