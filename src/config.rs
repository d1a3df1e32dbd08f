// src/config.rs

//! Tuning configuration for a replicated client instance: vbucket count,
//! replica count, tombstone lifetime, and the knobs that govern connection
//! behavior and comm-monitor hysteresis. Loaded from TOML, separate from the
//! cluster membership file read by [`crate::core::config_reader`].

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::{MeshKvError, Result};

/// Tuning settings for one client instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Number of vbuckets the ring is partitioned into. Must be a power of
    /// two; the backend fleet this client talks to is assumed fixed at 128.
    pub vbuckets: usize,

    /// Number of replicas (including the primary) to read from and write to
    /// per vbucket.
    pub replicas: usize,

    /// Lifetime of delete tombstones, after which the backend is free to
    /// reuse the slot outright.
    #[serde(with = "humantime_serde")]
    pub tombstone_lifetime: Duration,

    /// Minimum duration a failure or success streak must persist before the
    /// comm-monitor alarm flips.
    #[serde(with = "humantime_serde")]
    pub comm_monitor_hysteresis: Duration,

    /// Path to the cluster membership config file, reloaded on `SIGHUP`.
    pub cluster_config_path: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            vbuckets: 128,
            replicas: 2,
            tombstone_lifetime: Duration::from_secs(0),
            comm_monitor_hysteresis: Duration::from_secs(5),
            cluster_config_path: "/etc/meshkv/cluster_config".to_string(),
        }
    }
}

impl ClientSettings {
    /// Parses settings from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let settings: ClientSettings = toml::from_str(contents)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Loads and validates settings from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    fn validate(&self) -> Result<()> {
        if self.vbuckets == 0 || !self.vbuckets.is_power_of_two() {
            return Err(MeshKvError::InvalidSettings(format!(
                "vbuckets must be a nonzero power of two, got {}",
                self.vbuckets
            )));
        }
        if self.replicas == 0 {
            return Err(MeshKvError::InvalidSettings(
                "replicas must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
