// src/core/config_reader.rs

//! Reads the cluster membership config file: `servers=`, `new_servers=`, and
//! `tombstone_lifetime=` lines. Grounded closely on the original reader's key
//! whitelist and validation — only the `#`-comment support is new.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{error, info};

const DEFAULT_TOMBSTONE_LIFETIME: i64 = 0;

/// The parsed contents of a cluster config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterConfig {
    pub servers: Vec<String>,
    pub new_servers: Vec<String>,
    pub tombstone_lifetime: i64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            new_servers: Vec::new(),
            tombstone_lifetime: DEFAULT_TOMBSTONE_LIFETIME,
        }
    }
}

/// Reads and parses a cluster config file from disk.
pub struct ConfigFileReader {
    path: PathBuf,
}

impl ConfigFileReader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Reads the config file, returning `None` if the file is missing,
    /// malformed, or never defines a `servers=` line.
    pub fn read_config(&self) -> Option<ClusterConfig> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) => {
                error!("failed to open '{}': {e}", self.path.display());
                return None;
            }
        };

        info!("reloading cluster configuration from '{}'", self.path.display());
        parse_config(&contents)
    }
}

fn parse_config(contents: &str) -> Option<ClusterConfig> {
    let mut config = ClusterConfig::default();
    let mut seen_servers = false;

    for raw_line in contents.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut parts = line.splitn(2, '=');
        let key = parts.next().unwrap_or("").trim();
        let value = parts.next().unwrap_or("").trim();

        match key {
            "servers" => {
                config.servers = split_csv(value);
                seen_servers = true;
            }
            "new_servers" => {
                config.new_servers = split_csv(value);
            }
            "tombstone_lifetime" => match value.parse::<i64>() {
                Ok(n) => config.tombstone_lifetime = n,
                Err(_) => {
                    error!("config contained an invalid tombstone_lifetime line: '{raw_line}'");
                    return None;
                }
            },
            _ => {
                error!("malformed config file (got bad line: '{raw_line}')");
                return None;
            }
        }
    }

    if seen_servers { Some(config) } else { None }
}

fn split_csv(value: &str) -> Vec<String> {
    if value.is_empty() {
        return Vec::new();
    }
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_servers_and_tombstone_lifetime() {
        let config = parse_config("servers=10.0.0.1:11211,10.0.0.2:11211\ntombstone_lifetime=200\n")
            .expect("valid config");
        assert_eq!(config.servers, vec!["10.0.0.1:11211", "10.0.0.2:11211"]);
        assert_eq!(config.tombstone_lifetime, 200);
        assert!(config.new_servers.is_empty());
    }

    #[test]
    fn missing_servers_line_is_rejected() {
        assert!(parse_config("tombstone_lifetime=10\n").is_none());
    }

    #[test]
    fn unknown_key_is_rejected() {
        assert!(parse_config("servers=a:1\nbogus=1\n").is_none());
    }

    #[test]
    fn non_numeric_tombstone_lifetime_is_rejected() {
        assert!(parse_config("servers=a:1\ntombstone_lifetime=abc\n").is_none());
    }

    #[test]
    fn comment_lines_and_blank_lines_are_skipped() {
        let config = parse_config("# cluster config\nservers=a:1\n\n# trailing comment\n")
            .expect("valid config");
        assert_eq!(config.servers, vec!["a:1"]);
    }

    #[test]
    fn new_servers_defaults_empty_when_absent() {
        let config = parse_config("servers=a:1,b:1\n").expect("valid config");
        assert!(config.new_servers.is_empty());
    }
}
