//! Runtime configuration (C12): TOML-backed, with sensible defaults and
//! per-field override.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{BEACON_PORT, DEFAULT_PENDING_MAP_CAP};
use crate::error::{BeaconError, Result};

fn default_timesleep() -> u64 {
    30
}

fn default_bind_addr() -> String {
    format!("0.0.0.0:{BEACON_PORT}")
}

fn default_broadcast_addr() -> String {
    format!("255.255.255.255:{BEACON_PORT}")
}

fn default_keystore_path() -> PathBuf {
    PathBuf::from("keystore.json")
}

fn default_pending_map_cap() -> usize {
    DEFAULT_PENDING_MAP_CAP
}

/// Top-level configuration, loaded from a TOML file and overridable by CLI
/// flags. Every field has a default so a missing config file is not an
/// error — only a malformed one is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Seconds between full emission cycles once the key set is exhausted.
    #[serde(default = "default_timesleep")]
    pub timesleep: u64,

    /// Listener bind address, `host:port`.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Emitter destination address, `host:port`.
    #[serde(default = "default_broadcast_addr")]
    pub broadcast_addr: String,

    /// Path to the JSON keystore file.
    #[serde(default = "default_keystore_path")]
    pub keystore_path: PathBuf,

    /// Max pending-pair entries before oldest-entry eviction.
    #[serde(default = "default_pending_map_cap")]
    pub pending_map_cap: usize,

    /// Optional path for the JSON accept/reject audit log. `None` disables
    /// audit logging entirely.
    #[serde(default)]
    pub audit_log_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            timesleep: default_timesleep(),
            bind_addr: default_bind_addr(),
            broadcast_addr: default_broadcast_addr(),
            keystore_path: default_keystore_path(),
            pending_map_cap: default_pending_map_cap(),
            audit_log_path: None,
        }
    }
}

impl Config {
    /// Loads configuration from `path`, falling back to [`Config::default`]
    /// if the file does not exist. A present-but-malformed file is an
    /// error — silently ignoring a typo'd config is worse than failing
    /// loudly.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Config::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|source| BeaconError::ConfigIo {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| BeaconError::ConfigDecode {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let raw = toml::to_string_pretty(self).expect("Config serialization is infallible");
        std::fs::write(path, raw).map_err(|source| BeaconError::ConfigIo {
            path: path.display().to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = Config::load("/nonexistent/path/meshbeacon.toml").unwrap();
        assert_eq!(cfg.timesleep, 30);
        assert_eq!(cfg.pending_map_cap, DEFAULT_PENDING_MAP_CAP);
    }

    #[test]
    fn round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meshbeacon.toml");
        let mut cfg = Config::default();
        cfg.timesleep = 5;
        cfg.bind_addr = "127.0.0.1:7000".into();
        cfg.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.timesleep, 5);
        assert_eq!(loaded.bind_addr, "127.0.0.1:7000");
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meshbeacon.toml");
        std::fs::write(&path, "timesleep = 99\n").unwrap();
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.timesleep, 99);
        assert_eq!(cfg.bind_addr, default_bind_addr());
    }

    #[test]
    fn malformed_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meshbeacon.toml");
        std::fs::write(&path, "this is not valid toml {{{").unwrap();
        assert!(Config::load(&path).is_err());
    }
}
