//! `clawmesh.yaml`: the recognized configuration surface. Unlike the
//! teacher's tolerant merge-loader, unknown keys are rejected outright —
//! this config is small and flat enough that silent typos are a worse
//! failure mode than a loud one.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

fn default_enabled() -> bool {
    true
}

fn default_scan_interval_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PeerConfig {
    pub url: String,
    #[serde(rename = "deviceId")]
    pub device_id: String,
    #[serde(rename = "tlsFingerprint", default)]
    pub tls_fingerprint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(rename = "scanIntervalMs", default = "default_scan_interval_ms")]
    pub scan_interval_ms: u64,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub peers: Vec<PeerConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            enabled: default_enabled(),
            scan_interval_ms: default_scan_interval_ms(),
            capabilities: Vec::new(),
            peers: Vec::new(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scan_interval_ms < 5000 {
            return Err(ConfigError::ScanIntervalTooLow(self.scan_interval_ms));
        }
        Ok(())
    }
}

/// Parse and validate a config document.
pub fn parse_config(text: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_yaml::from_str(text).map_err(|e| ConfigError::Malformed {
        path: "<string>".into(),
        reason: e.to_string(),
    })?;
    config.validate()?;
    Ok(config)
}

/// Load and validate the config at `path`.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let config: Config = serde_yaml::from_str(&text).map_err(|e| ConfigError::Malformed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    config.validate()?;
    Ok(config)
}

/// Search the conventional locations for `clawmesh.yaml`: the current
/// directory first, then the XDG config directory.
pub fn find_config_path() -> Option<PathBuf> {
    let cwd_candidate = PathBuf::from("clawmesh.yaml");
    if cwd_candidate.exists() {
        return Some(cwd_candidate);
    }
    let xdg_candidate = dirs::config_dir()?.join("clawmesh").join("clawmesh.yaml");
    if xdg_candidate.exists() {
        return Some(xdg_candidate);
    }
    None
}
