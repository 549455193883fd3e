//! Client configuration.

use anyhow::{Context, Result};
use canvas_core::{
    ControllerConfig, ARTIFACT_MARKER_END, ARTIFACT_MARKER_START, DEFAULT_ENDPOINT,
    DEFAULT_REQUEST_TIMEOUT,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Request timeout in milliseconds; 0 disables it
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_marker_start")]
    pub artifact_marker_start: String,
    #[serde(default = "default_marker_end")]
    pub artifact_marker_end: String,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT.as_millis() as u64
}

fn default_marker_start() -> String {
    ARTIFACT_MARKER_START.to_string()
}

fn default_marker_end() -> String {
    ARTIFACT_MARKER_END.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            request_timeout_ms: default_request_timeout_ms(),
            artifact_marker_start: default_marker_start(),
            artifact_marker_end: default_marker_end(),
        }
    }
}

impl Config {
    /// Load config from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(config)
    }

    /// Load config from `config/default.toml`, then the user config directory,
    /// falling back to defaults.
    pub fn load() -> Result<Self> {
        for path in Self::search_paths() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }
        Ok(Config::default())
    }

    fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config/default.toml")];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("canvas").join("config.toml"));
        }
        paths
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
    }

    pub fn to_controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            endpoint: self.endpoint.clone(),
            request_timeout: self.request_timeout(),
            artifact_marker_start: self.artifact_marker_start.clone(),
            artifact_marker_end: self.artifact_marker_end.clone(),
        }
    }
}
