//! Sweep configuration.
//!
//! The configuration is stored in `~/.config/regsweep/config.yaml` (or the path
//! given with `--config`). Every field has a default, so an empty or missing
//! file is valid. Environment variables override file values.

use regsweep_core::error::{Result, SweepError};
use regsweep_core::user_paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Root structure for the sweep configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SweepConfig {
    /// Registry host the sweep targets (e.g. `iad.ocir.io`)
    #[serde(default)]
    pub registry: String,

    /// Use `http://` instead of `https://`
    #[serde(default)]
    pub plain_http: bool,

    /// Number of most recent unprotected tags retained per repository
    #[serde(default = "default_keep_count")]
    pub keep_count: usize,

    /// Whether deletion is allowed; otherwise runs only produce recommendations
    #[serde(default)]
    pub cleanup_enabled: bool,

    /// Whether untagged platform manifests are swept
    #[serde(default = "default_true")]
    pub orphan_cleanup_enabled: bool,

    /// Repositories swept even when no deployed image references them
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_repositories: Vec<String>,

    /// Candidate namespaces searched when locating a repository
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespaces: Vec<String>,

    /// Docker credential file; defaults to `$DOCKER_CONFIG/config.json` or `~/.docker/config.json`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker_config_path: Option<PathBuf>,

    /// Per-call timeout for registry requests
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Page size for tag listing
    #[serde(default = "default_page_size")]
    pub max_tags_per_page: usize,
}

fn default_keep_count() -> usize {
    5
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_page_size() -> usize {
    100
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            registry: String::new(),
            plain_http: false,
            keep_count: default_keep_count(),
            cleanup_enabled: false,
            orphan_cleanup_enabled: true,
            extra_repositories: Vec::new(),
            namespaces: Vec::new(),
            docker_config_path: None,
            request_timeout_secs: default_timeout_secs(),
            max_tags_per_page: default_page_size(),
        }
    }
}

impl SweepConfig {
    /// Load configuration from `path`, or from the default location.
    ///
    /// An explicitly given path must exist. The default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_path(path)?,
            None => {
                let default_path = user_paths::default_config_path()?;
                if default_path.exists() {
                    Self::load_from_path(&default_path)?
                } else {
                    debug!(
                        "No configuration at {}, using defaults",
                        default_path.display()
                    );
                    Self::default()
                }
            }
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load configuration from a specific path without environment overrides
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            SweepError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml_ng::from_str(&contents)?;
        Ok(config)
    }

    /// Apply `REGSWEEP_*` environment overrides.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(registry) = std::env::var("REGSWEEP_REGISTRY") {
            self.registry = registry;
        }
        if let Ok(raw) = std::env::var("REGSWEEP_KEEP_COUNT") {
            self.keep_count = raw.trim().parse().map_err(|_| {
                SweepError::Config(format!("REGSWEEP_KEEP_COUNT is not a number: {raw}"))
            })?;
        }
        if let Ok(raw) = std::env::var("REGSWEEP_CLEANUP_ENABLED") {
            self.cleanup_enabled = parse_bool(&raw).ok_or_else(|| {
                SweepError::Config(format!("REGSWEEP_CLEANUP_ENABLED is not a boolean: {raw}"))
            })?;
        }
        if let Ok(raw) = std::env::var("REGSWEEP_EXTRA_REPOSITORIES") {
            self.extra_repositories = split_list(&raw);
        }
        if let Ok(raw) = std::env::var("REGSWEEP_NAMESPACES") {
            self.namespaces = split_list(&raw);
        }
        Ok(())
    }

    /// Reject configurations a sweep cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.registry.is_empty() {
            return Err(SweepError::Config(
                "registry is not set (config file `registry:` or REGSWEEP_REGISTRY)".into(),
            ));
        }
        if self.registry.contains("://") || self.registry.contains('/') {
            return Err(SweepError::Config(format!(
                "registry must be a bare host, got '{}'",
                self.registry
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(SweepError::Config(
                "request_timeout_secs must be greater than zero".into(),
            ));
        }
        if self.max_tags_per_page == 0 {
            return Err(SweepError::Config(
                "max_tags_per_page must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Credential file location after applying defaults.
    pub fn resolved_docker_config_path(&self) -> Result<PathBuf> {
        match &self.docker_config_path {
            Some(path) => Ok(path.clone()),
            None => user_paths::docker_config_path(),
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
