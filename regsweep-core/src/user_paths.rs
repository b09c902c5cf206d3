//! User directory helpers for regsweep.

use crate::error::{Result, SweepError};
use std::path::PathBuf;

/// Get the user's configuration directory for regsweep.
///
/// Returns `$XDG_CONFIG_HOME/regsweep` on Linux, the platform equivalent elsewhere.
#[must_use = "configuration directory path should be used"]
pub fn user_config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("regsweep"))
        .ok_or_else(|| SweepError::Config("Could not determine config directory".into()))
}

/// Default location of the sweep configuration file.
#[must_use = "configuration path should be used"]
pub fn default_config_path() -> Result<PathBuf> {
    Ok(user_config_dir()?.join("config.yaml"))
}

/// Docker credential file, honouring `DOCKER_CONFIG` the way the docker CLI does.
#[must_use = "docker config path should be used"]
pub fn docker_config_path() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("DOCKER_CONFIG") {
        if !dir.is_empty() {
            return Ok(PathBuf::from(dir).join("config.json"));
        }
    }
    let home = dirs::home_dir()
        .ok_or_else(|| SweepError::Config("Could not determine home directory".into()))?;
    Ok(home.join(".docker").join("config.json"))
}
