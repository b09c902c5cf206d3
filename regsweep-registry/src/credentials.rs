//! Docker credential file (`~/.docker/config.json`).

use base64::{engine::general_purpose::STANDARD, Engine as _};
use regsweep_core::error::{Result, SweepError};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct DockerConfigFile {
    #[serde(default)]
    auths: HashMap<String, AuthEntry>,
}

#[derive(Debug, Deserialize)]
struct AuthEntry {
    #[serde(default)]
    auth: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

/// Stored registry credentials, keyed by bare host.
#[derive(Debug, Clone, Default)]
pub struct DockerCredentials {
    entries: HashMap<String, String>,
}

impl DockerCredentials {
    /// Read the credential file. A missing file yields an empty set.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No docker credential file at {}", path.display());
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|e| {
            SweepError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&contents).map_err(|e| {
            SweepError::Config(format!(
                "Invalid docker credential file {}: {}",
                path.display(),
                e
            ))
        })
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        let file: DockerConfigFile = serde_json::from_str(contents)?;
        let mut entries = HashMap::new();
        for (key, entry) in file.auths {
            let encoded = match (entry.auth, entry.username, entry.password) {
                (Some(auth), _, _) if !auth.is_empty() => auth,
                (_, Some(user), Some(pass)) => STANDARD.encode(format!("{user}:{pass}")),
                _ => {
                    // Entries backed by a credential helper carry no secret here.
                    debug!("Credential entry for {} has no inline secret", key);
                    continue;
                }
            };
            if STANDARD.decode(encoded.trim()).is_err() {
                warn!("Ignoring credential for {}: auth is not valid base64", key);
                continue;
            }
            entries.insert(normalize_host(&key), encoded.trim().to_string());
        }
        Ok(Self { entries })
    }

    /// Base64 `user:password` for `registry`, if stored.
    pub fn basic_for(&self, registry: &str) -> Option<&str> {
        let host = normalize_host(registry);
        if let Some(found) = self.entries.get(&host) {
            return Some(found.as_str());
        }
        if host == "docker.io" {
            return self.entries.get("index.docker.io").map(String::as_str);
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn insert(&mut self, registry: &str, user: &str, password: &str) {
        self.entries.insert(
            normalize_host(registry),
            STANDARD.encode(format!("{user}:{password}")),
        );
    }
}

/// `https://index.docker.io/v1/` becomes `index.docker.io`.
fn normalize_host(key: &str) -> String {
    let without_scheme = key
        .strip_prefix("https://")
        .or_else(|| key.strip_prefix("http://"))
        .unwrap_or(key);
    without_scheme
        .split('/')
        .next()
        .unwrap_or(without_scheme)
        .to_ascii_lowercase()
}
