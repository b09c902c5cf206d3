//! The registry API seam.

use crate::manifest::ManifestDocument;
use crate::types::ImageRef;
use regsweep_core::Outcome;
use std::fmt;

/// Where a repository lives inside a registry: an optional namespace (or
/// compartment) plus the bare repository name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositoryPath {
    pub location: String,
    pub name: String,
}

impl RepositoryPath {
    pub fn new(location: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            name: name.into(),
        }
    }

    /// A repository at the registry root.
    pub fn root(name: impl Into<String>) -> Self {
        Self::new("", name)
    }

    /// Path as used in `/v2/<path>/...` URLs.
    pub fn full(&self) -> String {
        if self.location.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.location, self.name)
        }
    }
}

impl fmt::Display for RepositoryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full())
    }
}

/// Operations the engine needs from a registry.
///
/// Implementations report "not in this location" as `Outcome::NotFound` and
/// never panic or retry. `list_images` must return every tag including
/// `latest`, and every untagged manifest the registry can enumerate.
pub trait RegistryBackend {
    /// Registry host, e.g. `iad.ocir.io`.
    fn registry(&self) -> &str;

    /// Locations searched, in order, when a repository's location is unknown.
    /// An empty string is the registry root.
    fn candidate_locations(&self) -> Vec<String>;

    /// Whether a stored credential exists for this registry.
    fn has_credential(&self) -> bool;

    /// `Ok(())` if the repository exists at `path`.
    fn probe(&self, path: &RepositoryPath) -> Outcome<()>;

    /// Every image in the repository. `repository` is stamped into each
    /// returned [`ImageRef`].
    fn list_images(&self, repository: &str, path: &RepositoryPath) -> Outcome<Vec<ImageRef>>;

    fn fetch_manifest(&self, path: &RepositoryPath, digest: &str) -> Outcome<ManifestDocument>;

    /// Delete one image. `NotFound` means it was already gone.
    fn delete_image(&self, path: &RepositoryPath, image: &ImageRef) -> Outcome<()>;
}
