//! Manifest documents and manifest-list expansion.

use crate::backend::{RegistryBackend, RepositoryPath};
use crate::types::ImageRef;
use regsweep_core::error::{Result, SweepError};
use regsweep_core::Outcome;
use serde::Deserialize;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, warn};

pub const DOCKER_MANIFEST_LIST: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";
pub const DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
pub const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";

/// `Accept` header covering every manifest format the engine understands.
pub const MANIFEST_ACCEPT: &str = "application/vnd.oci.image.index.v1+json, \
     application/vnd.docker.distribution.manifest.list.v2+json, \
     application/vnd.oci.image.manifest.v1+json, \
     application/vnd.docker.distribution.manifest.v2+json";

pub const CREATED_ANNOTATION: &str = "org.opencontainers.image.created";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    #[serde(default)]
    pub media_type: Option<String>,
    pub digest: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub platform: Option<Platform>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Platform {
    #[serde(default)]
    pub architecture: String,
    #[serde(default)]
    pub os: String,
}

/// A single-platform manifest or a manifest list / OCI index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestDocument {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub manifests: Vec<Descriptor>,
    #[serde(default)]
    pub config: Option<Descriptor>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl ManifestDocument {
    /// Parse a manifest body. `content_type` fills in the media type when the
    /// body omits it, as OCI indexes may.
    pub fn parse(body: &[u8], content_type: Option<&str>) -> Result<Self> {
        let mut doc: Self = serde_json::from_slice(body)?;
        if doc.media_type.is_none() {
            doc.media_type = content_type
                .map(|ct| ct.split(';').next().unwrap_or(ct).trim().to_string())
                .filter(|ct| !ct.is_empty() && ct != "application/json");
        }
        Ok(doc)
    }

    pub fn is_index(&self) -> bool {
        match self.media_type.as_deref() {
            Some(mt) => mt.contains("manifest.list") || mt.contains("image.index"),
            None => self.config.is_none() && !self.manifests.is_empty(),
        }
    }

    /// Digests of the platform manifests an index references.
    pub fn child_digests(&self) -> BTreeSet<String> {
        if !self.is_index() {
            return BTreeSet::new();
        }
        self.manifests.iter().map(|m| m.digest.clone()).collect()
    }

    pub fn created_annotation(&self) -> Option<&str> {
        self.annotations.get(CREATED_ANNOTATION).map(String::as_str)
    }
}

/// Expands an image into the platform manifests it references.
pub trait SubManifestSource {
    /// Digests referenced by `image` if it is a manifest list, an empty set for
    /// a single-platform manifest. `NotFound` means the manifest is gone;
    /// `Failed` means its children are unknown and must not be assumed empty.
    fn sub_manifest_digests(&self, image: &ImageRef) -> Outcome<BTreeSet<String>>;
}

#[derive(Clone)]
enum Resolution {
    Children(BTreeSet<String>),
    Missing,
    Unknown,
}

/// Resolves manifest lists through a [`RegistryBackend`] for one repository.
///
/// Results are memoised per digest for the resolver's lifetime, failures
/// included, so one repository pass fetches each manifest at most once.
pub struct ManifestGraphResolver<'a, B: RegistryBackend + ?Sized> {
    backend: &'a B,
    path: RepositoryPath,
    resolved: RefCell<HashMap<String, Resolution>>,
}

impl<'a, B: RegistryBackend + ?Sized> ManifestGraphResolver<'a, B> {
    pub fn new(backend: &'a B, path: RepositoryPath) -> Self {
        Self {
            backend,
            path,
            resolved: RefCell::new(HashMap::new()),
        }
    }

    fn fetch_children(&self, image: &ImageRef, digest: &str) -> Resolution {
        match self.backend.fetch_manifest(&self.path, digest) {
            Outcome::Ok(doc) => {
                let children = doc.child_digests();
                debug!(
                    image = %image.tag,
                    children = children.len(),
                    "Resolved manifest"
                );
                Resolution::Children(children)
            }
            Outcome::NotFound => {
                warn!(image = %image.tag, digest = %digest, "Manifest not found while resolving");
                Resolution::Missing
            }
            Outcome::Failed(e) => {
                warn!(image = %image.tag, digest = %digest, error = %e, "Failed to resolve manifest");
                Resolution::Unknown
            }
        }
    }
}

fn unresolved(image: &ImageRef) -> Outcome<BTreeSet<String>> {
    Outcome::Failed(SweepError::GraphUnresolved {
        repository: image.repository.clone(),
    })
}

impl<B: RegistryBackend + ?Sized> SubManifestSource for ManifestGraphResolver<'_, B> {
    fn sub_manifest_digests(&self, image: &ImageRef) -> Outcome<BTreeSet<String>> {
        // Without a digest the tag could not be described at listing time.
        let Some(digest) = image.digest.as_deref() else {
            return unresolved(image);
        };
        let cached = self.resolved.borrow().get(digest).cloned();
        let resolution = match cached {
            Some(resolution) => resolution,
            None => {
                let resolution = self.fetch_children(image, digest);
                self.resolved
                    .borrow_mut()
                    .insert(digest.to_string(), resolution.clone());
                resolution
            }
        };
        match resolution {
            Resolution::Children(children) => Outcome::Ok(children),
            Resolution::Missing => Outcome::NotFound,
            Resolution::Unknown => unresolved(image),
        }
    }
}
