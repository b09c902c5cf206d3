//! Image references and version ordering.

use crate::{LATEST_TAG, UNTAGGED_PREFIX};
use chrono::{DateTime, Utc};
use regex::Regex;
use regsweep_core::error::{Result, SweepError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::OnceLock;

const DOCKER_HUB: &str = "docker.io";

fn semver_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^v?(\d+)\.(\d+)(?:\.(\d+))?$")
            .expect("Hardcoded semver tag pattern should always compile")
    })
}

fn content_hash_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[0-9a-fA-F]{7,40}$")
            .expect("Hardcoded content hash pattern should always compile")
    })
}

/// One addressable image in a repository.
///
/// `repository` is the bare repository name with any namespace prefix
/// removed. Untagged platform manifests carry a synthetic tag built from
/// their digest, see [`ImageRef::platform_manifest`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRef {
    pub registry: String,
    pub repository: String,
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Registry-specific identifier used for deletion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opaque_id: Option<String>,
}

impl ImageRef {
    pub fn new(
        registry: impl Into<String>,
        repository: impl Into<String>,
        tag: impl Into<String>,
    ) -> Self {
        Self {
            registry: registry.into(),
            repository: repository.into(),
            tag: tag.into(),
            digest: None,
            created_at: None,
            opaque_id: None,
        }
    }

    /// An untagged platform manifest.
    pub fn platform_manifest(
        registry: impl Into<String>,
        repository: impl Into<String>,
        digest: impl Into<String>,
    ) -> Self {
        let digest = digest.into();
        Self {
            registry: registry.into(),
            repository: repository.into(),
            tag: format!("{UNTAGGED_PREFIX}{digest}"),
            digest: Some(digest),
            created_at: None,
            opaque_id: None,
        }
    }

    pub fn with_digest(mut self, digest: impl Into<String>) -> Self {
        self.digest = Some(digest.into());
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn with_opaque_id(mut self, opaque_id: impl Into<String>) -> Self {
        self.opaque_id = Some(opaque_id.into());
        self
    }

    /// Parse a deployment reference such as `iad.ocir.io/team/app:1.2.3`.
    ///
    /// The first path component is the registry when it looks like a host
    /// (contains `.` or `:`, or is `localhost`); otherwise the image is on
    /// Docker Hub. A missing tag defaults to `latest` unless the reference is
    /// pinned with `@digest`, in which case the tag is left empty.
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(SweepError::Parse("empty image reference".into()));
        }

        let (name_and_tag, digest) = match reference.split_once('@') {
            Some((name, digest)) if !digest.is_empty() => (name, Some(digest.to_string())),
            Some(_) => {
                return Err(SweepError::Parse(format!(
                    "image reference '{reference}' has an empty digest"
                )))
            }
            None => (reference, None),
        };

        let (name, tag) = match name_and_tag.rfind(':') {
            Some(idx) if !name_and_tag[idx + 1..].contains('/') => (
                &name_and_tag[..idx],
                name_and_tag[idx + 1..].to_string(),
            ),
            _ if digest.is_some() => (name_and_tag, String::new()),
            _ => (name_and_tag, LATEST_TAG.to_string()),
        };

        let (registry, repository) = match name.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (first.to_string(), rest.to_string())
            }
            Some(_) => (DOCKER_HUB.to_string(), name.to_string()),
            None => (DOCKER_HUB.to_string(), format!("library/{name}")),
        };

        if repository.is_empty() {
            return Err(SweepError::Parse(format!(
                "image reference '{reference}' has no repository"
            )));
        }

        Ok(Self {
            registry,
            repository,
            tag,
            digest,
            created_at: None,
            opaque_id: None,
        })
    }

    /// `registry/repository:tag`, the identity used for policy decisions.
    pub fn reference(&self) -> String {
        format!("{}/{}:{}", self.registry, self.repository, self.tag)
    }

    pub fn is_platform_manifest(&self) -> bool {
        self.tag.starts_with(UNTAGGED_PREFIX)
    }

    pub fn is_latest(&self) -> bool {
        self.tag == LATEST_TAG
    }

    /// A human-named tag other than `latest`.
    pub fn is_normal_tag(&self) -> bool {
        !self.is_platform_manifest() && !self.is_latest()
    }

    /// Identifier passed to the registry when deleting this image.
    pub fn deletion_id(&self) -> Option<&str> {
        self.opaque_id.as_deref().or(self.digest.as_deref())
    }

    pub fn version(&self) -> ImageVersion {
        ImageVersion::parse(&self.tag)
    }

    /// Total order used to pick the newest version.
    ///
    /// Entries fall into three ranks: undated non-semver tags, dated
    /// non-semver tags, then semver tags. Undated non-semver tags compare by
    /// tag, dated ones by creation time then tag, and semver tags by
    /// major/minor/patch then tag. Mixed pairs compare by rank, so the order
    /// stays transitive when semver and hash tags are sorted together.
    pub fn cmp_version(&self, other: &Self) -> Ordering {
        self.version_key().cmp(&other.version_key())
    }

    fn version_key(&self) -> (u8, (u64, u64, u64), Option<DateTime<Utc>>, &str) {
        match (self.version().kind, self.created_at) {
            (VersionKind::Semver { major, minor, patch }, _) => {
                (2, (major, minor, patch), None, self.tag.as_str())
            }
            (_, Some(created)) => (1, (0, 0, 0), Some(created), self.tag.as_str()),
            (_, None) => (0, (0, 0, 0), None, self.tag.as_str()),
        }
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reference())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionKind {
    Semver { major: u64, minor: u64, patch: u64 },
    ContentHash,
    Opaque,
}

/// Classification of a tag string.
///
/// `v1.2.3`, `1.2.3` and `1.2` are semantic versions (a missing patch is 0).
/// A 7 to 40 character hex string is a content hash. Anything else is opaque.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageVersion {
    pub tag: String,
    pub kind: VersionKind,
}

impl ImageVersion {
    pub fn parse(tag: &str) -> Self {
        let kind = if let Some(caps) = semver_regex().captures(tag) {
            let part = |i: usize| {
                caps.get(i)
                    .and_then(|m| m.as_str().parse::<u64>().ok())
                    .unwrap_or(0)
            };
            VersionKind::Semver {
                major: part(1),
                minor: part(2),
                patch: part(3),
            }
        } else if content_hash_regex().is_match(tag) {
            VersionKind::ContentHash
        } else {
            VersionKind::Opaque
        };
        Self {
            tag: tag.to_string(),
            kind,
        }
    }

    pub fn is_semver(&self) -> bool {
        matches!(self.kind, VersionKind::Semver { .. })
    }

    pub fn major(&self) -> Option<u64> {
        match self.kind {
            VersionKind::Semver { major, .. } => Some(major),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    /// Tags older than the newest `keep_count` unprotected ones.
    Retention,
    /// Untagged platform manifests no surviving index references.
    Orphan,
}

/// Deletion proposal for one repository.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanupRecommendation {
    pub registry: String,
    pub repository: String,
    pub kind: RecommendationKind,
    pub tags_to_delete: Vec<ImageRef>,
}

impl CleanupRecommendation {
    pub fn is_empty(&self) -> bool {
        self.tags_to_delete.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeletionFailure {
    pub image: ImageRef,
    pub error: String,
}

/// Newer version available for a deployed image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateInfo {
    pub current: ImageRef,
    pub latest: ImageRef,
    pub is_major_update: bool,
}
