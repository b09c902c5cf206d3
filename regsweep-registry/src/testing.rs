//! In-memory registry used by unit tests.

use crate::backend::{RegistryBackend, RepositoryPath};
use crate::manifest::{Descriptor, ManifestDocument, OCI_INDEX};
use crate::types::ImageRef;
use chrono::{DateTime, TimeZone, Utc};
use regsweep_core::error::SweepError;
use regsweep_core::Outcome;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

pub(crate) const REGISTRY: &str = "r.io";

pub(crate) fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().expect("valid timestamp")
}

/// A tagged image with digest `sha256:<tag>` created at `secs`.
pub(crate) fn tagged(repo: &str, tag: &str, secs: i64) -> ImageRef {
    ImageRef::new(REGISTRY, repo, tag)
        .with_digest(format!("sha256:{tag}"))
        .with_created_at(at(secs))
}

pub(crate) fn untagged(repo: &str, digest: &str) -> ImageRef {
    ImageRef::platform_manifest(REGISTRY, repo, digest)
}

pub(crate) fn tags_of(images: &[ImageRef]) -> Vec<String> {
    let mut tags: Vec<String> = images.iter().map(|i| i.tag.clone()).collect();
    tags.sort();
    tags
}

#[derive(Default)]
struct State {
    repos: HashMap<String, Vec<ImageRef>>,
    manifests: HashMap<String, ManifestDocument>,
    failing_lists: HashSet<String>,
    failing_manifests: HashSet<String>,
    failing_deletes: HashSet<String>,
    deleted: Vec<String>,
    list_calls: usize,
}

pub(crate) struct FakeBackend {
    registry: String,
    locations: Vec<String>,
    credential: bool,
    state: Mutex<State>,
}

impl FakeBackend {
    pub(crate) fn new(registry: &str) -> Self {
        Self {
            registry: registry.to_string(),
            locations: vec![String::new()],
            credential: true,
            state: Mutex::new(State::default()),
        }
    }

    pub(crate) fn with_locations(mut self, locations: &[&str]) -> Self {
        self.locations = locations.iter().map(|l| l.to_string()).collect();
        self
    }

    pub(crate) fn without_credential(mut self) -> Self {
        self.credential = false;
        self
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("fake backend lock")
    }

    pub(crate) fn add_images(&self, path: &RepositoryPath, images: Vec<ImageRef>) {
        self.state()
            .repos
            .entry(path.full())
            .or_default()
            .extend(images);
    }

    pub(crate) fn add_index(&self, digest: &str, children: &[&str]) {
        let doc = ManifestDocument {
            schema_version: Some(2),
            media_type: Some(OCI_INDEX.to_string()),
            manifests: children
                .iter()
                .map(|c| Descriptor {
                    media_type: None,
                    digest: c.to_string(),
                    size: 0,
                    platform: None,
                })
                .collect(),
            config: None,
            annotations: BTreeMap::new(),
        };
        self.state().manifests.insert(digest.to_string(), doc);
    }

    pub(crate) fn fail_manifest(&self, digest: &str) {
        self.state().failing_manifests.insert(digest.to_string());
    }

    pub(crate) fn fail_list(&self, path: &RepositoryPath) {
        self.state().failing_lists.insert(path.full());
    }

    pub(crate) fn fail_delete(&self, id: &str) {
        self.state().failing_deletes.insert(id.to_string());
    }

    pub(crate) fn deleted(&self) -> Vec<String> {
        self.state().deleted.clone()
    }

    pub(crate) fn list_calls(&self) -> usize {
        self.state().list_calls
    }

    fn check_credential<T>(&self) -> Option<Outcome<T>> {
        if self.credential {
            None
        } else {
            Some(Outcome::Failed(SweepError::AuthUnavailable {
                registry: self.registry.clone(),
            }))
        }
    }
}

impl RegistryBackend for FakeBackend {
    fn registry(&self) -> &str {
        &self.registry
    }

    fn candidate_locations(&self) -> Vec<String> {
        self.locations.clone()
    }

    fn has_credential(&self) -> bool {
        self.credential
    }

    fn probe(&self, path: &RepositoryPath) -> Outcome<()> {
        if let Some(denied) = self.check_credential() {
            return denied;
        }
        let state = self.state();
        if state.failing_lists.contains(&path.full()) {
            return Outcome::Failed(SweepError::Transient("probe timed out".into()));
        }
        if state.repos.contains_key(&path.full()) {
            Outcome::Ok(())
        } else {
            Outcome::NotFound
        }
    }

    fn list_images(&self, repository: &str, path: &RepositoryPath) -> Outcome<Vec<ImageRef>> {
        if let Some(denied) = self.check_credential() {
            return denied;
        }
        let mut state = self.state();
        state.list_calls += 1;
        if state.failing_lists.contains(&path.full()) {
            return Outcome::Failed(SweepError::Transient("list timed out".into()));
        }
        match state.repos.get(&path.full()) {
            Some(images) => Outcome::Ok(
                images
                    .iter()
                    .cloned()
                    .map(|mut image| {
                        image.repository = repository.to_string();
                        image
                    })
                    .collect(),
            ),
            None => Outcome::NotFound,
        }
    }

    fn fetch_manifest(&self, _path: &RepositoryPath, digest: &str) -> Outcome<ManifestDocument> {
        let state = self.state();
        if state.failing_manifests.contains(digest) {
            return Outcome::Failed(SweepError::Transient("manifest timed out".into()));
        }
        match state.manifests.get(digest) {
            Some(doc) => Outcome::Ok(doc.clone()),
            None => Outcome::NotFound,
        }
    }

    fn delete_image(&self, path: &RepositoryPath, image: &ImageRef) -> Outcome<()> {
        if let Some(denied) = self.check_credential() {
            return denied;
        }
        let Some(id) = image.deletion_id().map(str::to_string) else {
            return Outcome::Failed(SweepError::Parse("image has no digest".into()));
        };
        let mut state = self.state();
        if state.failing_deletes.contains(&id) {
            return Outcome::Failed(SweepError::Transient("delete returned HTTP 503".into()));
        }
        let Some(images) = state.repos.get_mut(&path.full()) else {
            return Outcome::NotFound;
        };
        let before = images.len();
        images.retain(|i| i.deletion_id() != Some(id.as_str()));
        if images.len() == before {
            return Outcome::NotFound;
        }
        state.deleted.push(id);
        Outcome::Ok(())
    }
}
