//! [`RegistryBackend`] over the Docker Registry HTTP API v2.
//!
//! Tags come from `/v2/<path>/tags/list`, following `Link: rel="next"`
//! pagination. Each tag's digest is taken from `Docker-Content-Digest`, or
//! computed from the manifest body when the header is absent. Creation time
//! comes from the `org.opencontainers.image.created` annotation, else from the
//! image config blob; for an index, from its first child's config.
//!
//! The v2 API cannot enumerate untagged manifests directly. Instead, every
//! child of a listed index that carries no tag of its own is returned as a
//! platform-manifest entry, dated like its first parent index.

use crate::auth::{Action, AuthHeader, RegistryAuthNegotiator};
use crate::backend::{RegistryBackend, RepositoryPath};
use crate::credentials::DockerCredentials;
use crate::http::{RegistryHttp, RegistryResponse};
use crate::manifest::{ManifestDocument, MANIFEST_ACCEPT};
use crate::types::ImageRef;
use chrono::{DateTime, Utc};
use regsweep_core::error::{Result, SweepError};
use regsweep_core::Outcome;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Upper bound on followed tag pages, guarding against pagination loops.
const MAX_TAG_PAGES: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionSettings {
    /// Bare host, e.g. `registry.example.com:5000`.
    pub registry: String,
    pub plain_http: bool,
    pub namespaces: Vec<String>,
    pub timeout: Duration,
    pub page_size: usize,
}

#[derive(Debug, Deserialize)]
struct TagList {
    #[serde(default)]
    tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ImageConfig {
    #[serde(default)]
    created: Option<String>,
}

struct AuthSession {
    path: String,
    action: Action,
    header: AuthHeader,
}

pub struct DistributionBackend {
    settings: DistributionSettings,
    http: RegistryHttp,
    negotiator: RegistryAuthNegotiator,
    /// Credential for the repository currently being processed. Replaced,
    /// never accumulated, when another repository or action is requested.
    session: Mutex<Option<AuthSession>>,
}

impl DistributionBackend {
    pub fn new(settings: DistributionSettings, credentials: DockerCredentials) -> Result<Self> {
        let scheme = if settings.plain_http { "http" } else { "https" };
        let http = RegistryHttp::new(
            &format!("{}://{}", scheme, settings.registry),
            settings.timeout,
        )?;
        let negotiator = RegistryAuthNegotiator::new(&settings.registry, http.clone(), credentials);
        Ok(Self {
            settings,
            http,
            negotiator,
            session: Mutex::new(None),
        })
    }

    fn auth(&self, path: &RepositoryPath, action: Action) -> Outcome<AuthHeader> {
        let full = path.full();
        let mut session = self
            .session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(current) = session.as_ref() {
            if current.path == full && current.action == action {
                return Outcome::Ok(current.header.clone());
            }
        }
        match self.negotiator.resolve(&full, action) {
            Outcome::Ok(header) => {
                *session = Some(AuthSession {
                    path: full,
                    action,
                    header: header.clone(),
                });
                Outcome::Ok(header)
            }
            other => {
                *session = None;
                other
            }
        }
    }

    fn get(&self, url: &str, auth: &AuthHeader, what: &str) -> Outcome<RegistryResponse> {
        let request = auth.apply(self.http.get(url));
        self.http.execute(request, what)
    }

    fn get_manifest(
        &self,
        path: &RepositoryPath,
        reference: &str,
        auth: &AuthHeader,
    ) -> Outcome<(String, ManifestDocument)> {
        let url = self
            .http
            .url(&format!("/v2/{}/manifests/{}", path.full(), reference));
        let request = auth.apply(self.http.get(&url).header("Accept", MANIFEST_ACCEPT));
        let what = format!("GET manifest {}:{}", path, reference);
        self.http.execute(request, &what).and_then(|response| {
            let digest = response
                .content_digest
                .clone()
                .unwrap_or_else(|| content_digest(&response.body));
            match ManifestDocument::parse(&response.body, response.content_type.as_deref()) {
                Ok(doc) => Outcome::Ok((digest, doc)),
                Err(e) => Outcome::Failed(e),
            }
        })
    }

    fn config_created(
        &self,
        path: &RepositoryPath,
        doc: &ManifestDocument,
        auth: &AuthHeader,
    ) -> Option<DateTime<Utc>> {
        let config = doc.config.as_ref()?;
        let url = self
            .http
            .url(&format!("/v2/{}/blobs/{}", path.full(), config.digest));
        let response = self.get(&url, auth, "GET config blob").ok()?;
        let config: ImageConfig = response.json().ok()?;
        parse_timestamp(config.created.as_deref()?)
    }

    fn created_at(
        &self,
        path: &RepositoryPath,
        doc: &ManifestDocument,
        auth: &AuthHeader,
    ) -> Option<DateTime<Utc>> {
        if let Some(created) = doc.created_annotation().and_then(parse_timestamp) {
            return Some(created);
        }
        if doc.is_index() {
            let first = doc.manifests.first()?;
            let (_, child) = self.get_manifest(path, &first.digest, auth).ok()?;
            if let Some(created) = child.created_annotation().and_then(parse_timestamp) {
                return Some(created);
            }
            return self.config_created(path, &child, auth);
        }
        self.config_created(path, doc, auth)
    }

    fn list_tags(&self, path: &RepositoryPath, auth: &AuthHeader) -> Outcome<Vec<String>> {
        let mut url = self.http.url(&format!(
            "/v2/{}/tags/list?n={}",
            path.full(),
            self.settings.page_size
        ));
        let mut tags = Vec::new();
        let mut seen_pages = HashSet::new();

        for _ in 0..MAX_TAG_PAGES {
            if !seen_pages.insert(url.clone()) {
                warn!(path = %path, "Tag pagination repeated a page; stopping");
                break;
            }
            let response = match self.get(&url, auth, &format!("GET tags {}", path)) {
                Outcome::Ok(response) => response,
                Outcome::NotFound => return Outcome::NotFound,
                Outcome::Failed(e) => return Outcome::Failed(e),
            };
            let page: TagList = match response.json() {
                Ok(page) => page,
                Err(e) => return Outcome::Failed(e),
            };
            tags.extend(page.tags.unwrap_or_default());

            match response
                .link
                .as_deref()
                .and_then(|link| next_page_url(&url, link))
            {
                Some(next) => url = next,
                None => break,
            }
        }
        Outcome::Ok(tags)
    }
}

impl RegistryBackend for DistributionBackend {
    fn registry(&self) -> &str {
        &self.settings.registry
    }

    fn candidate_locations(&self) -> Vec<String> {
        if self.settings.namespaces.is_empty() {
            vec![String::new()]
        } else {
            self.settings.namespaces.clone()
        }
    }

    fn has_credential(&self) -> bool {
        self.negotiator.has_credential()
    }

    fn probe(&self, path: &RepositoryPath) -> Outcome<()> {
        self.auth(path, Action::Pull).and_then(|auth| {
            let url = self
                .http
                .url(&format!("/v2/{}/tags/list?n=1", path.full()));
            self.get(&url, &auth, &format!("probe {}", path)).map(|_| ())
        })
    }

    fn list_images(&self, repository: &str, path: &RepositoryPath) -> Outcome<Vec<ImageRef>> {
        let auth = match self.auth(path, Action::Pull) {
            Outcome::Ok(auth) => auth,
            Outcome::NotFound => return Outcome::NotFound,
            Outcome::Failed(e) => return Outcome::Failed(e),
        };
        let tags = match self.list_tags(path, &auth) {
            Outcome::Ok(tags) => tags,
            Outcome::NotFound => return Outcome::NotFound,
            Outcome::Failed(e) => return Outcome::Failed(e),
        };

        let mut images = Vec::with_capacity(tags.len());
        let mut children: BTreeMap<String, Option<DateTime<Utc>>> = BTreeMap::new();
        for tag in tags {
            let mut image = ImageRef::new(&self.settings.registry, repository, &tag);
            match self.get_manifest(path, &tag, &auth) {
                Outcome::Ok((digest, doc)) => {
                    image.created_at = self.created_at(path, &doc, &auth);
                    for child in doc.child_digests() {
                        children.entry(child).or_insert(image.created_at);
                    }
                    image.opaque_id = Some(digest.clone());
                    image.digest = Some(digest);
                }
                Outcome::NotFound => {
                    debug!(tag = %tag, "Tag vanished while listing");
                    continue;
                }
                // Kept without a digest: it sorts as newest and cannot be deleted.
                Outcome::Failed(e) => {
                    warn!(tag = %tag, error = %e, "Failed to describe tag");
                }
            }
            images.push(image);
        }

        let tagged: HashSet<String> = images.iter().filter_map(|i| i.digest.clone()).collect();
        for (digest, created_at) in children {
            if tagged.contains(&digest) {
                continue;
            }
            let mut image =
                ImageRef::platform_manifest(&self.settings.registry, repository, &digest)
                    .with_opaque_id(&digest);
            image.created_at = created_at;
            images.push(image);
        }
        Outcome::Ok(images)
    }

    fn fetch_manifest(&self, path: &RepositoryPath, digest: &str) -> Outcome<ManifestDocument> {
        self.auth(path, Action::Pull)
            .and_then(|auth| self.get_manifest(path, digest, &auth))
            .map(|(_, doc)| doc)
    }

    fn delete_image(&self, path: &RepositoryPath, image: &ImageRef) -> Outcome<()> {
        let Some(digest) = image.deletion_id() else {
            return Outcome::Failed(SweepError::Parse(format!(
                "{} has no digest to delete",
                image
            )));
        };
        self.auth(path, Action::Delete).and_then(|auth| {
            let url = self
                .http
                .url(&format!("/v2/{}/manifests/{}", path.full(), digest));
            let request = auth.apply(self.http.delete(&url));
            self.http
                .execute(request, &format!("DELETE {}@{}", path, digest))
                .map(|_| ())
        })
    }
}

/// `sha256:<hex>` of a manifest body.
pub fn content_digest(body: &[u8]) -> String {
    let hash = Sha256::digest(body);
    let hex: String = hash.iter().map(|b| format!("{b:02x}")).collect();
    format!("sha256:{hex}")
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Resolve the `rel="next"` target of a `Link` header against `current`.
fn next_page_url(current: &str, link: &str) -> Option<String> {
    let entry = link
        .split(',')
        .find(|part| part.contains("rel=\"next\"") || part.contains("rel=next"))?;
    let start = entry.find('<')? + 1;
    let end = entry[start..].find('>')? + start;
    let target = &entry[start..end];
    let base = Url::parse(current).ok()?;
    base.join(target).ok().map(|u| u.to_string())
}
