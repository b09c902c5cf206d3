//! Cached repository listings and location search.

use crate::backend::{RegistryBackend, RepositoryPath};
use crate::cache::RepositoryCache;
use crate::types::ImageRef;
use regsweep_core::error::{Result, SweepError};
use regsweep_core::Outcome;
use tracing::{debug, info, warn};

/// Lists repositories through a backend, caching results for the run.
pub struct RepositoryCatalog<B: RegistryBackend> {
    backend: B,
    cache: RepositoryCache,
}

impl<B: RegistryBackend> RepositoryCatalog<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            cache: RepositoryCache::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn registry(&self) -> &str {
        self.backend.registry()
    }

    /// Strip a configured namespace prefix: `team-a/app` becomes `app`
    /// when `team-a` is a candidate location.
    pub fn normalize_repository(&self, raw: &str) -> String {
        for location in self.backend.candidate_locations() {
            if location.is_empty() {
                continue;
            }
            if let Some(rest) = raw.strip_prefix(&format!("{location}/")) {
                if !rest.is_empty() {
                    return rest.to_string();
                }
            }
        }
        raw.to_string()
    }

    /// Find where `repository` lives, searching candidate locations in order.
    ///
    /// `Ok(None)` means every location answered "not here". If some location
    /// failed transiently and none matched, the answer is unknown and an
    /// error is returned instead.
    pub fn locate(&mut self, repository: &str) -> Result<Option<RepositoryPath>> {
        if let Some(path) = self.cache.location(repository) {
            return Ok(Some(path.clone()));
        }

        let mut last_failure: Option<SweepError> = None;
        for location in self.backend.candidate_locations() {
            let path = RepositoryPath::new(location, repository);
            match self.backend.probe(&path) {
                Outcome::Ok(()) => {
                    debug!(repository = %repository, path = %path, "Located repository");
                    self.cache.put_location(repository, path.clone());
                    return Ok(Some(path));
                }
                Outcome::NotFound => continue,
                Outcome::Failed(e @ SweepError::AuthUnavailable { .. }) => return Err(e),
                Outcome::Failed(SweepError::AccessDenied(reason)) => {
                    debug!(path = %path, "Location not accessible: {}", reason);
                }
                Outcome::Failed(e) => {
                    warn!(path = %path, error = %e, "Failed to probe location");
                    last_failure = Some(e);
                }
            }
        }

        match last_failure {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }

    /// Every image in `repository`, including `latest` and untagged manifests.
    ///
    /// A repository found nowhere yields an empty listing.
    pub fn list_images(&mut self, repository: &str) -> Result<Vec<ImageRef>> {
        if let Some(images) = self.cache.images(repository) {
            debug!(repository = %repository, "Using cached listing");
            return Ok(images.to_vec());
        }

        let Some(path) = self.locate(repository)? else {
            warn!(
                repository = %repository,
                "Repository not found anywhere accessible"
            );
            return Ok(Vec::new());
        };

        match self.backend.list_images(repository, &path) {
            Outcome::Ok(images) => {
                info!(repository = %repository, count = images.len(), "Listed images");
                self.cache.put_images(repository, images.clone());
                Ok(images)
            }
            Outcome::NotFound => {
                warn!(path = %path, "Repository disappeared while listing");
                Ok(Vec::new())
            }
            Outcome::Failed(e) => Err(e),
        }
    }

    /// Drop the cached listing so the next call observes deletions.
    pub fn invalidate(&mut self, repository: &str) {
        self.cache.invalidate(repository);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{tagged, FakeBackend, REGISTRY};

    fn catalog_with_namespaces() -> RepositoryCatalog<FakeBackend> {
        let backend = FakeBackend::new(REGISTRY).with_locations(&["team-a", "team-b"]);
        backend.add_images(
            &RepositoryPath::new("team-b", "app"),
            vec![tagged("app", "1.0.0", 1), tagged("app", "latest", 2)],
        );
        RepositoryCatalog::new(backend)
    }

    #[test]
    fn test_location_search_skips_not_found() {
        let mut catalog = catalog_with_namespaces();
        let images = catalog.list_images("app").expect("should list");
        assert_eq!(images.len(), 2);
        assert!(images.iter().any(|i| i.is_latest()));
        assert_eq!(
            catalog.locate("app").expect("should locate"),
            Some(RepositoryPath::new("team-b", "app"))
        );
    }

    #[test]
    fn test_listing_is_cached_until_invalidated() {
        let mut catalog = catalog_with_namespaces();
        catalog.list_images("app").expect("should list");
        catalog.list_images("app").expect("should list");
        assert_eq!(catalog.backend().list_calls(), 1);

        catalog.invalidate("app");
        catalog.list_images("app").expect("should list");
        assert_eq!(catalog.backend().list_calls(), 2);
    }

    #[test]
    fn test_repository_found_nowhere_is_empty() {
        let mut catalog = catalog_with_namespaces();
        assert!(catalog.list_images("ghost").expect("should list").is_empty());
    }

    #[test]
    fn test_transient_probe_failure_is_not_treated_as_absent() {
        let backend = FakeBackend::new(REGISTRY).with_locations(&["team-a", "team-b"]);
        backend.fail_list(&RepositoryPath::new("team-a", "app"));
        let mut catalog = RepositoryCatalog::new(backend);
        assert!(matches!(
            catalog.list_images("app"),
            Err(SweepError::Transient(_))
        ));
    }

    #[test]
    fn test_missing_credential_propagates() {
        let backend = FakeBackend::new(REGISTRY).without_credential();
        let mut catalog = RepositoryCatalog::new(backend);
        assert!(matches!(
            catalog.list_images("app"),
            Err(SweepError::AuthUnavailable { .. })
        ));
    }

    #[test]
    fn test_normalize_strips_namespace_prefix() {
        let catalog = catalog_with_namespaces();
        assert_eq!(catalog.normalize_repository("team-a/app"), "app");
        assert_eq!(catalog.normalize_repository("other/app"), "other/app");
        assert_eq!(catalog.normalize_repository("app"), "app");
    }
}
