//! Per-run repository cache.

use crate::backend::RepositoryPath;
use crate::types::ImageRef;
use std::collections::HashMap;

/// Listings and resolved locations, keyed by bare repository name.
///
/// Lives for one run. Listings are dropped after any deletion in their
/// repository; locations stay valid for the whole run.
#[derive(Debug, Default)]
pub struct RepositoryCache {
    images: HashMap<String, Vec<ImageRef>>,
    locations: HashMap<String, RepositoryPath>,
}

impl RepositoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn images(&self, repository: &str) -> Option<&[ImageRef]> {
        self.images.get(repository).map(Vec::as_slice)
    }

    pub fn put_images(&mut self, repository: &str, images: Vec<ImageRef>) {
        self.images.insert(repository.to_string(), images);
    }

    pub fn location(&self, repository: &str) -> Option<&RepositoryPath> {
        self.locations.get(repository)
    }

    pub fn put_location(&mut self, repository: &str, path: RepositoryPath) {
        self.locations.insert(repository.to_string(), path);
    }

    pub fn invalidate(&mut self, repository: &str) {
        self.images.remove(repository);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalidate_keeps_location() {
        let mut cache = RepositoryCache::new();
        cache.put_images("app", vec![ImageRef::new("r.io", "app", "1.0.0")]);
        cache.put_location("app", RepositoryPath::new("team", "app"));

        cache.invalidate("app");
        assert!(cache.images("app").is_none());
        assert_eq!(cache.location("app").map(|p| p.full()), Some("team/app".into()));
    }
}
