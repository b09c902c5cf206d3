//! Newer-version detection for deployed images.

use crate::backend::RegistryBackend;
use crate::catalog::RepositoryCatalog;
use crate::types::{ImageRef, UpdateInfo};
use std::cmp::Ordering;
use tracing::{debug, warn};

/// The newest image in `available` that is strictly newer than `current`.
///
/// Versions compare within one tagging scheme: a semver deployment is only
/// compared against semver tags, anything else against dated non-semver tags.
/// `current` takes its creation time from the catalog entry with the same tag.
pub fn newest_available<'a>(current: &ImageRef, available: &'a [ImageRef]) -> Option<&'a ImageRef> {
    let mut current = current.clone();
    if current.created_at.is_none() {
        current.created_at = available
            .iter()
            .find(|i| i.tag == current.tag)
            .and_then(|i| i.created_at);
    }

    let semver = current.version().is_semver();
    if !semver && current.created_at.is_none() {
        return None;
    }

    available
        .iter()
        .filter(|i| i.is_normal_tag())
        .filter(|i| i.version().is_semver() == semver)
        .filter(|i| semver || i.created_at.is_some())
        .filter(|i| i.cmp_version(&current) == Ordering::Greater)
        .max_by(|a, b| a.cmp_version(b))
}

/// Check each deployed image on the catalog's registry for a newer version.
pub fn check_image_updates<B: RegistryBackend>(
    catalog: &mut RepositoryCatalog<B>,
    deployed: &[ImageRef],
) -> Vec<UpdateInfo> {
    let mut updates = Vec::new();
    for image in deployed {
        if !image.registry.eq_ignore_ascii_case(catalog.registry())
            || image.tag.is_empty()
            || image.is_latest()
        {
            debug!(image = %image, "Skipping update check");
            continue;
        }
        let repository = catalog.normalize_repository(&image.repository);
        let available = match catalog.list_images(&repository) {
            Ok(images) => images,
            Err(e) => {
                warn!(image = %image, error = %e, "Failed to list images for update check");
                continue;
            }
        };
        let mut current = image.clone();
        current.repository = repository;
        if let Some(latest) = newest_available(&current, &available) {
            let is_major_update = match (current.version().major(), latest.version().major()) {
                (Some(from), Some(to)) => to > from,
                _ => false,
            };
            updates.push(UpdateInfo {
                current,
                latest: latest.clone(),
                is_major_update,
            });
        }
    }
    updates
}
