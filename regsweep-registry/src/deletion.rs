//! Executes cleanup recommendations.

use crate::backend::RegistryBackend;
use crate::catalog::RepositoryCatalog;
use crate::types::{CleanupRecommendation, DeletionFailure, ImageRef};
use regsweep_core::Outcome;
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeletionReport {
    pub deleted: Vec<ImageRef>,
    pub failed: Vec<DeletionFailure>,
}

impl DeletionReport {
    pub fn merge(&mut self, other: DeletionReport) {
        self.deleted.extend(other.deleted);
        self.failed.extend(other.failed);
    }

    fn fail_all(&mut self, images: &[ImageRef], error: &str) {
        self.failed
            .extend(images.iter().cloned().map(|image| DeletionFailure {
                image,
                error: error.to_string(),
            }));
    }
}

/// Deletes exactly the images named by recommendations, nothing else.
///
/// A failure on one image is recorded and the batch continues. A 404 means
/// the image is already gone and counts as deleted.
pub struct DeletionExecutor<'a, B: RegistryBackend> {
    catalog: &'a mut RepositoryCatalog<B>,
}

impl<'a, B: RegistryBackend> DeletionExecutor<'a, B> {
    pub fn new(catalog: &'a mut RepositoryCatalog<B>) -> Self {
        Self { catalog }
    }

    pub fn execute(&mut self, recommendations: &[CleanupRecommendation]) -> DeletionReport {
        let mut report = DeletionReport::default();
        for recommendation in recommendations.iter().filter(|r| !r.is_empty()) {
            report.merge(self.execute_one(recommendation));
        }
        report
    }

    fn execute_one(&mut self, recommendation: &CleanupRecommendation) -> DeletionReport {
        let mut report = DeletionReport::default();
        let repository = recommendation.repository.as_str();
        let images = &recommendation.tags_to_delete;

        if !recommendation
            .registry
            .eq_ignore_ascii_case(self.catalog.registry())
        {
            report.fail_all(
                images,
                &format!(
                    "registry {} is not the configured registry",
                    recommendation.registry
                ),
            );
            return report;
        }

        let path = match self.catalog.locate(repository) {
            Ok(Some(path)) => path,
            Ok(None) => {
                report.fail_all(images, "repository not found");
                return report;
            }
            Err(e) => {
                report.fail_all(images, &e.to_string());
                return report;
            }
        };

        info!(
            repository = %repository,
            kind = ?recommendation.kind,
            count = images.len(),
            "Deleting images"
        );
        for image in images {
            match self.catalog.backend().delete_image(&path, image) {
                Outcome::Ok(()) => {
                    info!(image = %image.tag, "Deleted");
                    report.deleted.push(image.clone());
                }
                Outcome::NotFound => {
                    debug!(image = %image.tag, "Already deleted");
                    report.deleted.push(image.clone());
                }
                Outcome::Failed(e) => {
                    warn!(image = %image.tag, error = %e, "Failed to delete");
                    report.failed.push(DeletionFailure {
                        image: image.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        self.catalog.invalidate(repository);
        report
    }
}
