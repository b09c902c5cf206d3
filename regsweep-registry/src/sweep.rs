//! Whole-registry sweep: retention, orphan detection and optional deletion
//! for every repository that has a deployed image.

use crate::backend::{RegistryBackend, RepositoryPath};
use crate::catalog::RepositoryCatalog;
use crate::deletion::DeletionExecutor;
use crate::manifest::ManifestGraphResolver;
use crate::orphan::{OrphanDetector, OrphanScan};
use crate::retention::RetentionPolicy;
use crate::types::{CleanupRecommendation, DeletionFailure, ImageRef, RecommendationKind};
use regsweep_core::SweepError;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, info_span, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepMode {
    /// Produce recommendations only.
    Plan,
    /// Produce recommendations and delete them.
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepOptions {
    pub keep_count: usize,
    pub orphan_cleanup: bool,
    /// Repositories swept even without a deployed image; only `latest` roots them.
    pub extra_repositories: Vec<String>,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            keep_count: 5,
            orphan_cleanup: true,
            extra_repositories: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RepositoryStatus {
    Processed,
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepositoryReport {
    pub repository: String,
    #[serde(flatten)]
    pub status: RepositoryStatus,
    pub images: usize,
    pub protected: usize,
    pub retention_candidates: usize,
    pub orphan_candidates: usize,
    /// Untagged manifests left alone because reachability was unknown.
    pub skipped_for_uncertainty: usize,
}

impl RepositoryReport {
    fn skipped(repository: &str, reason: String) -> Self {
        Self {
            repository: repository.to_string(),
            status: RepositoryStatus::Skipped { reason },
            images: 0,
            protected: 0,
            retention_candidates: 0,
            orphan_candidates: 0,
            skipped_for_uncertainty: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepReport {
    pub registry: String,
    pub mode: SweepMode,
    pub keep_count: usize,
    pub repositories: Vec<RepositoryReport>,
    pub recommendations: Vec<CleanupRecommendation>,
    pub deleted: Vec<ImageRef>,
    pub failed: Vec<DeletionFailure>,
}

impl SweepReport {
    pub fn recommended_count(&self, kind: RecommendationKind) -> usize {
        self.recommendations
            .iter()
            .filter(|r| r.kind == kind)
            .map(|r| r.tags_to_delete.len())
            .sum()
    }

    pub fn skipped_repositories(&self) -> impl Iterator<Item = &RepositoryReport> {
        self.repositories
            .iter()
            .filter(|r| matches!(r.status, RepositoryStatus::Skipped { .. }))
    }
}

/// Runs the policy engine over one registry, one repository at a time.
pub struct Sweeper<B: RegistryBackend> {
    catalog: RepositoryCatalog<B>,
    options: SweepOptions,
}

impl<B: RegistryBackend> Sweeper<B> {
    pub fn new(backend: B, options: SweepOptions) -> Self {
        Self {
            catalog: RepositoryCatalog::new(backend),
            options,
        }
    }

    pub fn catalog_mut(&mut self) -> &mut RepositoryCatalog<B> {
        &mut self.catalog
    }

    /// Repositories to sweep, in first-seen order, each with the deployed
    /// references that protect it. Images on other registries are ignored.
    pub fn targets(&self, deployed: &[ImageRef]) -> Vec<(String, Vec<ImageRef>)> {
        let registry = self.catalog.registry();
        let mut order: Vec<String> = Vec::new();
        let mut by_repository: HashMap<String, Vec<ImageRef>> = HashMap::new();

        for image in deployed {
            if !image.registry.eq_ignore_ascii_case(registry) {
                debug!(image = %image, "Ignoring image on another registry");
                continue;
            }
            let repository = self.catalog.normalize_repository(&image.repository);
            let mut image = image.clone();
            image.registry = registry.to_string();
            image.repository = repository.clone();
            let entry = by_repository.entry(repository.clone()).or_insert_with(|| {
                order.push(repository);
                Vec::new()
            });
            if !entry.contains(&image) {
                entry.push(image);
            }
        }

        for extra in &self.options.extra_repositories {
            let raw = extra
                .strip_prefix(&format!("{registry}/"))
                .unwrap_or(extra.as_str());
            let repository = self.catalog.normalize_repository(raw);
            if !by_repository.contains_key(&repository) {
                by_repository.insert(repository.clone(), Vec::new());
                order.push(repository);
            }
        }

        order
            .into_iter()
            .map(|repository| {
                let refs = by_repository.remove(&repository).unwrap_or_default();
                (repository, refs)
            })
            .collect()
    }

    pub fn run(&mut self, deployed: &[ImageRef], mode: SweepMode) -> SweepReport {
        let mut report = SweepReport {
            registry: self.catalog.registry().to_string(),
            mode,
            keep_count: self.options.keep_count,
            repositories: Vec::new(),
            recommendations: Vec::new(),
            deleted: Vec::new(),
            failed: Vec::new(),
        };

        let targets = self.targets(deployed);
        info!(
            registry = %report.registry,
            repositories = targets.len(),
            mode = ?mode,
            "Starting sweep"
        );
        if !self.catalog.backend().has_credential() {
            let reason = SweepError::AuthUnavailable {
                registry: report.registry.clone(),
            }
            .to_string();
            warn!(registry = %report.registry, "No stored credential; skipping every repository");
            report.repositories.extend(
                targets
                    .iter()
                    .map(|(repository, _)| RepositoryReport::skipped(repository, reason.clone())),
            );
            return report;
        }
        for (repository, refs) in targets {
            self.sweep_repository(&repository, &refs, mode, &mut report);
        }

        info!(
            retention = report.recommended_count(RecommendationKind::Retention),
            orphans = report.recommended_count(RecommendationKind::Orphan),
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            "Sweep complete"
        );
        report
    }

    fn sweep_repository(
        &mut self,
        repository: &str,
        deployed: &[ImageRef],
        mode: SweepMode,
        report: &mut SweepReport,
    ) {
        let span = info_span!(
            "repository",
            registry = %report.registry,
            repository = %repository
        );
        let _enter = span.enter();

        let images = match self.catalog.list_images(repository) {
            Ok(images) => images,
            Err(e) => {
                warn!(error = %e, "Skipping repository");
                report
                    .repositories
                    .push(RepositoryReport::skipped(repository, e.to_string()));
                return;
            }
        };

        let path = match self.catalog.locate(repository) {
            Ok(Some(path)) => path,
            _ => RepositoryPath::root(repository),
        };

        let mut entry = RepositoryReport {
            repository: repository.to_string(),
            status: RepositoryStatus::Processed,
            images: images.len(),
            protected: 0,
            retention_candidates: 0,
            orphan_candidates: 0,
            skipped_for_uncertainty: 0,
        };
        let mut recommendations = Vec::new();
        {
            let resolver = ManifestGraphResolver::new(self.catalog.backend(), path);
            let decision = RetentionPolicy::new(self.options.keep_count).evaluate(
                &report.registry,
                repository,
                &images,
                deployed,
                &resolver,
            );
            entry.protected = decision.protected.len();
            entry.retention_candidates = decision.recommendation.tags_to_delete.len();

            if self.options.orphan_cleanup {
                match OrphanDetector.detect(
                    &report.registry,
                    repository,
                    &images,
                    &decision.survivors(),
                    &resolver,
                ) {
                    OrphanScan::Swept(orphans) => {
                        entry.orphan_candidates = orphans.tags_to_delete.len();
                        if !orphans.is_empty() {
                            recommendations.push(orphans);
                        }
                    }
                    OrphanScan::Unresolved { candidates } => {
                        entry.skipped_for_uncertainty = candidates;
                    }
                }
            }
            if !decision.recommendation.is_empty() {
                recommendations.insert(0, decision.recommendation);
            }
        }

        if mode == SweepMode::Delete && !recommendations.is_empty() {
            let outcome = DeletionExecutor::new(&mut self.catalog).execute(&recommendations);
            report.deleted.extend(outcome.deleted);
            report.failed.extend(outcome.failed);
        }

        report.repositories.push(entry);
        report.recommendations.extend(recommendations);
    }
}
