//! Untagged platform manifest detection.

use crate::manifest::SubManifestSource;
use crate::types::{CleanupRecommendation, ImageRef, RecommendationKind};
use regsweep_core::Outcome;
use std::collections::BTreeSet;
use tracing::{info, warn};

/// Result of scanning one repository for orphans.
#[derive(Debug, Clone, PartialEq)]
pub enum OrphanScan {
    Swept(CleanupRecommendation),
    /// A root could not be expanded, or no root resolved to any platform
    /// manifest, so reachability is unknown and nothing is recommended.
    /// `candidates` untagged entries were left alone.
    Unresolved { candidates: usize },
}

/// Finds untagged platform manifests that no root references.
#[derive(Debug, Default, Clone, Copy)]
pub struct OrphanDetector;

impl OrphanDetector {
    /// `roots` are the tags that survive retention, including `latest`.
    pub fn detect(
        &self,
        registry: &str,
        repository: &str,
        catalog: &[ImageRef],
        roots: &[ImageRef],
        resolver: &dyn SubManifestSource,
    ) -> OrphanScan {
        let untagged: Vec<&ImageRef> =
            catalog.iter().filter(|i| i.is_platform_manifest()).collect();
        let swept = |tags_to_delete: Vec<ImageRef>| {
            OrphanScan::Swept(CleanupRecommendation {
                registry: registry.to_string(),
                repository: repository.to_string(),
                kind: RecommendationKind::Orphan,
                tags_to_delete,
            })
        };
        if untagged.is_empty() {
            return swept(Vec::new());
        }

        let mut reachable = BTreeSet::new();
        let mut unresolved_roots = 0;
        for root in roots.iter().filter(|r| !r.is_platform_manifest()) {
            match resolver.sub_manifest_digests(root) {
                Outcome::Ok(children) => reachable.extend(children),
                Outcome::NotFound => {}
                Outcome::Failed(e) => {
                    warn!(repository = %repository, tag = %root.tag, error = %e, "Root not expanded");
                    unresolved_roots += 1;
                }
            }
        }
        if unresolved_roots > 0 || reachable.is_empty() {
            warn!(
                repository = %repository,
                untagged = untagged.len(),
                unresolved_roots,
                "Reachable set unknown; skipping orphan detection"
            );
            return OrphanScan::Unresolved {
                candidates: untagged.len(),
            };
        }

        let root_digests: BTreeSet<&str> =
            roots.iter().filter_map(|r| r.digest.as_deref()).collect();
        let orphans: Vec<ImageRef> = untagged
            .into_iter()
            .filter(|image| match image.digest.as_deref() {
                Some(digest) => !reachable.contains(digest) && !root_digests.contains(digest),
                None => false,
            })
            .cloned()
            .collect();

        info!(
            repository = %repository,
            reachable = reachable.len(),
            orphans = orphans.len(),
            "Orphan detection complete"
        );

        swept(orphans)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{tags_of, tagged, untagged, REGISTRY};
    use regsweep_core::SweepError;
    use std::collections::HashMap;

    struct StaticGraph(HashMap<&'static str, Vec<&'static str>>);

    impl SubManifestSource for StaticGraph {
        fn sub_manifest_digests(&self, image: &ImageRef) -> Outcome<BTreeSet<String>> {
            match image.digest.as_deref() {
                Some("sha256:broken") => {
                    Outcome::Failed(SweepError::Transient("manifest timed out".into()))
                }
                Some(digest) => Outcome::Ok(
                    self.0
                        .get(digest)
                        .map(|c| c.iter().map(|s| s.to_string()).collect())
                        .unwrap_or_default(),
                ),
                None => Outcome::NotFound,
            }
        }
    }

    fn swept(scan: OrphanScan) -> CleanupRecommendation {
        match scan {
            OrphanScan::Swept(rec) => rec,
            other => panic!("expected a sweep, got {other:?}"),
        }
    }

    #[test]
    fn test_unreferenced_platform_manifests_are_orphans() {
        let catalog = vec![
            tagged("app", "latest", 10).with_digest("sha256:list"),
            untagged("app", "sha256:A"),
            untagged("app", "sha256:B"),
            untagged("app", "sha256:C"),
            untagged("app", "sha256:D"),
        ];
        let graph = StaticGraph(HashMap::from([("sha256:list", vec!["sha256:A", "sha256:B"])]));
        let roots = vec![catalog[0].clone()];

        let rec = swept(OrphanDetector.detect(REGISTRY, "app", &catalog, &roots, &graph));
        assert_eq!(rec.kind, RecommendationKind::Orphan);
        let digests: Vec<_> = rec
            .tags_to_delete
            .iter()
            .filter_map(|i| i.digest.clone())
            .collect();
        assert_eq!(digests, vec!["sha256:C", "sha256:D"]);
    }

    #[test]
    fn test_latest_alone_is_a_root() {
        let catalog = vec![
            tagged("app", "latest", 10).with_digest("sha256:list"),
            untagged("app", "sha256:A"),
        ];
        let graph = StaticGraph(HashMap::from([("sha256:list", vec!["sha256:A"])]));
        let rec = swept(OrphanDetector.detect(
            REGISTRY,
            "app",
            &catalog,
            &catalog[..1],
            &graph,
        ));
        assert!(rec.is_empty());
    }

    #[test]
    fn test_every_untagged_is_orphan_when_latest_references_others() {
        let catalog = vec![
            tagged("app", "latest", 10).with_digest("sha256:list"),
            untagged("app", "sha256:A"),
            untagged("app", "sha256:B"),
            untagged("app", "sha256:C"),
        ];
        let graph = StaticGraph(HashMap::from([("sha256:list", vec!["sha256:X", "sha256:Y"])]));
        let rec = swept(OrphanDetector.detect(
            REGISTRY,
            "app",
            &catalog,
            &catalog[..1],
            &graph,
        ));
        assert_eq!(rec.tags_to_delete.len(), 3);
    }

    #[test]
    fn test_nothing_resolves_skips_repository() {
        let catalog = vec![
            tagged("app", "latest", 10),
            tagged("app", "1.0.0", 5),
            untagged("app", "sha256:A"),
            untagged("app", "sha256:B"),
        ];
        let scan = OrphanDetector.detect(
            REGISTRY,
            "app",
            &catalog,
            &catalog[..2],
            &StaticGraph(HashMap::new()),
        );
        assert_eq!(scan, OrphanScan::Unresolved { candidates: 2 });
    }

    #[test]
    fn test_one_unexpandable_root_withholds_every_orphan() {
        let catalog = vec![
            tagged("app", "deployed", 10).with_digest("sha256:broken"),
            tagged("app", "latest", 20).with_digest("sha256:list"),
            untagged("app", "sha256:A"),
            untagged("app", "sha256:B"),
            untagged("app", "sha256:C"),
        ];
        let graph = StaticGraph(HashMap::from([("sha256:list", vec!["sha256:C"])]));
        let scan = OrphanDetector.detect(REGISTRY, "app", &catalog, &catalog[..2], &graph);
        assert_eq!(scan, OrphanScan::Unresolved { candidates: 3 });
    }

    #[test]
    fn test_no_untagged_entries_is_empty_sweep() {
        let catalog = vec![tagged("app", "latest", 10)];
        let rec = swept(OrphanDetector.detect(
            REGISTRY,
            "app",
            &catalog,
            &catalog,
            &StaticGraph(HashMap::new()),
        ));
        assert!(rec.is_empty());
        assert_eq!(tags_of(&rec.tags_to_delete), Vec::<String>::new());
    }
}
