//! Tag retention policy.
//!
//! Deployed tags and `latest` are never recommended. Of the remaining tags the
//! newest `keep_count` are kept; everything older is a candidate. A candidate
//! survives anyway if a kept tag shares its digest, or if a kept manifest list
//! references it, since deleting it would break a surviving image. When a kept
//! list cannot be expanded every remaining candidate is kept.

use crate::manifest::SubManifestSource;
use crate::types::{CleanupRecommendation, ImageRef, RecommendationKind};
use regsweep_core::Outcome;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub keep_count: usize,
}

/// Outcome of applying the policy to a single repository.
#[derive(Debug, Clone)]
pub struct RetentionDecision {
    pub recommendation: CleanupRecommendation,
    /// Deployed tags plus `latest`.
    pub protected: Vec<ImageRef>,
    /// The newest `keep_count` unprotected tags.
    pub retained: Vec<ImageRef>,
    /// Older tags kept because a surviving image depends on their digest, or
    /// because they have no digest at all.
    pub rescued: Vec<ImageRef>,
}

impl RetentionDecision {
    /// Every tag that is not recommended for deletion.
    pub fn survivors(&self) -> Vec<ImageRef> {
        self.protected
            .iter()
            .chain(&self.retained)
            .chain(&self.rescued)
            .cloned()
            .collect()
    }
}

/// Whether `image` is one of the `deployed` references. A deployment pinned by
/// digest also protects every tag pointing at that digest.
pub fn is_deployed(image: &ImageRef, deployed: &[ImageRef]) -> bool {
    deployed.iter().any(|d| {
        d.registry.eq_ignore_ascii_case(&image.registry)
            && d.repository == image.repository
            && ((!d.tag.is_empty() && d.tag == image.tag)
                || (d.digest.is_some() && d.digest == image.digest))
    })
}

/// Newest first; tags without a creation time are treated as newest.
fn newest_first(a: &ImageRef, b: &ImageRef) -> Ordering {
    match (a.created_at, b.created_at) {
        (Some(x), Some(y)) => y.cmp(&x).then_with(|| b.cmp_version(a)),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => b.cmp_version(a),
    }
}

impl RetentionPolicy {
    pub fn new(keep_count: usize) -> Self {
        Self { keep_count }
    }

    /// Apply the policy to one repository's catalog.
    ///
    /// `deployed` holds the deployment references for this repository.
    pub fn evaluate(
        &self,
        registry: &str,
        repository: &str,
        catalog: &[ImageRef],
        deployed: &[ImageRef],
        resolver: &dyn SubManifestSource,
    ) -> RetentionDecision {
        let mut protected = Vec::new();
        let mut eligible = Vec::new();
        for image in catalog.iter().filter(|i| !i.is_platform_manifest()) {
            if image.is_latest() || is_deployed(image, deployed) {
                protected.push(image.clone());
            } else {
                eligible.push(image.clone());
            }
        }

        eligible.sort_by(newest_first);
        let split = self.keep_count.min(eligible.len());
        let candidates = eligible.split_off(split);
        let retained = eligible;

        // Without a digest the registry state of a tag is unknown.
        let (mut rescued, mut candidates): (Vec<_>, Vec<_>) =
            candidates.into_iter().partition(|c| c.digest.is_none());

        let mut keep_digests = BTreeSet::new();
        let mut frontier: Vec<ImageRef> = protected.iter().chain(&retained).cloned().collect();
        while !frontier.is_empty() {
            let mut unknown = false;
            for image in &frontier {
                keep_digests.extend(image.digest.iter().cloned());
                match resolver.sub_manifest_digests(image) {
                    Outcome::Ok(children) => keep_digests.extend(children),
                    Outcome::NotFound => {}
                    Outcome::Failed(e) => {
                        warn!(tag = %image.tag, error = %e, "Children of a surviving image unknown");
                        unknown = true;
                    }
                }
            }
            // A surviving list may reference any remaining candidate.
            if unknown {
                rescued.append(&mut candidates);
                break;
            }
            let (saved, remaining): (Vec<_>, Vec<_>) = candidates.into_iter().partition(|c| {
                c.digest
                    .as_ref()
                    .is_some_and(|digest| keep_digests.contains(digest))
            });
            candidates = remaining;
            for image in &saved {
                debug!(tag = %image.tag, "Kept: digest referenced by a surviving image");
            }
            rescued.extend(saved.iter().cloned());
            frontier = saved;
        }

        info!(
            protected = protected.len(),
            retained = retained.len(),
            rescued = rescued.len(),
            candidates = candidates.len(),
            "Retention evaluated"
        );

        RetentionDecision {
            recommendation: CleanupRecommendation {
                registry: registry.to_string(),
                repository: repository.to_string(),
                kind: RecommendationKind::Retention,
                tags_to_delete: candidates,
            },
            protected,
            retained,
            rescued,
        }
    }
}
