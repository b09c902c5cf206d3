//! Retention and garbage-collection engine for OCI/Docker v2 registries.
//!
//! The engine lists every image in a repository, protects what is deployed,
//! keeps the newest unprotected tags and recommends the rest for deletion.
//! A second pass finds untagged platform manifests that no surviving
//! multi-architecture index references. Nothing is destroyed unless the
//! caller explicitly invokes the [`deletion::DeletionExecutor`].
//!
//! Module map, bottom-up:
//! - [`types`]: image references, version classification and ordering
//! - [`credentials`], [`auth`], [`http`]: talking to the registry
//! - [`backend`], [`distribution`]: the registry API seam and its v2 implementation
//! - [`cache`], [`catalog`]: cached per-repository listings and location search
//! - [`manifest`]: manifest-list expansion
//! - [`retention`], [`orphan`], [`deletion`], [`updates`], [`sweep`]: the policy engine

pub mod auth;
pub mod backend;
pub mod cache;
pub mod catalog;
pub mod credentials;
pub mod deletion;
pub mod distribution;
pub mod http;
pub mod manifest;
pub mod orphan;
pub mod retention;
pub mod sweep;
pub mod types;
pub mod updates;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{RegistryBackend, RepositoryPath};
pub use catalog::RepositoryCatalog;
pub use distribution::DistributionBackend;
pub use sweep::{SweepMode, SweepReport, Sweeper};
pub use types::{
    CleanupRecommendation, DeletionFailure, ImageRef, ImageVersion, RecommendationKind,
    UpdateInfo, VersionKind,
};

/// Tag that is always protected and always an orphan-detection root.
pub const LATEST_TAG: &str = "latest";

/// Prefix of the synthetic tag given to untagged platform manifests.
pub const UNTAGGED_PREFIX: &str = "untagged@";
