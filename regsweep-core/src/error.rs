use std::fmt::{self, Display, Formatter};
use thiserror::Error;

/// Failure taxonomy shared by every regsweep crate.
///
/// Registry failures are always scoped to one image or one repository; none of
/// these variants is allowed to abort processing of sibling repositories.
#[derive(Error, Debug)]
pub enum SweepError {
    /// No stored credential exists for the registry. The repository is skipped.
    AuthUnavailable { registry: String },
    /// The registry rejected the credential (401/403) for one location.
    AccessDenied(String),
    /// The registry answered 404. On delete this counts as success.
    NotFound(String),
    /// Timeout, connection failure or 5xx. Degrades to "unknown".
    Transient(String),
    /// A manifest in the repository's graph could not be expanded, so which
    /// platform manifests it references is unknown.
    GraphUnresolved { repository: String },
    /// Malformed registry payload. Handled exactly like `Transient`.
    Parse(String),
    Config(String),
}

impl Display for SweepError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            SweepError::AuthUnavailable { registry } => {
                write!(f, "No credential available for registry {}", registry)
            }
            SweepError::AccessDenied(s) => write!(f, "Access denied: {}", s),
            SweepError::NotFound(s) => write!(f, "Not found: {}", s),
            SweepError::Transient(s) => write!(f, "Transient registry error: {}", s),
            SweepError::GraphUnresolved { repository } => write!(
                f,
                "Manifest graph for {} could not be resolved; orphan sweep skipped",
                repository
            ),
            SweepError::Parse(s) => write!(f, "Parse error: {}", s),
            SweepError::Config(s) => write!(f, "Configuration error: {}", s),
        }
    }
}

impl From<serde_yaml_ng::Error> for SweepError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        SweepError::Parse(err.to_string())
    }
}

impl From<serde_json::Error> for SweepError {
    fn from(err: serde_json::Error) -> Self {
        SweepError::Parse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SweepError>;
