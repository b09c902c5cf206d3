//! Tagged result for registry calls.
//!
//! Registry calls never raise across component boundaries. A caller has to
//! decide explicitly what `NotFound` and `Failed` mean at its call site, which is
//! how "treat unknown as kept" is enforced.

use crate::error::SweepError;

#[derive(Debug)]
pub enum Outcome<T> {
    Ok(T),
    NotFound,
    Failed(SweepError),
}

impl<T> Outcome<T> {
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U> {
        match self {
            Outcome::Ok(value) => Outcome::Ok(f(value)),
            Outcome::NotFound => Outcome::NotFound,
            Outcome::Failed(err) => Outcome::Failed(err),
        }
    }

    /// Chain a second registry call on success.
    pub fn and_then<U, F: FnOnce(T) -> Outcome<U>>(self, f: F) -> Outcome<U> {
        match self {
            Outcome::Ok(value) => f(value),
            Outcome::NotFound => Outcome::NotFound,
            Outcome::Failed(err) => Outcome::Failed(err),
        }
    }

    /// The value, discarding the reason it is absent.
    pub fn ok(self) -> Option<T> {
        match self {
            Outcome::Ok(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Outcome::NotFound)
    }

    /// Classify a non-success HTTP status.
    ///
    /// 404 is `NotFound`; 401/403 mean the credential did not grant access;
    /// everything else is transient.
    pub fn from_status(status: u16, context: &str) -> Self {
        match status {
            404 => Outcome::NotFound,
            401 | 403 => Outcome::Failed(SweepError::AccessDenied(format!(
                "{} returned HTTP {}",
                context, status
            ))),
            _ => Outcome::Failed(SweepError::Transient(format!(
                "{} returned HTTP {}",
                context, status
            ))),
        }
    }
}

impl<T> From<SweepError> for Outcome<T> {
    fn from(err: SweepError) -> Self {
        match err {
            SweepError::NotFound(_) => Outcome::NotFound,
            other => Outcome::Failed(other),
        }
    }
}
