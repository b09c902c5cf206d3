pub mod error;
pub mod outcome;
pub mod user_paths;

pub use error::{Result, SweepError};
pub use outcome::Outcome;
