//! Crate-level error type

use thiserror::Error;

use crate::criteria::CriteriaError;
use crate::repository::RepositoryError;

/// Result type alias using the crate [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to the host application
///
/// Library operations return the narrower [`CriteriaError`] or
/// [`RepositoryError`]; this type unifies them with setup failures.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    /// Invalid criteria
    #[error(transparent)]
    Criteria(#[from] CriteriaError),

    /// Repository operation failed
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// Tracing subscriber could not be installed
    #[error("Tracing error: {0}")]
    Tracing(String),
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}
