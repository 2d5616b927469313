//! Repository error types
//!
//! Structured errors for repository and data source operations. Each error
//! records which operation failed, why, and optionally the backend and entity
//! involved.
//!
//! "Not found" is not an error: [`Repository::search_by_id`] returns
//! `Ok(None)` for an absent entity.
//!
//! [`Repository::search_by_id`]: super::Repository::search_by_id
//!
//! # Example
//!
//! ```rust
//! use acton_criteria::repository::{RepositoryError, RepositoryErrorKind, RepositoryOperation};
//!
//! let error = RepositoryError::unsupported_operator("dynamodb", "LIKE");
//! assert!(matches!(error.kind, RepositoryErrorKind::UnsupportedOperator));
//! assert!(!error.is_retriable());
//! ```

use std::fmt;

use crate::criteria::CriteriaError;

/// Operation being performed when the repository error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryOperation {
    /// Upserting an aggregate
    Save,
    /// Fetching a single aggregate by id
    SearchById,
    /// Fetching every aggregate
    SearchAll,
    /// Fetching aggregates matching a criteria
    Matching,
    /// Deleting an aggregate by id
    Delete,
    /// Establishing the backend connection
    Connect,
    /// Running a command without results
    Execute,
    /// Running a command returning at most one record
    FetchOne,
    /// Running a command returning many records
    Fetch,
    /// Translating criteria into a native query
    Convert,
}

impl fmt::Display for RepositoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Save => write!(f, "save"),
            Self::SearchById => write!(f, "search_by_id"),
            Self::SearchAll => write!(f, "search_all"),
            Self::Matching => write!(f, "matching"),
            Self::Delete => write!(f, "delete"),
            Self::Connect => write!(f, "connect"),
            Self::Execute => write!(f, "execute"),
            Self::FetchOne => write!(f, "fetch_one"),
            Self::Fetch => write!(f, "fetch"),
            Self::Convert => write!(f, "convert"),
        }
    }
}

/// Category of repository error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryErrorKind {
    /// Invalid field, operator or order value
    Validation,
    /// The backend cannot evaluate this operator
    UnsupportedOperator,
    /// The criteria cannot be expressed losslessly for the backend
    Translation,
    /// The call exceeded its time budget
    Timeout,
    /// Connecting to the backend failed
    ConnectionFailed,
    /// The call was cancelled
    Cancelled,
    /// The backend rejected or failed the command
    Backend,
    /// Encoding or decoding a record failed
    Serialization,
    /// The data source is misconfigured
    Configuration,
}

impl fmt::Display for RepositoryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::UnsupportedOperator => write!(f, "unsupported_operator"),
            Self::Translation => write!(f, "translation"),
            Self::Timeout => write!(f, "timeout"),
            Self::ConnectionFailed => write!(f, "connection_failed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Backend => write!(f, "backend"),
            Self::Serialization => write!(f, "serialization"),
            Self::Configuration => write!(f, "configuration"),
        }
    }
}

/// Structured repository error with operation context
///
/// # Example
///
/// ```rust
/// use acton_criteria::repository::{RepositoryError, RepositoryOperation};
///
/// let error = RepositoryError::timeout(RepositoryOperation::Fetch, "no reply within 5000ms")
///     .with_backend("postgres");
/// assert_eq!(
///     error.to_string(),
///     "Repository timeout error during fetch: no reply within 5000ms [backend: postgres]"
/// );
/// assert!(error.is_retriable());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryError {
    /// The operation being performed when the error occurred
    pub operation: RepositoryOperation,
    /// The category of error
    pub kind: RepositoryErrorKind,
    /// Human-readable error message
    pub message: String,
    /// Backend that raised the error (e.g. "postgres", "dynamodb")
    pub backend: Option<String>,
    /// The id of the entity involved
    pub entity_id: Option<String>,
}

impl RepositoryError {
    /// Create a new repository error
    pub fn new(
        operation: RepositoryOperation,
        kind: RepositoryErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
            backend: None,
            entity_id: None,
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(
            RepositoryOperation::Matching,
            RepositoryErrorKind::Validation,
            message,
        )
    }

    /// Create an unsupported operator error, raised before any network call
    pub fn unsupported_operator(backend: impl Into<String>, operator: impl fmt::Display) -> Self {
        let backend = backend.into();
        Self {
            operation: RepositoryOperation::Convert,
            kind: RepositoryErrorKind::UnsupportedOperator,
            message: format!("Operator {} is not supported by {}", operator, backend),
            backend: Some(backend),
            entity_id: None,
        }
    }

    /// Create a translation error, raised before any network call
    pub fn translation(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            RepositoryOperation::Convert,
            RepositoryErrorKind::Translation,
            message,
        )
        .with_backend(backend)
    }

    /// Create a timeout error
    pub fn timeout(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::Timeout, message)
    }

    /// Create a connection failed error
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::new(
            RepositoryOperation::Connect,
            RepositoryErrorKind::ConnectionFailed,
            message,
        )
    }

    /// Create a cancellation error
    pub fn cancelled(operation: RepositoryOperation) -> Self {
        Self::new(
            operation,
            RepositoryErrorKind::Cancelled,
            "Operation was cancelled",
        )
    }

    /// Create a backend error
    pub fn backend_error(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::Backend, message)
    }

    /// Create a serialization error
    pub fn serialization(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::Serialization, message)
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(
            RepositoryOperation::Connect,
            RepositoryErrorKind::Configuration,
            message,
        )
    }

    /// Attach the backend name
    #[must_use]
    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    /// Attach the entity id
    #[must_use]
    pub fn with_entity_id(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    /// Set the operation that caused the error
    #[must_use]
    pub fn with_operation(mut self, operation: RepositoryOperation) -> Self {
        self.operation = operation;
        self
    }

    /// Check if this error is retriable (transient errors that may succeed on retry)
    ///
    /// ```rust
    /// use acton_criteria::repository::RepositoryError;
    ///
    /// assert!(RepositoryError::connection_failed("Connection reset").is_retriable());
    /// assert!(!RepositoryError::validation("bad field").is_retriable());
    /// ```
    pub fn is_retriable(&self) -> bool {
        matches!(
            self.kind,
            RepositoryErrorKind::ConnectionFailed | RepositoryErrorKind::Timeout
        )
    }
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Repository {} error during {}: {}",
            self.kind, self.operation, self.message
        )?;
        if let Some(ref backend) = self.backend {
            write!(f, " [backend: {}]", backend)?;
        }
        if let Some(ref entity_id) = self.entity_id {
            write!(f, " [id: {}]", entity_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for RepositoryError {}

impl From<CriteriaError> for RepositoryError {
    fn from(error: CriteriaError) -> Self {
        Self::validation(error.to_string())
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(error: serde_json::Error) -> Self {
        Self::serialization(RepositoryOperation::Convert, error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_operation_display() {
        assert_eq!(format!("{}", RepositoryOperation::Save), "save");
        assert_eq!(format!("{}", RepositoryOperation::SearchById), "search_by_id");
        assert_eq!(format!("{}", RepositoryOperation::SearchAll), "search_all");
        assert_eq!(format!("{}", RepositoryOperation::Matching), "matching");
        assert_eq!(format!("{}", RepositoryOperation::Delete), "delete");
        assert_eq!(format!("{}", RepositoryOperation::FetchOne), "fetch_one");
        assert_eq!(format!("{}", RepositoryOperation::Convert), "convert");
    }

    #[test]
    fn test_repository_error_kind_display() {
        assert_eq!(
            format!("{}", RepositoryErrorKind::UnsupportedOperator),
            "unsupported_operator"
        );
        assert_eq!(
            format!("{}", RepositoryErrorKind::ConnectionFailed),
            "connection_failed"
        );
        assert_eq!(format!("{}", RepositoryErrorKind::Cancelled), "cancelled");
    }

    #[test]
    fn test_only_transient_errors_retriable() {
        assert!(RepositoryError::timeout(RepositoryOperation::Fetch, "slow").is_retriable());
        assert!(RepositoryError::connection_failed("refused").is_retriable());
        assert!(!RepositoryError::cancelled(RepositoryOperation::Fetch).is_retriable());
        assert!(!RepositoryError::translation("dynamodb", "ordering").is_retriable());
        assert!(!RepositoryError::unsupported_operator("dynamodb", "LIKE").is_retriable());
        assert!(!RepositoryError::backend_error(RepositoryOperation::Save, "x").is_retriable());
    }

    #[test]
    fn test_unsupported_operator_names_backend() {
        let error = RepositoryError::unsupported_operator("dynamodb", "NOT LIKE");
        assert_eq!(error.backend.as_deref(), Some("dynamodb"));
        assert_eq!(error.operation, RepositoryOperation::Convert);
        assert!(error.message.contains("NOT LIKE"));
    }

    #[test]
    fn test_criteria_error_becomes_validation() {
        let error: RepositoryError = CriteriaError::EmptyField.into();
        assert_eq!(error.kind, RepositoryErrorKind::Validation);
    }

    #[test]
    fn test_display_with_context() {
        let error = RepositoryError::backend_error(RepositoryOperation::Delete, "boom")
            .with_backend("redis")
            .with_entity_id("42");
        assert_eq!(
            error.to_string(),
            "Repository backend error during delete: boom [backend: redis] [id: 42]"
        );
    }
}
