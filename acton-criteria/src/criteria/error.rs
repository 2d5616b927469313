//! Criteria validation errors
//!
//! Every error here is a caller mistake: an unknown operator, a field outside
//! the allowed set, a malformed value. They are surfaced as-is and never
//! retried.
//!
//! # Example
//!
//! ```rust
//! use acton_criteria::criteria::{CriteriaError, Filter};
//!
//! let error = Filter::create("status", "~=", "active").unwrap_err();
//! assert!(matches!(error, CriteriaError::InvalidOperator { .. }));
//! assert!(error.to_string().contains("NOT IN"));
//! ```

use thiserror::Error;

/// Result type for criteria construction
pub type CriteriaResult<T> = std::result::Result<T, CriteriaError>;

/// Validation failure while building filters, orders or criteria
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CriteriaError {
    /// A filter or order field was empty
    #[error("Field name cannot be empty")]
    EmptyField,

    /// The operator is not a member of the closed operator set
    #[error("Operator '{value}' is not valid. Allowed operators are: {}", .allowed.join(", "))]
    InvalidOperator {
        /// The rejected operator text
        value: String,
        /// Every accepted operator token
        allowed: Vec<String>,
    },

    /// The field is not part of the supplied whitelist
    #[error("Field '{field}' is not valid for {parameter}. Allowed fields are: {}", .allowed.join(", "))]
    InvalidField {
        /// Which input carried the field (`filter` or `order_by`)
        parameter: &'static str,
        /// The rejected field
        field: String,
        /// The whitelist the field was checked against
        allowed: Vec<String>,
    },

    /// The order direction could not be parsed
    #[error("Order type '{value}' is not valid. Must be one of: asc, desc")]
    InvalidOrderType {
        /// The rejected order type text
        value: String,
    },

    /// The value does not fit the operator
    #[error("Invalid value for '{field}' with operator {operator}: {reason}")]
    InvalidValue {
        /// Field the filter applies to
        field: String,
        /// Operator token
        operator: String,
        /// Why the value was rejected
        reason: String,
    },

    /// A limit or offset was negative
    #[error("Pagination parameter '{parameter}' must be non-negative, got {value}")]
    NegativePagination {
        /// `limit` or `offset`
        parameter: &'static str,
        /// The rejected value
        value: i64,
    },
}

impl CriteriaError {
    /// Allowed values attached to the error, if any
    pub fn allowed_values(&self) -> Option<&[String]> {
        match self {
            Self::InvalidOperator { allowed, .. } | Self::InvalidField { allowed, .. } => {
                Some(allowed)
            }
            _ => None,
        }
    }
}

/// Check that `field` belongs to `valid_fields`
pub(crate) fn ensure_allowed(
    parameter: &'static str,
    field: &str,
    valid_fields: &[&str],
) -> CriteriaResult<()> {
    if valid_fields.contains(&field) {
        Ok(())
    } else {
        Err(CriteriaError::InvalidField {
            parameter,
            field: field.to_string(),
            allowed: valid_fields.iter().map(|f| (*f).to_string()).collect(),
        })
    }
}
