//! Deserializable criteria input for transport layers

use serde::{Deserialize, Serialize};

use super::composite::Criteria;
use super::error::CriteriaResult;
use super::filter::FilterInput;

/// Untyped criteria as received from a request body or query string
///
/// # Example
///
/// ```rust
/// use acton_criteria::criteria::CriteriaRequest;
///
/// let request: CriteriaRequest = serde_json::from_str(r#"{
///     "filters": [{"field": "status", "operator": "=", "value": "active"}],
///     "order_by": "created_at",
///     "order_type": "desc",
///     "limit": 20
/// }"#).unwrap();
///
/// let criteria = request.into_criteria(Some(&["status", "created_at"])).unwrap();
/// assert_eq!(criteria.limit(), Some(20));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CriteriaRequest {
    /// Filter entries, AND-ed together
    pub filters: Vec<FilterInput>,
    /// Comma-separated sort fields
    pub order_by: Option<String>,
    /// `asc` or `desc`
    pub order_type: Option<String>,
    /// Maximum number of results
    pub limit: Option<i64>,
    /// Number of results to skip
    pub offset: Option<i64>,
}

impl CriteriaRequest {
    /// Validate the request into a [`Criteria`]
    pub fn into_criteria(self, valid_fields: Option<&[&str]>) -> CriteriaResult<Criteria> {
        Criteria::create(
            self.filters,
            self.order_by.as_deref(),
            self.order_type.as_deref(),
            self.limit,
            self.offset,
            valid_fields,
        )
    }
}

impl TryFrom<CriteriaRequest> for Criteria {
    type Error = super::error::CriteriaError;

    fn try_from(request: CriteriaRequest) -> Result<Self, Self::Error> {
        request.into_criteria(None)
    }
}
