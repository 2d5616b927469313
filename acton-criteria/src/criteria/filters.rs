//! Ordered collections of filters
//!
//! Filters in a collection are AND-ed together. A field may appear more than
//! once, e.g. `age >= 18` and `age < 65` to express a range.

use serde::Serialize;

use super::error::{ensure_allowed, CriteriaResult};
use super::filter::{Filter, FilterInput, FilterValue};

/// An ordered list of filters combined with AND
///
/// # Example
///
/// ```rust
/// use acton_criteria::criteria::{Filter, Filters};
///
/// let filters = Filters::new(vec![
///     Filter::gte("age", 18).unwrap(),
///     Filter::lt("age", 65).unwrap(),
///     Filter::eq("status", "active").unwrap(),
/// ]);
/// assert_eq!(filters.len(), 3);
///
/// let without_age = filters.exclude("age");
/// assert_eq!(without_age.len(), 1);
/// assert!(!without_age.has("age"));
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct Filters(Vec<Filter>);

impl Filters {
    /// Wrap already-validated filters
    pub fn new(filters: Vec<Filter>) -> Self {
        Self(filters)
    }

    /// An empty collection
    pub fn none() -> Self {
        Self::default()
    }

    /// Wrap filters after checking every field against a whitelist
    pub fn with_valid_fields(filters: Vec<Filter>, valid_fields: &[&str]) -> CriteriaResult<Self> {
        for filter in &filters {
            ensure_allowed("filter", filter.field().as_str(), valid_fields)?;
        }
        Ok(Self(filters))
    }

    /// Build filters from untyped input records
    ///
    /// Fails on the first invalid entry.
    pub fn create(
        inputs: Vec<FilterInput>,
        valid_fields: Option<&[&str]>,
    ) -> CriteriaResult<Self> {
        let filters = inputs
            .into_iter()
            .map(Filter::from_input)
            .collect::<CriteriaResult<Vec<_>>>()?;
        match valid_fields {
            Some(valid) => Self::with_valid_fields(filters, valid),
            None => Ok(Self(filters)),
        }
    }

    /// A new collection with `filter` appended
    #[must_use]
    pub fn add(&self, filter: Filter) -> Self {
        let mut filters = self.0.clone();
        filters.push(filter);
        Self(filters)
    }

    /// A new collection without any filter on `field`
    #[must_use]
    pub fn exclude(&self, field: &str) -> Self {
        Self(
            self.0
                .iter()
                .filter(|filter| filter.field() != field)
                .cloned()
                .collect(),
        )
    }

    /// Whether any filter applies to `field`
    pub fn has(&self, field: &str) -> bool {
        self.0.iter().any(|filter| filter.field() == field)
    }

    /// First filter on `field`
    pub fn get(&self, field: &str) -> Option<&Filter> {
        self.0.iter().find(|filter| filter.field() == field)
    }

    /// Value of the first filter on `field`
    pub fn value_of(&self, field: &str) -> Option<&FilterValue> {
        self.get(field).map(Filter::value)
    }

    /// Number of filters
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the collection is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate in insertion order
    pub fn iter(&self) -> std::slice::Iter<'_, Filter> {
        self.0.iter()
    }

    pub(crate) fn push(&mut self, filter: Filter) {
        self.0.push(filter);
    }

    pub(crate) fn retain(&mut self, keep: impl FnMut(&Filter) -> bool) {
        self.0.retain(keep);
    }

    pub(crate) fn map_in_place(&mut self, f: impl Fn(&Filter) -> Option<Filter>) {
        for filter in &mut self.0 {
            if let Some(replacement) = f(filter) {
                *filter = replacement;
            }
        }
    }
}

impl From<Vec<Filter>> for Filters {
    fn from(filters: Vec<Filter>) -> Self {
        Self(filters)
    }
}

impl FromIterator<Filter> for Filters {
    fn from_iter<I: IntoIterator<Item = Filter>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Filters {
    type Item = Filter;
    type IntoIter = std::vec::IntoIter<Filter>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Filters {
    type Item = &'a Filter;
    type IntoIter = std::slice::Iter<'a, Filter>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::CriteriaError;
    use serde_json::json;

    #[test]
    fn test_create_from_inputs_keeps_order() {
        let filters = Filters::create(
            vec![
                FilterInput::new("b", "=", 1),
                FilterInput::new("a", ">", 2),
            ],
            None,
        )
        .unwrap();
        let fields: Vec<_> = filters.iter().map(|f| f.field().as_str()).collect();
        assert_eq!(fields, vec!["b", "a"]);
    }

    #[test]
    fn test_create_rejects_field_outside_whitelist() {
        let error = Filters::create(
            vec![FilterInput::new("password", "=", "x")],
            Some(&["name", "email"]),
        )
        .unwrap_err();
        match error {
            CriteriaError::InvalidField {
                parameter,
                field,
                allowed,
            } => {
                assert_eq!(parameter, "filter");
                assert_eq!(field, "password");
                assert_eq!(allowed, vec!["name", "email"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_create_fails_on_bad_operator() {
        let result = Filters::create(vec![FilterInput::new("a", "===", 1)], None);
        assert!(matches!(result, Err(CriteriaError::InvalidOperator { .. })));
    }

    #[test]
    fn test_add_does_not_mutate_original() {
        let base = Filters::none();
        let extended = base.add(Filter::eq("a", 1).unwrap());
        assert!(base.is_empty());
        assert_eq!(extended.len(), 1);
    }

    #[test]
    fn test_exclude_removes_every_filter_on_field() {
        let filters = Filters::new(vec![
            Filter::gte("age", 18).unwrap(),
            Filter::eq("name", "a").unwrap(),
            Filter::lt("age", 65).unwrap(),
        ]);
        let excluded = filters.exclude("age");
        assert_eq!(excluded.len(), 1);
        assert!(excluded.has("name"));
    }

    #[test]
    fn test_get_returns_first_match() {
        let filters = Filters::new(vec![
            Filter::gte("age", 18).unwrap(),
            Filter::lt("age", 65).unwrap(),
        ]);
        assert_eq!(filters.value_of("age"), Some(&FilterValue::Integer(18)));
        assert!(filters.get("missing").is_none());
    }

    #[test]
    fn test_serializes_as_list() {
        let filters = Filters::new(vec![Filter::eq("a", 1).unwrap()]);
        assert_eq!(
            serde_json::to_value(&filters).unwrap(),
            json!([{"field": "a", "operator": "=", "value": 1}])
        );
    }
}
