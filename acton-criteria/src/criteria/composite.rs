//! Composite query criteria
//!
//! A [`Criteria`] node holds AND-ed filters plus a list of alternative
//! branches. The result set of a node is the rows matching all of its filters
//! united with the result set of every branch, computed recursively.
//!
//! Branches are owned values, so the tree is acyclic by construction: a
//! node cannot be inserted into itself.
//!
//! Only the root node's order, limit and offset are honored. Those set on
//! branches are carried but ignored by every converter and by
//! [`Criteria::matches`](crate::criteria::Criteria::matches).
//!
//! # Example
//!
//! ```rust
//! use acton_criteria::criteria::{Criteria, Filter, FilterInput};
//!
//! // status = 'active' AND age >= 18, ordered by name, first page of 20
//! let mut criteria = Criteria::create(
//!     vec![
//!         FilterInput::new("status", "=", "active"),
//!         FilterInput::new("age", ">=", 18),
//!     ],
//!     Some("name"),
//!     None,
//!     Some(20),
//!     Some(0),
//!     Some(&["status", "age", "name", "role"]),
//! )
//! .unwrap();
//!
//! // ... OR role = 'admin'
//! criteria.add_or_criteria(Criteria::from_filter(Filter::eq("role", "admin").unwrap()));
//!
//! // Dropping a field removes it from the whole tree
//! criteria.remove_filter("role");
//! assert!(!criteria.or_criteria()[0].has_filters());
//! ```

use std::collections::HashMap;

use serde::Serialize;

use super::error::{ensure_allowed, CriteriaError, CriteriaResult};
use super::filter::{Filter, FilterField, FilterInput, FilterValue};
use super::filters::Filters;
use super::order::Order;

/// Filters, order, pagination and OR-ed alternatives
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Criteria {
    filters: Filters,
    order: Order,
    limit: Option<u64>,
    offset: Option<u64>,
    or_criteria: Vec<Criteria>,
}

/// Fields to replace when deriving a criteria with [`Criteria::copy_with`]
///
/// `None` keeps the original value. For `limit` and `offset`,
/// `Some(None)` clears the value.
#[derive(Debug, Clone, Default)]
pub struct CriteriaOverrides {
    /// Replacement filters
    pub filters: Option<Filters>,
    /// Replacement order
    pub order: Option<Order>,
    /// Replacement limit
    pub limit: Option<Option<u64>>,
    /// Replacement offset
    pub offset: Option<Option<u64>>,
    /// Replacement branches
    pub or_criteria: Option<Vec<Criteria>>,
}

impl Criteria {
    /// Build a criteria from untyped caller input
    ///
    /// When `valid_fields` is supplied it whitelists both filter fields and
    /// order fields.
    pub fn create(
        filters: Vec<FilterInput>,
        order_by: Option<&str>,
        order_type: Option<&str>,
        limit: Option<i64>,
        offset: Option<i64>,
        valid_fields: Option<&[&str]>,
    ) -> CriteriaResult<Self> {
        let filters = Filters::create(filters, valid_fields)?;
        let order = Order::create(order_by, order_type, valid_fields)?;
        Ok(Self {
            filters,
            order,
            limit: non_negative("limit", limit)?,
            offset: non_negative("offset", offset)?,
            or_criteria: Vec::new(),
        })
    }

    /// Criteria with the given filters and order, unpaginated
    pub fn new(filters: Filters, order: Order) -> Self {
        Self {
            filters,
            order,
            ..Self::default()
        }
    }

    /// Criteria matching everything
    pub fn all() -> Self {
        Self::default()
    }

    /// Criteria with a single filter
    pub fn from_filter(filter: Filter) -> Self {
        Self::new(Filters::new(vec![filter]), Order::none())
    }

    /// Set the maximum number of results
    #[must_use]
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set the number of results to skip
    #[must_use]
    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Set the order
    #[must_use]
    pub fn with_order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    /// Top-level filters
    pub fn filters(&self) -> &Filters {
        &self.filters
    }

    /// Sort order
    pub fn order(&self) -> &Order {
        &self.order
    }

    /// Maximum number of results
    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    /// Number of results to skip
    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    /// Alternative branches
    pub fn or_criteria(&self) -> &[Criteria] {
        &self.or_criteria
    }

    /// Whether this node has filters of its own
    pub fn has_filters(&self) -> bool {
        !self.filters.is_empty()
    }

    /// Whether this node filters on `field`
    pub fn has_filter(&self, field: &str) -> bool {
        self.filters.has(field)
    }

    /// Value of the first top-level filter on `field`
    pub fn get_filter_value(&self, field: &str) -> Option<&FilterValue> {
        self.filters.value_of(field)
    }

    /// Append a filter to this node
    pub fn add_filter(&mut self, filter: Filter) {
        self.filters.push(filter);
    }

    /// Remove every filter on `field` from this node and all descendants
    pub fn remove_filter(&mut self, field: &str) {
        self.filters.retain(|filter| filter.field() != field);
        for branch in &mut self.or_criteria {
            branch.remove_filter(field);
        }
    }

    /// Rename filter fields across the whole tree
    ///
    /// Operators and values are kept. Fields absent from `mapping` are left
    /// untouched. Fails without modifying anything if a target name is blank.
    pub fn rename_filters(&mut self, mapping: &HashMap<String, String>) -> CriteriaResult<()> {
        let targets = mapping
            .iter()
            .map(|(from, to)| FilterField::new(to.as_str()).map(|field| (from.as_str(), field)))
            .collect::<CriteriaResult<HashMap<_, _>>>()?;
        self.rename_with(&targets);
        Ok(())
    }

    fn rename_with(&mut self, targets: &HashMap<&str, FilterField>) {
        self.filters.map_in_place(|filter| {
            targets
                .get(filter.field().as_str())
                .map(|field| filter.renamed(field.clone()))
        });
        for branch in &mut self.or_criteria {
            branch.rename_with(targets);
        }
    }

    /// Append an alternative branch
    pub fn add_or_criteria(&mut self, criteria: Criteria) {
        self.or_criteria.push(criteria);
    }

    /// Deep, independent clone of the whole tree
    #[must_use]
    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// Deep clone with selected parts replaced
    ///
    /// ```rust
    /// use acton_criteria::criteria::{Criteria, CriteriaOverrides, Filter};
    ///
    /// let base = Criteria::from_filter(Filter::eq("status", "active").unwrap()).with_limit(20);
    /// let page_two = base.copy_with(CriteriaOverrides {
    ///     offset: Some(Some(20)),
    ///     ..Default::default()
    /// });
    /// assert_eq!(page_two.offset(), Some(20));
    /// assert_eq!(base.offset(), None);
    /// ```
    #[must_use]
    pub fn copy_with(&self, overrides: CriteriaOverrides) -> Self {
        let mut copy = self.clone();
        if let Some(filters) = overrides.filters {
            copy.filters = filters;
        }
        if let Some(order) = overrides.order {
            copy.order = order;
        }
        if let Some(limit) = overrides.limit {
            copy.limit = limit;
        }
        if let Some(offset) = overrides.offset {
            copy.offset = offset;
        }
        if let Some(or_criteria) = overrides.or_criteria {
            copy.or_criteria = or_criteria;
        }
        copy
    }

    /// Check every field in the tree against a whitelist
    pub fn validate_fields(&self, valid_fields: &[&str]) -> CriteriaResult<()> {
        for filter in &self.filters {
            ensure_allowed("filter", filter.field().as_str(), valid_fields)?;
        }
        for field in self.order.order_by().fields() {
            ensure_allowed("order_by", field, valid_fields)?;
        }
        self.or_criteria
            .iter()
            .try_for_each(|branch| branch.validate_fields(valid_fields))
    }

    /// Whether the tree selects every row: no filters and no branches
    pub fn is_unconstrained(&self) -> bool {
        self.filters.is_empty() && self.or_criteria.is_empty()
    }

    /// Whether the criteria is equivalent to a plain full fetch
    pub fn is_empty(&self) -> bool {
        self.is_unconstrained()
            && !self.order.has_order()
            && self.limit.is_none()
            && self.offset.is_none()
    }

    /// Whether any branch carries its own order or pagination
    pub fn has_nested_modifiers(&self) -> bool {
        self.or_criteria.iter().any(|branch| {
            branch.order.has_order()
                || branch.limit.is_some()
                || branch.offset.is_some()
                || branch.has_nested_modifiers()
        })
    }

    /// Every node of the tree, depth first, starting with this one
    pub fn nodes(&self) -> Vec<&Criteria> {
        let mut nodes = vec![self];
        for branch in &self.or_criteria {
            nodes.extend(branch.nodes());
        }
        nodes
    }

    /// Log that branch order and pagination will be ignored
    pub(crate) fn trace_ignored_modifiers(&self, backend: &str) {
        if self.has_nested_modifiers() {
            tracing::debug!(
                backend,
                "Ignoring order, limit and offset set on OR branches; only the root node's apply"
            );
        }
    }
}

impl From<Filters> for Criteria {
    fn from(filters: Filters) -> Self {
        Self::new(filters, Order::none())
    }
}

fn non_negative(parameter: &'static str, value: Option<i64>) -> CriteriaResult<Option<u64>> {
    value
        .map(|value| {
            u64::try_from(value).map_err(|_| CriteriaError::NegativePagination { parameter, value })
        })
        .transpose()
}
