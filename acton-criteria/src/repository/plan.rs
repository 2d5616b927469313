//! Query plans: a native command plus the in-process remainder

use crate::criteria::{compare_records, Criteria, Order};

use super::traits::Record;

/// A backend command together with what it could not express
#[derive(Debug, Clone)]
pub struct QueryPlan<C> {
    /// Command sent to the data source
    pub command: C,
    /// Work left to do on the fetched records
    pub residual: Residual,
}

impl<C> QueryPlan<C> {
    /// A plan fully expressed by its command
    pub fn native(command: C) -> Self {
        Self {
            command,
            residual: Residual::none(),
        }
    }

    /// A plan with a residual
    pub fn with_residual(command: C, residual: Residual) -> Self {
        Self { command, residual }
    }
}

/// Filtering, ordering and pagination applied in process after a fetch
///
/// Backends without a query language (key-value stores) or with partial
/// support (scan-based stores) hand the unsupported part of a criteria back
/// as a residual. Applying it costs a full read of whatever the command
/// returned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Residual {
    /// Predicate tree evaluated per record
    pub criteria: Option<Criteria>,
    /// Sort applied after filtering
    pub order: Order,
    /// Records skipped after sorting
    pub offset: Option<u64>,
    /// Maximum records kept
    pub limit: Option<u64>,
}

impl Residual {
    /// Nothing left to do
    pub fn none() -> Self {
        Self::default()
    }

    /// Only pagination left to do
    pub fn pagination(limit: Option<u64>, offset: Option<u64>) -> Self {
        Self {
            limit,
            offset,
            ..Self::default()
        }
    }

    /// Everything in `criteria` left to do
    pub fn from_criteria(criteria: &Criteria) -> Self {
        let predicate = (!criteria.is_unconstrained()).then(|| criteria.clone());
        Self {
            criteria: predicate,
            order: criteria.order().clone(),
            offset: criteria.offset(),
            limit: criteria.limit(),
        }
    }

    /// Whether applying the residual is a no-op
    pub fn is_empty(&self) -> bool {
        self.criteria.is_none()
            && !self.order.has_order()
            && self.offset.is_none()
            && self.limit.is_none()
    }

    /// Filter, sort and paginate `records`
    pub fn apply(&self, records: Vec<Record>) -> Vec<Record> {
        if self.is_empty() {
            return records;
        }

        let mut records: Vec<Record> = match &self.criteria {
            Some(criteria) => records
                .into_iter()
                .filter(|record| criteria.matches(record))
                .collect(),
            None => records,
        };

        if self.order.has_order() {
            records.sort_by(|left, right| compare_records(left, right, &self.order));
        }

        let offset = to_usize(self.offset.unwrap_or(0));
        let limit = self.limit.map_or(usize::MAX, to_usize);
        records.into_iter().skip(offset).take(limit).collect()
    }
}

fn to_usize(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}
