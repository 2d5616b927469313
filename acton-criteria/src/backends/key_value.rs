//! Commands for key-value stores (Redis and the in-memory store)
//!
//! Key-value stores can only look up a key or scan a key prefix. The builder
//! pushes down what maps onto those two primitives:
//!
//! - `id = x` in a criteria without OR branches becomes a point [`KeyValueCommand::Get`]
//! - `id BEGINS_WITH x` in a criteria without OR branches becomes a prefix scan
//!
//! Keys are text, so a numeric `id = 7` also fetches a record whose id is the
//! string `"7"`. Such a filter stays in the residual to reject that record.
//!
//! Everything else (other predicates, OR branches, ordering, pagination) is
//! returned as a [`Residual`] and evaluated in process over the scanned
//! records. This is a full read of the collection and is logged at debug
//! level whenever it happens.

use crate::criteria::{Criteria, CriteriaOverrides, Filter, FilterOperator, FilterValue, Filters};
use crate::repository::{CommandBuilder, QueryPlan, Record, RepositoryResult, Residual};

/// Identifier attribute used when none is configured
pub const DEFAULT_ID_FIELD: &str = "id";

/// A key-value command
#[derive(Debug, Clone, PartialEq)]
pub enum KeyValueCommand {
    /// Store `record` under `id`, replacing any previous value
    Put {
        /// Collection (key namespace)
        collection: String,
        /// Record key
        id: String,
        /// Record to store
        record: Record,
    },
    /// Read the record stored under `id`
    Get {
        /// Collection (key namespace)
        collection: String,
        /// Record key
        id: String,
    },
    /// Read every record whose key starts with `prefix`
    Scan {
        /// Collection (key namespace)
        collection: String,
        /// Key prefix; `None` reads the whole collection
        prefix: Option<String>,
    },
    /// Remove the record stored under `id`
    Delete {
        /// Collection (key namespace)
        collection: String,
        /// Record key
        id: String,
    },
}

impl KeyValueCommand {
    /// The collection the command targets
    pub fn collection(&self) -> &str {
        match self {
            Self::Put { collection, .. }
            | Self::Get { collection, .. }
            | Self::Scan { collection, .. }
            | Self::Delete { collection, .. } => collection,
        }
    }
}

/// Builds [`KeyValueCommand`]s for one collection
#[derive(Debug, Clone)]
pub struct KeyValueCommandBuilder {
    collection: String,
    id_field: String,
}

impl KeyValueCommandBuilder {
    /// Builder for `collection`, keyed on `id`
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id_field: DEFAULT_ID_FIELD.to_string(),
        }
    }

    /// Use a different identifier attribute
    #[must_use]
    pub fn with_id_field(mut self, id_field: impl Into<String>) -> Self {
        self.id_field = id_field.into();
        self
    }

    /// The collection name
    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn pushdown<'a>(&self, criteria: &'a Criteria) -> Option<&'a Filter> {
        if !criteria.or_criteria().is_empty() {
            return None;
        }
        let id_filters = || {
            criteria
                .filters()
                .iter()
                .filter(|f| f.field() == self.id_field.as_str())
        };
        id_filters()
            .find(|f| f.operator() == FilterOperator::Equal && key_of(f.value()).is_some())
            .or_else(|| {
                id_filters().find(|f| f.operator() == FilterOperator::BeginsWith)
            })
    }
}

impl CommandBuilder for KeyValueCommandBuilder {
    type Command = KeyValueCommand;

    fn id_field(&self) -> &str {
        &self.id_field
    }

    fn upsert(&self, id: &str, record: Record) -> RepositoryResult<Self::Command> {
        Ok(KeyValueCommand::Put {
            collection: self.collection.clone(),
            id: id.to_string(),
            record,
        })
    }

    fn find_by_id(&self, id: &str) -> RepositoryResult<Self::Command> {
        Ok(KeyValueCommand::Get {
            collection: self.collection.clone(),
            id: id.to_string(),
        })
    }

    fn find_all(&self) -> RepositoryResult<Self::Command> {
        Ok(KeyValueCommand::Scan {
            collection: self.collection.clone(),
            prefix: None,
        })
    }

    fn matching(&self, criteria: &Criteria) -> RepositoryResult<QueryPlan<Self::Command>> {
        criteria.trace_ignored_modifiers("key_value");

        let (command, remaining) = match self.pushdown(criteria) {
            Some(pushed) => {
                let key = key_of(pushed.value()).unwrap_or_default();
                let command = match pushed.operator() {
                    FilterOperator::Equal => KeyValueCommand::Get {
                        collection: self.collection.clone(),
                        id: key,
                    },
                    _ => KeyValueCommand::Scan {
                        collection: self.collection.clone(),
                        prefix: Some(key),
                    },
                };
                let exact = matches!(pushed.value(), FilterValue::String(_));
                let rest: Filters = criteria
                    .filters()
                    .iter()
                    .filter(|f| !exact || *f != pushed)
                    .cloned()
                    .collect();
                let remaining = criteria.copy_with(CriteriaOverrides {
                    filters: Some(rest),
                    ..Default::default()
                });
                (command, remaining)
            }
            None => (self.find_all()?, criteria.copy()),
        };

        let residual = Residual::from_criteria(&remaining);
        if residual.criteria.is_some() {
            tracing::debug!(
                collection = %self.collection,
                criteria = ?remaining,
                "Key-value store cannot filter natively; evaluating criteria in process"
            );
        }
        Ok(QueryPlan::with_residual(command, residual))
    }

    fn delete(&self, id: &str) -> RepositoryResult<Self::Command> {
        Ok(KeyValueCommand::Delete {
            collection: self.collection.clone(),
            id: id.to_string(),
        })
    }
}

fn key_of(value: &FilterValue) -> Option<String> {
    match value {
        FilterValue::String(s) => Some(s.clone()),
        FilterValue::Integer(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::Order;

    fn builder() -> KeyValueCommandBuilder {
        KeyValueCommandBuilder::new("users")
    }

    #[test]
    fn test_id_equality_becomes_get() {
        let mut criteria = Criteria::from_filter(Filter::eq("id", "42").unwrap());
        criteria.add_filter(Filter::eq("status", "active").unwrap());
        let plan = builder().matching(&criteria).unwrap();

        assert_eq!(
            plan.command,
            KeyValueCommand::Get {
                collection: "users".into(),
                id: "42".into()
            }
        );
        let residual = plan.residual.criteria.unwrap();
        assert!(!residual.has_filter("id"));
        assert!(residual.has_filter("status"));
    }

    #[test]
    fn test_numeric_id_equality_becomes_get() {
        let plan = builder()
            .matching(&Criteria::from_filter(Filter::eq("id", 7).unwrap()))
            .unwrap();
        assert!(matches!(plan.command, KeyValueCommand::Get { ref id, .. } if id == "7"));
        // The key lookup cannot tell 7 from "7"
        let residual = plan.residual.criteria.unwrap();
        assert!(residual.has_filter("id"));
    }

    #[test]
    fn test_numeric_id_does_not_match_string_id() {
        let filter = Filter::eq("id", 7).unwrap();
        let plan = builder()
            .matching(&Criteria::from_filter(filter.clone()))
            .unwrap();

        let stored = match serde_json::json!({"id": "7", "name": "Ada"}) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        let kept = plan.residual.apply(vec![stored.clone()]);
        assert!(kept.is_empty());

        // Same answer as the unpushed evaluation inside an OR tree
        let mut tree = Criteria::from_filter(filter);
        tree.add_or_criteria(Criteria::from_filter(Filter::eq("name", "Grace").unwrap()));
        let plan = builder().matching(&tree).unwrap();
        assert!(plan.residual.apply(vec![stored]).is_empty());
    }

    #[test]
    fn test_id_prefix_becomes_scan() {
        let plan = builder()
            .matching(&Criteria::from_filter(Filter::begins_with("id", "usr_").unwrap()))
            .unwrap();
        assert_eq!(
            plan.command,
            KeyValueCommand::Scan {
                collection: "users".into(),
                prefix: Some("usr_".into())
            }
        );
        assert!(plan.residual.is_empty());
    }

    #[test]
    fn test_or_branches_disable_pushdown() {
        let mut criteria = Criteria::from_filter(Filter::eq("id", "1").unwrap());
        criteria.add_or_criteria(Criteria::from_filter(Filter::eq("id", "2").unwrap()));
        let plan = builder().matching(&criteria).unwrap();
        assert!(matches!(plan.command, KeyValueCommand::Scan { prefix: None, .. }));
        assert_eq!(plan.residual.criteria, Some(criteria));
    }

    #[test]
    fn test_order_and_pagination_stay_in_residual() {
        let criteria = Criteria::from_filter(Filter::gt("age", 1).unwrap())
            .with_order(Order::asc("age").unwrap())
            .with_limit(3)
            .with_offset(1);
        let plan = builder().matching(&criteria).unwrap();
        assert_eq!(plan.residual.limit, Some(3));
        assert_eq!(plan.residual.offset, Some(1));
        assert!(plan.residual.order.has_order());
    }

    #[test]
    fn test_custom_id_field() {
        let builder = builder().with_id_field("email");
        let plan = builder
            .matching(&Criteria::from_filter(Filter::eq("email", "a@b.c").unwrap()))
            .unwrap();
        assert!(matches!(plan.command, KeyValueCommand::Get { .. }));
        assert_eq!(builder.id_field(), "email");
    }
}
