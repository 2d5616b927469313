//! Criteria to DynamoDB filter expression translation
//!
//! Every filter gets its own `#fN` attribute name and `:vN` value
//! placeholder, numbered with a single counter across the whole criteria
//! tree. IN / NOT IN members expand to `:vN_0`, `:vN_1`, ...
//!
//! A null comparison treats a missing attribute and an attribute of type
//! `NULL` alike, matching how records with `None` fields are stored.
//!
//! Scans return items in no particular order and DynamoDB's `Limit` bounds
//! the items evaluated rather than returned, so:
//!
//! - criteria with an order fail to translate
//! - limit and offset are applied after the paginated scan completes

use std::collections::BTreeMap;

use serde_json::Value;

use crate::criteria::{Criteria, Filter, FilterOperator, FilterValue};
use crate::repository::{
    CommandBuilder, CriteriaConverter, QueryPlan, Record, RepositoryError, RepositoryResult,
    Residual,
};

const BACKEND: &str = "dynamodb";

/// DynamoDB caps the number of operands of an IN comparison
pub const MAX_IN_OPERANDS: usize = 100;

/// Type descriptor of a `NULL` attribute, as passed to `attribute_type`
pub const NULL_TYPE: &str = "NULL";

/// A rendered filter expression with its placeholder maps
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DynamoDbQuery {
    /// `FilterExpression`; `None` scans everything
    pub filter_expression: Option<String>,
    /// `ExpressionAttributeNames`
    pub expression_attribute_names: BTreeMap<String, String>,
    /// `ExpressionAttributeValues`, as JSON to be encoded as attribute values
    pub expression_attribute_values: BTreeMap<String, Value>,
}

/// Translates criteria into DynamoDB filter expressions
///
/// # Example
///
/// ```rust
/// use acton_criteria::backends::dynamodb::DynamoDbCriteriaConverter;
/// use acton_criteria::criteria::{Criteria, Filter};
/// use acton_criteria::repository::CriteriaConverter;
///
/// let mut criteria = Criteria::from_filter(Filter::begins_with("name", "A").unwrap());
/// criteria.add_filter(Filter::is_in("role", vec!["admin", "editor"]).unwrap());
///
/// let query = DynamoDbCriteriaConverter.convert(&criteria).unwrap();
/// assert_eq!(
///     query.filter_expression.as_deref(),
///     Some("begins_with(#f0, :v0) AND #f1 IN (:v1_0, :v1_1)")
/// );
/// assert_eq!(query.expression_attribute_names["#f1"], "role");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct DynamoDbCriteriaConverter;

impl CriteriaConverter for DynamoDbCriteriaConverter {
    type Query = DynamoDbQuery;

    fn convert(&self, criteria: &Criteria) -> RepositoryResult<DynamoDbQuery> {
        if criteria.order().has_order() {
            return Err(RepositoryError::translation(
                BACKEND,
                format!(
                    "Ordering by '{}' requires a sort key; scans return items unordered",
                    criteria.order().order_by()
                ),
            ));
        }
        criteria.trace_ignored_modifiers(BACKEND);

        let mut query = DynamoDbQuery::default();
        if !matches_everything(criteria) {
            let mut counter = 0;
            query.filter_expression = node_expression(criteria, &mut query, &mut counter)?;
        }

        tracing::debug!(
            filter_expression = ?query.filter_expression,
            values = query.expression_attribute_values.len(),
            "Translated criteria"
        );
        Ok(query)
    }
}

/// Whether a node's result set is every item
///
/// DynamoDB has no `TRUE` literal, so an unconstrained branch collapses the
/// whole expression instead.
fn matches_everything(node: &Criteria) -> bool {
    node.is_unconstrained() || node.or_criteria().iter().any(matches_everything)
}

fn node_expression(
    node: &Criteria,
    query: &mut DynamoDbQuery,
    counter: &mut usize,
) -> RepositoryResult<Option<String>> {
    let mut groups = Vec::new();

    if node.has_filters() {
        let conditions = node
            .filters()
            .iter()
            .map(|filter| filter_expression(filter, query, counter))
            .collect::<RepositoryResult<Vec<_>>>()?;
        groups.push(conditions.join(" AND "));
    }

    for branch in node.or_criteria() {
        if let Some(expression) = node_expression(branch, query, counter)? {
            groups.push(expression);
        }
    }

    Ok(match groups.len() {
        0 => None,
        1 => groups.pop(),
        _ => Some(
            groups
                .iter()
                .map(|group| format!("({})", group))
                .collect::<Vec<_>>()
                .join(" OR "),
        ),
    })
}

fn filter_expression(
    filter: &Filter,
    query: &mut DynamoDbQuery,
    counter: &mut usize,
) -> RepositoryResult<String> {
    let operator = filter.operator();
    if matches!(operator, FilterOperator::Like | FilterOperator::NotLike) {
        return Err(RepositoryError::unsupported_operator(BACKEND, operator));
    }

    let n = *counter;
    *counter += 1;

    let name = format!("#f{}", n);
    query
        .expression_attribute_names
        .insert(name.clone(), filter.field().to_string());

    let value = filter.value();
    let mut bind = |placeholder: String, value: &FilterValue| {
        query
            .expression_attribute_values
            .insert(placeholder.clone(), value.to_json());
        placeholder
    };

    let expression = match operator {
        FilterOperator::Equal if value.is_null() => {
            let null_type = bind(format!(":v{}", n), &FilterValue::from(NULL_TYPE));
            format!(
                "(attribute_not_exists({}) OR attribute_type({}, {}))",
                name, name, null_type
            )
        }
        FilterOperator::NotEqual if value.is_null() => {
            let null_type = bind(format!(":v{}", n), &FilterValue::from(NULL_TYPE));
            format!(
                "(attribute_exists({}) AND NOT attribute_type({}, {}))",
                name, name, null_type
            )
        }
        FilterOperator::Equal => format!("{} = {}", name, bind(format!(":v{}", n), value)),
        FilterOperator::NotEqual => format!("{} <> {}", name, bind(format!(":v{}", n), value)),
        FilterOperator::GreaterThan => {
            format!("{} > {}", name, bind(format!(":v{}", n), value))
        }
        FilterOperator::GreaterEqual => {
            format!("{} >= {}", name, bind(format!(":v{}", n), value))
        }
        FilterOperator::LessThan => format!("{} < {}", name, bind(format!(":v{}", n), value)),
        FilterOperator::LessEqual => {
            format!("{} <= {}", name, bind(format!(":v{}", n), value))
        }
        FilterOperator::Contains => {
            format!("contains({}, {})", name, bind(format!(":v{}", n), value))
        }
        FilterOperator::BeginsWith => {
            format!("begins_with({}, {})", name, bind(format!(":v{}", n), value))
        }
        FilterOperator::In | FilterOperator::NotIn => {
            let members = value.as_list().unwrap_or_default();
            if members.is_empty() {
                return Err(RepositoryError::translation(
                    BACKEND,
                    format!("{} on '{}' needs at least one value", operator, filter.field()),
                ));
            }
            if members.len() > MAX_IN_OPERANDS {
                return Err(RepositoryError::translation(
                    BACKEND,
                    format!(
                        "{} on '{}' has {} values; at most {} are allowed",
                        operator,
                        filter.field(),
                        members.len(),
                        MAX_IN_OPERANDS
                    ),
                ));
            }
            let placeholders: Vec<String> = members
                .iter()
                .enumerate()
                .map(|(i, member)| bind(format!(":v{}_{}", n, i), member))
                .collect();
            let membership = format!("{} IN ({})", name, placeholders.join(", "));
            if operator == FilterOperator::In {
                membership
            } else {
                format!("NOT ({})", membership)
            }
        }
        FilterOperator::Like | FilterOperator::NotLike => {
            return Err(RepositoryError::unsupported_operator(BACKEND, operator))
        }
    };
    Ok(expression)
}

/// A DynamoDB request
#[derive(Debug, Clone, PartialEq)]
pub enum DynamoDbCommand {
    /// Write a whole item
    PutItem {
        /// Table name
        table: String,
        /// Item attributes
        item: Record,
    },
    /// Read one item by key
    GetItem {
        /// Table name
        table: String,
        /// Primary key attributes
        key: Record,
    },
    /// Read every item passing an optional filter, following pagination
    Scan {
        /// Table name
        table: String,
        /// Filter expression and placeholders
        query: DynamoDbQuery,
    },
    /// Remove one item by key
    DeleteItem {
        /// Table name
        table: String,
        /// Primary key attributes
        key: Record,
    },
}

/// Builds [`DynamoDbCommand`]s for one table keyed on a single partition key
#[derive(Debug, Clone)]
pub struct DynamoDbCommandBuilder {
    table: String,
    id_field: String,
    numeric_keys: bool,
    converter: DynamoDbCriteriaConverter,
}

impl DynamoDbCommandBuilder {
    /// Builder for `table` with a string partition key named `id`
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            id_field: crate::backends::key_value::DEFAULT_ID_FIELD.to_string(),
            numeric_keys: false,
            converter: DynamoDbCriteriaConverter,
        }
    }

    /// Use a different partition key attribute
    #[must_use]
    pub fn with_id_field(mut self, id_field: impl Into<String>) -> Self {
        self.id_field = id_field.into();
        self
    }

    /// Encode keys as numbers (`N`) instead of strings (`S`)
    #[must_use]
    pub fn with_numeric_keys(mut self, numeric_keys: bool) -> Self {
        self.numeric_keys = numeric_keys;
        self
    }

    fn key(&self, id: &str) -> RepositoryResult<Record> {
        let value = if self.numeric_keys {
            let number = id.parse::<i64>().map_err(|_| {
                RepositoryError::validation(format!(
                    "Key '{}' is not numeric but table '{}' uses numeric keys",
                    id, self.table
                ))
                .with_backend(BACKEND)
            })?;
            Value::from(number)
        } else {
            Value::String(id.to_string())
        };
        let mut key = Record::new();
        key.insert(self.id_field.clone(), value);
        Ok(key)
    }
}

impl CommandBuilder for DynamoDbCommandBuilder {
    type Command = DynamoDbCommand;

    fn id_field(&self) -> &str {
        &self.id_field
    }

    fn upsert(&self, id: &str, mut record: Record) -> RepositoryResult<DynamoDbCommand> {
        // The key attribute must carry the configured key type
        record.extend(self.key(id)?);
        Ok(DynamoDbCommand::PutItem {
            table: self.table.clone(),
            item: record,
        })
    }

    fn find_by_id(&self, id: &str) -> RepositoryResult<DynamoDbCommand> {
        Ok(DynamoDbCommand::GetItem {
            table: self.table.clone(),
            key: self.key(id)?,
        })
    }

    fn find_all(&self) -> RepositoryResult<DynamoDbCommand> {
        Ok(DynamoDbCommand::Scan {
            table: self.table.clone(),
            query: DynamoDbQuery::default(),
        })
    }

    fn matching(&self, criteria: &Criteria) -> RepositoryResult<QueryPlan<DynamoDbCommand>> {
        let query = self.converter.convert(criteria)?;
        let command = DynamoDbCommand::Scan {
            table: self.table.clone(),
            query,
        };
        Ok(QueryPlan::with_residual(
            command,
            Residual::pagination(criteria.limit(), criteria.offset()),
        ))
    }

    fn delete(&self, id: &str) -> RepositoryResult<DynamoDbCommand> {
        Ok(DynamoDbCommand::DeleteItem {
            table: self.table.clone(),
            key: self.key(id)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::Order;
    use crate::repository::RepositoryErrorKind;
    use serde_json::json;

    fn convert(criteria: &Criteria) -> RepositoryResult<DynamoDbQuery> {
        DynamoDbCriteriaConverter.convert(criteria)
    }

    #[test]
    fn test_placeholders_are_unique_across_branches() {
        let mut root = Criteria::from_filter(Filter::eq("status", "active").unwrap());
        root.add_filter(Filter::gt("age", 18).unwrap());
        root.add_or_criteria(Criteria::from_filter(Filter::eq("status", "vip").unwrap()));

        let query = convert(&root).unwrap();
        assert_eq!(
            query.filter_expression.as_deref(),
            Some("(#f0 = :v0 AND #f1 > :v1) OR (#f2 = :v2)")
        );
        assert_eq!(query.expression_attribute_names.len(), 3);
        assert_eq!(query.expression_attribute_values[":v1"], json!(18));
        assert_eq!(query.expression_attribute_values[":v2"], json!("vip"));
    }

    #[test]
    fn test_in_and_not_in_expand_members() {
        let mut criteria = Criteria::from_filter(Filter::is_in("a", vec![1, 2]).unwrap());
        criteria.add_filter(Filter::not_in("b", vec!["x"]).unwrap());
        let query = convert(&criteria).unwrap();
        assert_eq!(
            query.filter_expression.as_deref(),
            Some("#f0 IN (:v0_0, :v0_1) AND NOT (#f1 IN (:v1_0))")
        );
        let keys: Vec<_> = query.expression_attribute_values.keys().cloned().collect();
        assert_eq!(keys, vec![":v0_0", ":v0_1", ":v1_0"]);
    }

    #[test]
    fn test_null_equality_covers_missing_and_null_attributes() {
        let mut criteria =
            Criteria::from_filter(Filter::eq("deleted_at", None::<String>).unwrap());
        criteria.add_filter(Filter::ne("email", None::<String>).unwrap());
        let query = convert(&criteria).unwrap();
        assert_eq!(
            query.filter_expression.as_deref(),
            Some(
                "(attribute_not_exists(#f0) OR attribute_type(#f0, :v0)) \
                 AND (attribute_exists(#f1) AND NOT attribute_type(#f1, :v1))"
            )
        );
        assert_eq!(query.expression_attribute_values[":v0"], json!("NULL"));
        assert_eq!(query.expression_attribute_values[":v1"], json!("NULL"));
    }

    #[test]
    fn test_status_in_three_values() {
        let criteria =
            Criteria::from_filter(Filter::is_in("status", vec!["a", "b", "c"]).unwrap());
        let query = convert(&criteria).unwrap();
        let expression = query.filter_expression.unwrap();
        assert_eq!(expression, "#f0 IN (:v0_0, :v0_1, :v0_2)");
        assert_eq!(query.expression_attribute_names["#f0"], "status");
        assert_eq!(query.expression_attribute_values.len(), 3);
        for (placeholder, expected) in [(":v0_0", "a"), (":v0_1", "b"), (":v0_2", "c")] {
            assert!(expression.contains(placeholder));
            assert_eq!(query.expression_attribute_values[placeholder], json!(expected));
        }
    }

    #[test]
    fn test_like_is_unsupported() {
        for filter in [
            Filter::like("name", "A%").unwrap(),
            Filter::not_like("name", "A%").unwrap(),
        ] {
            let error = convert(&Criteria::from_filter(filter)).unwrap_err();
            assert_eq!(error.kind, RepositoryErrorKind::UnsupportedOperator);
            assert_eq!(error.backend.as_deref(), Some("dynamodb"));
        }
    }

    #[test]
    fn test_order_is_a_translation_error() {
        let criteria = Criteria::all().with_order(Order::asc("name").unwrap());
        let error = convert(&criteria).unwrap_err();
        assert_eq!(error.kind, RepositoryErrorKind::Translation);
    }

    #[test]
    fn test_empty_and_oversized_in_lists_rejected() {
        let empty: Vec<i64> = Vec::new();
        let error = convert(&Criteria::from_filter(Filter::is_in("a", empty).unwrap()))
            .unwrap_err();
        assert_eq!(error.kind, RepositoryErrorKind::Translation);

        let many: Vec<i64> = (0..=MAX_IN_OPERANDS as i64).collect();
        let error = convert(&Criteria::from_filter(Filter::is_in("a", many).unwrap()))
            .unwrap_err();
        assert_eq!(error.kind, RepositoryErrorKind::Translation);
    }

    #[test]
    fn test_unconstrained_branch_collapses_expression() {
        let mut root = Criteria::from_filter(Filter::eq("a", 1).unwrap());
        root.add_or_criteria(Criteria::all());
        let query = convert(&root).unwrap();
        assert_eq!(query, DynamoDbQuery::default());
    }

    #[test]
    fn test_matching_keeps_pagination_as_residual() {
        let plan = DynamoDbCommandBuilder::new("users")
            .matching(&Criteria::from_filter(Filter::eq("a", 1).unwrap()).with_limit(5))
            .unwrap();
        assert!(matches!(plan.command, DynamoDbCommand::Scan { .. }));
        assert_eq!(plan.residual.limit, Some(5));
        assert!(plan.residual.criteria.is_none());
    }

    #[test]
    fn test_numeric_keys() {
        let builder = DynamoDbCommandBuilder::new("orders").with_numeric_keys(true);
        let command = builder.find_by_id("42").unwrap();
        let DynamoDbCommand::GetItem { key, .. } = command else {
            panic!("expected GetItem");
        };
        assert_eq!(key["id"], json!(42));
        assert!(builder.find_by_id("abc").is_err());
    }
}
